pub mod config;
pub mod kernel;
pub mod services;

// Re-export specific items if needed for convenient access
pub use kernel::context::RunContext;
pub use kernel::invocation::{Invocation, InvocationLogger};
pub use services::logging::LogSink;
