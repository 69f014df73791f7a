//! Invocation Kernel
//!
//! Wraps a unit of work with start / success / failure events and maps its
//! outcome onto a process exit code.
//!
//! # LOGGING INVARIANT
//! Log delivery is best-effort. A sink failure must **NEVER** change the
//! outcome of the wrapped command: no swallowed success, no masked error,
//! no different exit code.
//!
//! # TERMINATION INVARIANT
//! Nothing in this module exits the process. Exit codes are carried by
//! [`error::InvocationError::exit_code`] and consulted once, by the binary.

pub mod context;
pub mod error;
pub mod event;
pub mod invocation;
pub mod report;
pub mod session;
