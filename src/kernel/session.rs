use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Length of the random component of a session id.
pub const TOKEN_LEN: usize = 40;

/// Correlation token grouping every event of one run: `{user}:{epoch}:{token}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Session id for the current user, stamped with the current time.
    pub fn generate() -> Self {
        Self::for_user(&current_user(), SystemTime::now())
    }

    pub fn for_user(user: &str, at: SystemTime) -> Self {
        let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
        SessionId(format!(
            "{}:{}.{:06}:{}",
            user,
            since_epoch.as_secs(),
            since_epoch.subsec_micros(),
            random_token()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits into `(user, timestamp, token)`. The user part may itself contain ':'.
    pub fn parts(&self) -> (&str, &str, &str) {
        let mut it = self.0.rsplitn(3, ':');
        let token = it.next().unwrap_or_default();
        let timestamp = it.next().unwrap_or_default();
        let user = it.next().unwrap_or_default();
        (user, timestamp, token)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Login name from `USER`; empty when unavailable.
pub fn current_user() -> String {
    std::env::var("USER").unwrap_or_default()
}

fn random_token() -> String {
    let mut token = String::with_capacity(TOKEN_LEN + 32);
    while token.len() < TOKEN_LEN {
        token.push_str(&Uuid::new_v4().simple().to_string());
    }
    token.truncate(TOKEN_LEN);
    token
}
