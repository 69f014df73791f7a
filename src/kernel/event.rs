use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ExpectedError;
use super::session::SessionId;

/// Parameters that identify the invocation, rendered first and verbatim.
const IDENTITY_PARAMS: &[&str] = &["command", "testcase_id"];

/// Flag parameter -> descriptor token, rendered only when truthy.
const FLAG_TOKENS: &[(&str, &str)] = &[("current", "current"), ("enable_debug", "debug")];

pub const INTERRUPTED_NAME: &str = "Interrupted";
pub const UNCLASSIFIED_NAME: &str = "UnclassifiedError";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Error,
}

/// One event, ready for a sink. Never mutated once handed over.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub message: String,
    pub fields: Map<String, Value>,
    pub severity: Severity,
}

/// Who is speaking: owned by the run context, shared by every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub session_id: SessionId,
}

impl Identity {
    pub fn current() -> Self {
        Self {
            user: super::session::current_user(),
            session_id: SessionId::generate(),
        }
    }
}

/// Classification attached to a failure event.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub exception: String,
    pub extras: Map<String, Value>,
}

impl Failure {
    pub fn expected(err: &ExpectedError) -> Self {
        Self {
            exception: err.kind.name().to_string(),
            extras: err.extras.clone(),
        }
    }

    pub fn interrupted() -> Self {
        Self {
            exception: INTERRUPTED_NAME.to_string(),
            extras: Map::new(),
        }
    }

    /// Records the innermost cause under `root_cause`.
    pub fn unclassified(err: &anyhow::Error) -> Self {
        let mut extras = Map::new();
        extras.insert("root_cause".into(), Value::from(err.root_cause().to_string()));
        Self {
            exception: UNCLASSIFIED_NAME.to_string(),
            extras,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Started,
    Succeeded,
    Failed(Failure),
}

impl Outcome {
    fn verb(&self) -> &'static str {
        match self {
            Outcome::Started => "started",
            Outcome::Succeeded => "successfully finished",
            Outcome::Failed(_) => "failed to finish",
        }
    }
}

/// Renders one event.
///
/// Field order: params, outcome fields (`success`, `exception`,
/// `exception_extras`), `user`, `sessionId`, `message`, then `extra`.
/// Extra fields are merged last and win on collision.
///
/// `trace` is appended to the message on its own line and forces `ERROR`.
pub fn format_event(
    identity: &Identity,
    params: &Map<String, Value>,
    outcome: &Outcome,
    extra: &Map<String, Value>,
    trace: Option<&str>,
) -> LogEntry {
    let mut message = format!(
        "{} {} ({}).",
        identity.user,
        outcome.verb(),
        descriptors(params).join(", ")
    );
    if let Some(trace) = trace {
        message.push('\n');
        message.push_str(trace);
    }

    let mut fields = params.clone();
    match outcome {
        Outcome::Started => {}
        Outcome::Succeeded => {
            fields.insert("success".into(), Value::Bool(true));
        }
        Outcome::Failed(failure) => {
            fields.insert("success".into(), Value::Bool(false));
            fields.insert("exception".into(), Value::from(failure.exception.clone()));
            if !failure.extras.is_empty() {
                fields.insert(
                    "exception_extras".into(),
                    Value::Object(failure.extras.clone()),
                );
            }
        }
    }
    fields.insert("user".into(), Value::from(identity.user.clone()));
    fields.insert("sessionId".into(), Value::from(identity.session_id.as_str()));
    fields.insert("message".into(), Value::from(message.clone()));
    fields.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    let severity = match (outcome, trace) {
        (Outcome::Failed(_), _) | (_, Some(_)) => Severity::Error,
        _ => Severity::Info,
    };

    LogEntry {
        message,
        fields,
        severity,
    }
}

/// Short tokens summarising the invocation: identity params, then set flags.
pub fn descriptors(params: &Map<String, Value>) -> Vec<String> {
    let mut tokens: Vec<String> = IDENTITY_PARAMS
        .iter()
        .filter_map(|key| params.get(*key))
        .filter(|value| !value.is_null())
        .map(render_token)
        .collect();

    tokens.extend(
        FLAG_TOKENS
            .iter()
            .filter(|(key, _)| params.get(*key).is_some_and(is_truthy))
            .map(|(_, token)| token.to_string()),
    );
    tokens
}

fn render_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(3)));
        assert!(is_truthy(&json!("x")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn test_descriptors_skip_missing_identity() {
        let p = params(json!({"command": "exec", "enable_debug": true}));
        assert_eq!(descriptors(&p), vec!["exec", "debug"]);
    }

    #[test]
    fn test_string_testcase_id_is_unquoted() {
        let p = params(json!({"command": "reproduce", "testcase_id": "abc"}));
        assert_eq!(descriptors(&p), vec!["reproduce", "abc"]);
    }
}
