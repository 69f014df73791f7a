use serde::Serialize;
use serde_json::{Map, Value};

use super::error::class_name_for_exit_code;
use super::event::{LogEntry, Severity};

/// Outcome of one testcase reproduction attempt on CI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub testcase_id: u64,
    /// Sanity check or pulled testcase.
    pub testcase_type: String,
    pub version: String,
    pub release: String,
    pub return_code: i32,
    pub logs: String,
    pub opts: String,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.return_code == 0
    }

    /// Class name of the failure; empty on success.
    pub fn error_name(&self) -> &'static str {
        if self.succeeded() {
            ""
        } else {
            class_name_for_exit_code(self.return_code)
        }
    }

    pub fn message(&self) -> String {
        let opts = if self.opts.is_empty() {
            String::new()
        } else {
            format!(", {}", self.opts)
        };

        if self.succeeded() {
            format!(
                "{} ({}) reproduced {} successfully ({}{}).",
                self.version, self.release, self.testcase_id, self.testcase_type, opts
            )
        } else {
            format!(
                "{} ({}) failed to reproduce {} ({}, {}{}).",
                self.version,
                self.release,
                self.testcase_id,
                self.testcase_type,
                self.error_name(),
                opts
            )
        }
    }

    /// Logs are only shipped on failure.
    pub fn to_entry(&self) -> LogEntry {
        let success = self.succeeded();
        let message = self.message();

        let mut fields = Map::new();
        fields.insert("testcaseId".into(), Value::from(self.testcase_id));
        fields.insert("type".into(), Value::from(self.testcase_type.clone()));
        fields.insert("version".into(), Value::from(self.version.clone()));
        fields.insert("message".into(), Value::from(message.clone()));
        fields.insert("release".into(), Value::from(self.release.clone()));
        fields.insert("returnCode".into(), Value::from(self.return_code));
        fields.insert("error".into(), Value::from(self.error_name()));
        let logs = if success { "" } else { self.logs.as_str() };
        fields.insert("logs".into(), Value::from(logs));
        fields.insert("opts".into(), Value::from(self.opts.clone()));

        LogEntry {
            message,
            fields,
            severity: if success { Severity::Info } else { Severity::Error },
        }
    }
}
