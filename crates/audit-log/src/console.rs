//! Human-oriented console rendering of audit entries.

use serde_json::Value;

use crate::AuditLogEntry;

// Widest level/operation names ("Information", "Remediation").
const LEVEL_WIDTH: usize = 11;
const OPERATION_WIDTH: usize = 11;

pub(crate) fn render(entry: &AuditLogEntry) -> String {
    let mut line = format!(
        "{} [{:<lw$}] [{:<ow$}] {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        entry.level.as_str(),
        entry.operation.as_str(),
        entry.message,
        lw = LEVEL_WIDTH,
        ow = OPERATION_WIDTH,
    );
    for (key, value) in entry.context.iter() {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&render_value(value));
    }
    line
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) if s.is_empty() || s.contains(char::is_whitespace) => format!("{:?}", s),
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::render;
    use crate::{Actor, AuditLogEntry, LogContext, LogLevel, Operation};
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_aligned_columns_and_inline_context() {
        let entry = AuditLogEntry {
            timestamp: Utc
                .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
                .single()
                .expect("valid timestamp"),
            sequence: 1,
            level: LogLevel::Warning,
            operation: Operation::Check,
            message: "control evaluated".to_string(),
            module: "cisguard".to_string(),
            context: LogContext::new()
                .with("controlId", "1.1.4")
                .with("status", "Fail")
                .with("title", "Minimum password length"),
            actor: Actor {
                user: "admin".to_string(),
                host: "ws01".to_string(),
                process_id: 42,
                process_name: "cisguard-agent".to_string(),
            },
        };

        assert_eq!(
            render(&entry),
            "2026-01-02 03:04:05.000 [Warning    ] [Check      ] control evaluated \
controlId=1.1.4 status=Fail title=\"Minimum password length\""
        );
    }
}
