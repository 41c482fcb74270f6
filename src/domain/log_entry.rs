use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Success,
    Failure,
    Task,
    Scan,
    Input,
    Notification,
    Plain,
}

impl LogCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Task => "task",
            Self::Scan => "scan",
            Self::Input => "input",
            Self::Notification => "notification",
            Self::Plain => "plain",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" => Some(Self::Success),
            "failure" | "error" | "warn" | "warning" => Some(Self::Failure),
            "task" | "monitor" | "lock" => Some(Self::Task),
            "scan" => Some(Self::Scan),
            "input" | "action" => Some(Self::Input),
            "notification" | "email" => Some(Self::Notification),
            "plain" | "info" | "debug" => Some(Self::Plain),
            _ => None,
        }
    }
}

// Checked in order; the first group with a hit wins.
const KEYWORD_GROUPS: [(LogCategory, &[&str]); 6] = [
    (LogCategory::Success, &["成功", "Success", "✅", "🎉"]),
    (LogCategory::Failure, &["失败", "Error", "❌", "⚠️"]),
    (LogCategory::Task, &["监控", "Task", "Lock"]),
    (LogCategory::Scan, &["扫描", "嗅探"]),
    (LogCategory::Input, &["输入", "点击"]),
    (LogCategory::Notification, &["邮件", "Email"]),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub raw: String,
    pub stamp: Option<String>,
    pub message: String,
    pub category: LogCategory,
}

#[derive(Debug, Deserialize)]
struct StructuredLine {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default, alias = "msg")]
    message: Option<String>,
    #[serde(default, alias = "timestamp", alias = "time")]
    stamp: Option<String>,
}

impl LogEntry {
    /// Parses either a JSON log record carrying its own category or level, or a
    /// plain `[stamp] message` line categorised by keyword.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(entry) = Self::parse_structured(trimmed) {
            return entry;
        }

        let (stamp, message) = split_stamp(trimmed);
        Self {
            raw: trimmed.to_string(),
            stamp,
            category: categorize_by_keyword(&message),
            message,
        }
    }

    fn parse_structured(raw: &str) -> Option<Self> {
        if !raw.starts_with('{') {
            return None;
        }
        let line: StructuredLine = serde_json::from_str(raw).ok()?;
        let message = line.message?.trim().to_string();
        let category = line
            .category
            .as_deref()
            .and_then(LogCategory::from_label)
            .or_else(|| line.level.as_deref().and_then(LogCategory::from_label))
            .unwrap_or_else(|| categorize_by_keyword(&message));
        Some(Self {
            raw: raw.to_string(),
            stamp: line
                .stamp
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            message,
            category,
        })
    }
}

pub fn categorize_by_keyword(message: &str) -> LogCategory {
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| message.contains(keyword)))
        .map(|(category, _)| *category)
        .unwrap_or(LogCategory::Plain)
}

fn split_stamp(line: &str) -> (Option<String>, String) {
    if !line.starts_with('[') {
        return (None, line.to_string());
    }
    match line.split_once(']') {
        Some((stamp, rest)) => (
            Some(stamp.trim_start_matches('[').trim().to_string()),
            rest.trim().to_string(),
        ),
        None => (None, line.to_string()),
    }
}
