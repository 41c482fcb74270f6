use crate::domain::models::{MonthlyTask, OrderRecord, TaskInfo, TaskKind, VenueRow};
use crate::infrastructure::error::InfraError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

const STATUS_SUCCESS: &str = "success";
const STATUS_NEED_2FA: &str = "need_2fa";
const STATUS_FORBIDDEN: &str = "forbidden";
const STATUS_NEED_RESCUE_2FA: &str = "need_rescue_2fa";

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitTwoFactorRequest<'a> {
    pub code: &'a str,
    pub username: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    pub token: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub venue_id: String,
    pub price: f64,
    pub stadium_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorTaskPayload {
    pub token: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub lock_mode: bool,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stadium_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopTaskRequest<'a> {
    #[serde(rename = "taskId")]
    pub task_id: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyTaskPayload {
    pub token: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub target_year: i32,
    pub target_month: u32,
    pub weekday: u8,
    pub start_time: String,
    pub end_time: String,
    pub venue_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelMonthlyRequest<'a> {
    pub task_id: &'a str,
    pub username: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrdersRequest {
    pub token: String,
    #[serde(rename = "type")]
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
}

/// Generic `{status, msg, ...}` acknowledgement returned by mutating endpoints.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ServiceAck {
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "taskId", alias = "task_id")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ServiceAck {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_SUCCESS)
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.msg
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    pub fn into_success(self, action: &str) -> Result<Self, InfraError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(InfraError::ServiceRejected(
            self.message_or(&format!("{action} failed with status {:?}", self.status)),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginReply {
    Authenticated { token: String },
    TwoFactorRequired,
    Forbidden(String),
    Rejected(String),
}

impl From<ServiceAck> for LoginReply {
    fn from(ack: ServiceAck) -> Self {
        match ack.status.as_str() {
            STATUS_SUCCESS => match ack
                .token
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                Some(token) => Self::Authenticated {
                    token: token.to_string(),
                },
                None => Self::Rejected("login succeeded without a token".to_string()),
            },
            STATUS_NEED_2FA => Self::TwoFactorRequired,
            STATUS_FORBIDDEN => Self::Forbidden(ack.message_or("account is not allowed")),
            _ => Self::Rejected(ack.message_or("login failed")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VenueWindow {
    pub dates: BTreeMap<NaiveDate, Vec<VenueRow>>,
    pub undecodable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VenuesReply {
    Window(VenueWindow),
    NeedRescueTwoFactor { username: String, message: String },
    /// Error marker: the service could not use the supplied token.
    Invalid(String),
}

pub fn decode_venues_reply(body: &str) -> Result<VenuesReply, InfraError> {
    let parsed: serde_json::Value = serde_json::from_str(body).map_err(|error| {
        InfraError::ServiceRejected(format!("invalid venues payload: {error}; body={body}"))
    })?;
    let Some(object) = parsed.as_object() else {
        return Ok(VenuesReply::Invalid(format!("unexpected venues payload: {body}")));
    };

    if object.get("status").and_then(serde_json::Value::as_str) == Some(STATUS_NEED_RESCUE_2FA) {
        let username = object
            .get("username")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let message = object
            .get("msg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("two-factor code required")
            .to_string();
        return Ok(VenuesReply::NeedRescueTwoFactor { username, message });
    }

    if let Some(error) = object.get("error").filter(|value| !value.is_null()) {
        let message = error
            .as_str()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| error.to_string());
        return Ok(VenuesReply::Invalid(message));
    }
    if let Some(code) = object.get("code").and_then(serde_json::Value::as_i64) {
        if code != 200 {
            return Ok(VenuesReply::Invalid(format!("service returned code {code}")));
        }
    }

    let mut window = VenueWindow::default();
    for (key, value) in object {
        if key == "code" {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(key, "%Y-%m-%d") else {
            warn!(key = %key, "ignoring non-date key in venues payload");
            continue;
        };
        match serde_json::from_value::<Vec<VenueRow>>(value.clone()) {
            Ok(rows) => {
                window.dates.insert(date, rows);
            }
            Err(error) => {
                warn!(%date, %error, "venue rows for date did not decode; keeping previous data");
                window.undecodable.push(key.clone());
            }
        }
    }
    Ok(VenuesReply::Window(window))
}

#[derive(Debug, Deserialize)]
struct TaskSnapshotEntry {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    info: Option<String>,
}

pub fn decode_task_snapshot(body: &str) -> Result<Vec<TaskInfo>, InfraError> {
    let parsed: BTreeMap<String, TaskSnapshotEntry> =
        serde_json::from_str(body).map_err(|error| {
            InfraError::ServiceRejected(format!("invalid tasks payload: {error}; body={body}"))
        })?;
    Ok(parsed
        .into_iter()
        .filter(|(id, _)| !id.trim().is_empty())
        .map(|(id, entry)| TaskInfo {
            id,
            kind: parse_task_kind(entry.kind.as_deref()),
            status: entry.status.unwrap_or_default(),
            info: entry.info.unwrap_or_default(),
        })
        .collect())
}

fn parse_task_kind(value: Option<&str>) -> TaskKind {
    match value.map(str::trim) {
        Some(kind) if kind.eq_ignore_ascii_case("lock") => TaskKind::Lock,
        _ => TaskKind::Snipe,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrdersReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<OrdersPage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrdersPage {
    #[serde(default)]
    pub records: Vec<OrderRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MonthlyTasksReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub tasks: Vec<MonthlyTask>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MonthlyVenueIdsReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub venue_ids: BTreeMap<String, String>,
}
