use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub const OFFERED_SLOTS: [&str; 11] = [
    "08:00-09:00",
    "09:00-10:00",
    "10:00-11:00",
    "11:00-12:00",
    "12:00-13:00",
    "13:00-14:00",
    "14:00-15:00",
    "15:00-16:00",
    "16:00-18:00",
    "18:00-20:00",
    "20:00-22:00",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Free,
    Sold,
    Reserved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VenueSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub venue_id: String,
    pub start_time: String,
    pub end_time: String,
    pub status: SlotStatus,
    #[serde(default, deserialize_with = "price_or_zero")]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stadium_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_purpose: Option<String>,
}

impl VenueSession {
    pub fn slot(&self) -> Result<SlotRange, String> {
        SlotRange::from_bounds(&self.start_time, &self.end_time)
    }

    pub fn matches_slot(&self, slot: &SlotRange) -> bool {
        self.slot().map(|own| own == *slot).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VenueRow {
    pub name: String,
    #[serde(deserialize_with = "text_or_number")]
    pub id: String,
    #[serde(default)]
    pub sessions: Vec<VenueSession>,
}

impl VenueRow {
    pub fn session_for(&self, slot: &SlotRange) -> Option<&VenueSession> {
        self.sessions.iter().find(|session| session.matches_slot(slot))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn parse(value: &str, field_name: &str) -> Result<Self, String> {
        let invalid = || format!("{field_name} must be HH:MM");
        let mut split = value.trim().split(':');
        let (Some(hour_str), Some(minute_str), None) = (split.next(), split.next(), split.next())
        else {
            return Err(invalid());
        };
        let hour = hour_str.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute_str.parse::<u8>().map_err(|_| invalid())?;
        if hour > 24 || minute > 59 || (hour == 24 && minute > 0) {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A bookable interval written as `HH:MM-HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotRange {
    start: ClockTime,
    end: ClockTime,
}

impl SlotRange {
    pub fn from_bounds(start: &str, end: &str) -> Result<Self, String> {
        let start = ClockTime::parse(start, "slot start")?;
        let end = ClockTime::parse(end, "slot end")?;
        if end <= start {
            return Err(format!("slot end {end} must be after start {start}"));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> ClockTime {
        self.start
    }

    pub fn end(&self) -> ClockTime {
        self.end
    }

    pub fn start_hour(&self) -> u32 {
        u32::from(self.start.hour)
    }

    pub fn end_hour(&self) -> u32 {
        u32::from(self.end.hour)
    }
}

impl FromStr for SlotRange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((start, end)) = value.trim().split_once('-') else {
            return Err(format!("slot must be HH:MM-HH:MM, got {value:?}"));
        };
        Self::from_bounds(start, end)
    }
}

impl TryFrom<String> for SlotRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotRange> for String {
    fn from(value: SlotRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Snipe,
    Lock,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snipe => "snipe",
            Self::Lock => "lock",
        }
    }

    pub fn lock_mode(self) -> bool {
        matches!(self, Self::Lock)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: String,
    pub kind: TaskKind,
    pub status: String,
    pub info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyTaskStatus {
    Pending,
    Waiting,
    Running,
    Success,
    Failed,
    Cancelled,
    #[serde(untagged)]
    Unknown(String),
}

impl MonthlyTaskStatus {
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Waiting)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthlyTask {
    pub task_id: String,
    pub target_year: i32,
    pub target_month: u32,
    pub weekday: u8,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub venue_ids: Vec<String>,
    pub status: MonthlyTaskStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub success_venues: Vec<String>,
    #[serde(default)]
    pub failed_venues: Vec<String>,
}

impl MonthlyTask {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.task_id, "monthly_task.task_id")?;
        validate_weekday(self.weekday, "monthly_task.weekday")?;
        validate_month(self.target_month, "monthly_task.target_month")?;
        SlotRange::from_bounds(&self.start_time, &self.end_time)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Idle,
    Checking,
    TwoFactorNeeded,
    Active,
    Reconnecting,
    RescueTwoFactorNeeded,
    Error,
}

impl AuthState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::TwoFactorNeeded => "two_factor_needed",
            Self::Active => "active",
            Self::Reconnecting => "reconnecting",
            Self::RescueTwoFactorNeeded => "rescue_two_factor_needed",
            Self::Error => "error",
        }
    }

    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            Self::Active | Self::Reconnecting | Self::RescueTwoFactorNeeded
        )
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub notify_email: Option<String>,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        notify_email: Option<String>,
    ) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password: password.into(),
            notify_email: notify_email
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.username, "credentials.username")?;
        validate_non_empty(&self.password, "credentials.password")?;
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("notify_email", &self.notify_email)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderBucket {
    Unpaid,
    Paid,
    Refund,
    Closed,
}

impl OrderBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Refund => "refund",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for OrderBucket {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            "refund" => Ok(Self::Refund),
            "closed" => Ok(Self::Closed),
            other => Err(format!(
                "order bucket must be unpaid, paid, refund or closed, got {other:?}"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub belong_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

pub fn parse_date(value: &str, field_name: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub fn validate_weekday(value: u8, field_name: &str) -> Result<(), String> {
    if !(1..=7).contains(&value) {
        return Err(format!("{field_name} must be between 1 (Monday) and 7 (Sunday)"));
    }
    Ok(())
}

pub fn validate_month(value: u32, field_name: &str) -> Result<(), String> {
    if !(1..=12).contains(&value) {
        return Err(format!("{field_name} must be between 1 and 12"));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Integer(i64),
    Float(f64),
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(value) => value,
        TextOrNumber::Integer(value) => value.to_string(),
        TextOrNumber::Float(value) => value.to_string(),
    })
}

/// A missing or null price reads as 0.
fn price_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
