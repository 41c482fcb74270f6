use crate::infrastructure::credential_store::DEFAULT_TOKEN_SERVICE;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
const DEFAULT_WINDOW_DAYS: u64 = 8;
const MAX_WINDOW_DAYS: u64 = 31;

const ENV_SERVICE_URL: [&str; 2] = ["COURTSIDE_SERVICE_URL", "BOOKING_SERVICE_URL"];
const ENV_TIMEZONE: [&str; 2] = ["COURTSIDE_TIMEZONE", "TZ_VENUE"];

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub service_base_url: String,
    pub timezone: Tz,
    pub window_days: u32,
    pub request_timeout: Duration,
    pub fast_poll_interval: Duration,
    pub auto_refresh_interval: Duration,
    pub post_booking_delay: Duration,
    pub default_monitor_price: f64,
    pub default_stadium_id: i64,
    pub credential_service: String,
    pub support_contact: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_base_url: DEFAULT_SERVICE_URL.to_string(),
            timezone: chrono_tz::Asia::Shanghai,
            window_days: DEFAULT_WINDOW_DAYS as u32,
            request_timeout: Duration::from_secs(30),
            fast_poll_interval: Duration::from_millis(1_000),
            auto_refresh_interval: Duration::from_secs(300),
            post_booking_delay: Duration::from_secs(5),
            default_monitor_price: 40.0,
            default_stadium_id: 1,
            credential_service: DEFAULT_TOKEN_SERVICE.to_string(),
            support_contact: None,
        }
    }
}

pub fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "Courtside",
        "serviceBaseUrl": DEFAULT_SERVICE_URL,
        "timezone": DEFAULT_TIMEZONE,
        "windowDays": DEFAULT_WINDOW_DAYS,
        "requestTimeoutSecs": 30,
        "polling": {
            "fastIntervalMs": 1000,
            "autoRefreshIntervalSecs": 300,
            "postBookingDelaySecs": 5
        },
        "monitor": {
            "defaultPrice": 40,
            "defaultStadiumId": 1
        },
        "credentialService": DEFAULT_TOKEN_SERVICE,
        "supportContact": null
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_client_config(config_dir: &Path) -> Result<ClientConfig, InfraError> {
    load_client_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn load_client_config_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<ClientConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let app = read_config(&config_dir.join(APP_JSON))?;
    let mut config = parse_client_config(&app)?;

    if let Some(url) = optional_lookup_value(&lookup, &ENV_SERVICE_URL) {
        config.service_base_url = url;
    }
    if let Some(timezone) = optional_lookup_value(&lookup, &ENV_TIMEZONE) {
        config.timezone = parse_timezone(&timezone)?;
    }
    Ok(config)
}

pub fn parse_client_config(app: &serde_json::Value) -> Result<ClientConfig, InfraError> {
    let defaults = ClientConfig::default();

    let window_days = read_u64(app, &["windowDays"]).unwrap_or(DEFAULT_WINDOW_DAYS);
    if window_days == 0 || window_days > MAX_WINDOW_DAYS {
        return Err(InfraError::InvalidConfig(format!(
            "windowDays must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }

    let timezone = match read_str(app, &["timezone"]) {
        Some(value) => parse_timezone(&value)?,
        None => defaults.timezone,
    };

    Ok(ClientConfig {
        service_base_url: read_str(app, &["serviceBaseUrl"]).unwrap_or(defaults.service_base_url),
        timezone,
        window_days: window_days as u32,
        request_timeout: positive_duration(
            app,
            &["requestTimeoutSecs"],
            Duration::from_secs,
            defaults.request_timeout,
        )?,
        fast_poll_interval: positive_duration(
            app,
            &["polling", "fastIntervalMs"],
            Duration::from_millis,
            defaults.fast_poll_interval,
        )?,
        auto_refresh_interval: positive_duration(
            app,
            &["polling", "autoRefreshIntervalSecs"],
            Duration::from_secs,
            defaults.auto_refresh_interval,
        )?,
        post_booking_delay: read_u64(app, &["polling", "postBookingDelaySecs"])
            .map(Duration::from_secs)
            .unwrap_or(defaults.post_booking_delay),
        default_monitor_price: read_path(app, &["monitor", "defaultPrice"])
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(defaults.default_monitor_price),
        default_stadium_id: read_path(app, &["monitor", "defaultStadiumId"])
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(defaults.default_stadium_id),
        credential_service: read_str(app, &["credentialService"])
            .unwrap_or(defaults.credential_service),
        support_contact: read_str(app, &["supportContact"]),
    })
}

pub fn parse_timezone(value: &str) -> Result<Tz, InfraError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone {value:?}: {error}")))
}

fn read_path<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

fn read_str(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    read_path(value, path)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn read_u64(value: &serde_json::Value, path: &[&str]) -> Option<u64> {
    read_path(value, path).and_then(serde_json::Value::as_u64)
}

fn positive_duration(
    value: &serde_json::Value,
    path: &[&str],
    unit: fn(u64) -> Duration,
    fallback: Duration,
) -> Result<Duration, InfraError> {
    match read_u64(value, path) {
        Some(0) => Err(InfraError::InvalidConfig(format!(
            "{} must be greater than zero",
            path.join(".")
        ))),
        Some(amount) => Ok(unit(amount)),
        None => Ok(fallback),
    }
}

pub fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
