use crate::application::availability_sync::{AvailabilityModel, FetchMode, GridRow, RefreshOutcome};
use crate::application::booking::BookingRequestBuilder;
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::clock::{Clock, NowProvider};
use crate::application::logs::LogFeed;
use crate::application::polling::{PollingScheduler, View};
use crate::application::session::{LoginOutcome, SessionManager, SessionSnapshot};
use crate::application::tasks::{
    MonitorDefaults, MonitorRequest, MonthlyBatchReport, MonthlyBatchRequest,
    TaskLifecycleController, VenueSelector,
};
use crate::domain::log_entry::LogEntry;
use crate::domain::models::{
    parse_date, Credentials, MonthlyTask, OrderBucket, OrderRecord, SlotRange, TaskInfo, TaskKind,
};
use crate::infrastructure::booking_client::{BookingServiceClient, ReqwestBookingServiceClient};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::credential_store::{KeyringTokenStore, TokenStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::OrdersRequest;
use crate::infrastructure::venue_cache::InMemoryVenueCacheRepository;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

const ORDERS_PAGE_SIZE: u32 = 10;

pub struct AppState {
    config: ClientConfig,
    logs_dir: PathBuf,
    clock: Clock,
    client: Arc<dyn BookingServiceClient>,
    session: Arc<SessionManager>,
    availability: Arc<AvailabilityModel>,
    tasks: Arc<TaskLifecycleController>,
    logs: Arc<LogFeed>,
    scheduler: Arc<PollingScheduler>,
    booking: BookingRequestBuilder,
    log_guard: Mutex<()>,
}

impl AppState {
    /// Production wiring: HTTP client from config and the OS keyring.
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let client = ReqwestBookingServiceClient::new(
            &bootstrap.config.service_base_url,
            bootstrap.config.request_timeout,
        )?;
        let token_store = KeyringTokenStore::new(bootstrap.config.credential_service.clone());
        Ok(Self::assemble(
            bootstrap,
            Arc::new(client),
            Arc::new(token_store),
            None,
        ))
    }

    pub fn with_collaborators(
        workspace_root: PathBuf,
        client: Arc<dyn BookingServiceClient>,
        token_store: Arc<dyn TokenStore>,
        now_provider: Option<NowProvider>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self::assemble(bootstrap, client, token_store, now_provider))
    }

    fn assemble(
        bootstrap: BootstrapResult,
        client: Arc<dyn BookingServiceClient>,
        token_store: Arc<dyn TokenStore>,
        now_provider: Option<NowProvider>,
    ) -> Self {
        let config = bootstrap.config;
        let mut clock = Clock::new(config.timezone);
        if let Some(now_provider) = now_provider {
            clock = clock.with_now_provider(now_provider);
        }

        let session = Arc::new(SessionManager::new(client.clone(), token_store));
        match session.restore() {
            Ok(true) => info!("resuming persisted session"),
            Ok(false) => {}
            Err(error) => warn!(%error, "could not read persisted session token"),
        }

        let availability = Arc::new(AvailabilityModel::new(
            session.clone(),
            client.clone(),
            Arc::new(InMemoryVenueCacheRepository::default()),
            clock.clone(),
            config.window_days,
        ));
        let tasks = Arc::new(TaskLifecycleController::new(
            session.clone(),
            client.clone(),
            MonitorDefaults {
                price: config.default_monitor_price,
                stadium_id: config.default_stadium_id,
            },
        ));
        let logs = Arc::new(LogFeed::new(session.clone(), client.clone(), clock.clone()));
        let scheduler = Arc::new(PollingScheduler::new(
            session.clone(),
            availability.clone(),
            tasks.clone(),
            logs.clone(),
            config.fast_poll_interval,
            config.auto_refresh_interval,
        ));
        let booking = BookingRequestBuilder::new(
            session.clone(),
            client.clone(),
            tasks.clone(),
            scheduler.clone(),
            clock.clone(),
        )
        .with_default_stadium_id(config.default_stadium_id)
        .with_post_booking_delay(config.post_booking_delay);

        Self {
            config,
            logs_dir: bootstrap.logs_dir,
            clock,
            client,
            session,
            availability,
            tasks,
            logs,
            scheduler,
            booking,
            log_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn scheduler(&self) -> &Arc<PollingScheduler> {
        &self.scheduler
    }

    /// Username for a session restored from the keyring.
    pub fn set_username(&self, username: &str) -> Result<(), InfraError> {
        self.session.set_username(username)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        info!(command, "{message}");
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        error!(command, "{message}");
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RefreshResponse {
    pub status: String,
    pub dates: Vec<String>,
    pub skipped: Vec<String>,
}

impl From<RefreshOutcome> for RefreshResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Refreshed { dates, skipped } => Self {
                status: "refreshed".to_string(),
                dates: dates.iter().map(NaiveDate::to_string).collect(),
                skipped,
            },
            RefreshOutcome::Discarded => Self {
                status: "discarded".to_string(),
                dates: Vec::new(),
                skipped: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AvailabilityStatus {
    pub loading: bool,
    pub last_refreshed: Option<String>,
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoginResponse {
    pub status: String,
    pub username: Option<String>,
    pub venues: Option<RefreshResponse>,
    pub venues_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BookingResponse {
    pub status: String,
    pub message: String,
    pub refresh_in_secs: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskCreatedResponse {
    pub status: String,
    pub task_id: Option<String>,
}

fn parse_slot(value: &str) -> Result<SlotRange, InfraError> {
    value.parse().map_err(InfraError::InvalidInput)
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    parse_date(value, field_name).map_err(InfraError::InvalidInput)
}

fn parse_task_kind(value: &str) -> Result<TaskKind, InfraError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "snipe" => Ok(TaskKind::Snipe),
        "lock" => Ok(TaskKind::Lock),
        other => Err(InfraError::InvalidInput(format!(
            "task kind must be snipe or lock, got {other:?}"
        ))),
    }
}

/// Appends the configured support channel to an access-denied result.
fn with_support_contact(state: &AppState, error: InfraError) -> InfraError {
    match (error, state.config.support_contact.as_deref()) {
        (InfraError::AccessForbidden(message), Some(contact)) => {
            InfraError::AccessForbidden(format!("{message}; contact {contact} for access"))
        }
        (error, _) => error,
    }
}

async fn refresh_after_sign_in(state: &AppState) -> (Option<RefreshResponse>, Option<String>) {
    match state.availability.refresh(FetchMode::Blocking).await {
        Ok(outcome) => (Some(outcome.into()), None),
        Err(error) => {
            state.log_error("refresh_venues", &error.to_string());
            (None, Some(error.to_string()))
        }
    }
}

pub async fn login_impl(
    state: &AppState,
    username: String,
    password: String,
    notify_email: Option<String>,
) -> Result<LoginResponse, InfraError> {
    let credentials = Credentials::new(username, password, notify_email);
    let username = credentials.username.clone();
    let outcome = state
        .session
        .login(credentials)
        .await
        .map_err(|error| with_support_contact(state, error))?;
    match outcome {
        LoginOutcome::TwoFactorRequired => {
            state.log_info("login", "login requires a two-factor code");
            Ok(LoginResponse {
                status: "two_factor_required".to_string(),
                username: Some(username),
                venues: None,
                venues_error: None,
            })
        }
        LoginOutcome::Authenticated => {
            state.log_info("login", "login succeeded");
            let (venues, venues_error) = refresh_after_sign_in(state).await;
            Ok(LoginResponse {
                status: "authenticated".to_string(),
                username: Some(username),
                venues,
                venues_error,
            })
        }
    }
}

pub async fn submit_two_factor_impl(
    state: &AppState,
    code: String,
) -> Result<LoginResponse, InfraError> {
    state
        .session
        .submit_two_factor(&code)
        .await
        .map_err(|error| with_support_contact(state, error))?;
    state.log_info("submit_two_factor", "two-factor code accepted");
    let (venues, venues_error) = refresh_after_sign_in(state).await;
    Ok(LoginResponse {
        status: "authenticated".to_string(),
        username: state.session.snapshot()?.username,
        venues,
        venues_error,
    })
}

pub async fn rescue_two_factor_impl(
    state: &AppState,
    code: String,
) -> Result<RefreshResponse, InfraError> {
    let blocked = state.session.rescue_two_factor(&code).await?;
    state.log_info("rescue_two_factor", "rescue code accepted; replaying blocked read");
    Ok(state.availability.resume(blocked).await?.into())
}

pub fn logout_impl(state: &AppState) -> Result<(), InfraError> {
    state.scheduler.unmount_view()?;
    state.session.logout()?;
    state.availability.clear()?;
    state.tasks.clear()?;
    state.logs.clear()?;
    state.log_info("logout", "session cleared");
    Ok(())
}

pub fn session_status_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    state.session.snapshot()
}

pub async fn refresh_venues_impl(state: &AppState) -> Result<RefreshResponse, InfraError> {
    let outcome = state.availability.refresh(FetchMode::Blocking).await?;
    Ok(outcome.into())
}

pub fn venue_grid_impl(state: &AppState, date: Option<String>) -> Result<Vec<GridRow>, InfraError> {
    let date = match date {
        Some(value) => parse_date_input(&value, "date")?,
        None => state.clock.today(),
    };
    state.availability.grid(date)
}

/// Cached window dates plus whether a blocking fetch is running.
pub fn availability_status_impl(state: &AppState) -> Result<AvailabilityStatus, InfraError> {
    Ok(AvailabilityStatus {
        loading: state.availability.is_loading(),
        last_refreshed: state
            .availability
            .last_refreshed()?
            .map(|stamp| stamp.to_rfc3339()),
        dates: state
            .availability
            .window_dates()
            .iter()
            .map(NaiveDate::to_string)
            .collect(),
    })
}

pub async fn direct_book_impl(
    state: &AppState,
    date: String,
    venue: String,
    slot: String,
) -> Result<BookingResponse, InfraError> {
    let selection = state.availability.select(
        parse_date_input(&date, "date")?,
        &venue,
        parse_slot(&slot)?,
    )?;
    let message = state.booking.direct_book(&selection).await?;
    state.log_info(
        "direct_book",
        &format!("booked {} {} on {}", selection.venue_name, selection.slot, selection.date),
    );
    Ok(BookingResponse {
        status: "submitted".to_string(),
        message,
        refresh_in_secs: state.config.post_booking_delay.as_secs(),
    })
}

pub async fn lock_book_impl(
    state: &AppState,
    date: String,
    venue: String,
    slot: String,
) -> Result<TaskCreatedResponse, InfraError> {
    let selection = state.availability.select(
        parse_date_input(&date, "date")?,
        &venue,
        parse_slot(&slot)?,
    )?;
    let task_id = state.booking.lock_book(&selection).await?;
    state.log_info(
        "lock_book",
        &format!("lock task started for {} {}", selection.venue_name, selection.slot),
    );
    Ok(TaskCreatedResponse {
        status: "created".to_string(),
        task_id,
    })
}

pub async fn create_monitor_task_impl(
    state: &AppState,
    kind: String,
    date: String,
    slot: String,
    venue: Option<String>,
) -> Result<TaskCreatedResponse, InfraError> {
    let kind = parse_task_kind(&kind)?;
    let date = parse_date_input(&date, "date")?;
    let slot = parse_slot(&slot)?;
    let venue = match venue.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(venue) => VenueSelector::from_selection(&state.availability.select(date, venue, slot)?),
        None if kind == TaskKind::Lock => {
            return Err(InfraError::InvalidInput("a lock task needs a venue".to_string()));
        }
        None => VenueSelector::Any,
    };
    let task_id = state
        .tasks
        .create_monitor_task(MonitorRequest {
            kind,
            date,
            slot,
            venue,
        })
        .await?;
    state.log_info(
        "create_monitor_task",
        &format!("{} task created for {slot} on {date}", kind.as_str()),
    );
    Ok(TaskCreatedResponse {
        status: "created".to_string(),
        task_id,
    })
}

pub async fn list_tasks_impl(state: &AppState, refresh: bool) -> Result<Vec<TaskInfo>, InfraError> {
    if refresh {
        return state.tasks.refresh_tasks().await;
    }
    state.tasks.visible_tasks()
}

/// Stops a task and returns the list as it should now be shown.
pub async fn stop_task_impl(state: &AppState, task_id: String) -> Result<Vec<TaskInfo>, InfraError> {
    state.tasks.stop_task(&task_id).await?;
    state.log_info("stop_task", &format!("stopped task {}", task_id.trim()));
    state.tasks.visible_tasks()
}

pub async fn create_monthly_tasks_impl(
    state: &AppState,
    target_year: i32,
    target_month: u32,
    weekdays: Vec<u8>,
    slots: Vec<String>,
    venue_ids: Vec<String>,
) -> Result<MonthlyBatchReport, InfraError> {
    let slots = slots
        .iter()
        .map(|slot| parse_slot(slot))
        .collect::<Result<Vec<_>, _>>()?;
    let report = state
        .tasks
        .create_monthly_batch(&MonthlyBatchRequest {
            target_year,
            target_month,
            weekdays,
            slots,
            venue_ids,
        })
        .await?;
    match report.clone().into_result() {
        Ok(created) => state.log_info(
            "create_monthly_tasks",
            &format!("created {} monthly tasks", created.len()),
        ),
        Err(error) => {
            state.command_error("create_monthly_tasks", &error);
        }
    }
    Ok(report)
}

pub async fn list_monthly_tasks_impl(state: &AppState) -> Result<Vec<MonthlyTask>, InfraError> {
    state.tasks.refresh_monthly_tasks().await
}

pub async fn cancel_monthly_task_impl(
    state: &AppState,
    task_id: String,
    confirmed: bool,
) -> Result<bool, InfraError> {
    state.tasks.cancel_monthly_task(&task_id, confirmed).await?;
    state.log_info("cancel_monthly_task", &format!("cancelled {}", task_id.trim()));
    Ok(true)
}

pub async fn monthly_venue_ids_impl(state: &AppState) -> Result<BTreeMap<String, String>, InfraError> {
    state.tasks.monthly_venue_ids().await
}

pub async fn list_orders_impl(
    state: &AppState,
    bucket: String,
    page: Option<u32>,
) -> Result<Vec<OrderRecord>, InfraError> {
    let bucket: OrderBucket = bucket.parse().map_err(InfraError::InvalidInput)?;
    let context = state.session.request_context()?;
    let mut request = OrdersRequest {
        token: context.token.clone(),
        bucket: bucket.as_str().to_string(),
        username: context.username.clone(),
        page: page.unwrap_or(1).max(1),
        page_size: ORDERS_PAGE_SIZE,
    };
    let orders = match state.client.list_orders(&request).await {
        Err(InfraError::TokenExpired) => {
            request.token = state.session.silent_reconnect(&context.token).await?;
            state.client.list_orders(&request).await?
        }
        other => other?,
    };
    if !state.session.is_current(context.epoch) {
        return Err(InfraError::StaleResponse);
    }
    Ok(orders)
}

pub async fn logs_impl(state: &AppState, refresh: bool) -> Result<Vec<LogEntry>, InfraError> {
    if refresh {
        return state.logs.refresh_logs().await;
    }
    state.logs.entries()
}

pub fn mount_view_impl(state: &AppState, view: View) -> Result<(), InfraError> {
    state.scheduler.mount_view(view)
}

pub fn unmount_view_impl(state: &AppState) -> Result<(), InfraError> {
    state.scheduler.unmount_view()
}

pub fn set_auto_refresh_impl(state: &AppState, enabled: bool) -> Result<(), InfraError> {
    state.scheduler.set_auto_refresh(enabled)?;
    state.log_info(
        "set_auto_refresh",
        if enabled { "auto refresh enabled" } else { "auto refresh disabled" },
    );
    Ok(())
}
