use crate::application::session::{RequestContext, SessionManager};
use crate::domain::availability::SlotSelection;
use crate::domain::models::{
    validate_month, validate_non_empty, validate_weekday, MonthlyTask, MonthlyTaskStatus,
    SlotRange, TaskInfo, TaskKind,
};
use crate::infrastructure::booking_client::BookingServiceClient;
use crate::infrastructure::error::{BatchFailure, InfraError};
use crate::infrastructure::payloads::{MonitorTaskPayload, MonthlyTaskPayload, ServiceAck};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorDefaults {
    pub price: f64,
    pub stadium_id: i64,
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        Self {
            price: 40.0,
            stadium_id: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VenueSelector {
    /// Let the worker race every venue offering the slot.
    Any,
    Specific {
        venue_id: String,
        venue_name: String,
        stadium_id: Option<i64>,
        price: f64,
    },
}

impl VenueSelector {
    pub fn from_selection(selection: &SlotSelection) -> Self {
        Self::Specific {
            venue_id: selection.session.venue_id.clone(),
            venue_name: selection.venue_name.clone(),
            stadium_id: selection.session.stadium_id,
            price: selection.session.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorRequest {
    pub kind: TaskKind,
    pub date: NaiveDate,
    pub slot: SlotRange,
    pub venue: VenueSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopMark {
    Tentative,
    Confirmed,
}

#[derive(Debug, Default)]
struct TaskBoard {
    snapshot: Vec<TaskInfo>,
    stops: BTreeMap<String, StopMark>,
}

impl TaskBoard {
    fn visible(&self) -> Vec<TaskInfo> {
        self.snapshot
            .iter()
            .filter(|task| !self.stops.contains_key(&task.id))
            .cloned()
            .collect()
    }

    fn reconcile(&mut self, snapshot: Vec<TaskInfo>) {
        let live: BTreeSet<&str> = snapshot.iter().map(|task| task.id.as_str()).collect();
        self.stops
            .retain(|id, mark| *mark == StopMark::Tentative || live.contains(id.as_str()));
        self.snapshot = snapshot;
    }
}

/// Proof that phase one of a stop ran; redeem it with `confirm_stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTicket {
    task_id: String,
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyBatchRequest {
    pub target_year: i32,
    pub target_month: u32,
    pub weekdays: Vec<u8>,
    pub slots: Vec<SlotRange>,
    pub venue_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthlyBatchReport {
    pub created: Vec<String>,
    pub failures: Vec<BatchFailure>,
}

impl MonthlyBatchReport {
    pub fn into_result(self) -> Result<Vec<String>, InfraError> {
        if self.failures.is_empty() {
            return Ok(self.created);
        }
        Err(InfraError::PartialBatchFailure {
            succeeded: self.created.len(),
            failures: self.failures,
        })
    }
}

/// Numeric court ids order by value; anything else falls back to text order.
fn compare_venue_ids(left: &str, right: &str) -> Ordering {
    match (left.parse::<u64>(), right.parse::<u64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => left.cmp(right),
    }
}

impl MonthlyBatchRequest {
    /// Validates and returns the sorted, de-duplicated weekdays, slots and venues.
    fn normalized(&self) -> Result<(Vec<u8>, Vec<SlotRange>, Vec<String>), InfraError> {
        validate_month(self.target_month, "monthly.target_month").map_err(InfraError::InvalidInput)?;
        if self.weekdays.is_empty() {
            return Err(InfraError::InvalidInput("pick at least one weekday".to_string()));
        }
        if self.slots.is_empty() {
            return Err(InfraError::InvalidInput("pick at least one slot".to_string()));
        }
        for weekday in &self.weekdays {
            validate_weekday(*weekday, "monthly.weekday").map_err(InfraError::InvalidInput)?;
        }

        let mut weekdays = self.weekdays.clone();
        weekdays.sort_unstable();
        weekdays.dedup();

        let mut slots = self.slots.clone();
        slots.sort_by_key(|slot| (slot.start(), slot.end()));
        slots.dedup();

        let mut venue_ids = Vec::with_capacity(self.venue_ids.len());
        for venue_id in &self.venue_ids {
            let venue_id = venue_id.trim();
            validate_non_empty(venue_id, "monthly.venue_id").map_err(InfraError::InvalidInput)?;
            venue_ids.push(venue_id.to_string());
        }
        if venue_ids.is_empty() {
            return Err(InfraError::InvalidInput("pick at least one venue".to_string()));
        }
        venue_ids.sort_by(|left, right| compare_venue_ids(left, right));
        venue_ids.dedup();

        Ok((weekdays, slots, venue_ids))
    }
}

pub struct TaskLifecycleController {
    session: Arc<SessionManager>,
    client: Arc<dyn BookingServiceClient>,
    defaults: MonitorDefaults,
    board: Mutex<TaskBoard>,
    monthly: Mutex<Vec<MonthlyTask>>,
}

impl TaskLifecycleController {
    pub fn new(
        session: Arc<SessionManager>,
        client: Arc<dyn BookingServiceClient>,
        defaults: MonitorDefaults,
    ) -> Self {
        Self {
            session,
            client,
            defaults,
            board: Mutex::new(TaskBoard::default()),
            monthly: Mutex::new(Vec::new()),
        }
    }

    fn lock_board(&self) -> Result<MutexGuard<'_, TaskBoard>, InfraError> {
        self.board
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task board lock poisoned: {error}")))
    }

    fn lock_monthly(&self) -> Result<MutexGuard<'_, Vec<MonthlyTask>>, InfraError> {
        self.monthly.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("monthly task lock poisoned: {error}"))
        })
    }

    pub fn visible_tasks(&self) -> Result<Vec<TaskInfo>, InfraError> {
        Ok(self.lock_board()?.visible())
    }

    pub fn monthly_tasks(&self) -> Result<Vec<MonthlyTask>, InfraError> {
        Ok(self.lock_monthly()?.clone())
    }

    /// Replaces the snapshot. Stopped tasks stay hidden; confirmed stops are
    /// forgotten once the service no longer reports the task.
    pub fn reconcile(&self, snapshot: Vec<TaskInfo>) -> Result<Vec<TaskInfo>, InfraError> {
        let mut board = self.lock_board()?;
        board.reconcile(snapshot);
        Ok(board.visible())
    }

    pub async fn refresh_tasks(&self) -> Result<Vec<TaskInfo>, InfraError> {
        let context = self.session.request_context()?;
        let snapshot = self.client.list_tasks(context.username.as_deref()).await?;
        if !self.session.is_current(context.epoch) {
            return Err(InfraError::StaleResponse);
        }
        self.reconcile(snapshot)
    }

    /// Creates a snipe or lock monitor task. Returns the service task id when reported.
    pub async fn create_monitor_task(
        &self,
        request: MonitorRequest,
    ) -> Result<Option<String>, InfraError> {
        let context = self.session.request_context()?;
        let mut payload = self.monitor_payload(&context, &request);

        let ack = match self.client.create_monitor_task(&payload).await {
            Err(InfraError::TokenExpired) => {
                payload.token = self.session.silent_reconnect(&context.token).await?;
                self.client.create_monitor_task(&payload).await?
            }
            other => other?,
        };
        let ack = ack.into_success("create monitor task")?;
        info!(
            kind = request.kind.as_str(),
            date = %request.date,
            slot = %request.slot,
            "monitor task created"
        );

        if let Err(error) = self.refresh_tasks().await {
            debug!(%error, "task refresh after monitor creation failed");
        }
        Ok(ack.task_id)
    }

    fn monitor_payload(&self, context: &RequestContext, request: &MonitorRequest) -> MonitorTaskPayload {
        let (price, venue_id, venue_name, stadium_id) = match &request.venue {
            VenueSelector::Any => (self.defaults.price, None, None, None),
            VenueSelector::Specific {
                venue_id,
                venue_name,
                stadium_id,
                price,
            } => (
                *price,
                Some(venue_id.clone()),
                Some(venue_name.clone()),
                Some(stadium_id.unwrap_or(self.defaults.stadium_id)),
            ),
        };
        MonitorTaskPayload {
            token: context.token.clone(),
            date: request.date.to_string(),
            start_time: request.slot.start().to_string(),
            end_time: request.slot.end().to_string(),
            lock_mode: request.kind.lock_mode(),
            price,
            email: context.notify_email.clone(),
            username: context.username.clone(),
            venue_id,
            venue_name,
            stadium_id,
        }
    }

    /// Phase one of a stop: hides the task right away.
    pub fn begin_stop(&self, task_id: &str) -> Result<StopTicket, InfraError> {
        let task_id = task_id.trim();
        validate_non_empty(task_id, "task_id").map_err(InfraError::InvalidInput)?;
        let epoch = self.session.request_context()?.epoch;
        let mut board = self.lock_board()?;
        if !board.snapshot.iter().any(|task| task.id == task_id) {
            return Err(InfraError::InvalidInput(format!("unknown task {task_id}")));
        }
        if board.stops.contains_key(task_id) {
            return Err(InfraError::InvalidInput(format!("task {task_id} is already stopping")));
        }
        board.stops.insert(task_id.to_string(), StopMark::Tentative);
        Ok(StopTicket {
            task_id: task_id.to_string(),
            epoch,
        })
    }

    /// Phase two: confirms the stop with the service, or lifts the mark so the
    /// next poll shows the task again.
    pub async fn confirm_stop(&self, ticket: StopTicket) -> Result<(), InfraError> {
        let reply = self
            .client
            .stop_task(&ticket.task_id)
            .await
            .and_then(|ack| ack.into_success("stop task"));
        if !self.session.is_current(ticket.epoch) {
            return Err(InfraError::StaleResponse);
        }

        let mut board = self.lock_board()?;
        match reply {
            Ok(_) => {
                board.stops.insert(ticket.task_id.clone(), StopMark::Confirmed);
                info!(task_id = %ticket.task_id, "task stopped");
                Ok(())
            }
            Err(error) => {
                board.stops.remove(&ticket.task_id);
                warn!(task_id = %ticket.task_id, %error, "stop failed; task restored");
                Err(error)
            }
        }
    }

    pub async fn stop_task(&self, task_id: &str) -> Result<(), InfraError> {
        let ticket = self.begin_stop(task_id)?;
        self.confirm_stop(ticket).await
    }

    /// One creation call per weekday and slot, weekday-major, each carrying the
    /// full venue list. Failures are collected; created tasks are kept.
    pub async fn create_monthly_batch(
        &self,
        request: &MonthlyBatchRequest,
    ) -> Result<MonthlyBatchReport, InfraError> {
        let (weekdays, slots, venue_ids) = request.normalized()?;
        let context = self.session.request_context()?;
        let username = required_username(&context)?;
        let mut token = context.token.clone();
        let mut report = MonthlyBatchReport::default();

        let pairs: Vec<(u8, SlotRange)> = weekdays
            .iter()
            .flat_map(|weekday| slots.iter().map(move |slot| (*weekday, *slot)))
            .collect();
        for (index, (weekday, slot)) in pairs.iter().enumerate() {
            let mut payload = MonthlyTaskPayload {
                token: token.clone(),
                username: username.clone(),
                email: context.notify_email.clone(),
                target_year: request.target_year,
                target_month: request.target_month,
                weekday: *weekday,
                start_time: slot.start().to_string(),
                end_time: slot.end().to_string(),
                venue_ids: venue_ids.clone(),
            };
            let reply = match self.client.create_monthly_task(&payload).await {
                Err(InfraError::TokenExpired) => {
                    match self.session.silent_reconnect(&payload.token).await {
                        Ok(fresh) => {
                            token = fresh;
                            payload.token = token.clone();
                            self.client.create_monthly_task(&payload).await
                        }
                        Err(error) => {
                            warn!(%error, "reconnect failed mid-batch; remaining pairs not submitted");
                            let reason = error.to_string();
                            report.failures.extend(pairs[index..].iter().map(
                                |(weekday, slot)| BatchFailure {
                                    weekday: *weekday,
                                    slot: slot.to_string(),
                                    reason: reason.clone(),
                                },
                            ));
                            break;
                        }
                    }
                }
                other => other,
            };
            match reply.and_then(|ack: ServiceAck| ack.into_success("create monthly task")) {
                Ok(ack) => report.created.push(ack.task_id.unwrap_or_default()),
                Err(error) => {
                    warn!(weekday, slot = %slot, %error, "monthly task creation failed");
                    report.failures.push(BatchFailure {
                        weekday: *weekday,
                        slot: slot.to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }
        info!(
            created = report.created.len(),
            failed = report.failures.len(),
            "monthly batch submitted"
        );

        if let Err(error) = self.refresh_monthly_tasks().await {
            debug!(%error, "monthly refresh after batch failed");
        }
        Ok(report)
    }

    pub async fn cancel_monthly_task(&self, task_id: &str, confirmed: bool) -> Result<(), InfraError> {
        let task_id = task_id.trim();
        validate_non_empty(task_id, "task_id").map_err(InfraError::InvalidInput)?;
        if !confirmed {
            return Err(InfraError::InvalidInput(
                "cancelling a monthly task must be confirmed".to_string(),
            ));
        }
        let cancellable = self
            .lock_monthly()?
            .iter()
            .find(|task| task.task_id == task_id)
            .map(|task| task.status.is_cancellable());
        if cancellable == Some(false) {
            return Err(InfraError::InvalidInput(format!(
                "monthly task {task_id} can no longer be cancelled"
            )));
        }
        let context = self.session.request_context()?;
        let username = required_username(&context)?;

        self.client
            .cancel_monthly_task(task_id, &username)
            .await?
            .into_success("cancel monthly task")?;
        if !self.session.is_current(context.epoch) {
            return Err(InfraError::StaleResponse);
        }
        self.lock_monthly()?.retain(|task| task.task_id != task_id);
        info!(%task_id, "monthly task cancelled");

        if let Err(error) = self.refresh_monthly_tasks().await {
            debug!(%error, "monthly refresh after cancel failed");
        }
        Ok(())
    }

    pub async fn refresh_monthly_tasks(&self) -> Result<Vec<MonthlyTask>, InfraError> {
        let context = self.session.request_context()?;
        let username = required_username(&context)?;
        let tasks = self.client.list_monthly_tasks(&username).await?;
        if !self.session.is_current(context.epoch) {
            return Err(InfraError::StaleResponse);
        }
        let visible: Vec<MonthlyTask> = tasks
            .into_iter()
            .filter(|task| task.status != MonthlyTaskStatus::Cancelled)
            .collect();
        *self.lock_monthly()? = visible.clone();
        Ok(visible)
    }

    pub async fn monthly_venue_ids(&self) -> Result<BTreeMap<String, String>, InfraError> {
        self.client.monthly_venue_ids().await
    }

    pub fn clear(&self) -> Result<(), InfraError> {
        *self.lock_board()? = TaskBoard::default();
        self.lock_monthly()?.clear();
        Ok(())
    }
}

fn required_username(context: &RequestContext) -> Result<String, InfraError> {
    context
        .username
        .clone()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            InfraError::InvalidInput("monthly tasks need a known username; pass --username".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{
        error_ack, success_ack, task, FakeBookingService, Scripted,
    };
    use crate::domain::models::{AuthState, Credentials};
    use crate::infrastructure::credential_store::InMemoryTokenStore;
    use crate::infrastructure::payloads::LoginReply;
    use std::sync::atomic::Ordering as AtomicOrdering;

    async fn controller() -> (Arc<FakeBookingService>, Arc<SessionManager>, TaskLifecycleController) {
        let client = Arc::new(FakeBookingService::default());
        client.push_login(Scripted::Reply(LoginReply::Authenticated {
            token: "tok-1".to_string(),
        }));
        let session = Arc::new(SessionManager::new(
            client.clone(),
            Arc::new(InMemoryTokenStore::default()),
        ));
        session
            .login(Credentials::new("alice", "secret", Some("a@example.com".to_string())))
            .await
            .expect("login");
        let controller =
            TaskLifecycleController::new(session.clone(), client.clone(), MonitorDefaults::default());
        (client, session, controller)
    }

    fn slot(value: &str) -> SlotRange {
        value.parse().expect("slot")
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 12).expect("date")
    }

    fn monthly(task_id: &str, status: MonthlyTaskStatus) -> MonthlyTask {
        MonthlyTask {
            task_id: task_id.to_string(),
            target_year: 2026,
            target_month: 4,
            weekday: 1,
            start_time: "09:00".to_string(),
            end_time: "10:00".to_string(),
            venue_ids: vec!["2".to_string()],
            status,
            created_at: None,
            success_venues: Vec::new(),
            failed_venues: Vec::new(),
        }
    }

    #[tokio::test]
    async fn stop_hides_task_synchronously_then_confirms() {
        let (client, _session, controller) = controller().await;
        client.set_tasks(vec![task("t1", TaskKind::Snipe), task("t2", TaskKind::Lock)]);
        controller.refresh_tasks().await.expect("refresh");

        let ticket = controller.begin_stop("t1").expect("begin stop");
        let ids: Vec<String> = controller
            .visible_tasks()
            .expect("tasks")
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids, vec!["t2".to_string()]);

        controller.confirm_stop(ticket).await.expect("confirm");
        let visible = controller.refresh_tasks().await.expect("poll");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "t2");
        assert_eq!(client.stop_requests(), vec!["t1".to_string()]);

        client.set_tasks(vec![task("t2", TaskKind::Lock)]);
        controller.refresh_tasks().await.expect("purged poll");
        client.set_tasks(vec![task("t1", TaskKind::Snipe), task("t2", TaskKind::Lock)]);
        let reused = controller.refresh_tasks().await.expect("reused id poll");
        assert_eq!(reused.len(), 2);
    }

    #[tokio::test]
    async fn failed_stop_restores_task_on_next_poll() {
        let (client, _session, controller) = controller().await;
        client.set_tasks(vec![task("t1", TaskKind::Snipe), task("t2", TaskKind::Lock)]);
        controller.refresh_tasks().await.expect("refresh");
        client.push_stop(Scripted::Reply(error_ack("worker busy")));

        let result = controller.stop_task("t1").await;

        assert!(matches!(result, Err(InfraError::ServiceRejected(message)) if message == "worker busy"));
        let visible = controller.refresh_tasks().await.expect("poll");
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn stopping_unknown_task_is_rejected() {
        let (client, _session, controller) = controller().await;
        assert!(matches!(controller.begin_stop("ghost"), Err(InfraError::InvalidInput(_))));
        assert!(client.stop_requests().is_empty());
    }

    #[tokio::test]
    async fn snipe_without_venue_uses_default_price() {
        let (client, _session, controller) = controller().await;
        client.set_tasks(vec![task("task-1", TaskKind::Snipe)]);

        let task_id = controller
            .create_monitor_task(MonitorRequest {
                kind: TaskKind::Snipe,
                date: date(),
                slot: slot("18:00-20:00"),
                venue: VenueSelector::Any,
            })
            .await
            .expect("create");

        assert_eq!(task_id.as_deref(), Some("task-1"));
        let payload = &client.monitor_payloads()[0];
        assert!(!payload.lock_mode);
        assert_eq!(payload.price, 40.0);
        assert_eq!(payload.venue_id, None);
        assert_eq!(payload.date, "2026-03-12");
        assert_eq!(payload.start_time, "18:00");
        assert_eq!(payload.email.as_deref(), Some("a@example.com"));
        assert_eq!(controller.visible_tasks().expect("tasks").len(), 1);
    }

    #[tokio::test]
    async fn rejected_monitor_leaves_task_list_alone() {
        let (client, _session, controller) = controller().await;
        client.push_monitor(Scripted::Reply(error_ack("slot not monitorable")));

        let result = controller
            .create_monitor_task(MonitorRequest {
                kind: TaskKind::Lock,
                date: date(),
                slot: slot("18:00-20:00"),
                venue: VenueSelector::Specific {
                    venue_id: "11".to_string(),
                    venue_name: "Court 1".to_string(),
                    stadium_id: None,
                    price: 60.0,
                },
            })
            .await;

        assert!(matches!(result, Err(InfraError::ServiceRejected(_))));
        assert_eq!(client.tasks_calls.load(AtomicOrdering::SeqCst), 0);
        let payload = &client.monitor_payloads()[0];
        assert!(payload.lock_mode);
        assert_eq!(payload.stadium_id, Some(1));
        assert_eq!(payload.venue_name.as_deref(), Some("Court 1"));
    }

    #[tokio::test]
    async fn expired_token_on_monitor_reconnects_once() {
        let (client, _session, controller) = controller().await;
        client.push_monitor(Scripted::Status(401));
        client.push_login(Scripted::Reply(LoginReply::Authenticated {
            token: "tok-2".to_string(),
        }));

        controller
            .create_monitor_task(MonitorRequest {
                kind: TaskKind::Snipe,
                date: date(),
                slot: slot("09:00-10:00"),
                venue: VenueSelector::Any,
            })
            .await
            .expect("create after reconnect");

        let tokens: Vec<String> = client
            .monitor_payloads()
            .into_iter()
            .map(|payload| payload.token)
            .collect();
        assert_eq!(tokens, vec!["tok-1".to_string(), "tok-2".to_string()]);
    }

    #[tokio::test]
    async fn monthly_batch_issues_one_call_per_weekday_and_slot() {
        let (client, _session, controller) = controller().await;
        let report = controller
            .create_monthly_batch(&MonthlyBatchRequest {
                target_year: 2026,
                target_month: 4,
                weekdays: vec![5, 2],
                slots: vec![slot("09:00-10:00"), slot("18:00-20:00"), slot("20:00-22:00")],
                venue_ids: vec!["12".to_string(), "3".to_string(), "7".to_string()],
            })
            .await
            .expect("batch");

        let payloads = client.monthly_payloads();
        assert_eq!(payloads.len(), 6);
        assert_eq!(report.created.len(), 6);
        assert!(payloads
            .iter()
            .all(|payload| payload.venue_ids == vec!["3".to_string(), "7".to_string(), "12".to_string()]));
        assert_eq!(client.monthly_list_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn monthly_batch_sorts_weekdays_and_venues() {
        let (client, _session, controller) = controller().await;
        controller
            .create_monthly_batch(&MonthlyBatchRequest {
                target_year: 2026,
                target_month: 4,
                weekdays: vec![3, 1],
                slots: vec![slot("09:00-10:00")],
                venue_ids: vec!["5".to_string(), "2".to_string()],
            })
            .await
            .expect("batch");

        let payloads = client.monthly_payloads();
        let weekdays: Vec<u8> = payloads.iter().map(|payload| payload.weekday).collect();
        assert_eq!(weekdays, vec![1, 3]);
        for payload in &payloads {
            assert_eq!(payload.venue_ids, vec!["2".to_string(), "5".to_string()]);
            assert_eq!(payload.username, "alice");
            assert_eq!(payload.start_time, "09:00");
            assert_eq!(payload.end_time, "10:00");
        }
    }

    #[tokio::test]
    async fn monthly_batch_collects_partial_failures_without_rollback() {
        let (client, _session, controller) = controller().await;
        client.push_monthly_create(Scripted::Reply(success_ack(Some("m-1"))));
        client.push_monthly_create(Scripted::Network("timeout".to_string()));

        let report = controller
            .create_monthly_batch(&MonthlyBatchRequest {
                target_year: 2026,
                target_month: 4,
                weekdays: vec![1, 2],
                slots: vec![slot("09:00-10:00")],
                venue_ids: vec!["2".to_string()],
            })
            .await
            .expect("batch");

        assert_eq!(report.created, vec!["m-1".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].weekday, 2);
        assert_eq!(client.cancel_requests().len(), 0);
        match report.into_result() {
            Err(InfraError::PartialBatchFailure { succeeded, failures }) => {
                assert_eq!(succeeded, 1);
                assert_eq!(failures[0].slot, "09:00-10:00");
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_monthly_batch_issues_no_calls() {
        let (client, _session, controller) = controller().await;
        let result = controller
            .create_monthly_batch(&MonthlyBatchRequest {
                target_year: 2026,
                target_month: 4,
                weekdays: vec![8],
                slots: vec![slot("09:00-10:00")],
                venue_ids: vec!["2".to_string()],
            })
            .await;
        assert!(matches!(result, Err(InfraError::InvalidInput(_))));
        assert!(client.monthly_payloads().is_empty());
    }

    #[tokio::test]
    async fn cancel_requires_confirmation_and_hides_cancelled_tasks() {
        let (client, _session, controller) = controller().await;
        client.set_monthly_tasks(vec![
            monthly("m-1", MonthlyTaskStatus::Pending),
            monthly("m-2", MonthlyTaskStatus::Cancelled),
        ]);
        let visible = controller.refresh_monthly_tasks().await.expect("refresh");
        assert_eq!(visible.len(), 1);

        let unconfirmed = controller.cancel_monthly_task("m-1", false).await;
        assert!(matches!(unconfirmed, Err(InfraError::InvalidInput(_))));
        assert!(client.cancel_requests().is_empty());

        client.set_monthly_tasks(vec![monthly("m-1", MonthlyTaskStatus::Cancelled)]);
        controller.cancel_monthly_task("m-1", true).await.expect("cancel");

        assert_eq!(
            client.cancel_requests(),
            vec![("m-1".to_string(), "alice".to_string())]
        );
        assert!(controller.monthly_tasks().expect("monthly").is_empty());
    }

    #[tokio::test]
    async fn finished_monthly_task_cannot_be_cancelled() {
        let (client, _session, controller) = controller().await;
        client.set_monthly_tasks(vec![monthly("m-1", MonthlyTaskStatus::Success)]);
        controller.refresh_monthly_tasks().await.expect("refresh");

        let result = controller.cancel_monthly_task("m-1", true).await;

        assert!(matches!(result, Err(InfraError::InvalidInput(_))));
        assert!(client.cancel_requests().is_empty());
    }

    #[tokio::test]
    async fn logout_makes_task_poll_stale() {
        let (client, session, controller) = controller().await;
        client.set_tasks(vec![task("t1", TaskKind::Snipe)]);
        controller.refresh_tasks().await.expect("refresh");

        session.logout().expect("logout");
        controller.clear().expect("clear");

        assert!(controller.visible_tasks().expect("tasks").is_empty());
        assert!(matches!(controller.refresh_tasks().await, Err(InfraError::NotAuthenticated)));
    }

    #[test]
    fn venue_ids_sort_numerically() {
        let mut ids = vec!["10", "9", "B", "1", "A"];
        ids.sort_by(|left, right| compare_venue_ids(left, right));
        assert_eq!(ids, vec!["1", "9", "10", "A", "B"]);
    }

    #[tokio::test]
    async fn failed_reconnect_mid_batch_still_reports_created_tasks() {
        let (client, session, controller) = controller().await;
        client.push_monthly_create(Scripted::Reply(success_ack(Some("m-1"))));
        client.push_monthly_create(Scripted::Status(401));
        client.push_login(Scripted::Reply(LoginReply::Rejected(
            "password changed".to_string(),
        )));

        let report = controller
            .create_monthly_batch(&MonthlyBatchRequest {
                target_year: 2026,
                target_month: 4,
                weekdays: vec![1, 2],
                slots: vec![slot("09:00-10:00"), slot("10:00-11:00")],
                venue_ids: vec!["2".to_string()],
            })
            .await
            .expect("report");

        assert_eq!(client.monthly_payloads().len(), 2);
        assert_eq!(report.created, vec!["m-1".to_string()]);
        let pending: Vec<(u8, String)> = report
            .failures
            .iter()
            .map(|failure| (failure.weekday, failure.slot.clone()))
            .collect();
        assert_eq!(
            pending,
            vec![
                (1, "10:00-11:00".to_string()),
                (2, "09:00-10:00".to_string()),
                (2, "10:00-11:00".to_string()),
            ]
        );
        assert!(report
            .failures
            .iter()
            .all(|failure| failure.reason.contains("password changed")));
        assert_eq!(session.auth_state().expect("state"), AuthState::Idle);
    }

    #[tokio::test]
    async fn failed_task_listing_keeps_previous_snapshot() {
        let (client, _session, controller) = controller().await;
        client.set_tasks(vec![task("t1", TaskKind::Snipe)]);
        controller.refresh_tasks().await.expect("refresh");

        client.fail_task_listing(true);
        let result = controller.refresh_tasks().await;

        assert!(matches!(result, Err(InfraError::NetworkFailure(_))));
        let visible: Vec<String> = controller
            .visible_tasks()
            .expect("tasks")
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(visible, vec!["t1".to_string()]);
    }
}
