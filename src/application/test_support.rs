use crate::domain::models::{
    Credentials, MonthlyTask, OrderRecord, SlotStatus, TaskInfo, VenueRow, VenueSession,
};
use crate::infrastructure::booking_client::BookingServiceClient;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::{
    BookingPayload, LoginReply, MonitorTaskPayload, MonthlyTaskPayload, OrdersRequest, ServiceAck,
    VenueWindow, VenuesReply,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Scripted<T> {
    Reply(T),
    Network(String),
    Status(u16),
}

impl<T> Scripted<T> {
    fn into_result(self) -> Result<T, InfraError> {
        match self {
            Self::Reply(value) => Ok(value),
            Self::Network(message) => Err(InfraError::NetworkFailure(message)),
            Self::Status(401) => Err(InfraError::TokenExpired),
            Self::Status(status) => Err(InfraError::Http {
                status,
                body: String::new(),
            }),
        }
    }
}

pub(crate) fn success_ack(task_id: Option<&str>) -> ServiceAck {
    ServiceAck {
        status: "success".to_string(),
        msg: Some("ok".to_string()),
        task_id: task_id.map(ToOwned::to_owned),
        ..ServiceAck::default()
    }
}

pub(crate) fn error_ack(message: &str) -> ServiceAck {
    ServiceAck {
        status: "error".to_string(),
        msg: Some(message.to_string()),
        ..ServiceAck::default()
    }
}

pub(crate) fn free_session(venue_id: &str, start: &str, end: &str, price: f64) -> VenueSession {
    VenueSession {
        name: None,
        venue_id: venue_id.to_string(),
        start_time: start.to_string(),
        end_time: end.to_string(),
        status: SlotStatus::Free,
        price,
        stadium_id: Some(1),
        fixed_purpose: None,
    }
}

pub(crate) fn court(name: &str, id: &str, sessions: Vec<VenueSession>) -> VenueRow {
    VenueRow {
        name: name.to_string(),
        id: id.to_string(),
        sessions,
    }
}

pub(crate) fn window(dates: Vec<(NaiveDate, Vec<VenueRow>)>) -> VenuesReply {
    VenuesReply::Window(VenueWindow {
        dates: dates.into_iter().collect(),
        undecodable: Vec::new(),
    })
}

pub(crate) fn task(id: &str, kind: crate::domain::models::TaskKind) -> TaskInfo {
    TaskInfo {
        id: id.to_string(),
        kind,
        status: "Running".to_string(),
        info: String::new(),
    }
}

fn pop<T>(queue: &Mutex<VecDeque<Scripted<T>>>) -> Option<Scripted<T>> {
    queue.lock().expect("script mutex poisoned").pop_front()
}

fn push<T>(queue: &Mutex<VecDeque<Scripted<T>>>, value: Scripted<T>) {
    queue.lock().expect("script mutex poisoned").push_back(value);
}

fn record<T>(log: &Mutex<Vec<T>>, value: T) {
    log.lock().expect("record mutex poisoned").push(value);
}

/// Scriptable booking service. Unscripted calls succeed with generated values.
#[derive(Default)]
pub(crate) struct FakeBookingService {
    login_script: Mutex<VecDeque<Scripted<LoginReply>>>,
    two_factor_script: Mutex<VecDeque<Scripted<LoginReply>>>,
    venues_script: Mutex<VecDeque<Scripted<VenuesReply>>>,
    booking_script: Mutex<VecDeque<Scripted<ServiceAck>>>,
    monitor_script: Mutex<VecDeque<Scripted<ServiceAck>>>,
    stop_script: Mutex<VecDeque<Scripted<ServiceAck>>>,
    monthly_create_script: Mutex<VecDeque<Scripted<ServiceAck>>>,
    monthly_cancel_script: Mutex<VecDeque<Scripted<ServiceAck>>>,
    login_delay: Mutex<Option<Duration>>,
    venues_delay: Mutex<Option<Duration>>,
    tasks: Mutex<Vec<TaskInfo>>,
    fail_tasks: AtomicBool,
    logs: Mutex<Vec<String>>,
    monthly_tasks: Mutex<Vec<MonthlyTask>>,
    orders: Mutex<Vec<OrderRecord>>,
    pub login_calls: AtomicUsize,
    pub two_factor_calls: AtomicUsize,
    pub venues_calls: AtomicUsize,
    pub tasks_calls: AtomicUsize,
    pub logs_calls: AtomicUsize,
    pub monthly_list_calls: AtomicUsize,
    two_factor_usernames: Mutex<Vec<String>>,
    venues_tokens: Mutex<Vec<String>>,
    booking_payloads: Mutex<Vec<BookingPayload>>,
    monitor_payloads: Mutex<Vec<MonitorTaskPayload>>,
    stop_requests: Mutex<Vec<String>>,
    monthly_payloads: Mutex<Vec<MonthlyTaskPayload>>,
    cancel_requests: Mutex<Vec<(String, String)>>,
    order_requests: Mutex<Vec<OrdersRequest>>,
}

impl FakeBookingService {
    pub fn push_login(&self, reply: Scripted<LoginReply>) {
        push(&self.login_script, reply);
    }

    pub fn push_two_factor(&self, reply: Scripted<LoginReply>) {
        push(&self.two_factor_script, reply);
    }

    pub fn push_venues(&self, reply: Scripted<VenuesReply>) {
        push(&self.venues_script, reply);
    }

    pub fn push_booking(&self, reply: Scripted<ServiceAck>) {
        push(&self.booking_script, reply);
    }

    pub fn push_monitor(&self, reply: Scripted<ServiceAck>) {
        push(&self.monitor_script, reply);
    }

    pub fn push_stop(&self, reply: Scripted<ServiceAck>) {
        push(&self.stop_script, reply);
    }

    pub fn push_monthly_create(&self, reply: Scripted<ServiceAck>) {
        push(&self.monthly_create_script, reply);
    }

    pub fn push_monthly_cancel(&self, reply: Scripted<ServiceAck>) {
        push(&self.monthly_cancel_script, reply);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock().expect("delay mutex poisoned") = Some(delay);
    }

    pub fn set_venues_delay(&self, delay: Duration) {
        *self.venues_delay.lock().expect("delay mutex poisoned") = Some(delay);
    }

    pub fn set_tasks(&self, tasks: Vec<TaskInfo>) {
        *self.tasks.lock().expect("tasks mutex poisoned") = tasks;
    }

    pub fn fail_task_listing(&self, fail: bool) {
        self.fail_tasks.store(fail, Ordering::SeqCst);
    }

    pub fn set_logs(&self, lines: Vec<&str>) {
        *self.logs.lock().expect("logs mutex poisoned") =
            lines.into_iter().map(ToOwned::to_owned).collect();
    }

    pub fn set_monthly_tasks(&self, tasks: Vec<MonthlyTask>) {
        *self.monthly_tasks.lock().expect("monthly mutex poisoned") = tasks;
    }

    pub fn set_orders(&self, orders: Vec<OrderRecord>) {
        *self.orders.lock().expect("orders mutex poisoned") = orders;
    }

    pub fn two_factor_usernames(&self) -> Vec<String> {
        self.two_factor_usernames.lock().expect("record mutex poisoned").clone()
    }

    pub fn venues_tokens(&self) -> Vec<String> {
        self.venues_tokens.lock().expect("record mutex poisoned").clone()
    }

    pub fn booking_payloads(&self) -> Vec<BookingPayload> {
        self.booking_payloads.lock().expect("record mutex poisoned").clone()
    }

    pub fn monitor_payloads(&self) -> Vec<MonitorTaskPayload> {
        self.monitor_payloads.lock().expect("record mutex poisoned").clone()
    }

    pub fn stop_requests(&self) -> Vec<String> {
        self.stop_requests.lock().expect("record mutex poisoned").clone()
    }

    pub fn monthly_payloads(&self) -> Vec<MonthlyTaskPayload> {
        self.monthly_payloads.lock().expect("record mutex poisoned").clone()
    }

    pub fn cancel_requests(&self) -> Vec<(String, String)> {
        self.cancel_requests.lock().expect("record mutex poisoned").clone()
    }

    pub fn order_requests(&self) -> Vec<OrdersRequest> {
        self.order_requests.lock().expect("record mutex poisoned").clone()
    }

    async fn pause(delay: &Mutex<Option<Duration>>) {
        let delay = *delay.lock().expect("delay mutex poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BookingServiceClient for FakeBookingService {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginReply, InfraError> {
        let call = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Self::pause(&self.login_delay).await;
        pop(&self.login_script)
            .unwrap_or_else(|| {
                Scripted::Reply(LoginReply::Authenticated {
                    token: format!("token-{call}"),
                })
            })
            .into_result()
    }

    async fn submit_two_factor(
        &self,
        username: &str,
        _code: &str,
    ) -> Result<LoginReply, InfraError> {
        let call = self.two_factor_calls.fetch_add(1, Ordering::SeqCst) + 1;
        record(&self.two_factor_usernames, username.to_string());
        pop(&self.two_factor_script)
            .unwrap_or_else(|| {
                Scripted::Reply(LoginReply::Authenticated {
                    token: format!("2fa-token-{call}"),
                })
            })
            .into_result()
    }

    async fn fetch_venues(
        &self,
        token: &str,
        _username: Option<&str>,
        start_date: NaiveDate,
    ) -> Result<VenuesReply, InfraError> {
        self.venues_calls.fetch_add(1, Ordering::SeqCst);
        record(&self.venues_tokens, token.to_string());
        Self::pause(&self.venues_delay).await;
        pop(&self.venues_script)
            .unwrap_or_else(|| {
                Scripted::Reply(window(vec![(
                    start_date,
                    vec![court(
                        "Court 1",
                        "11",
                        vec![free_session("11", "18:00", "20:00", 40.0)],
                    )],
                )]))
            })
            .into_result()
    }

    async fn book_direct(&self, payload: &BookingPayload) -> Result<ServiceAck, InfraError> {
        record(&self.booking_payloads, payload.clone());
        pop(&self.booking_script)
            .unwrap_or_else(|| Scripted::Reply(success_ack(None)))
            .into_result()
    }

    async fn create_monitor_task(
        &self,
        payload: &MonitorTaskPayload,
    ) -> Result<ServiceAck, InfraError> {
        record(&self.monitor_payloads, payload.clone());
        let id = format!("task-{}", self.monitor_payloads.lock().expect("record mutex poisoned").len());
        pop(&self.monitor_script)
            .unwrap_or_else(|| Scripted::Reply(success_ack(Some(&id))))
            .into_result()
    }

    async fn stop_task(&self, task_id: &str) -> Result<ServiceAck, InfraError> {
        record(&self.stop_requests, task_id.to_string());
        pop(&self.stop_script)
            .unwrap_or_else(|| Scripted::Reply(success_ack(None)))
            .into_result()
    }

    async fn list_tasks(&self, _username: Option<&str>) -> Result<Vec<TaskInfo>, InfraError> {
        self.tasks_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tasks.load(Ordering::SeqCst) {
            return Err(InfraError::NetworkFailure("tasks unavailable".to_string()));
        }
        Ok(self.tasks.lock().expect("tasks mutex poisoned").clone())
    }

    async fn fetch_logs(
        &self,
        _username: Option<&str>,
        _cache_buster: i64,
    ) -> Result<Vec<String>, InfraError> {
        self.logs_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.logs.lock().expect("logs mutex poisoned").clone())
    }

    async fn list_orders(&self, request: &OrdersRequest) -> Result<Vec<OrderRecord>, InfraError> {
        record(&self.order_requests, request.clone());
        Ok(self.orders.lock().expect("orders mutex poisoned").clone())
    }

    async fn create_monthly_task(
        &self,
        payload: &MonthlyTaskPayload,
    ) -> Result<ServiceAck, InfraError> {
        record(&self.monthly_payloads, payload.clone());
        let id = format!(
            "monthly-{}",
            self.monthly_payloads.lock().expect("record mutex poisoned").len()
        );
        pop(&self.monthly_create_script)
            .unwrap_or_else(|| Scripted::Reply(success_ack(Some(&id))))
            .into_result()
    }

    async fn cancel_monthly_task(
        &self,
        task_id: &str,
        username: &str,
    ) -> Result<ServiceAck, InfraError> {
        record(
            &self.cancel_requests,
            (task_id.to_string(), username.to_string()),
        );
        pop(&self.monthly_cancel_script)
            .unwrap_or_else(|| Scripted::Reply(success_ack(None)))
            .into_result()
    }

    async fn list_monthly_tasks(&self, _username: &str) -> Result<Vec<MonthlyTask>, InfraError> {
        self.monthly_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.monthly_tasks.lock().expect("monthly mutex poisoned").clone())
    }

    async fn monthly_venue_ids(&self) -> Result<BTreeMap<String, String>, InfraError> {
        Ok(BTreeMap::from([
            ("1".to_string(), "5115".to_string()),
            ("2".to_string(), "5116".to_string()),
        ]))
    }
}
