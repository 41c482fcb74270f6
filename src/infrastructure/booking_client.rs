use crate::domain::models::{Credentials, MonthlyTask, OrderRecord, TaskInfo};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::{
    decode_task_snapshot, decode_venues_reply, BookingPayload, CancelMonthlyRequest, LoginReply,
    LoginRequest, MonitorTaskPayload, MonthlyTaskPayload, MonthlyTasksReply,
    MonthlyVenueIdsReply, OrdersReply, OrdersRequest, ServiceAck, StopTaskRequest,
    SubmitTwoFactorRequest, VenuesReply,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait BookingServiceClient: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginReply, InfraError>;

    async fn submit_two_factor(&self, username: &str, code: &str)
    -> Result<LoginReply, InfraError>;

    async fn fetch_venues(
        &self,
        token: &str,
        username: Option<&str>,
        start_date: NaiveDate,
    ) -> Result<VenuesReply, InfraError>;

    async fn book_direct(&self, payload: &BookingPayload) -> Result<ServiceAck, InfraError>;

    async fn create_monitor_task(
        &self,
        payload: &MonitorTaskPayload,
    ) -> Result<ServiceAck, InfraError>;

    async fn stop_task(&self, task_id: &str) -> Result<ServiceAck, InfraError>;

    async fn list_tasks(&self, username: Option<&str>) -> Result<Vec<TaskInfo>, InfraError>;

    async fn fetch_logs(
        &self,
        username: Option<&str>,
        cache_buster: i64,
    ) -> Result<Vec<String>, InfraError>;

    async fn list_orders(&self, request: &OrdersRequest) -> Result<Vec<OrderRecord>, InfraError>;

    async fn create_monthly_task(
        &self,
        payload: &MonthlyTaskPayload,
    ) -> Result<ServiceAck, InfraError>;

    async fn cancel_monthly_task(
        &self,
        task_id: &str,
        username: &str,
    ) -> Result<ServiceAck, InfraError>;

    async fn list_monthly_tasks(&self, username: &str) -> Result<Vec<MonthlyTask>, InfraError>;

    async fn monthly_venue_ids(&self) -> Result<BTreeMap<String, String>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBookingServiceClient {
    client: Client,
    base_url: Url,
}

impl ReqwestBookingServiceClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, InfraError> {
        let mut base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid booking service url {base_url:?}: {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "booking service url cannot be a base: {base_url}"
            )));
        }
        if let Ok(mut segments) = base_url.path_segments_mut() {
            segments.pop_if_empty();
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("failed to build http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: StatusCode, body: &str) -> InfraError {
        if status == StatusCode::UNAUTHORIZED {
            return InfraError::TokenExpired;
        }
        InfraError::Http {
            status: status.as_u16(),
            body: body.trim().to_string(),
        }
    }

    fn endpoint(&self, path: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("booking service URL cannot be a base".to_string())
            })?;
            segments.extend(path);
        }
        Ok(url)
    }

    async fn read_body(
        response: reqwest::Response,
        context: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::NetworkFailure(format!("failed reading {context} response: {error}"))
        })?;
        Ok((status, body))
    }

    async fn get(
        &self,
        path: &[&str],
        query: &[(&str, String)],
        context: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let response = self
            .client
            .get(self.endpoint(path)?)
            .query(query)
            .send()
            .await
            .map_err(|error| {
                InfraError::NetworkFailure(format!("network error while {context}: {error}"))
            })?;
        Self::read_body(response, context).await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &[&str],
        body: &B,
        context: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await
            .map_err(|error| {
                InfraError::NetworkFailure(format!("network error while {context}: {error}"))
            })?;
        Self::read_body(response, context).await
    }

    fn decode<T: DeserializeOwned>(
        (status, body): (StatusCode, String),
        context: &str,
    ) -> Result<T, InfraError> {
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|error| {
            InfraError::ServiceRejected(format!("invalid {context} payload: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl BookingServiceClient for ReqwestBookingServiceClient {
    async fn login(&self, credentials: &Credentials) -> Result<LoginReply, InfraError> {
        Self::ensure_non_empty(&credentials.username, "username")?;
        Self::ensure_non_empty(&credentials.password, "password")?;
        let request = LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
            email: credentials.notify_email.as_deref(),
        };
        let response = self.post(&["login"], &request, "logging in").await?;
        let ack: ServiceAck = Self::decode(response, "login")?;
        Ok(LoginReply::from(ack))
    }

    async fn submit_two_factor(
        &self,
        username: &str,
        code: &str,
    ) -> Result<LoginReply, InfraError> {
        Self::ensure_non_empty(username, "username")?;
        Self::ensure_non_empty(code, "two-factor code")?;
        let request = SubmitTwoFactorRequest {
            code: code.trim(),
            username,
        };
        let response = self
            .post(&["submit_2fa"], &request, "submitting two-factor code")
            .await?;
        let ack: ServiceAck = Self::decode(response, "two-factor")?;
        Ok(LoginReply::from(ack))
    }

    async fn fetch_venues(
        &self,
        token: &str,
        username: Option<&str>,
        start_date: NaiveDate,
    ) -> Result<VenuesReply, InfraError> {
        Self::ensure_non_empty(token, "token")?;
        let mut query = vec![
            ("token", token.to_string()),
            ("startDate", start_date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(username) = username {
            query.push(("username", username.to_string()));
        }
        let (status, body) = self.get(&["venues"], &query, "fetching venues").await?;
        let decoded = decode_venues_reply(&body);
        if status.is_success() {
            return decoded;
        }
        match decoded {
            Ok(VenuesReply::Invalid(message)) => Ok(VenuesReply::Invalid(message)),
            Ok(_) | Err(_) => Ok(VenuesReply::Invalid(format!(
                "http {}: {}",
                status.as_u16(),
                body.trim()
            ))),
        }
    }

    async fn book_direct(&self, payload: &BookingPayload) -> Result<ServiceAck, InfraError> {
        Self::ensure_non_empty(&payload.token, "token")?;
        Self::ensure_non_empty(&payload.venue_id, "venue id")?;
        let response = self
            .post(&["book", "direct"], payload, "booking a slot")
            .await?;
        Self::decode(response, "direct booking")
    }

    async fn create_monitor_task(
        &self,
        payload: &MonitorTaskPayload,
    ) -> Result<ServiceAck, InfraError> {
        Self::ensure_non_empty(&payload.token, "token")?;
        let response = self
            .post(&["task", "monitor"], payload, "creating a monitor task")
            .await?;
        Self::decode(response, "monitor task")
    }

    async fn stop_task(&self, task_id: &str) -> Result<ServiceAck, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let response = self
            .post(&["task", "stop"], &StopTaskRequest { task_id }, "stopping a task")
            .await?;
        Self::decode(response, "stop task")
    }

    async fn list_tasks(&self, username: Option<&str>) -> Result<Vec<TaskInfo>, InfraError> {
        let query = username
            .map(|username| vec![("username", username.to_string())])
            .unwrap_or_default();
        let (status, body) = self.get(&["tasks"], &query, "listing tasks").await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        decode_task_snapshot(&body)
    }

    async fn fetch_logs(
        &self,
        username: Option<&str>,
        cache_buster: i64,
    ) -> Result<Vec<String>, InfraError> {
        let mut query = vec![("t", cache_buster.to_string())];
        if let Some(username) = username {
            query.push(("username", username.to_string()));
        }
        let response = self.get(&["logs"], &query, "fetching logs").await?;
        Self::decode(response, "logs")
    }

    async fn list_orders(&self, request: &OrdersRequest) -> Result<Vec<OrderRecord>, InfraError> {
        Self::ensure_non_empty(&request.token, "token")?;
        let response = self.post(&["orders"], request, "listing orders").await?;
        let reply: OrdersReply = Self::decode(response, "orders")?;
        if !reply.status.eq_ignore_ascii_case("success") {
            return Err(InfraError::ServiceRejected(
                reply
                    .msg
                    .unwrap_or_else(|| format!("order listing failed with status {:?}", reply.status)),
            ));
        }
        Ok(reply.data.map(|page| page.records).unwrap_or_default())
    }

    async fn create_monthly_task(
        &self,
        payload: &MonthlyTaskPayload,
    ) -> Result<ServiceAck, InfraError> {
        Self::ensure_non_empty(&payload.token, "token")?;
        Self::ensure_non_empty(&payload.username, "username")?;
        let response = self
            .post(&["monthly", "create"], payload, "creating a monthly task")
            .await?;
        Self::decode(response, "monthly create")
    }

    async fn cancel_monthly_task(
        &self,
        task_id: &str,
        username: &str,
    ) -> Result<ServiceAck, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let response = self
            .post(
                &["monthly", "cancel"],
                &CancelMonthlyRequest { task_id, username },
                "cancelling a monthly task",
            )
            .await?;
        Self::decode(response, "monthly cancel")
    }

    async fn list_monthly_tasks(&self, username: &str) -> Result<Vec<MonthlyTask>, InfraError> {
        Self::ensure_non_empty(username, "username")?;
        let response = self
            .get(
                &["monthly", "tasks"],
                &[("username", username.to_string())],
                "listing monthly tasks",
            )
            .await?;
        let reply: MonthlyTasksReply = Self::decode(response, "monthly tasks")?;
        if !reply.status.eq_ignore_ascii_case("success") {
            return Err(InfraError::ServiceRejected(reply.msg.unwrap_or_else(|| {
                format!("monthly task listing failed with status {:?}", reply.status)
            })));
        }
        Ok(reply.tasks)
    }

    async fn monthly_venue_ids(&self) -> Result<BTreeMap<String, String>, InfraError> {
        let response = self
            .get(&["monthly", "venue_ids"], &[], "fetching monthly venue ids")
            .await?;
        let reply: MonthlyVenueIdsReply = Self::decode(response, "monthly venue ids")?;
        if !reply.status.eq_ignore_ascii_case("success") {
            return Err(InfraError::ServiceRejected(reply.msg.unwrap_or_else(|| {
                format!("venue id listing failed with status {:?}", reply.status)
            })));
        }
        Ok(reply.venue_ids)
    }
}
