use crate::application::clock::Clock;
use crate::application::polling::PollingScheduler;
use crate::application::session::SessionManager;
use crate::application::tasks::{MonitorRequest, TaskLifecycleController, VenueSelector};
use crate::domain::availability::{BookingActions, SlotSelection};
use crate::domain::models::TaskKind;
use crate::infrastructure::booking_client::BookingServiceClient;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::BookingPayload;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Turns a selected slot into a direct purchase or a lock task.
pub struct BookingRequestBuilder {
    session: Arc<SessionManager>,
    client: Arc<dyn BookingServiceClient>,
    tasks: Arc<TaskLifecycleController>,
    scheduler: Arc<PollingScheduler>,
    clock: Clock,
    default_stadium_id: i64,
    post_booking_delay: Duration,
}

impl BookingRequestBuilder {
    pub fn new(
        session: Arc<SessionManager>,
        client: Arc<dyn BookingServiceClient>,
        tasks: Arc<TaskLifecycleController>,
        scheduler: Arc<PollingScheduler>,
        clock: Clock,
    ) -> Self {
        Self {
            session,
            client,
            tasks,
            scheduler,
            clock,
            default_stadium_id: 1,
            post_booking_delay: Duration::from_secs(5),
        }
    }

    pub fn with_default_stadium_id(mut self, stadium_id: i64) -> Self {
        self.default_stadium_id = stadium_id;
        self
    }

    pub fn with_post_booking_delay(mut self, delay: Duration) -> Self {
        self.post_booking_delay = delay;
        self
    }

    pub fn offered_actions(&self, selection: &SlotSelection) -> BookingActions {
        selection.offered_actions(self.clock.local_now())
    }

    /// One-shot purchase. On success a venue refresh is scheduled after the
    /// post-booking delay. Returns the service's message.
    pub async fn direct_book(&self, selection: &SlotSelection) -> Result<String, InfraError> {
        if !self.offered_actions(selection).direct {
            return Err(InfraError::InvalidInput(format!(
                "{} {} on {} is no longer bookable",
                selection.venue_name, selection.slot, selection.date
            )));
        }
        let context = self.session.request_context()?;
        let mut payload = BookingPayload {
            token: context.token.clone(),
            date: selection.date.to_string(),
            start_time: selection.slot.start().to_string(),
            end_time: selection.slot.end().to_string(),
            venue_id: selection.session.venue_id.clone(),
            price: selection.session.price,
            stadium_id: selection
                .session
                .stadium_id
                .unwrap_or(self.default_stadium_id),
            email: context.notify_email.clone(),
            username: context.username.clone(),
        };

        let ack = match self.client.book_direct(&payload).await {
            Err(InfraError::TokenExpired) => {
                payload.token = self.session.silent_reconnect(&context.token).await?;
                self.client.book_direct(&payload).await?
            }
            other => other?,
        };
        let ack = ack.into_success("direct booking")?;
        info!(
            venue = %selection.venue_name,
            date = %selection.date,
            slot = %selection.slot,
            "direct booking accepted"
        );
        self.scheduler.schedule_refresh(self.post_booking_delay);
        Ok(ack.message_or("booking submitted"))
    }

    /// Starts a continuous lock task on the selected venue. Only offered for
    /// slots that have not started.
    pub async fn lock_book(&self, selection: &SlotSelection) -> Result<Option<String>, InfraError> {
        if !self.offered_actions(selection).lock {
            return Err(InfraError::InvalidInput(format!(
                "lock is only offered for slots that have not started; {} on {} has",
                selection.slot, selection.date
            )));
        }
        self.tasks
            .create_monitor_task(MonitorRequest {
                kind: TaskKind::Lock,
                date: selection.date,
                slot: selection.slot,
                venue: VenueSelector::from_selection(selection),
            })
            .await
    }
}
