use crate::application::clock::Clock;
use crate::application::session::SessionManager;
use crate::domain::log_entry::LogEntry;
use crate::infrastructure::booking_client::BookingServiceClient;
use crate::infrastructure::error::InfraError;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tail of the Booking Service log, replaced wholesale on every poll.
pub struct LogFeed {
    session: Arc<SessionManager>,
    client: Arc<dyn BookingServiceClient>,
    clock: Clock,
    entries: Mutex<Vec<LogEntry>>,
}

impl LogFeed {
    pub fn new(
        session: Arc<SessionManager>,
        client: Arc<dyn BookingServiceClient>,
        clock: Clock,
    ) -> Self {
        Self {
            session,
            client,
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, Vec<LogEntry>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("log feed lock poisoned: {error}")))
    }

    pub async fn refresh_logs(&self) -> Result<Vec<LogEntry>, InfraError> {
        let snapshot = self.session.snapshot()?;
        let lines = self
            .client
            .fetch_logs(
                snapshot.username.as_deref(),
                self.clock.now_utc().timestamp_millis(),
            )
            .await?;
        if !self.session.is_current(snapshot.epoch) {
            return Err(InfraError::StaleResponse);
        }
        let entries: Vec<LogEntry> = lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| LogEntry::parse(line))
            .collect();
        *self.lock_entries()? = entries.clone();
        Ok(entries)
    }

    pub fn entries(&self) -> Result<Vec<LogEntry>, InfraError> {
        Ok(self.lock_entries()?.clone())
    }

    pub fn clear(&self) -> Result<(), InfraError> {
        self.lock_entries()?.clear();
        Ok(())
    }
}
