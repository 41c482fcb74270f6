use crate::application::clock::Clock;
use crate::application::session::{BlockedRead, RequestContext, SessionManager};
use crate::domain::availability::{classify, SlotCategory, SlotSelection};
use crate::domain::models::{SlotRange, VenueRow, OFFERED_SLOTS};
use crate::domain::time_classifier::{is_past, rolling_window};
use crate::infrastructure::booking_client::BookingServiceClient;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::{VenueWindow, VenuesReply};
use crate::infrastructure::venue_cache::VenueCacheRepository;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// User-initiated; raises the loading flag.
    Blocking,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed {
        dates: Vec<NaiveDate>,
        skipped: Vec<String>,
    },
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub slot: String,
    pub category: Option<SlotCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub venue_name: String,
    pub venue_id: String,
    pub cells: Vec<GridCell>,
}

/// Counts blocking fetches in flight.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AvailabilityModel {
    session: Arc<SessionManager>,
    client: Arc<dyn BookingServiceClient>,
    cache: Arc<dyn VenueCacheRepository>,
    clock: Clock,
    window_days: u32,
    loading: AtomicUsize,
    last_refreshed: Mutex<Option<DateTime<Utc>>>,
}

impl AvailabilityModel {
    pub fn new(
        session: Arc<SessionManager>,
        client: Arc<dyn BookingServiceClient>,
        cache: Arc<dyn VenueCacheRepository>,
        clock: Clock,
        window_days: u32,
    ) -> Self {
        Self {
            session,
            client,
            cache,
            clock,
            window_days,
            loading: AtomicUsize::new(0),
            last_refreshed: Mutex::new(None),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    pub fn last_refreshed(&self) -> Result<Option<DateTime<Utc>>, InfraError> {
        Ok(*self.lock_last_refreshed()?)
    }

    fn lock_last_refreshed(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<DateTime<Utc>>>, InfraError> {
        self.last_refreshed.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("availability lock poisoned: {error}"))
        })
    }

    /// Fetches the rolling window starting at the venue-local today.
    ///
    /// A rejected token gets one silent reconnect and one retry. A rescue
    /// challenge parks the read in the session and surfaces
    /// `RescueTwoFactorRequired`; `resume` replays it after the code is accepted.
    pub async fn refresh(&self, mode: FetchMode) -> Result<RefreshOutcome, InfraError> {
        let context = self.session.request_context()?;
        let _loading = (mode == FetchMode::Blocking).then(|| LoadingGuard::enter(&self.loading));

        let reply = self.fetch(&context).await?;
        let (reply, context) = match reply {
            VenuesReply::Invalid(reason) => {
                if !self.session.is_current(context.epoch) {
                    return Ok(RefreshOutcome::Discarded);
                }
                info!(%reason, "venue fetch rejected the session token");
                self.session.silent_reconnect(&context.token).await?;
                let retried = self.session.request_context()?;
                (self.fetch(&retried).await?, retried)
            }
            other => (other, context),
        };

        match reply {
            VenuesReply::Window(window) => self.apply(window, context.epoch),
            VenuesReply::NeedRescueTwoFactor { username, message } => {
                if !self.session.is_current(context.epoch) {
                    return Ok(RefreshOutcome::Discarded);
                }
                warn!(%message, "venue fetch blocked by a rescue two-factor challenge");
                let username = self.session.enter_rescue(&username, BlockedRead::VenueWindow)?;
                Err(InfraError::RescueTwoFactorRequired { username })
            }
            VenuesReply::Invalid(reason) => {
                warn!(%reason, "venue fetch still rejected after reconnect");
                Err(InfraError::TokenExpired)
            }
        }
    }

    /// Replays a read that a rescue challenge interrupted.
    pub async fn resume(&self, blocked: BlockedRead) -> Result<RefreshOutcome, InfraError> {
        match blocked {
            BlockedRead::VenueWindow => self.refresh(FetchMode::Blocking).await,
        }
    }

    async fn fetch(&self, context: &RequestContext) -> Result<VenuesReply, InfraError> {
        let start_date = self.clock.today();
        match self
            .client
            .fetch_venues(&context.token, context.username.as_deref(), start_date)
            .await
        {
            Err(InfraError::TokenExpired) => Ok(VenuesReply::Invalid("http 401".to_string())),
            other => other,
        }
    }

    fn apply(&self, window: VenueWindow, epoch: u64) -> Result<RefreshOutcome, InfraError> {
        if !self.session.is_current(epoch) {
            info!("discarding venue window fetched for a previous session");
            return Ok(RefreshOutcome::Discarded);
        }
        let mut dates = Vec::with_capacity(window.dates.len());
        for (date, rows) in window.dates {
            self.cache.replace_date(date, rows)?;
            dates.push(date);
        }
        let today = self.clock.today();
        self.cache.retain_dates(&|date| date >= today)?;
        *self.lock_last_refreshed()? = Some(self.clock.now_utc());
        info!(
            dates = dates.len(),
            skipped = window.undecodable.len(),
            "venue availability refreshed"
        );
        Ok(RefreshOutcome::Refreshed {
            dates,
            skipped: window.undecodable,
        })
    }

    pub fn window_dates(&self) -> Vec<NaiveDate> {
        rolling_window(self.clock.today(), self.window_days)
    }

    pub fn rows_for(&self, date: NaiveDate) -> Result<Vec<VenueRow>, InfraError> {
        Ok(self
            .cache
            .rows_for(date)?
            .map(|rows| rows.to_vec())
            .unwrap_or_default())
    }

    /// Venue by slot matrix for one date, classified against the current wall clock.
    pub fn grid(&self, date: NaiveDate) -> Result<Vec<GridRow>, InfraError> {
        let now = self.clock.local_now();
        let slots: Vec<SlotRange> = OFFERED_SLOTS
            .iter()
            .filter_map(|value| value.parse().ok())
            .collect();
        let rows = self.cache.rows_for(date)?.unwrap_or_else(|| Arc::from(Vec::new()));
        Ok(rows
            .iter()
            .map(|row| GridRow {
                venue_name: row.name.clone(),
                venue_id: row.id.clone(),
                cells: slots
                    .iter()
                    .map(|slot| GridCell {
                        slot: slot.to_string(),
                        category: row
                            .session_for(slot)
                            .map(|session| classify(session, is_past(date, slot, now))),
                    })
                    .collect(),
            })
            .collect())
    }

    pub fn select(
        &self,
        date: NaiveDate,
        venue: &str,
        slot: SlotRange,
    ) -> Result<SlotSelection, InfraError> {
        let rows = self.cache.rows_for(date)?.ok_or_else(|| {
            InfraError::InvalidInput(format!("no availability cached for {date}; refresh first"))
        })?;
        SlotSelection::from_rows(&rows, date, venue, slot, self.clock.local_now())
            .map_err(InfraError::InvalidInput)
    }

    pub fn clear(&self) -> Result<(), InfraError> {
        self.cache.clear()?;
        *self.lock_last_refreshed()? = None;
        Ok(())
    }
}
