use crate::application::availability_sync::{AvailabilityModel, FetchMode};
use crate::application::logs::LogFeed;
use crate::application::session::SessionManager;
use crate::application::tasks::TaskLifecycleController;
use crate::domain::models::AuthState;
use crate::infrastructure::error::InfraError;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Dashboard,
    Orders,
    Monthly,
}

/// A spawned loop or one-shot. Cancelling is idempotent and lets an
/// in-flight request finish.
pub struct LoopHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl LoopHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) {
        if let Err(error) = self.join.await {
            warn!(%error, "polling task ended abnormally");
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    view: Option<View>,
    auto_refresh: bool,
    fast: Option<LoopHandle>,
    auto: Option<LoopHandle>,
}

impl SchedulerState {
    fn stop_fast(&mut self) {
        if let Some(handle) = self.fast.take() {
            handle.cancel();
        }
    }

    fn stop_auto(&mut self) {
        if let Some(handle) = self.auto.take() {
            handle.cancel();
        }
    }
}

pub struct PollingScheduler {
    session: Arc<SessionManager>,
    availability: Arc<AvailabilityModel>,
    tasks: Arc<TaskLifecycleController>,
    logs: Arc<LogFeed>,
    fast_interval: Duration,
    auto_refresh_interval: Duration,
    root: CancellationToken,
    state: Mutex<SchedulerState>,
}

fn spawn_loop<F, Fut>(
    cancel: CancellationToken,
    first_tick: Instant,
    period: Duration,
    mut tick: F,
) -> LoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = cancel.clone();
    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(first_tick, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            tick().await;
        }
    });
    LoopHandle { cancel, join }
}

/// Background venue reads wait while a rescue code is outstanding.
fn background_refresh_allowed(session: &SessionManager) -> bool {
    session.is_authenticated()
        && !matches!(session.auth_state(), Ok(AuthState::RescueTwoFactorNeeded))
}

impl PollingScheduler {
    pub fn new(
        session: Arc<SessionManager>,
        availability: Arc<AvailabilityModel>,
        tasks: Arc<TaskLifecycleController>,
        logs: Arc<LogFeed>,
        fast_interval: Duration,
        auto_refresh_interval: Duration,
    ) -> Self {
        Self {
            session,
            availability,
            tasks,
            logs,
            fast_interval,
            auto_refresh_interval,
            root: CancellationToken::new(),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SchedulerState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("scheduler lock poisoned: {error}")))
    }

    pub fn current_view(&self) -> Option<View> {
        self.lock_state().ok().and_then(|state| state.view)
    }

    pub fn is_fast_loop_running(&self) -> bool {
        self.lock_state()
            .map(|state| state.fast.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    pub fn is_auto_refresh_running(&self) -> bool {
        self.lock_state()
            .map(|state| state.auto.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Mount hook. Starts the fast loop on first mount; switching views keeps it.
    pub fn mount_view(self: &Arc<Self>, view: View) -> Result<(), InfraError> {
        let mut state = self.lock_state()?;
        state.view = Some(view);
        if state.fast.is_none() {
            let scheduler = Arc::clone(self);
            state.fast = Some(spawn_loop(
                self.root.child_token(),
                Instant::now(),
                self.fast_interval,
                move || {
                    let scheduler = Arc::clone(&scheduler);
                    async move { scheduler.fast_tick().await }
                },
            ));
        }
        if view == View::Dashboard && state.auto_refresh && state.auto.is_none() {
            state.auto = Some(self.spawn_auto_refresh());
        } else if view != View::Dashboard {
            state.stop_auto();
        }
        info!(?view, "view mounted");
        Ok(())
    }

    /// Unmount hook. Stops every loop.
    pub fn unmount_view(&self) -> Result<(), InfraError> {
        let mut state = self.lock_state()?;
        state.view = None;
        state.stop_fast();
        state.stop_auto();
        Ok(())
    }

    pub fn set_auto_refresh(self: &Arc<Self>, enabled: bool) -> Result<(), InfraError> {
        let mut state = self.lock_state()?;
        state.auto_refresh = enabled;
        if !enabled {
            state.stop_auto();
        } else if state.view == Some(View::Dashboard) && state.auto.is_none() {
            state.auto = Some(self.spawn_auto_refresh());
        }
        Ok(())
    }

    fn spawn_auto_refresh(self: &Arc<Self>) -> LoopHandle {
        let scheduler = Arc::clone(self);
        spawn_loop(
            self.root.child_token(),
            Instant::now() + self.auto_refresh_interval,
            self.auto_refresh_interval,
            move || {
                let scheduler = Arc::clone(&scheduler);
                async move { scheduler.auto_tick().await }
            },
        )
    }

    /// One-shot background venue refresh after `delay`.
    pub fn schedule_refresh(&self, delay: Duration) -> LoopHandle {
        let cancel = self.root.child_token();
        let token = cancel.clone();
        let availability = Arc::clone(&self.availability);
        let session = Arc::clone(&self.session);
        let join = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if !background_refresh_allowed(&session) {
                debug!("scheduled venue refresh skipped");
                return;
            }
            if let Err(error) = availability.refresh(FetchMode::Background).await {
                debug!(%error, "scheduled venue refresh failed");
            }
        });
        LoopHandle { cancel, join }
    }

    pub async fn fast_tick(&self) {
        if let Err(error) = self.logs.refresh_logs().await {
            debug!(%error, "log poll failed");
        }
        if self.current_view() == Some(View::Dashboard) && self.session.is_authenticated() {
            if let Err(error) = self.tasks.refresh_tasks().await {
                debug!(%error, "task poll failed");
            }
        }
    }

    pub async fn auto_tick(&self) {
        if self.current_view() != Some(View::Dashboard) || !background_refresh_allowed(&self.session) {
            return;
        }
        match self.availability.refresh(FetchMode::Background).await {
            Ok(_) => {}
            Err(error) if error.is_transient() => debug!(%error, "auto refresh failed"),
            Err(error) => warn!(%error, "auto refresh failed"),
        }
    }

    /// Cancels every loop and pending one-shot.
    pub fn shutdown(&self) {
        self.root.cancel();
        if let Ok(mut state) = self.lock_state() {
            state.view = None;
            state.stop_fast();
            state.stop_auto();
        }
    }
}
