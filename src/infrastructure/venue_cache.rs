use crate::domain::models::VenueRow;
use crate::infrastructure::error::InfraError;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Per-date venue rows. A date's rows are always replaced as one unit.
pub trait VenueCacheRepository: Send + Sync {
    fn rows_for(&self, date: NaiveDate) -> Result<Option<Arc<[VenueRow]>>, InfraError>;
    fn replace_date(&self, date: NaiveDate, rows: Vec<VenueRow>) -> Result<(), InfraError>;
    fn cached_dates(&self) -> Result<Vec<NaiveDate>, InfraError>;
    fn retain_dates(&self, keep: &dyn Fn(NaiveDate) -> bool) -> Result<(), InfraError>;
    fn clear(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryVenueCacheRepository {
    dates: Mutex<BTreeMap<NaiveDate, Arc<[VenueRow]>>>,
}

impl InMemoryVenueCacheRepository {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<NaiveDate, Arc<[VenueRow]>>>, InfraError> {
        self.dates
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("venue cache lock poisoned: {error}")))
    }
}

impl VenueCacheRepository for InMemoryVenueCacheRepository {
    fn rows_for(&self, date: NaiveDate) -> Result<Option<Arc<[VenueRow]>>, InfraError> {
        Ok(self.lock()?.get(&date).cloned())
    }

    fn replace_date(&self, date: NaiveDate, rows: Vec<VenueRow>) -> Result<(), InfraError> {
        let rows: Arc<[VenueRow]> = rows.into();
        self.lock()?.insert(date, rows);
        Ok(())
    }

    fn cached_dates(&self) -> Result<Vec<NaiveDate>, InfraError> {
        Ok(self.lock()?.keys().copied().collect())
    }

    fn retain_dates(&self, keep: &dyn Fn(NaiveDate) -> bool) -> Result<(), InfraError> {
        self.lock()?.retain(|date, _| keep(*date));
        Ok(())
    }

    fn clear(&self) -> Result<(), InfraError> {
        self.lock()?.clear();
        Ok(())
    }
}
