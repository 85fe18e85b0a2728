// 🔄 Renewal Engine
// Advances a record's billing end date by one cycle and persists it

use crate::cycle::{format_date, parse_date, renewal_length, CycleLength};
use crate::db::{Column, FieldChanges, RecordStore, VpsInstance};
use crate::error::RenewalError;
use chrono::NaiveDate;
use serde::Serialize;

/// Result of one successful renewal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Renewal {
    pub id: i64,
    pub previous_end_date: String,
    pub new_end_date: String,
    pub cycle: CycleLength,
}

/// End date one cycle after `end_date`. Pure: nothing is read or written.
pub fn next_end_date(end_date: &str, descriptor: &str) -> Result<(NaiveDate, CycleLength), RenewalError> {
    let end = parse_date(end_date).ok_or_else(|| RenewalError::InvalidDate(end_date.to_string()))?;
    let length = match renewal_length(descriptor) {
        Some(CycleLength::Months(0)) | Some(CycleLength::Years(0)) | Some(CycleLength::Days(0)) | None => {
            return Err(RenewalError::UnsupportedCycle(descriptor.to_string()));
        }
        Some(length) => length,
    };
    let next = length
        .advance(end)
        .ok_or_else(|| RenewalError::UnsupportedCycle(descriptor.to_string()))?;
    Ok((next, length))
}

fn billing_terms(record: &VpsInstance) -> Result<(&str, &str), RenewalError> {
    let invalid = |reason: &str| RenewalError::InvalidState {
        id: record.id,
        reason: reason.to_string(),
    };
    let end_date = record
        .billing_end_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| invalid("no billing end date"))?;
    let cycle = record
        .billing_cycle
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| invalid("no billing cycle"))?;
    Ok((end_date, cycle))
}

/// Applies renewals through a `RecordStore`
pub struct RenewalEngine<'a, S: RecordStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> RenewalEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Renew the record as currently persisted.
    ///
    /// Each call re-reads the record, so two calls advance two cycles. The
    /// write is a blind overwrite of the end date; concurrent renewals of the
    /// same record are serialised by the store, not checked here.
    pub fn renew(&self, id: i64) -> Result<Renewal, RenewalError> {
        let record = self
            .store
            .get_by_id(id)?
            .ok_or(RenewalError::RecordNotFound(id))?;

        let (end_date, cycle) = billing_terms(&record)?;
        let (next, length) = next_end_date(end_date, cycle)?;
        let new_end_date = format_date(next);

        let changes = FieldChanges::new().text(Column::BillingEndDate, Some(&new_end_date));
        if self.store.update(id, &changes)? == 0 {
            return Err(RenewalError::RecordNotFound(id));
        }

        tracing::info!(
            id,
            previous = end_date,
            next = %new_end_date,
            cycle = %length.label(),
            "billing period renewed"
        );

        Ok(Renewal {
            id,
            previous_end_date: end_date.to_string(),
            new_end_date,
            cycle: length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewVpsInstance, SqliteStore};
    use anyhow::Result;
    use std::cell::Cell;

    fn store_with(end_date: Option<&str>, cycle: Option<&str>) -> (SqliteStore, i64) {
        let store = SqliteStore::open_in_memory("http://localhost:3000").unwrap();
        let id = store
            .insert(&NewVpsInstance {
                name: "box".to_string(),
                billing_end_date: end_date.map(str::to_string),
                billing_cycle: cycle.map(str::to_string),
                ..Default::default()
            })
            .unwrap();
        (store, id)
    }

    fn end_date_of(store: &SqliteStore, id: i64) -> Option<String> {
        store.get_by_id(id).unwrap().unwrap().billing_end_date
    }

    #[test]
    fn test_monthly_renewal_clamps_to_leap_february() {
        let (store, id) = store_with(Some("2024-01-31"), Some("Monthly"));
        let renewal = RenewalEngine::new(&store).renew(id).unwrap();
        assert_eq!(renewal.new_end_date, "2024-02-29");
        assert_eq!(end_date_of(&store, id).as_deref(), Some("2024-02-29"));
    }

    #[test]
    fn test_bi_annual_renewal_adds_two_years() {
        let (store, id) = store_with(Some("2024-03-15"), Some("Bi-Annually"));
        let renewal = RenewalEngine::new(&store).renew(id).unwrap();
        assert_eq!(renewal.new_end_date, "2026-03-15");
        assert_eq!(renewal.cycle, CycleLength::Years(2));
    }

    #[test]
    fn test_day_based_renewal() {
        let (store, id) = store_with(Some("2024-06-01"), Some("30 days"));
        let renewal = RenewalEngine::new(&store).renew(id).unwrap();
        assert_eq!(renewal.new_end_date, "2024-07-01");
        assert_eq!(renewal.previous_end_date, "2024-06-01");
    }

    #[test]
    fn test_quarterly_and_loose_digit_renewals() {
        assert_eq!(
            next_end_date("2024-11-30", "Quarterly").unwrap().0,
            parse_date("2025-02-28").unwrap()
        );
        assert_eq!(
            next_end_date("2024-01-01", "45d").unwrap().0,
            parse_date("2024-02-15").unwrap()
        );
    }

    #[test]
    fn test_empty_cycle_is_invalid_state_and_untouched() {
        let (store, id) = store_with(Some("2024-01-01"), Some(""));
        let err = RenewalEngine::new(&store).renew(id).unwrap_err();
        assert!(matches!(err, RenewalError::InvalidState { .. }));
        assert_eq!(end_date_of(&store, id).as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_missing_end_date_is_invalid_state() {
        let (store, id) = store_with(None, Some("Monthly"));
        let err = RenewalEngine::new(&store).renew(id).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_unsupported_cycle_is_refused() {
        let (store, id) = store_with(Some("2024-01-01"), Some("whenever"));
        let err = RenewalEngine::new(&store).renew(id).unwrap_err();
        assert_eq!(err, RenewalError::UnsupportedCycle("whenever".to_string()));
        assert_eq!(end_date_of(&store, id).as_deref(), Some("2024-01-01"));

        assert!(matches!(
            next_end_date("2024-01-01", "0 days"),
            Err(RenewalError::UnsupportedCycle(_))
        ));
    }

    #[test]
    fn test_unparseable_end_date_is_invalid_date() {
        let (store, id) = store_with(Some("01/02/2024"), Some("Monthly"));
        let err = RenewalEngine::new(&store).renew(id).unwrap_err();
        assert_eq!(err, RenewalError::InvalidDate("01/02/2024".to_string()));
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let (store, id) = store_with(Some("2024-01-01"), Some("Monthly"));
        let err = RenewalEngine::new(&store).renew(id + 1).unwrap_err();
        assert_eq!(err, RenewalError::RecordNotFound(id + 1));
    }

    #[test]
    fn test_each_call_advances_from_persisted_date() {
        let (store, id) = store_with(Some("2024-01-15"), Some("Monthly"));
        let engine = RenewalEngine::new(&store);
        engine.renew(id).unwrap();
        let second = engine.renew(id).unwrap();
        assert_eq!(second.previous_end_date, "2024-02-15");
        assert_eq!(second.new_end_date, "2024-03-15");
    }

    /// Store whose record disappears between read and write
    struct VanishingStore {
        record: VpsInstance,
        updates: Cell<usize>,
    }

    impl RecordStore for VanishingStore {
        fn insert(&self, _new: &NewVpsInstance) -> Result<i64> {
            Ok(self.record.id)
        }
        fn get_by_id(&self, _id: i64) -> Result<Option<VpsInstance>> {
            Ok(Some(self.record.clone()))
        }
        fn list_all(&self) -> Result<Vec<VpsInstance>> {
            Ok(vec![self.record.clone()])
        }
        fn update(&self, _id: i64, _changes: &FieldChanges) -> Result<usize> {
            self.updates.set(self.updates.get() + 1);
            Ok(0)
        }
        fn delete(&self, _id: i64) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_concurrent_delete_is_not_found() {
        let (sqlite, id) = store_with(Some("2024-01-01"), Some("Monthly"));
        let store = VanishingStore {
            record: sqlite.get_by_id(id).unwrap().unwrap(),
            updates: Cell::new(0),
        };
        let err = RenewalEngine::new(&store).renew(id).unwrap_err();
        assert_eq!(err, RenewalError::RecordNotFound(id));
        assert_eq!(store.updates.get(), 1);
    }
}
