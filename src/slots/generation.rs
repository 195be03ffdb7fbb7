//! Weekly slot generation.
//!
//! Runs in two phases. Prune drops every partition dated before `today`.
//! Generate upserts one slot per default template for each working day in
//! the coming week. Both are idempotent: slot ids are derived from their
//! key, so a re-run neither duplicates slots nor clears a `booked` flag.

use std::time::Duration;

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::models::{NewSlot, Role, UpsertOutcome};
use crate::store::{Store, StoreError, bounded};

pub const WINDOW_DAYS: u64 = 7;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub partitions_pruned: usize,
    pub slots_pruned: u64,
    pub slots_created: usize,
    pub slots_existing: usize,
}

/// First day of the generation window: the Sunday strictly after `today`.
pub fn next_week_start(today: NaiveDate) -> NaiveDate {
    let ahead = 7 - u64::from(today.weekday().num_days_from_sunday());
    today + Days::new(ahead)
}

pub async fn prune_past_partitions(
    store: &dyn Store,
    today: NaiveDate,
    limit: Duration,
    report: &mut GenerationReport,
) -> Result<(), StoreError> {
    for (doctor_id, date) in bounded(limit, store.slot_partitions()).await? {
        if date >= today {
            continue;
        }
        let removed = bounded(limit, store.delete_slot_partition(doctor_id, date)).await?;
        tracing::info!(%doctor_id, %date, removed, "pruned slot partition");
        report.partitions_pruned += 1;
        report.slots_pruned += removed;
    }
    Ok(())
}

pub async fn generate_week(
    store: &dyn Store,
    today: NaiveDate,
    limit: Duration,
    report: &mut GenerationReport,
) -> Result<(), StoreError> {
    let start = next_week_start(today);
    let doctors = bounded(limit, store.list_doctors()).await?;

    for doctor in doctors.iter().filter(|d| d.effective_role() == Role::Doctor) {
        for offset in 0..WINDOW_DAYS {
            let date = start + Days::new(offset);
            if !doctor.works_on(date.weekday()) {
                continue;
            }

            let mut created = 0usize;
            for template in &doctor.default_slots {
                let slot = NewSlot {
                    doctor_id: doctor.doctor_id,
                    date,
                    start: template.start,
                    end: template.end,
                };
                match bounded(limit, store.upsert_slot(slot)).await? {
                    UpsertOutcome::Inserted => created += 1,
                    UpsertOutcome::AlreadyPresent => report.slots_existing += 1,
                }
            }
            report.slots_created += created;
            tracing::info!(doctor_id = %doctor.doctor_id, %date, created, "generated slots");
        }
    }
    Ok(())
}

/// Prune, then generate. Every store call is bounded by `limit`.
pub async fn run(
    store: &dyn Store,
    today: NaiveDate,
    limit: Duration,
) -> Result<GenerationReport, StoreError> {
    let mut report = GenerationReport::default();
    prune_past_partitions(store, today, limit, &mut report).await?;
    generate_week(store, today, limit, &mut report).await?;
    tracing::info!(
        partitions_pruned = report.partitions_pruned,
        slots_created = report.slots_created,
        slots_existing = report.slots_existing,
        "slot generation finished"
    );
    Ok(report)
}
