//! Document store contract.
//!
//! Every collection the service touches (doctor and patient profiles, slot
//! partitions, appointments, history records) is reached through [`Store`].
//! Two backends exist: [`pg::PgStore`] for Postgres and
//! [`memory::MemoryStore`] for tests and database-less runs.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentFilter, DoctorProfile, HistoryRecord, NewAppointment, NewDoctor,
    NewHistoryRecord, NewPatient, NewSlot, PatientChanges, PatientProfile, Slot, SlotTemplate,
    UpsertOutcome,
};

pub mod memory;
pub mod pg;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Duplicate(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    // doctors (and admins)
    async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, StoreError>;
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, StoreError>;
    async fn find_doctor_by_auth_id(&self, auth_id: &str) -> Result<Option<DoctorProfile>, StoreError>;
    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<DoctorProfile>, StoreError>;
    async fn insert_doctor(&self, new: NewDoctor) -> Result<DoctorProfile, StoreError>;
    async fn set_doctor_auth_id(&self, doctor_id: Uuid, auth_id: &str) -> Result<(), StoreError>;
    async fn update_doctor_schedule(
        &self,
        doctor_id: Uuid,
        working_days: Vec<String>,
        default_slots: Vec<SlotTemplate>,
    ) -> Result<Option<DoctorProfile>, StoreError>;

    // patients
    async fn list_patients(&self) -> Result<Vec<PatientProfile>, StoreError>;
    async fn get_patient(&self, patient_id: Uuid) -> Result<Option<PatientProfile>, StoreError>;
    async fn find_patient_by_auth_id(&self, auth_id: &str) -> Result<Option<PatientProfile>, StoreError>;
    async fn find_patient_by_email(&self, email: &str) -> Result<Option<PatientProfile>, StoreError>;
    async fn find_patients_by_username(&self, username: &str) -> Result<Vec<PatientProfile>, StoreError>;
    async fn insert_patient(&self, new: NewPatient) -> Result<PatientProfile, StoreError>;
    async fn update_patient(
        &self,
        patient_id: Uuid,
        changes: PatientChanges,
    ) -> Result<Option<PatientProfile>, StoreError>;
    async fn delete_patient(&self, patient_id: Uuid) -> Result<bool, StoreError>;
    async fn set_patient_auth_id(&self, patient_id: Uuid, auth_id: &str) -> Result<(), StoreError>;

    // medical history (append-only)
    async fn insert_history(&self, new: NewHistoryRecord) -> Result<HistoryRecord, StoreError>;
    async fn list_history(&self, patient_id: Uuid) -> Result<Vec<HistoryRecord>, StoreError>;

    // slot partitions
    async fn slot_partitions(&self) -> Result<Vec<(Uuid, NaiveDate)>, StoreError>;
    async fn delete_slot_partition(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u64, StoreError>;
    async fn list_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>, StoreError>;
    /// Unbooked slots of the partition with exactly this start and end, in store order.
    async fn find_open_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Vec<Slot>, StoreError>;
    async fn upsert_slot(&self, slot: NewSlot) -> Result<UpsertOutcome, StoreError>;

    /// Flips `booked` from false to true and records the appointment, as one
    /// atomic step. Returns `None` without writing anything when the slot is
    /// missing or already booked.
    async fn reserve_slot(
        &self,
        slot_id: Uuid,
        appointment: NewAppointment,
    ) -> Result<Option<Appointment>, StoreError>;

    async fn list_appointments(&self, filter: AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;
}

/// Runs a future that talks to the store with an upper bound on its duration.
/// Expiry surfaces as `StoreError::Timeout` converted into the caller's error.
pub async fn bounded<T, E, F>(limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<StoreError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout(limit).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_reports_timeout() {
        let res: Result<(), StoreError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let res = bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }
}
