use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Appointment, NewAppointment, parse_date, parse_hhmm};
use crate::store::{Store, StoreError, bounded};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("slot is already booked or does not exist")]
    SlotUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raw booking body. Every field is optional here so that a missing field
/// is reported as a validation error rather than a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct BookingRequest {
    #[serde(alias = "doctorID", alias = "doctorId")]
    pub doctor_id: Option<String>,
    #[serde(alias = "patientID", alias = "patientId")]
    pub patient_id: Option<String>,
    pub date: Option<String>,
    #[serde(alias = "startTime")]
    pub start_time: Option<String>,
    #[serde(alias = "endTime")]
    pub end_time: Option<String>,
    pub note: Option<String>,
}

impl BookingRequest {
    pub fn validate(self) -> Result<NewAppointment, BookingError> {
        let doctor_id = required_uuid("doctor_id", self.doctor_id.as_deref())?;
        let patient_id = required_uuid("patient_id", self.patient_id.as_deref())?;

        let date = required("date", self.date.as_deref())?;
        let date = parse_date(date)
            .ok_or_else(|| BookingError::InvalidRequest("date must be YYYY-MM-DD".into()))?;

        let start = required("start_time", self.start_time.as_deref())?;
        let start = parse_hhmm(start)
            .ok_or_else(|| BookingError::InvalidRequest("start_time must be HH:MM".into()))?;
        let end = required("end_time", self.end_time.as_deref())?;
        let end = parse_hhmm(end)
            .ok_or_else(|| BookingError::InvalidRequest("end_time must be HH:MM".into()))?;

        if end <= start {
            return Err(BookingError::InvalidRequest(
                "end_time must be after start_time".into(),
            ));
        }

        Ok(NewAppointment {
            doctor_id,
            patient_id,
            date,
            start,
            end,
            note: self.note.filter(|n| !n.trim().is_empty()),
        })
    }
}

fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, BookingError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BookingError::InvalidRequest(format!("{field} is required"))),
    }
}

fn required_uuid(field: &str, value: Option<&str>) -> Result<Uuid, BookingError> {
    let raw = required(field, value)?;
    Uuid::parse_str(raw)
        .map_err(|_| BookingError::InvalidRequest(format!("{field} must be a UUID")))
}

/// Reserves the first open slot matching the request and records the
/// appointment.
///
/// The flag flip and the appointment insert are a single conditional store
/// operation, so two callers racing for one slot cannot both succeed and no
/// appointment is ever left pointing at an unbooked slot. A caller that
/// loses the race searches once more before giving up.
pub async fn book(
    store: &dyn Store,
    request: NewAppointment,
    limit: Duration,
) -> Result<Appointment, BookingError> {
    bounded(limit, async {
        for attempt in 0..2 {
            let open = store
                .find_open_slots(request.doctor_id, request.date, request.start, request.end)
                .await?;
            let Some(slot) = open.into_iter().next() else {
                return Err(BookingError::SlotUnavailable);
            };

            match store.reserve_slot(slot.slot_id, request.clone()).await? {
                Some(appointment) => {
                    tracing::info!(
                        appointment_id = %appointment.appointment_id,
                        slot_id = %slot.slot_id,
                        doctor_id = %request.doctor_id,
                        patient_id = %request.patient_id,
                        "appointment booked"
                    );
                    return Ok(appointment);
                }
                None => {
                    tracing::warn!(slot_id = %slot.slot_id, attempt, "lost race for slot");
                }
            }
        }
        Err(BookingError::SlotUnavailable)
    })
    .await
}
