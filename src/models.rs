use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::IdentityProvider;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn IdentityProvider>,
    pub store_timeout: Duration,
}

/* -------------------------
   API envelopes
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct MessageData {
    pub message: String,
}

/* -------------------------
   Roles
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Admin,
    Patient,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::Patient => "patient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Some(Role::Doctor),
            "admin" => Some(Role::Admin),
            "patient" => Some(Role::Patient),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/* -------------------------
   Profiles
--------------------------*/

/// Start/end pair of a recurring weekly slot, "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTemplate {
    #[serde(with = "hhmm", alias = "from")]
    pub start: NaiveTime,
    #[serde(with = "hhmm", alias = "to")]
    pub end: NaiveTime,
}

/// Doctors and admins share one collection; `role` tells them apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    pub doctor_id: Uuid,
    pub auth_id: Option<String>,
    pub email: String,
    pub name: String,
    pub specialty: String,
    pub phone: String,
    pub license_number: String,
    pub role: Option<Role>,
    pub permissions: Vec<String>,
    pub working_days: Vec<String>,
    pub default_slots: Vec<SlotTemplate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoctorProfile {
    pub fn effective_role(&self) -> Role {
        match self.role {
            Some(Role::Admin) => Role::Admin,
            _ => Role::Doctor,
        }
    }

    pub fn works_on(&self, day: Weekday) -> bool {
        let name = weekday_name(day);
        self.working_days.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub auth_id: Option<String>,
    pub email: String,
    pub name: String,
    pub specialty: String,
    pub phone: String,
    pub license_number: String,
    pub role: Role,
    pub permissions: Vec<String>,
    pub working_days: Vec<String>,
    pub default_slots: Vec<SlotTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientProfile {
    pub patient_id: Uuid,
    pub auth_id: Option<String>,
    pub email: String,
    pub name: String,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub medical_history: Vec<Uuid>,
    pub created_by: Option<String>,
    pub created_by_role: Option<Role>,
    pub updated_by: Option<String>,
    pub updated_by_role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub auth_id: Option<String>,
    pub email: String,
    pub name: String,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub created_by: Option<String>,
    pub created_by_role: Option<Role>,
}

/// Fields left as `None` are kept.
#[derive(Debug, Clone)]
pub struct PatientChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub address: Option<Option<String>>,
    pub updated_by: String,
    pub updated_by_role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub record_id: Uuid,
    pub patient_id: Uuid,
    pub diagnosis: String,
    pub treatment: String,
    pub cost_cents: i64,
    pub payment_method: String,
    pub doctor_name: String,
    pub notes: String,
    pub attachments: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    pub patient_id: Uuid,
    pub diagnosis: String,
    pub treatment: String,
    pub cost_cents: i64,
    pub payment_method: String,
    pub doctor_name: String,
    pub notes: String,
    pub attachments: Vec<String>,
    pub created_by: String,
}

/* -------------------------
   Slots & appointments
--------------------------*/

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub slot_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub booked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSlot {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl NewSlot {
    /// Deterministic id for the (doctor, date, start, end) key; re-inserting
    /// the same slot always lands on the same record.
    pub fn slot_id(&self) -> Uuid {
        let key = format!(
            "{}|{}|{}|{}",
            self.doctor_id,
            self.date.format("%Y-%m-%d"),
            self.start.format("%H:%M"),
            self.end.format("%H:%M"),
        );
        Uuid::new_v5(&SLOT_NAMESPACE, key.as_bytes())
    }
}

const SLOT_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_6462_6f6f_6b2d_736c_6f74_2d6b_6579);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booked" => Some(AppointmentStatus::Booked),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub note: Option<String>,
    pub slot_id: Uuid,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

impl AppointmentFilter {
    pub fn matches(&self, a: &Appointment) -> bool {
        self.doctor_id.is_none_or(|d| d == a.doctor_id)
            && self.patient_id.is_none_or(|p| p == a.patient_id)
            && self.date.is_none_or(|d| d == a.date)
    }
}

/* -------------------------
   Helpers
--------------------------*/

pub const WEEKDAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAY_NAMES[day.num_days_from_sunday() as usize]
}

/// Lowercases and validates a list of weekday names, dropping duplicates.
pub fn normalize_working_days(days: &[String]) -> Result<Vec<String>, String> {
    let mut out: Vec<String> = Vec::with_capacity(days.len());
    for d in days {
        let lower = d.trim().to_ascii_lowercase();
        if !WEEKDAY_NAMES.contains(&lower.as_str()) {
            return Err(format!("unknown weekday: {d}"));
        }
        if !out.contains(&lower) {
            out.push(lower);
        }
    }
    Ok(out)
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Serde adapter for "HH:MM" times.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).ok_or_else(|| D::Error::custom(format!("expected HH:MM, got {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_id_is_stable_for_the_same_key() {
        let s = NewSlot {
            doctor_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            start: parse_hhmm("09:00").unwrap(),
            end: parse_hhmm("09:30").unwrap(),
        };
        assert_eq!(s.slot_id(), s.slot_id());

        let other = NewSlot { end: parse_hhmm("10:00").unwrap(), ..s };
        assert_ne!(s.slot_id(), other.slot_id());
    }

    #[test]
    fn working_days_are_normalized() {
        let days = vec!["Monday".to_string(), "monday".into(), " FRIDAY ".into()];
        assert_eq!(normalize_working_days(&days).unwrap(), vec!["monday", "friday"]);
        assert!(normalize_working_days(&["funday".to_string()]).is_err());
    }

    #[test]
    fn slot_template_accepts_legacy_field_names() {
        let t: SlotTemplate = serde_json::from_str(r#"{"from":"09:00","to":"09:30"}"#).unwrap();
        assert_eq!(t.start, parse_hhmm("09:00").unwrap());
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json["start"], "09:00");
        assert_eq!(json["end"], "09:30");
    }
}
