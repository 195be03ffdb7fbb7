// src/store/memory.rs

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    Appointment, AppointmentFilter, AppointmentStatus, DoctorProfile, HistoryRecord,
    NewAppointment, NewDoctor, NewHistoryRecord, NewPatient, NewSlot, PatientChanges,
    PatientProfile, Slot, SlotTemplate, UpsertOutcome,
};

/// Process-local store. Collections are vectors so that "store order" is
/// insertion order.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

#[derive(Default)]
struct Collections {
    doctors: Vec<DoctorProfile>,
    patients: Vec<PatientProfile>,
    history: Vec<HistoryRecord>,
    slots: Vec<Slot>,
    appointments: Vec<Appointment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, StoreError> {
        Ok(self.inner.lock().await.doctors.clone())
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c.doctors.iter().find(|d| d.doctor_id == doctor_id).cloned())
    }

    async fn find_doctor_by_auth_id(&self, auth_id: &str) -> Result<Option<DoctorProfile>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c
            .doctors
            .iter()
            .find(|d| d.auth_id.as_deref() == Some(auth_id))
            .cloned())
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<DoctorProfile>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c.doctors.iter().find(|d| d.email == email).cloned())
    }

    async fn insert_doctor(&self, new: NewDoctor) -> Result<DoctorProfile, StoreError> {
        let mut c = self.inner.lock().await;
        if let Some(auth_id) = new.auth_id.as_deref() {
            if c.doctors.iter().any(|d| d.auth_id.as_deref() == Some(auth_id)) {
                return Err(StoreError::Duplicate(
                    "doctor profile for this identity already exists".into(),
                ));
            }
        }
        let now = Utc::now();
        let profile = DoctorProfile {
            doctor_id: Uuid::new_v4(),
            auth_id: new.auth_id,
            email: new.email,
            name: new.name,
            specialty: new.specialty,
            phone: new.phone,
            license_number: new.license_number,
            role: Some(new.role),
            permissions: new.permissions,
            working_days: new.working_days,
            default_slots: new.default_slots,
            created_at: now,
            updated_at: now,
        };
        c.doctors.push(profile.clone());
        Ok(profile)
    }

    async fn set_doctor_auth_id(&self, doctor_id: Uuid, auth_id: &str) -> Result<(), StoreError> {
        let mut c = self.inner.lock().await;
        if c
            .doctors
            .iter()
            .any(|d| d.doctor_id != doctor_id && d.auth_id.as_deref() == Some(auth_id))
        {
            return Err(StoreError::Duplicate(
                "doctor profile for this identity already exists".into(),
            ));
        }
        if let Some(d) = c.doctors.iter_mut().find(|d| d.doctor_id == doctor_id) {
            d.auth_id = Some(auth_id.to_string());
            d.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_doctor_schedule(
        &self,
        doctor_id: Uuid,
        working_days: Vec<String>,
        default_slots: Vec<SlotTemplate>,
    ) -> Result<Option<DoctorProfile>, StoreError> {
        let mut c = self.inner.lock().await;
        let Some(d) = c.doctors.iter_mut().find(|d| d.doctor_id == doctor_id) else {
            return Ok(None);
        };
        d.working_days = working_days;
        d.default_slots = default_slots;
        d.updated_at = Utc::now();
        Ok(Some(d.clone()))
    }

    async fn list_patients(&self) -> Result<Vec<PatientProfile>, StoreError> {
        let c = self.inner.lock().await;
        let mut out = c.patients.clone();
        out.reverse();
        Ok(out)
    }

    async fn get_patient(&self, patient_id: Uuid) -> Result<Option<PatientProfile>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c.patients.iter().find(|p| p.patient_id == patient_id).cloned())
    }

    async fn find_patient_by_auth_id(&self, auth_id: &str) -> Result<Option<PatientProfile>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c
            .patients
            .iter()
            .find(|p| p.auth_id.as_deref() == Some(auth_id))
            .cloned())
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<PatientProfile>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c.patients.iter().find(|p| p.email == email).cloned())
    }

    async fn find_patients_by_username(&self, username: &str) -> Result<Vec<PatientProfile>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c
            .patients
            .iter()
            .filter(|p| p.username.as_deref() == Some(username))
            .cloned()
            .collect())
    }

    async fn insert_patient(&self, new: NewPatient) -> Result<PatientProfile, StoreError> {
        let mut c = self.inner.lock().await;
        let clash = c.patients.iter().any(|p| {
            p.email == new.email
                || (new.auth_id.is_some() && p.auth_id.as_deref() == new.auth_id.as_deref())
        });
        if clash {
            return Err(StoreError::Duplicate(
                "patient with this email or identity already exists".into(),
            ));
        }
        let now = Utc::now();
        let profile = PatientProfile {
            patient_id: Uuid::new_v4(),
            auth_id: new.auth_id,
            email: new.email,
            name: new.name,
            username: new.username,
            phone: new.phone,
            date_of_birth: new.date_of_birth,
            address: new.address,
            medical_history: Vec::new(),
            created_by: new.created_by.clone(),
            created_by_role: new.created_by_role,
            updated_by: new.created_by,
            updated_by_role: new.created_by_role,
            created_at: now,
            updated_at: now,
        };
        c.patients.push(profile.clone());
        Ok(profile)
    }

    async fn update_patient(
        &self,
        patient_id: Uuid,
        changes: PatientChanges,
    ) -> Result<Option<PatientProfile>, StoreError> {
        let mut c = self.inner.lock().await;
        if let Some(email) = changes.email.as_deref() {
            if c
                .patients
                .iter()
                .any(|p| p.patient_id != patient_id && p.email == email)
            {
                return Err(StoreError::Duplicate("patient with this email already exists".into()));
            }
        }
        let Some(p) = c.patients.iter_mut().find(|p| p.patient_id == patient_id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            p.name = name;
        }
        if let Some(email) = changes.email {
            p.email = email;
        }
        if let Some(username) = changes.username {
            p.username = username;
        }
        if let Some(phone) = changes.phone {
            p.phone = phone;
        }
        if let Some(dob) = changes.date_of_birth {
            p.date_of_birth = dob;
        }
        if let Some(address) = changes.address {
            p.address = address;
        }
        p.updated_by = Some(changes.updated_by);
        p.updated_by_role = Some(changes.updated_by_role);
        p.updated_at = Utc::now();
        Ok(Some(p.clone()))
    }

    async fn delete_patient(&self, patient_id: Uuid) -> Result<bool, StoreError> {
        let mut c = self.inner.lock().await;
        let before = c.patients.len();
        c.patients.retain(|p| p.patient_id != patient_id);
        Ok(c.patients.len() != before)
    }

    async fn set_patient_auth_id(&self, patient_id: Uuid, auth_id: &str) -> Result<(), StoreError> {
        let mut c = self.inner.lock().await;
        if c
            .patients
            .iter()
            .any(|p| p.patient_id != patient_id && p.auth_id.as_deref() == Some(auth_id))
        {
            return Err(StoreError::Duplicate(
                "patient profile for this identity already exists".into(),
            ));
        }
        if let Some(p) = c.patients.iter_mut().find(|p| p.patient_id == patient_id) {
            p.auth_id = Some(auth_id.to_string());
            p.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_history(&self, new: NewHistoryRecord) -> Result<HistoryRecord, StoreError> {
        let mut c = self.inner.lock().await;
        let record = HistoryRecord {
            record_id: Uuid::new_v4(),
            patient_id: new.patient_id,
            diagnosis: new.diagnosis,
            treatment: new.treatment,
            cost_cents: new.cost_cents,
            payment_method: new.payment_method,
            doctor_name: new.doctor_name,
            notes: new.notes,
            attachments: new.attachments,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        if let Some(p) = c.patients.iter_mut().find(|p| p.patient_id == record.patient_id) {
            p.medical_history.push(record.record_id);
            p.updated_at = record.created_at;
        }
        c.history.push(record.clone());
        Ok(record)
    }

    async fn list_history(&self, patient_id: Uuid) -> Result<Vec<HistoryRecord>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c
            .history
            .iter()
            .filter(|h| h.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn slot_partitions(&self) -> Result<Vec<(Uuid, NaiveDate)>, StoreError> {
        let c = self.inner.lock().await;
        let mut keys: Vec<(Uuid, NaiveDate)> = c.slots.iter().map(|s| (s.doctor_id, s.date)).collect();
        keys.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        keys.dedup();
        Ok(keys)
    }

    async fn delete_slot_partition(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u64, StoreError> {
        let mut c = self.inner.lock().await;
        let before = c.slots.len();
        c.slots.retain(|s| !(s.doctor_id == doctor_id && s.date == date));
        Ok((before - c.slots.len()) as u64)
    }

    async fn list_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>, StoreError> {
        let c = self.inner.lock().await;
        let mut out: Vec<Slot> = c
            .slots
            .iter()
            .filter(|s| s.doctor_id == doctor_id && s.date == date)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        Ok(out)
    }

    async fn find_open_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Vec<Slot>, StoreError> {
        let c = self.inner.lock().await;
        Ok(c
            .slots
            .iter()
            .filter(|s| {
                s.doctor_id == doctor_id && s.date == date && s.start == start && s.end == end && !s.booked
            })
            .cloned()
            .collect())
    }

    async fn upsert_slot(&self, slot: NewSlot) -> Result<UpsertOutcome, StoreError> {
        let mut c = self.inner.lock().await;
        let slot_id = slot.slot_id();
        if c.slots.iter().any(|s| s.slot_id == slot_id) {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        c.slots.push(Slot {
            slot_id,
            doctor_id: slot.doctor_id,
            date: slot.date,
            start: slot.start,
            end: slot.end,
            booked: false,
        });
        Ok(UpsertOutcome::Inserted)
    }

    async fn reserve_slot(
        &self,
        slot_id: Uuid,
        appointment: NewAppointment,
    ) -> Result<Option<Appointment>, StoreError> {
        // Flag check, flip and appointment insert all happen under one lock.
        let mut c = self.inner.lock().await;
        let Some(slot) = c.slots.iter_mut().find(|s| s.slot_id == slot_id && !s.booked) else {
            return Ok(None);
        };
        slot.booked = true;

        let record = Appointment {
            appointment_id: Uuid::new_v4(),
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            date: appointment.date,
            start: appointment.start,
            end: appointment.end,
            note: appointment.note,
            slot_id,
            status: AppointmentStatus::Booked,
            created_at: Utc::now(),
        };
        c.appointments.push(record.clone());
        Ok(Some(record))
    }

    async fn list_appointments(&self, filter: AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let c = self.inner.lock().await;
        let mut out: Vec<Appointment> = c
            .appointments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.start.cmp(&b.start)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_hhmm;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn slot(doctor_id: Uuid, start: &str, end: &str) -> NewSlot {
        NewSlot {
            doctor_id,
            date: day(),
            start: parse_hhmm(start).unwrap(),
            end: parse_hhmm(end).unwrap(),
        }
    }

    fn appointment_for(s: &NewSlot) -> NewAppointment {
        NewAppointment {
            doctor_id: s.doctor_id,
            patient_id: Uuid::new_v4(),
            date: s.date,
            start: s.start,
            end: s.end,
            note: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_slot_tuple() {
        let store = MemoryStore::new();
        let doc = Uuid::new_v4();
        assert_eq!(store.upsert_slot(slot(doc, "09:00", "09:30")).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(
            store.upsert_slot(slot(doc, "09:00", "09:30")).await.unwrap(),
            UpsertOutcome::AlreadyPresent
        );
        assert_eq!(store.list_slots(doc, day()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reserve_only_succeeds_once() {
        let store = MemoryStore::new();
        let s = slot(Uuid::new_v4(), "10:00", "10:30");
        store.upsert_slot(s).await.unwrap();

        let first = store.reserve_slot(s.slot_id(), appointment_for(&s)).await.unwrap();
        let second = store.reserve_slot(s.slot_id(), appointment_for(&s)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        let all = store.list_appointments(AppointmentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].slot_id, s.slot_id());
    }

    #[tokio::test]
    async fn reserve_unknown_slot_writes_nothing() {
        let store = MemoryStore::new();
        let s = slot(Uuid::new_v4(), "10:00", "10:30");
        let res = store.reserve_slot(s.slot_id(), appointment_for(&s)).await.unwrap();
        assert!(res.is_none());
        assert!(store.list_appointments(AppointmentFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_linked_to_patient() {
        let store = MemoryStore::new();
        let p = store
            .insert_patient(NewPatient {
                auth_id: None,
                email: "p@example.com".into(),
                name: "P".into(),
                username: None,
                phone: None,
                date_of_birth: None,
                address: None,
                created_by: None,
                created_by_role: None,
            })
            .await
            .unwrap();
        let rec = store
            .insert_history(NewHistoryRecord {
                patient_id: p.patient_id,
                diagnosis: "flu".into(),
                treatment: "rest".into(),
                cost_cents: 5000,
                payment_method: "cash".into(),
                doctor_name: "Dr. A".into(),
                notes: String::new(),
                attachments: vec![],
                created_by: "uid-1".into(),
            })
            .await
            .unwrap();

        let p = store.get_patient(p.patient_id).await.unwrap().unwrap();
        assert_eq!(p.medical_history, vec![rec.record_id]);
        assert_eq!(store.list_history(p.patient_id).await.unwrap().len(), 1);
    }
}
