use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Role, Slot};
use crate::store::{Store, StoreError};

/// Query for one doctor's day. Accepted both as a query string and as a JSON
/// body.
#[derive(Debug, Default, Deserialize)]
pub struct SlotsQuery {
    #[serde(alias = "doctorID", alias = "doctorId")]
    pub doctor_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AllSlotsQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DaySlots {
    pub available: Vec<Slot>,
    pub booked: Vec<Slot>,
}

impl DaySlots {
    fn split(slots: Vec<Slot>) -> Self {
        let (booked, available) = slots.into_iter().partition(|s| s.booked);
        DaySlots { available, booked }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorDaySlots {
    pub doctor_id: Uuid,
    pub name: String,
    pub specialty: String,
    pub available: Vec<Slot>,
    pub booked: Vec<Slot>,
    pub available_count: usize,
    pub booked_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AllSlots {
    pub date: NaiveDate,
    pub doctors: Vec<DoctorDaySlots>,
    pub total_available: usize,
    pub total_booked: usize,
}

pub async fn list_slots(
    store: &dyn Store,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<DaySlots, StoreError> {
    let slots = store.list_slots(doctor_id, date).await?;
    Ok(DaySlots::split(slots))
}

/// One partition read per doctor, in doctor order.
pub async fn list_all_slots(store: &dyn Store, date: NaiveDate) -> Result<AllSlots, StoreError> {
    let doctors = store.list_doctors().await?;

    let mut out = Vec::with_capacity(doctors.len());
    for doctor in doctors.into_iter().filter(|d| d.effective_role() == Role::Doctor) {
        let day = DaySlots::split(store.list_slots(doctor.doctor_id, date).await?);
        out.push(DoctorDaySlots {
            doctor_id: doctor.doctor_id,
            name: doctor.name,
            specialty: doctor.specialty,
            available_count: day.available.len(),
            booked_count: day.booked.len(),
            available: day.available,
            booked: day.booked,
        });
    }

    let total_available = out.iter().map(|d| d.available_count).sum();
    let total_booked = out.iter().map(|d| d.booked_count).sum();
    Ok(AllSlots {
        date,
        doctors: out,
        total_available,
        total_booked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAppointment, NewDoctor, NewSlot, SlotTemplate, parse_hhmm};
    use crate::store::memory::MemoryStore;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 26).unwrap()
    }

    fn slot(doctor_id: Uuid, start: &str, end: &str) -> NewSlot {
        NewSlot {
            doctor_id,
            date: day(),
            start: parse_hhmm(start).unwrap(),
            end: parse_hhmm(end).unwrap(),
        }
    }

    async fn doctor(store: &MemoryStore, email: &str, role: Role) -> Uuid {
        store
            .insert_doctor(NewDoctor {
                auth_id: None,
                email: email.into(),
                name: format!("Dr. {email}"),
                specialty: "General Medicine".into(),
                phone: String::new(),
                license_number: String::new(),
                role,
                permissions: vec![],
                working_days: vec!["monday".into()],
                default_slots: vec![SlotTemplate {
                    start: parse_hhmm("09:00").unwrap(),
                    end: parse_hhmm("09:30").unwrap(),
                }],
            })
            .await
            .unwrap()
            .doctor_id
    }

    async fn book_directly(store: &MemoryStore, s: NewSlot) {
        store
            .reserve_slot(
                s.slot_id(),
                NewAppointment {
                    doctor_id: s.doctor_id,
                    patient_id: Uuid::new_v4(),
                    date: s.date,
                    start: s.start,
                    end: s.end,
                    note: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn partition_is_split_by_booked_flag() {
        let store = MemoryStore::new();
        let d = Uuid::new_v4();
        for (s, e) in [("09:00", "09:30"), ("09:30", "10:00"), ("10:00", "10:30")] {
            store.upsert_slot(slot(d, s, e)).await.unwrap();
        }
        book_directly(&store, slot(d, "09:30", "10:00")).await;

        let day_slots = list_slots(&store, d, day()).await.unwrap();
        assert_eq!(day_slots.available.len(), 2);
        assert_eq!(day_slots.booked.len(), 1);
        assert_eq!(day_slots.booked[0].start, parse_hhmm("09:30").unwrap());
    }

    #[tokio::test]
    async fn empty_partition_gives_empty_lists() {
        let store = MemoryStore::new();
        let day_slots = list_slots(&store, Uuid::new_v4(), day()).await.unwrap();
        assert!(day_slots.available.is_empty());
        assert!(day_slots.booked.is_empty());
    }

    #[tokio::test]
    async fn all_slots_counts_every_doctor_and_skips_admins() {
        let store = MemoryStore::new();
        let a = doctor(&store, "a@c.org", Role::Doctor).await;
        let b = doctor(&store, "b@c.org", Role::Doctor).await;
        doctor(&store, "root@c.org", Role::Admin).await;

        store.upsert_slot(slot(a, "09:00", "09:30")).await.unwrap();
        store.upsert_slot(slot(a, "09:30", "10:00")).await.unwrap();
        store.upsert_slot(slot(b, "09:00", "09:30")).await.unwrap();
        book_directly(&store, slot(b, "09:00", "09:30")).await;

        let all = list_all_slots(&store, day()).await.unwrap();
        assert_eq!(all.doctors.len(), 2);
        assert_eq!(all.total_available, 2);
        assert_eq!(all.total_booked, 1);
        let b_row = all.doctors.iter().find(|d| d.doctor_id == b).unwrap();
        assert_eq!((b_row.available_count, b_row.booked_count), (0, 1));
    }
}
