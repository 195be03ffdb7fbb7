// src/store/pg.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    Appointment, AppointmentFilter, AppointmentStatus, DoctorProfile, HistoryRecord,
    NewAppointment, NewDoctor, NewHistoryRecord, NewPatient, NewSlot, PatientChanges,
    PatientProfile, Role, Slot, SlotTemplate, UpsertOutcome,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/* -------------------------
   Row models
--------------------------*/

const DOCTOR_COLUMNS: &str = r#"
    doctor_id, auth_id, email, name, specialty, phone, license_number, role,
    permissions, working_days, default_slots, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct DoctorRow {
    doctor_id: Uuid,
    auth_id: Option<String>,
    email: String,
    name: String,
    specialty: String,
    phone: String,
    license_number: String,
    role: Option<String>,
    permissions: Vec<String>,
    working_days: Vec<String>,
    default_slots: Json<Vec<SlotTemplate>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DoctorRow> for DoctorProfile {
    type Error = StoreError;

    fn try_from(r: DoctorRow) -> Result<Self, Self::Error> {
        Ok(DoctorProfile {
            doctor_id: r.doctor_id,
            auth_id: r.auth_id,
            email: r.email,
            name: r.name,
            specialty: r.specialty,
            phone: r.phone,
            license_number: r.license_number,
            role: parse_role(r.role.as_deref())?,
            permissions: r.permissions,
            working_days: r.working_days,
            default_slots: r.default_slots.0,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const PATIENT_COLUMNS: &str = r#"
    patient_id, auth_id, email, name, username, phone, date_of_birth, address,
    medical_history, created_by, created_by_role, updated_by, updated_by_role,
    created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct PatientRow {
    patient_id: Uuid,
    auth_id: Option<String>,
    email: String,
    name: String,
    username: Option<String>,
    phone: Option<String>,
    date_of_birth: Option<NaiveDate>,
    address: Option<String>,
    medical_history: Vec<Uuid>,
    created_by: Option<String>,
    created_by_role: Option<String>,
    updated_by: Option<String>,
    updated_by_role: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PatientRow> for PatientProfile {
    type Error = StoreError;

    fn try_from(r: PatientRow) -> Result<Self, Self::Error> {
        Ok(PatientProfile {
            patient_id: r.patient_id,
            auth_id: r.auth_id,
            email: r.email,
            name: r.name,
            username: r.username,
            phone: r.phone,
            date_of_birth: r.date_of_birth,
            address: r.address,
            medical_history: r.medical_history,
            created_by: r.created_by,
            created_by_role: parse_role(r.created_by_role.as_deref())?,
            updated_by: r.updated_by,
            updated_by_role: parse_role(r.updated_by_role.as_deref())?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    record_id: Uuid,
    patient_id: Uuid,
    diagnosis: String,
    treatment: String,
    cost_cents: i64,
    payment_method: String,
    doctor_name: String,
    notes: String,
    attachments: Vec<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(r: HistoryRow) -> Self {
        HistoryRecord {
            record_id: r.record_id,
            patient_id: r.patient_id,
            diagnosis: r.diagnosis,
            treatment: r.treatment,
            cost_cents: r.cost_cents,
            payment_method: r.payment_method,
            doctor_name: r.doctor_name,
            notes: r.notes,
            attachments: r.attachments,
            created_by: r.created_by,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SlotRow {
    slot_id: Uuid,
    doctor_id: Uuid,
    slot_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    booked: bool,
}

impl From<SlotRow> for Slot {
    fn from(r: SlotRow) -> Self {
        Slot {
            slot_id: r.slot_id,
            doctor_id: r.doctor_id,
            date: r.slot_date,
            start: r.start_time,
            end: r.end_time,
            booked: r.booked,
        }
    }
}

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, doctor_id, patient_id, appointment_date, start_time, end_time,
    note, slot_id, status, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    appointment_id: Uuid,
    doctor_id: Uuid,
    patient_id: Uuid,
    appointment_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    note: Option<String>,
    slot_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(r: AppointmentRow) -> Result<Self, Self::Error> {
        let status = AppointmentStatus::parse(&r.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown appointment status: {}", r.status)))?;
        Ok(Appointment {
            appointment_id: r.appointment_id,
            doctor_id: r.doctor_id,
            patient_id: r.patient_id,
            date: r.appointment_date,
            start: r.start_time,
            end: r.end_time,
            note: r.note,
            slot_id: r.slot_id,
            status,
            created_at: r.created_at,
        })
    }
}

fn parse_role(raw: Option<&str>) -> Result<Option<Role>, StoreError> {
    match raw {
        None => Ok(None),
        Some(s) => Role::parse(s)
            .map(Some)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown role: {s}"))),
    }
}

/// Unique violations surface as `Duplicate`; everything else stays a database error.
fn insert_error(e: sqlx::Error, what: &str) -> StoreError {
    let is_unique = e
        .as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|c| c == "23505");
    if is_unique {
        StoreError::Duplicate(format!("{what} already exists"))
    } else {
        StoreError::Database(e)
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/* -------------------------
   Store impl
--------------------------*/

#[async_trait]
impl Store for PgStore {
    async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, StoreError> {
        let rows: Vec<DoctorRow> = sqlx::query_as(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctor_profile ORDER BY created_at ASC, doctor_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorProfile>, StoreError> {
        let row: Option<DoctorRow> = sqlx::query_as(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctor_profile WHERE doctor_id = $1"
        ))
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DoctorProfile::try_from).transpose()
    }

    async fn find_doctor_by_auth_id(&self, auth_id: &str) -> Result<Option<DoctorProfile>, StoreError> {
        let row: Option<DoctorRow> = sqlx::query_as(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctor_profile WHERE auth_id = $1 LIMIT 1"
        ))
        .bind(auth_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DoctorProfile::try_from).transpose()
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<DoctorProfile>, StoreError> {
        let row: Option<DoctorRow> = sqlx::query_as(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctor_profile WHERE email = $1 ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DoctorProfile::try_from).transpose()
    }

    async fn insert_doctor(&self, new: NewDoctor) -> Result<DoctorProfile, StoreError> {
        let row: DoctorRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO doctor_profile
                (doctor_id, auth_id, email, name, specialty, phone, license_number, role,
                 permissions, working_days, default_slots)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            RETURNING {DOCTOR_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.auth_id.as_deref())
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.specialty)
        .bind(&new.phone)
        .bind(&new.license_number)
        .bind(new.role.as_str())
        .bind(&new.permissions)
        .bind(&new.working_days)
        .bind(Json(new.default_slots.clone()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, "doctor profile for this identity"))?;
        row.try_into()
    }

    async fn set_doctor_auth_id(&self, doctor_id: Uuid, auth_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE doctor_profile
            SET auth_id = $2, updated_at = now()
            WHERE doctor_id = $1
            "#,
        )
        .bind(doctor_id)
        .bind(auth_id)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "doctor profile for this identity"))?;
        Ok(())
    }

    async fn update_doctor_schedule(
        &self,
        doctor_id: Uuid,
        working_days: Vec<String>,
        default_slots: Vec<SlotTemplate>,
    ) -> Result<Option<DoctorProfile>, StoreError> {
        let row: Option<DoctorRow> = sqlx::query_as(&format!(
            r#"
            UPDATE doctor_profile
            SET working_days = $2, default_slots = $3, updated_at = now()
            WHERE doctor_id = $1
            RETURNING {DOCTOR_COLUMNS}
            "#
        ))
        .bind(doctor_id)
        .bind(&working_days)
        .bind(Json(default_slots))
        .fetch_optional(&self.pool)
        .await?;
        row.map(DoctorProfile::try_from).transpose()
    }

    async fn list_patients(&self) -> Result<Vec<PatientProfile>, StoreError> {
        let rows: Vec<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patient_profile ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn get_patient(&self, patient_id: Uuid) -> Result<Option<PatientProfile>, StoreError> {
        let row: Option<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patient_profile WHERE patient_id = $1"
        ))
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PatientProfile::try_from).transpose()
    }

    async fn find_patient_by_auth_id(&self, auth_id: &str) -> Result<Option<PatientProfile>, StoreError> {
        let row: Option<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patient_profile WHERE auth_id = $1 LIMIT 1"
        ))
        .bind(auth_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PatientProfile::try_from).transpose()
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<PatientProfile>, StoreError> {
        let row: Option<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patient_profile WHERE email = $1 LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PatientProfile::try_from).transpose()
    }

    async fn find_patients_by_username(&self, username: &str) -> Result<Vec<PatientProfile>, StoreError> {
        let rows: Vec<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patient_profile WHERE username = $1 ORDER BY created_at ASC"
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn insert_patient(&self, new: NewPatient) -> Result<PatientProfile, StoreError> {
        let row: PatientRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO patient_profile
                (patient_id, auth_id, email, name, username, phone, date_of_birth, address,
                 created_by, created_by_role, updated_by, updated_by_role)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$9,$10)
            RETURNING {PATIENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.auth_id.as_deref())
        .bind(&new.email)
        .bind(&new.name)
        .bind(new.username.as_deref())
        .bind(new.phone.as_deref())
        .bind(new.date_of_birth)
        .bind(new.address.as_deref())
        .bind(new.created_by.as_deref())
        .bind(new.created_by_role.map(Role::as_str))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, "patient with this email or identity"))?;
        row.try_into()
    }

    async fn update_patient(
        &self,
        patient_id: Uuid,
        changes: PatientChanges,
    ) -> Result<Option<PatientProfile>, StoreError> {
        // Nullable columns take a "present" flag so an explicit null clears them.
        let row: Option<PatientRow> = sqlx::query_as(&format!(
            r#"
            UPDATE patient_profile
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                username = CASE WHEN $4 THEN $5 ELSE username END,
                phone = CASE WHEN $6 THEN $7 ELSE phone END,
                date_of_birth = CASE WHEN $8 THEN $9 ELSE date_of_birth END,
                address = CASE WHEN $10 THEN $11 ELSE address END,
                updated_by = $12,
                updated_by_role = $13,
                updated_at = now()
            WHERE patient_id = $1
            RETURNING {PATIENT_COLUMNS}
            "#
        ))
        .bind(patient_id)
        .bind(changes.name.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.username.is_some())
        .bind(changes.username.flatten())
        .bind(changes.phone.is_some())
        .bind(changes.phone.flatten())
        .bind(changes.date_of_birth.is_some())
        .bind(changes.date_of_birth.flatten())
        .bind(changes.address.is_some())
        .bind(changes.address.flatten())
        .bind(&changes.updated_by)
        .bind(changes.updated_by_role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| insert_error(e, "patient with this email"))?;
        row.map(PatientProfile::try_from).transpose()
    }

    async fn delete_patient(&self, patient_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM patient_profile WHERE patient_id = $1")
            .bind(patient_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_patient_auth_id(&self, patient_id: Uuid, auth_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE patient_profile
            SET auth_id = $2, updated_at = now()
            WHERE patient_id = $1
            "#,
        )
        .bind(patient_id)
        .bind(auth_id)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "patient profile for this identity"))?;
        Ok(())
    }

    async fn insert_history(&self, new: NewHistoryRecord) -> Result<HistoryRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: HistoryRow = sqlx::query_as(
            r#"
            INSERT INTO history_record
                (record_id, patient_id, diagnosis, treatment, cost_cents, payment_method,
                 doctor_name, notes, attachments, created_by)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            RETURNING record_id, patient_id, diagnosis, treatment, cost_cents, payment_method,
                      doctor_name, notes, attachments, created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.patient_id)
        .bind(&new.diagnosis)
        .bind(&new.treatment)
        .bind(new.cost_cents)
        .bind(&new.payment_method)
        .bind(&new.doctor_name)
        .bind(&new.notes)
        .bind(&new.attachments)
        .bind(&new.created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE patient_profile
            SET medical_history = array_append(medical_history, $2), updated_at = now()
            WHERE patient_id = $1
            "#,
        )
        .bind(new.patient_id)
        .bind(row.record_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn list_history(&self, patient_id: Uuid) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT record_id, patient_id, diagnosis, treatment, cost_cents, payment_method,
                   doctor_name, notes, attachments, created_by, created_at
            FROM history_record
            WHERE patient_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }

    async fn slot_partitions(&self) -> Result<Vec<(Uuid, NaiveDate)>, StoreError> {
        let rows: Vec<(Uuid, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT DISTINCT doctor_id, slot_date
            FROM slot
            ORDER BY slot_date ASC, doctor_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_slot_partition(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM slot WHERE doctor_id = $1 AND slot_date = $2")
            .bind(doctor_id)
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>, StoreError> {
        let rows: Vec<SlotRow> = sqlx::query_as(
            r#"
            SELECT slot_id, doctor_id, slot_date, start_time, end_time, booked
            FROM slot
            WHERE doctor_id = $1 AND slot_date = $2
            ORDER BY start_time ASC, end_time ASC
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Slot::from).collect())
    }

    async fn find_open_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Vec<Slot>, StoreError> {
        let rows: Vec<SlotRow> = sqlx::query_as(
            r#"
            SELECT slot_id, doctor_id, slot_date, start_time, end_time, booked
            FROM slot
            WHERE doctor_id = $1
              AND slot_date = $2
              AND start_time = $3
              AND end_time = $4
              AND booked = FALSE
            ORDER BY created_at ASC, slot_id ASC
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Slot::from).collect())
    }

    async fn upsert_slot(&self, slot: NewSlot) -> Result<UpsertOutcome, StoreError> {
        let res = sqlx::query(
            r#"
            INSERT INTO slot (slot_id, doctor_id, slot_date, start_time, end_time, booked)
            VALUES ($1,$2,$3,$4,$5, FALSE)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(slot.slot_id())
        .bind(slot.doctor_id)
        .bind(slot.date)
        .bind(slot.start)
        .bind(slot.end)
        .execute(&self.pool)
        .await?;

        Ok(if res.rows_affected() == 1 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::AlreadyPresent
        })
    }

    async fn reserve_slot(
        &self,
        slot_id: Uuid,
        appointment: NewAppointment,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Conditional flip: only one transaction can see booked = FALSE here.
        let flipped = sqlx::query(
            r#"
            UPDATE slot
            SET booked = TRUE, updated_at = now()
            WHERE slot_id = $1 AND booked = FALSE
            "#,
        )
        .bind(slot_id)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row: AppointmentRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO appointment
                (appointment_id, doctor_id, patient_id, appointment_date, start_time, end_time,
                 note, slot_id, status)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(appointment.doctor_id)
        .bind(appointment.patient_id)
        .bind(appointment.date)
        .bind(appointment.start)
        .bind(appointment.end)
        .bind(appointment.note.as_deref())
        .bind(slot_id)
        .bind(AppointmentStatus::Booked.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into().map(Some)
    }

    async fn list_appointments(&self, filter: AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE ($1::uuid IS NULL OR doctor_id = $1)
              AND ($2::uuid IS NULL OR patient_id = $2)
              AND ($3::date IS NULL OR appointment_date = $3)
            ORDER BY appointment_date ASC, start_time ASC
            "#
        ))
        .bind(filter.doctor_id)
        .bind(filter.patient_id)
        .bind(filter.date)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }
}
