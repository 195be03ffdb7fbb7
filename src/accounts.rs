//! Account provisioning: identity plus profile creation for signup and admin
//! flows, and the one-off `auth_id` repair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::email_local_part;
use crate::error::ApiError;
use crate::identity::{IdentityError, IdentityProvider, SignedIn};
use crate::models::{
    AppState, NewDoctor, NewPatient, Role, SlotTemplate, normalize_working_days, parse_date,
};
use crate::roles::{AdminProfile, Assignment};
use crate::store::{Store, StoreError, bounded};

pub const DEFAULT_SPECIALTY: &str = "General Medicine";
pub const DEFAULT_ADMIN_PERMISSIONS: [&str; 3] = ["read", "write", "delete"];

/// Optional profile fields accepted by signup and role assignment.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileDetails {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    #[serde(alias = "licenseNumber")]
    pub license_number: Option<String>,
    pub permissions: Option<Vec<String>>,
    #[serde(alias = "workingDays")]
    pub working_days: Option<Vec<String>>,
    #[serde(alias = "defaultSlots")]
    pub default_slots: Option<Vec<SlotTemplate>>,
    pub username: Option<String>,
    #[serde(alias = "dateOfBirth")]
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ProfileDetails {
    /// Doctor or admin profile with the usual defaults filled in.
    pub fn into_doctor(
        self,
        auth_id: Option<String>,
        email: &str,
        role: Role,
    ) -> Result<NewDoctor, ApiError> {
        let local = email_local_part(email);
        let name = non_empty(self.name).unwrap_or_else(|| match role {
            Role::Admin => format!("Admin {local}"),
            _ => format!("Dr. {local}"),
        });
        let working_days = normalize_working_days(&self.working_days.unwrap_or_default())
            .map_err(ApiError::validation)?;
        let default_slots = self.default_slots.unwrap_or_default();
        if default_slots.iter().any(|t| t.end <= t.start) {
            return Err(ApiError::validation("slot end must be after start"));
        }

        let permissions = match (role, self.permissions) {
            (_, Some(p)) => p,
            (Role::Admin, None) => DEFAULT_ADMIN_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
            _ => Vec::new(),
        };

        Ok(NewDoctor {
            auth_id,
            email: email.to_string(),
            name,
            specialty: non_empty(self.specialty).unwrap_or_else(|| DEFAULT_SPECIALTY.to_string()),
            phone: non_empty(self.phone).unwrap_or_default(),
            license_number: non_empty(self.license_number).unwrap_or_default(),
            role,
            permissions,
            working_days,
            default_slots,
        })
    }

    pub fn into_patient(self, auth_id: Option<String>, email: &str) -> Result<NewPatient, ApiError> {
        let date_of_birth = match non_empty(self.date_of_birth) {
            Some(raw) => Some(
                parse_date(&raw)
                    .ok_or_else(|| ApiError::validation("date_of_birth must be YYYY-MM-DD"))?,
            ),
            None => None,
        };
        Ok(NewPatient {
            auth_id,
            email: email.to_string(),
            name: non_empty(self.name).unwrap_or_else(|| email_local_part(email).to_string()),
            username: non_empty(self.username),
            phone: non_empty(self.phone),
            date_of_birth,
            address: non_empty(self.address),
            created_by: None,
            created_by_role: None,
        })
    }
}

/// Token plus resolved profile, returned by login and signup.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
    pub email: String,
    #[serde(flatten)]
    pub assignment: Assignment,
}

impl SessionResponse {
    pub fn new(signed: SignedIn, assignment: Assignment) -> Self {
        SessionResponse {
            token: signed.id_token,
            expires_at: signed.expires_at,
            user_id: signed.uid,
            email: signed.email,
            assignment,
        }
    }
}

enum PendingProfile {
    Doctor(NewDoctor),
    Patient(NewPatient),
}

/// Stores the profile for an identity that already exists.
pub async fn create_profile(
    state: &AppState,
    uid: &str,
    email: &str,
    role: Role,
    details: ProfileDetails,
) -> Result<Assignment, ApiError> {
    let pending = match role {
        Role::Doctor | Role::Admin => {
            PendingProfile::Doctor(details.into_doctor(Some(uid.to_string()), email, role)?)
        }
        Role::Patient => PendingProfile::Patient(details.into_patient(Some(uid.to_string()), email)?),
    };
    insert_pending(state, pending).await
}

async fn insert_pending(state: &AppState, pending: PendingProfile) -> Result<Assignment, ApiError> {
    let assignment = match pending {
        PendingProfile::Doctor(new) => {
            let profile = bounded(state.store_timeout, state.store.insert_doctor(new)).await?;
            match profile.effective_role() {
                Role::Admin => Assignment::Admin(AdminProfile::Stored(profile)),
                _ => Assignment::Doctor(profile),
            }
        }
        PendingProfile::Patient(new) => {
            Assignment::Patient(bounded(state.store_timeout, state.store.insert_patient(new)).await?)
        }
    };
    Ok(assignment)
}

/// Creates an identity and its profile. The identity is removed again when
/// the profile cannot be stored.
pub async fn sign_up(
    state: &AppState,
    email: &str,
    password: &str,
    role: Role,
    details: ProfileDetails,
) -> Result<SessionResponse, ApiError> {
    let email = crate::auth::normalize_email(email);
    let display_name = details.name.clone();

    // Shape checks run before anything is written.
    let pending = match role {
        Role::Doctor | Role::Admin => PendingProfile::Doctor(details.into_doctor(None, &email, role)?),
        Role::Patient => PendingProfile::Patient(details.into_patient(None, &email)?),
    };

    let signed = bounded(
        state.store_timeout,
        state.identity.create_user(&email, password, display_name.as_deref()),
    )
    .await?;

    let pending = match pending {
        PendingProfile::Doctor(mut d) => {
            d.auth_id = Some(signed.uid.clone());
            d.email = signed.email.clone();
            PendingProfile::Doctor(d)
        }
        PendingProfile::Patient(mut p) => {
            p.auth_id = Some(signed.uid.clone());
            p.email = signed.email.clone();
            PendingProfile::Patient(p)
        }
    };

    match insert_pending(state, pending).await {
        Ok(assignment) => {
            tracing::info!(uid = %signed.uid, role = %role, "account created");
            Ok(SessionResponse::new(signed, assignment))
        }
        Err(e) => {
            match bounded(state.store_timeout, state.identity.delete_user(&signed.uid)).await {
                Ok(()) => tracing::info!(uid = %signed.uid, "removed identity after failed profile creation"),
                Err(cleanup) => {
                    tracing::error!(uid = %signed.uid, error = %cleanup, "identity cleanup failed")
                }
            }
            Err(e)
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub doctors_linked: usize,
    pub patients_linked: usize,
    pub unmatched: usize,
}

/// Sets `auth_id` on every profile that lacks one and whose email belongs to
/// an identity.
pub async fn link_missing_auth_ids(
    store: &dyn Store,
    identity: &dyn IdentityProvider,
) -> Result<LinkReport, LinkError> {
    let mut report = LinkReport::default();

    for doctor in store.list_doctors().await? {
        if doctor.auth_id.is_some() {
            continue;
        }
        match identity.get_user_by_email(&doctor.email).await? {
            Some(user) => {
                store.set_doctor_auth_id(doctor.doctor_id, &user.uid).await?;
                tracing::info!(doctor_id = %doctor.doctor_id, uid = %user.uid, "linked doctor profile");
                report.doctors_linked += 1;
            }
            None => {
                tracing::warn!(email = %doctor.email, "no identity for doctor profile");
                report.unmatched += 1;
            }
        }
    }

    for patient in store.list_patients().await? {
        if patient.auth_id.is_some() {
            continue;
        }
        match identity.get_user_by_email(&patient.email).await? {
            Some(user) => {
                store.set_patient_auth_id(patient.patient_id, &user.uid).await?;
                tracing::info!(patient_id = %patient.patient_id, uid = %user.uid, "linked patient profile");
                report.patients_linked += 1;
            }
            None => {
                tracing::warn!(email = %patient.email, "no identity for patient profile");
                report.unmatched += 1;
            }
        }
    }

    Ok(report)
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::identity::memory::MemoryIdentity;
    use crate::store::memory::MemoryStore;

    fn state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            identity: Arc::new(MemoryIdentity::new(1)),
            store_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn doctor_and_admin_defaults() {
        let d = ProfileDetails::default()
            .into_doctor(None, "house@clinic.org", Role::Doctor)
            .unwrap();
        assert_eq!(d.name, "Dr. house");
        assert_eq!(d.specialty, DEFAULT_SPECIALTY);
        assert!(d.permissions.is_empty());

        let a = ProfileDetails::default()
            .into_doctor(None, "root@clinic.org", Role::Admin)
            .unwrap();
        assert_eq!(a.name, "Admin root");
        assert_eq!(a.permissions, vec!["read", "write", "delete"]);
    }

    #[test]
    fn patient_defaults_and_bad_birth_date() {
        let p = ProfileDetails::default().into_patient(None, "pat@clinic.org").unwrap();
        assert_eq!(p.name, "pat");

        let bad = ProfileDetails {
            date_of_birth: Some("31/12/1990".into()),
            ..Default::default()
        };
        assert!(bad.into_patient(None, "pat@clinic.org").is_err());
    }

    #[tokio::test]
    async fn sign_up_links_profile_to_identity() {
        let state = state();
        let res = sign_up(&state, "Pat@Clinic.org", "secret-1", Role::Patient, ProfileDetails::default())
            .await
            .unwrap();
        assert_eq!(res.email, "pat@clinic.org");
        assert_eq!(res.assignment.role(), Some(Role::Patient));

        let p = state.store.find_patient_by_auth_id(&res.user_id).await.unwrap();
        assert!(p.is_some());
    }

    #[tokio::test]
    async fn failed_profile_insert_removes_identity() {
        let state = state();
        // a staff-created patient record already owns this email
        state
            .store
            .insert_patient(ProfileDetails::default().into_patient(None, "pat@clinic.org").unwrap())
            .await
            .unwrap();

        let err = sign_up(&state, "pat@clinic.org", "secret-1", Role::Patient, ProfileDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(..)));
        assert!(state.identity.get_user_by_email("pat@clinic.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_details_create_nothing() {
        let state = state();
        let details = ProfileDetails {
            working_days: Some(vec!["caturday".into()]),
            ..Default::default()
        };
        let err = sign_up(&state, "doc@clinic.org", "secret-1", Role::Doctor, details)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest("VALIDATION_ERROR", _)));
        assert!(state.identity.get_user_by_email("doc@clinic.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repair_links_profiles_by_email() {
        let state = state();
        let user = state.identity.create_user("doc@clinic.org", "secret-1", None).await.unwrap();
        state
            .store
            .insert_doctor(ProfileDetails::default().into_doctor(None, "doc@clinic.org", Role::Doctor).unwrap())
            .await
            .unwrap();
        state
            .store
            .insert_patient(ProfileDetails::default().into_patient(None, "nobody@clinic.org").unwrap())
            .await
            .unwrap();

        let report = link_missing_auth_ids(state.store.as_ref(), state.identity.as_ref())
            .await
            .unwrap();
        assert_eq!(report.doctors_linked, 1);
        assert_eq!(report.unmatched, 1);

        let d = state.store.find_doctor_by_auth_id(&user.uid).await.unwrap();
        assert!(d.is_some());
    }
}
