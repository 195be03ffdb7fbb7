//! Role resolution: maps a verified identity onto a doctor, admin or patient
//! profile.
//!
//! Lookup order, first match wins:
//! 1. doctor/admin profile linked by `auth_id`
//! 2. patient profile linked by `auth_id`
//! 3. legacy `admin` role claim on the identity itself
//!
//! Login additionally falls back to an email match and backfills `auth_id`
//! on the profile it finds that way. Request authentication never writes.

use serde::Serialize;

use crate::identity::{IdentityError, IdentityProvider, VerifiedIdentity};
use crate::models::{DoctorProfile, PatientProfile, Role};
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("identity has no linked profile")]
    ProfileNotFound,
    #[error(transparent)]
    Identity(IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IdentityError> for RoleError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidToken => RoleError::Unauthenticated,
            other => RoleError::Identity(other),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AdminProfile {
    Stored(DoctorProfile),
    /// Admin known only through the identity's role claim.
    Claim { auth_id: String, email: String, role: Role },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "role", content = "profile", rename_all = "lowercase")]
pub enum Assignment {
    Doctor(DoctorProfile),
    Admin(AdminProfile),
    Patient(PatientProfile),
    Unassigned,
}

impl Assignment {
    pub fn role(&self) -> Option<Role> {
        match self {
            Assignment::Doctor(_) => Some(Role::Doctor),
            Assignment::Admin(_) => Some(Role::Admin),
            Assignment::Patient(_) => Some(Role::Patient),
            Assignment::Unassigned => None,
        }
    }

    /// Human-facing name used in logs and audit fields.
    pub fn display_name(&self) -> String {
        match self {
            Assignment::Doctor(d) | Assignment::Admin(AdminProfile::Stored(d)) => d.name.clone(),
            Assignment::Admin(AdminProfile::Claim { email, .. }) => email.clone(),
            Assignment::Patient(p) => p.name.clone(),
            Assignment::Unassigned => String::new(),
        }
    }
}

/// Pure classification of what the lookups produced.
pub fn classify(
    identity: &VerifiedIdentity,
    doctor: Option<DoctorProfile>,
    patient: Option<PatientProfile>,
    claim: Option<Role>,
) -> Assignment {
    if let Some(d) = doctor {
        return match d.effective_role() {
            Role::Admin => Assignment::Admin(AdminProfile::Stored(d)),
            _ => Assignment::Doctor(d),
        };
    }
    if let Some(p) = patient {
        return Assignment::Patient(p);
    }
    if claim == Some(Role::Admin) {
        return Assignment::Admin(AdminProfile::Claim {
            auth_id: identity.uid.clone(),
            email: identity.email.clone(),
            role: Role::Admin,
        });
    }
    Assignment::Unassigned
}

/// Request-path resolution: `auth_id` lookups, then the claim.
pub async fn resolve(
    store: &dyn Store,
    identity_provider: &dyn IdentityProvider,
    identity: &VerifiedIdentity,
) -> Result<Assignment, RoleError> {
    let doctor = store.find_doctor_by_auth_id(&identity.uid).await?;
    if doctor.is_some() {
        return Ok(classify(identity, doctor, None, None));
    }

    let patient = store.find_patient_by_auth_id(&identity.uid).await?;
    if patient.is_some() {
        return Ok(classify(identity, None, patient, None));
    }

    let claim = legacy_claim(identity_provider, &identity.uid).await;
    Ok(classify(identity, None, None, claim))
}

/// Login-path resolution: like [`resolve`] but each collection is also
/// searched by email, and a profile found that way gets its `auth_id` set.
/// A profile already linked to a different identity is not a match.
pub async fn resolve_for_login(
    store: &dyn Store,
    identity_provider: &dyn IdentityProvider,
    identity: &VerifiedIdentity,
) -> Result<Assignment, RoleError> {
    let doctor = match store.find_doctor_by_auth_id(&identity.uid).await? {
        Some(d) => Some(d),
        None => match store.find_doctor_by_email(&identity.email).await? {
            Some(mut d) if d.auth_id.is_none() => {
                tracing::info!(doctor_id = %d.doctor_id, email = %identity.email, "linking doctor profile to identity");
                store.set_doctor_auth_id(d.doctor_id, &identity.uid).await?;
                d.auth_id = Some(identity.uid.clone());
                Some(d)
            }
            Some(d) => {
                tracing::warn!(doctor_id = %d.doctor_id, email = %identity.email, "doctor profile with this email belongs to another identity");
                None
            }
            None => None,
        },
    };
    if doctor.is_some() {
        return Ok(classify(identity, doctor, None, None));
    }

    let patient = match store.find_patient_by_auth_id(&identity.uid).await? {
        Some(p) => Some(p),
        None => match store.find_patient_by_email(&identity.email).await? {
            Some(mut p) if p.auth_id.is_none() => {
                tracing::info!(patient_id = %p.patient_id, email = %identity.email, "linking patient profile to identity");
                store.set_patient_auth_id(p.patient_id, &identity.uid).await?;
                p.auth_id = Some(identity.uid.clone());
                Some(p)
            }
            Some(p) => {
                tracing::warn!(patient_id = %p.patient_id, email = %identity.email, "patient profile with this email belongs to another identity");
                None
            }
            None => None,
        },
    };
    if patient.is_some() {
        return Ok(classify(identity, None, patient, None));
    }

    let claim = legacy_claim(identity_provider, &identity.uid).await;
    Ok(classify(identity, None, None, claim))
}

/// A failing claim lookup counts as "no claim".
async fn legacy_claim(identity_provider: &dyn IdentityProvider, uid: &str) -> Option<Role> {
    match identity_provider.get_user(uid).await {
        Ok(user) => user.and_then(|u| u.role_claim),
        Err(e) => {
            tracing::warn!(uid, error = %e, "role claim lookup failed");
            None
        }
    }
}
