use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enumerations (Mapped to Postgres enum types) ---

/// Role
///
/// The RBAC field of a user. Fixed at registration; there is no role-change endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
            Role::Admin => "ADMIN",
        }
    }

    /// Roles a visitor may pick for themselves on `/auth/register`.
    pub fn is_self_registrable(self) -> bool {
        matches!(self, Role::Patient | Role::Doctor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, so `"patient"` and `"PATIENT"` both resolve to `Role::Patient`.
impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PATIENT" => Ok(Role::Patient),
            "DOCTOR" => Ok(Role::Doctor),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// AppointmentStatus
///
/// Lifecycle of an appointment:
///
/// ```text
/// PENDING ──► CONFIRMED ──► COMPLETED
///    │            │
///    └────────────┴──────► CANCELLED
/// ```
///
/// COMPLETED and CANCELLED are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TS,
    ToSchema,
    sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "appointment_status", rename_all = "UPPERCASE")]
#[ts(export)]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }

    /// Whether a stored appointment in `self` may be moved to `next`.
    /// Re-applying the current status is accepted as a no-op.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Confirmed)
                    | (Pending, Cancelled)
                    | (Confirmed, Completed)
                    | (Confirmed, Cancelled)
            )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact match only: status values are part of the wire contract.
impl FromStr for AppointmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Returned when a string names no known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

// --- Core Schemas (Mapped to Database) ---

/// User
///
/// The identity record in the `users` table. Carries the password hash, so it is never
/// serialized; responses use `PublicUser` instead.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// NewUser
///
/// Insert payload for the `users` table, built after the password has been hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// PublicUser
///
/// The safe subset of `User` returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

/// Patient
///
/// Profile row owned 1:1 by a PATIENT user (`patients.user_id` is unique).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub age: i32,
    pub gender: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// Doctor
///
/// Profile row owned 1:1 by a DOCTOR user (`doctors.user_id` is unique).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

/// Appointment
///
/// Raw row of the `appointments` table. Used internally for ownership and transition
/// checks; clients receive `AppointmentDetails`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Joined Output Schemas ---

/// UserSummary
///
/// Display data of the user behind a profile: the only identity fields joined into
/// patient and appointment responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct UserSummary {
    pub name: String,
    pub email: String,
}

/// DoctorUserSummary
///
/// Identity fields joined into the doctor directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct DoctorUserSummary {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// PatientWithUser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct PatientWithUser {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub patient: Patient,
    #[sqlx(flatten)]
    pub user: UserSummary,
}

/// DoctorWithUser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct DoctorWithUser {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub doctor: Doctor,
    #[sqlx(flatten)]
    pub user: DoctorUserSummary,
}

/// PatientProfile / DoctorProfile
///
/// The nested profile blocks of `AppointmentDetails`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PatientProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub age: i32,
    pub gender: String,
    pub phone: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: String,
    pub department: String,
    pub user: UserSummary,
}

/// AppointmentDetails
///
/// An appointment with the denormalized display data of both participants. Every
/// appointment response (list, create, update) uses this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AppointmentDetails {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub patient: PatientProfile,
    pub doctor: DoctorProfile,
}

/// AppointmentRow
///
/// Flat result of the appointments ⨝ patients ⨝ doctors ⨝ users query. Both participants
/// join the `users` table, so their columns are aliased with a `patient_`/`doctor_` prefix.
#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub patient_user_id: Uuid,
    pub patient_age: i32,
    pub patient_gender: String,
    pub patient_phone: String,
    pub patient_name: String,
    pub patient_email: String,
    pub doctor_user_id: Uuid,
    pub doctor_specialization: String,
    pub doctor_department: String,
    pub doctor_name: String,
    pub doctor_email: String,
}

impl From<AppointmentRow> for AppointmentDetails {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            date: row.date,
            status: row.status,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            patient: PatientProfile {
                id: row.patient_id,
                user_id: row.patient_user_id,
                age: row.patient_age,
                gender: row.patient_gender,
                phone: row.patient_phone,
                user: UserSummary {
                    name: row.patient_name,
                    email: row.patient_email,
                },
            },
            doctor: DoctorProfile {
                id: row.doctor_id,
                user_id: row.doctor_user_id,
                specialization: row.doctor_specialization,
                department: row.doctor_department,
                user: UserSummary {
                    name: row.doctor_name,
                    email: row.doctor_email,
                },
            },
        }
    }
}

// --- Request Payloads (Input Schemas) ---
//
// Every field is optional at the serde level so a missing field is reported as a
// 400 with a readable message by the handler instead of a generic body rejection.

/// RegisterRequest
///
/// Input payload for `POST /auth/register`. `role` is matched case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

/// LoginRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// AuthResponse
///
/// Returned by register and login: the safe user projection plus a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub token: String,
}

/// CreatePatientRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatePatientRequest {
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
}

/// NewPatient
///
/// Validated form of `CreatePatientRequest`.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub age: i32,
    pub gender: String,
    pub phone: String,
}

/// CreateDoctorRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateDoctorRequest {
    pub specialization: Option<String>,
    pub department: Option<String>,
}

/// NewDoctor
#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub specialization: String,
    pub department: String,
}

/// CreateAppointmentRequest
///
/// Input payload for `POST /appointments`. `date` is an ISO-8601 string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateAppointmentRequest {
    pub date: Option<String>,
    pub doctor_id: Option<Uuid>,
}

/// UpdateAppointmentRequest
///
/// Input payload for `PUT /appointments`. `status` must be one of the four upper-case
/// status names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateAppointmentRequest {
    pub id: Option<Uuid>,
    pub status: Option<String>,
}
