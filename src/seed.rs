//! Demo data for local development.
//!
//! Two admins, six doctors, eight patients and ten appointments spread around the current
//! day (today, tomorrow, next week and yesterday). Every demo account uses
//! `DEMO_PASSWORD`. Enabled with `SEED_DEMO_DATA=true`.

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;

use crate::{
    error::RepositoryError,
    models::{AppointmentStatus, NewDoctor, NewPatient, NewUser, Role, User},
    repository::Repository,
};

pub const DEMO_PASSWORD: &str = "password123";

const ADMINS: [(&str, &str); 2] = [
    ("Admin User", "admin@hospital.com"),
    ("Sarah Johnson", "sarah.admin@hospital.com"),
];

// (name, email, specialization). Department matches the specialization.
const DOCTORS: [(&str, &str, &str); 6] = [
    ("Dr. John Smith", "john.smith@hospital.com", "Cardiology"),
    ("Dr. Emily Chen", "emily.chen@hospital.com", "Pediatrics"),
    ("Dr. Michael Rodriguez", "michael.rodriguez@hospital.com", "Orthopedics"),
    ("Dr. Sarah Williams", "sarah.williams@hospital.com", "Neurology"),
    ("Dr. David Lee", "david.lee@hospital.com", "General Medicine"),
    ("Dr. Maria Garcia", "maria.garcia@hospital.com", "Dermatology"),
];

// (name, email, age, gender, phone)
const PATIENTS: [(&str, &str, i32, &str, &str); 8] = [
    ("Alice Johnson", "alice.johnson@email.com", 28, "Female", "+1-555-0101"),
    ("Bob Smith", "bob.smith@email.com", 35, "Male", "+1-555-0102"),
    ("Charlie Brown", "charlie.brown@email.com", 42, "Male", "+1-555-0103"),
    ("Diana Wilson", "diana.wilson@email.com", 31, "Female", "+1-555-0104"),
    ("Ethan Davis", "ethan.davis@email.com", 25, "Male", "+1-555-0105"),
    ("Fiona Martinez", "fiona.martinez@email.com", 38, "Female", "+1-555-0106"),
    ("George Taylor", "george.taylor@email.com", 55, "Male", "+1-555-0107"),
    ("Hannah Anderson", "hannah.anderson@email.com", 29, "Female", "+1-555-0108"),
];

struct DemoAppointment {
    patient: usize,
    doctor: usize,
    day_offset: i64,
    hour: u32,
    minute: u32,
    status: AppointmentStatus,
}

const fn visit(
    patient: usize,
    doctor: usize,
    day_offset: i64,
    hour: u32,
    minute: u32,
    status: AppointmentStatus,
) -> DemoAppointment {
    DemoAppointment {
        patient,
        doctor,
        day_offset,
        hour,
        minute,
        status,
    }
}

const APPOINTMENTS: [DemoAppointment; 10] = {
    use AppointmentStatus::*;
    [
        visit(0, 0, 0, 9, 0, Pending),
        visit(1, 0, 0, 10, 30, Confirmed),
        visit(2, 1, 0, 11, 0, Pending),
        visit(3, 2, 0, 14, 0, Confirmed),
        visit(4, 0, 1, 9, 0, Pending),
        visit(5, 1, 1, 10, 0, Confirmed),
        visit(6, 3, 7, 13, 0, Pending),
        visit(7, 4, 7, 15, 30, Confirmed),
        visit(0, 0, -1, 10, 0, Completed),
        visit(1, 2, -1, 14, 0, Completed),
    ]
};

/// SeedError
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("demo appointment time is not representable in the local time zone")]
    UnrepresentableDate,
}

/// SeedSummary
///
/// Number of records the seed created (admins that already existed are counted too).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub admins: usize,
    pub doctors: usize,
    pub patients: usize,
    pub appointments: usize,
}

/// seed_demo_data
///
/// Loads the demo data set unless the first demo doctor is already registered, in which
/// case it returns `Ok(None)` and writes nothing. Appointment times are wall-clock times in
/// the zone of `now`. `password_hash` is stored for every demo account.
pub async fn seed_demo_data<Tz: TimeZone>(
    repo: &dyn Repository,
    password_hash: &str,
    now: &DateTime<Tz>,
) -> Result<Option<SeedSummary>, SeedError> {
    if repo.get_user_by_email(DOCTORS[0].1).await?.is_some() {
        tracing::info!("demo data already present, skipping seed");
        return Ok(None);
    }

    let slots = APPOINTMENTS
        .iter()
        .map(|a| slot(now, a.day_offset, a.hour, a.minute))
        .collect::<Option<Vec<_>>>()
        .ok_or(SeedError::UnrepresentableDate)?;

    for (name, email) in ADMINS {
        ensure_user(repo, name, email, Role::Admin, password_hash).await?;
    }

    let mut doctors = Vec::with_capacity(DOCTORS.len());
    for (name, email, specialization) in DOCTORS {
        let user = ensure_user(repo, name, email, Role::Doctor, password_hash).await?;
        let doctor = repo
            .create_doctor(
                user.id,
                NewDoctor {
                    specialization: specialization.to_string(),
                    department: specialization.to_string(),
                },
            )
            .await?;
        doctors.push(doctor);
    }

    let mut patients = Vec::with_capacity(PATIENTS.len());
    for (name, email, age, gender, phone) in PATIENTS {
        let user = ensure_user(repo, name, email, Role::Patient, password_hash).await?;
        let patient = repo
            .create_patient(
                user.id,
                NewPatient {
                    age,
                    gender: gender.to_string(),
                    phone: phone.to_string(),
                },
            )
            .await?;
        patients.push(patient);
    }

    for (appointment, date) in APPOINTMENTS.iter().zip(slots) {
        let created = repo
            .create_appointment(
                patients[appointment.patient].id,
                doctors[appointment.doctor].id,
                date,
            )
            .await?;
        if appointment.status != created.status {
            repo.update_appointment_status(created.id, created.status, appointment.status)
                .await?;
        }
    }

    let summary = SeedSummary {
        admins: ADMINS.len(),
        doctors: doctors.len(),
        patients: patients.len(),
        appointments: APPOINTMENTS.len(),
    };
    tracing::info!(?summary, "demo data seeded");
    Ok(Some(summary))
}

/// Returns the existing account for `email`, or creates it.
async fn ensure_user(
    repo: &dyn Repository,
    name: &str,
    email: &str,
    role: Role,
    password_hash: &str,
) -> Result<User, RepositoryError> {
    if let Some(user) = repo.get_user_by_email(email).await? {
        return Ok(user);
    }
    repo.create_user(NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        role,
    })
    .await
}

/// `hour:minute` on the day `day_offset` days from `now`, in the zone of `now`.
fn slot<Tz: TimeZone>(
    now: &DateTime<Tz>,
    day_offset: i64,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    let day = now
        .date_naive()
        .checked_add_signed(TimeDelta::try_days(day_offset)?)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    now.timezone()
        .from_local_datetime(&day.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
