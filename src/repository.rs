use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{RepoResult, RepositoryError},
    models::{
        Appointment, AppointmentDetails, AppointmentRow, AppointmentStatus, Doctor,
        DoctorUserSummary, DoctorWithUser, NewDoctor, NewPatient, NewUser, Patient,
        PatientWithUser, User, UserSummary,
    },
    scope::AppointmentFilter,
};

/// Repository Trait
///
/// The persistence contract used by handlers and the scope resolver. Every method is a
/// single atomic store call; there are no multi-statement transactions.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    // Fails with `UniqueViolation` when the email is taken.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;

    // --- Patients ---
    async fn list_patients(&self) -> RepoResult<Vec<PatientWithUser>>;
    async fn get_patient_by_user(&self, user_id: Uuid) -> RepoResult<Option<Patient>>;
    async fn get_patient_with_user(&self, user_id: Uuid) -> RepoResult<Option<PatientWithUser>>;
    // Fails with `UniqueViolation` when the user already owns a patient profile.
    async fn create_patient(&self, user_id: Uuid, patient: NewPatient) -> RepoResult<Patient>;

    // --- Doctors ---
    async fn list_doctors(&self) -> RepoResult<Vec<DoctorWithUser>>;
    async fn get_doctor(&self, id: Uuid) -> RepoResult<Option<Doctor>>;
    async fn get_doctor_by_user(&self, user_id: Uuid) -> RepoResult<Option<Doctor>>;
    // Fails with `UniqueViolation` when the user already owns a doctor profile.
    async fn create_doctor(&self, user_id: Uuid, doctor: NewDoctor) -> RepoResult<Doctor>;

    // --- Appointments ---
    // Ordered by appointment date, ascending.
    async fn list_appointments(&self, filter: &AppointmentFilter)
    -> RepoResult<Vec<AppointmentDetails>>;
    async fn get_appointment(&self, id: Uuid) -> RepoResult<Option<Appointment>>;
    // New appointments always start as PENDING.
    async fn create_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: DateTime<Utc>,
    ) -> RepoResult<AppointmentDetails>;
    // Compare-and-set: only applies while the stored status still equals `expected`.
    // Returns `None` if the appointment is gone or its status moved in the meantime.
    async fn update_appointment_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> RepoResult<Option<AppointmentDetails>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- SQL fragments ---

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";
const PATIENT_COLUMNS: &str = "id, user_id, age, gender, phone, created_at";
const DOCTOR_COLUMNS: &str = "id, user_id, specialization, department, created_at";

/// Appointment ⨝ both profiles ⨝ both users, aliased to match `AppointmentRow`.
const APPOINTMENT_SELECT: &str = r#"
    SELECT
        a.id, a.date, a.status, a.patient_id, a.doctor_id, a.created_at, a.updated_at,
        p.user_id AS patient_user_id, p.age AS patient_age,
        p.gender AS patient_gender, p.phone AS patient_phone,
        pu.name AS patient_name, pu.email AS patient_email,
        d.user_id AS doctor_user_id, d.specialization AS doctor_specialization,
        d.department AS doctor_department,
        du.name AS doctor_name, du.email AS doctor_email
    FROM appointments a
    JOIN patients p ON a.patient_id = p.id
    JOIN users pu ON p.user_id = pu.id
    JOIN doctors d ON a.doctor_id = d.id
    JOIN users du ON d.user_id = du.id
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn appointment_details(&self, id: Uuid) -> RepoResult<Option<AppointmentDetails>> {
        let query = format!("{APPOINTMENT_SELECT} WHERE a.id = $1");
        let row = sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AppointmentDetails::from))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let query = format!(
            "INSERT INTO users (id, name, email, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await?)
    }

    /// list_patients
    ///
    /// All patient profiles with the owner's name and email, newest first.
    async fn list_patients(&self) -> RepoResult<Vec<PatientWithUser>> {
        Ok(sqlx::query_as::<_, PatientWithUser>(
            r#"
            SELECT p.id, p.user_id, p.age, p.gender, p.phone, p.created_at, u.name, u.email
            FROM patients p
            JOIN users u ON p.user_id = u.id
            ORDER BY p.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_patient_by_user(&self, user_id: Uuid) -> RepoResult<Option<Patient>> {
        let query = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE user_id = $1");
        Ok(sqlx::query_as::<_, Patient>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_patient_with_user(&self, user_id: Uuid) -> RepoResult<Option<PatientWithUser>> {
        Ok(sqlx::query_as::<_, PatientWithUser>(
            r#"
            SELECT p.id, p.user_id, p.age, p.gender, p.phone, p.created_at, u.name, u.email
            FROM patients p
            JOIN users u ON p.user_id = u.id
            WHERE p.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_patient(&self, user_id: Uuid, patient: NewPatient) -> RepoResult<Patient> {
        let query = format!(
            "INSERT INTO patients (id, user_id, age, gender, phone) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PATIENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Patient>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(patient.age)
            .bind(patient.gender)
            .bind(patient.phone)
            .fetch_one(&self.pool)
            .await?)
    }

    /// list_doctors
    ///
    /// The doctor directory, joined with each doctor's safe identity fields.
    async fn list_doctors(&self) -> RepoResult<Vec<DoctorWithUser>> {
        Ok(sqlx::query_as::<_, DoctorWithUser>(
            r#"
            SELECT d.id, d.user_id, d.specialization, d.department, d.created_at,
                   u.name, u.email, u.role
            FROM doctors d
            JOIN users u ON d.user_id = u.id
            ORDER BY u.name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_doctor(&self, id: Uuid) -> RepoResult<Option<Doctor>> {
        let query = format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = $1");
        Ok(sqlx::query_as::<_, Doctor>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_doctor_by_user(&self, user_id: Uuid) -> RepoResult<Option<Doctor>> {
        let query = format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE user_id = $1");
        Ok(sqlx::query_as::<_, Doctor>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_doctor(&self, user_id: Uuid, doctor: NewDoctor) -> RepoResult<Doctor> {
        let query = format!(
            "INSERT INTO doctors (id, user_id, specialization, department) \
             VALUES ($1, $2, $3, $4) RETURNING {DOCTOR_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Doctor>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(doctor.specialization)
            .bind(doctor.department)
            .fetch_one(&self.pool)
            .await?)
    }

    /// list_appointments
    ///
    /// Builds the WHERE clause from the filter with `QueryBuilder`, so every value is a
    /// bound parameter.
    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> RepoResult<Vec<AppointmentDetails>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(APPOINTMENT_SELECT);
        builder.push(" WHERE TRUE");

        if let Some(patient_id) = filter.patient_id {
            builder.push(" AND a.patient_id = ");
            builder.push_bind(patient_id);
        }

        if let Some(doctor_id) = filter.doctor_id {
            builder.push(" AND a.doctor_id = ");
            builder.push_bind(doctor_id);
        }

        if let Some((from, until)) = filter.window {
            builder.push(" AND a.date >= ");
            builder.push_bind(from);
            builder.push(" AND a.date < ");
            builder.push_bind(until);
        }

        builder.push(" ORDER BY a.date ASC");

        let rows = builder
            .build_query_as::<AppointmentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AppointmentDetails::from).collect())
    }

    async fn get_appointment(&self, id: Uuid) -> RepoResult<Option<Appointment>> {
        Ok(sqlx::query_as::<_, Appointment>(
            "SELECT id, patient_id, doctor_id, date, status, created_at, updated_at \
             FROM appointments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: DateTime<Utc>,
    ) -> RepoResult<AppointmentDetails> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO appointments (id, patient_id, doctor_id, date, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(doctor_id)
        .bind(date)
        .bind(AppointmentStatus::Pending)
        .fetch_one(&self.pool)
        .await?;

        // Read back through the joined query so the response carries both participants.
        self.appointment_details(id)
            .await?
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> RepoResult<Option<AppointmentDetails>> {
        let updated = sqlx::query(
            "UPDATE appointments SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.appointment_details(id).await
    }
}

// --- In-memory implementation (for tests) ---

#[derive(Default)]
struct MockTables {
    users: Vec<User>,
    patients: Vec<Patient>,
    doctors: Vec<Doctor>,
    appointments: Vec<Appointment>,
}

/// MockRepository
///
/// An in-memory `Repository` used by handler and router tests. It enforces the same
/// uniqueness rules as the SQL schema (email, one profile per user) and can be switched
/// into a failing mode to exercise the 500 path.
#[derive(Default)]
pub struct MockRepository {
    tables: Mutex<MockTables>,
    /// When true, every operation returns a simulated database failure.
    pub should_fail: bool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn tables(&self) -> RepoResult<MutexGuard<'_, MockTables>> {
        if self.should_fail {
            return Err(RepositoryError::Database(sqlx::Error::Protocol(
                "mock repository failure".to_string(),
            )));
        }
        // A poisoned lock only means another test thread panicked mid-write.
        Ok(self.tables.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Inserts an appointment with an arbitrary status and returns it. Test setup only.
    pub fn insert_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: DateTime<Utc>,
        status: AppointmentStatus,
    ) -> Appointment {
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            date,
            status,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .appointments
            .push(appointment.clone());
        appointment
    }
}

impl MockTables {
    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn patient_with_user(&self, patient: &Patient) -> Option<PatientWithUser> {
        let user = self.user(patient.user_id)?;
        Some(PatientWithUser {
            patient: patient.clone(),
            user: UserSummary {
                name: user.name.clone(),
                email: user.email.clone(),
            },
        })
    }

    fn details(&self, appointment: &Appointment) -> Option<AppointmentDetails> {
        let patient = self.patients.iter().find(|p| p.id == appointment.patient_id)?;
        let doctor = self.doctors.iter().find(|d| d.id == appointment.doctor_id)?;
        let patient_user = self.user(patient.user_id)?;
        let doctor_user = self.user(doctor.user_id)?;

        Some(AppointmentDetails::from(AppointmentRow {
            id: appointment.id,
            date: appointment.date,
            status: appointment.status,
            patient_id: patient.id,
            doctor_id: doctor.id,
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
            patient_user_id: patient.user_id,
            patient_age: patient.age,
            patient_gender: patient.gender.clone(),
            patient_phone: patient.phone.clone(),
            patient_name: patient_user.name.clone(),
            patient_email: patient_user.email.clone(),
            doctor_user_id: doctor.user_id,
            doctor_specialization: doctor.specialization.clone(),
            doctor_department: doctor.department.clone(),
            doctor_name: doctor_user.name.clone(),
            doctor_email: doctor_user.email.clone(),
        }))
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.tables()?.user(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.tables()?.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables()?;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::UniqueViolation);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn list_patients(&self) -> RepoResult<Vec<PatientWithUser>> {
        let tables = self.tables()?;
        Ok(tables
            .patients
            .iter()
            .rev()
            .filter_map(|p| tables.patient_with_user(p))
            .collect())
    }

    async fn get_patient_by_user(&self, user_id: Uuid) -> RepoResult<Option<Patient>> {
        Ok(self
            .tables()?
            .patients
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn get_patient_with_user(&self, user_id: Uuid) -> RepoResult<Option<PatientWithUser>> {
        let tables = self.tables()?;
        Ok(tables
            .patients
            .iter()
            .find(|p| p.user_id == user_id)
            .and_then(|p| tables.patient_with_user(p)))
    }

    async fn create_patient(&self, user_id: Uuid, patient: NewPatient) -> RepoResult<Patient> {
        let mut tables = self.tables()?;
        if tables.patients.iter().any(|p| p.user_id == user_id) {
            return Err(RepositoryError::UniqueViolation);
        }
        let patient = Patient {
            id: Uuid::new_v4(),
            user_id,
            age: patient.age,
            gender: patient.gender,
            phone: patient.phone,
            created_at: Utc::now(),
        };
        tables.patients.push(patient.clone());
        Ok(patient)
    }

    async fn list_doctors(&self) -> RepoResult<Vec<DoctorWithUser>> {
        let tables = self.tables()?;
        let mut doctors: Vec<DoctorWithUser> = tables
            .doctors
            .iter()
            .filter_map(|d| {
                let user = tables.user(d.user_id)?;
                Some(DoctorWithUser {
                    doctor: d.clone(),
                    user: DoctorUserSummary {
                        name: user.name.clone(),
                        email: user.email.clone(),
                        role: user.role,
                    },
                })
            })
            .collect();
        doctors.sort_by(|a, b| a.user.name.cmp(&b.user.name));
        Ok(doctors)
    }

    async fn get_doctor(&self, id: Uuid) -> RepoResult<Option<Doctor>> {
        Ok(self.tables()?.doctors.iter().find(|d| d.id == id).cloned())
    }

    async fn get_doctor_by_user(&self, user_id: Uuid) -> RepoResult<Option<Doctor>> {
        Ok(self
            .tables()?
            .doctors
            .iter()
            .find(|d| d.user_id == user_id)
            .cloned())
    }

    async fn create_doctor(&self, user_id: Uuid, doctor: NewDoctor) -> RepoResult<Doctor> {
        let mut tables = self.tables()?;
        if tables.doctors.iter().any(|d| d.user_id == user_id) {
            return Err(RepositoryError::UniqueViolation);
        }
        let doctor = Doctor {
            id: Uuid::new_v4(),
            user_id,
            specialization: doctor.specialization,
            department: doctor.department,
            created_at: Utc::now(),
        };
        tables.doctors.push(doctor.clone());
        Ok(doctor)
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> RepoResult<Vec<AppointmentDetails>> {
        let tables = self.tables()?;
        let mut matching: Vec<&Appointment> = tables
            .appointments
            .iter()
            .filter(|a| filter.patient_id.is_none_or(|id| a.patient_id == id))
            .filter(|a| filter.doctor_id.is_none_or(|id| a.doctor_id == id))
            .filter(|a| {
                filter
                    .window
                    .is_none_or(|(from, until)| from <= a.date && a.date < until)
            })
            .collect();
        matching.sort_by_key(|a| a.date);
        Ok(matching
            .into_iter()
            .filter_map(|a| tables.details(a))
            .collect())
    }

    async fn get_appointment(&self, id: Uuid) -> RepoResult<Option<Appointment>> {
        Ok(self
            .tables()?
            .appointments
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn create_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: DateTime<Utc>,
    ) -> RepoResult<AppointmentDetails> {
        let mut tables = self.tables()?;
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            date,
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let details = tables
            .details(&appointment)
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))?;
        tables.appointments.push(appointment);
        Ok(details)
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> RepoResult<Option<AppointmentDetails>> {
        let mut tables = self.tables()?;
        let Some(appointment) = tables
            .appointments
            .iter_mut()
            .find(|a| a.id == id && a.status == expected)
        else {
            return Ok(None);
        };
        appointment.status = status;
        appointment.updated_at = Utc::now();
        let updated = appointment.clone();
        Ok(tables.details(&updated))
    }
}
