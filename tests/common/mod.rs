#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hospital_api::{
    AppConfig, AppState, MockRepository,
    auth::{self, AuthUser},
    models::{
        Appointment, AppointmentStatus, Doctor, NewDoctor, NewPatient, NewUser, Patient, Role,
    },
    password,
    repository::{Repository, RepositoryState},
};

pub const PASSWORD: &str = "correct horse battery staple";

/// Shared fixture: an in-memory repository wired into an `AppState`.
pub struct TestContext {
    pub repo: Arc<MockRepository>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_repo(MockRepository::new())
    }

    pub fn failing() -> Self {
        Self::with_repo(MockRepository::new_failing())
    }

    fn with_repo(repo: MockRepository) -> Self {
        let repo = Arc::new(repo);
        let state = AppState {
            repo: repo.clone() as RepositoryState,
            config: AppConfig::default(),
        };
        Self { repo, state }
    }

    /// Creates a user account with `PASSWORD` and returns its identity.
    pub async fn user(&self, name: &str, role: Role) -> AuthUser {
        let user = self
            .repo
            .create_user(NewUser {
                name: name.to_string(),
                email: format!("{}@hospital.test", name.to_lowercase()),
                password_hash: password::hash_password(
                    PASSWORD,
                    self.state.config.password_iterations,
                ),
                role,
            })
            .await
            .unwrap();
        AuthUser {
            id: user.id,
            role: user.role,
        }
    }

    pub async fn patient(&self, name: &str) -> (AuthUser, Patient) {
        let user = self.user(name, Role::Patient).await;
        let patient = self
            .repo
            .create_patient(
                user.id,
                NewPatient {
                    age: 42,
                    gender: "F".to_string(),
                    phone: "+44 20 7946 0000".to_string(),
                },
            )
            .await
            .unwrap();
        (user, patient)
    }

    pub async fn doctor(&self, name: &str) -> (AuthUser, Doctor) {
        let user = self.user(name, Role::Doctor).await;
        let doctor = self
            .repo
            .create_doctor(
                user.id,
                NewDoctor {
                    specialization: "Cardiology".to_string(),
                    department: "Heart Center".to_string(),
                },
            )
            .await
            .unwrap();
        (user, doctor)
    }

    pub fn appointment(
        &self,
        patient: &Patient,
        doctor: &Doctor,
        date: DateTime<Utc>,
        status: AppointmentStatus,
    ) -> Appointment {
        self.repo
            .insert_appointment(patient.id, doctor.id, date, status)
    }

    pub fn bearer(&self, user: &AuthUser) -> String {
        let token = auth::issue_token(
            user.id,
            user.role,
            &self.state.config.jwt_secret,
            self.state.config.token_ttl_days,
        )
        .unwrap();
        format!("Bearer {token}")
    }
}
