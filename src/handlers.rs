use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{ApiError, ApiResult, ErrorBody, RepositoryError},
    models::{
        AppointmentDetails, AppointmentStatus, AuthResponse, CreateAppointmentRequest,
        CreateDoctorRequest, CreatePatientRequest, Doctor, DoctorWithUser, LoginRequest,
        NewDoctor, NewPatient, NewUser, Patient, PatientWithUser, PublicUser, RegisterRequest,
        Role, UpdateAppointmentRequest,
    },
    password,
    scope::{self, ActingAs, Profile},
};
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Local;
use serde::Deserialize;

// --- Extractors ---

/// ApiJson
///
/// `axum::Json` with its rejection mapped onto `ApiError`, so malformed bodies answer
/// with the same 400 `{"error": ...}` shape as every other validation failure.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// ApiQuery
///
/// `axum::extract::Query` with an `ApiError` rejection.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// --- Filter Structs ---

/// PatientQuery
///
/// Query parameters of `GET /patients`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PatientQuery {
    /// `true` returns the caller's own patient profile instead of the full list.
    pub me: Option<String>,
}

/// AppointmentQuery
///
/// Query parameters of `GET /appointments`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AppointmentQuery {
    /// `patient` or `doctor`: whose appointments to list. Required unless the caller is ADMIN.
    pub me: Option<String>,
    /// `today` restricts to the current server-local calendar day.
    pub date: Option<String>,
}

/// Returns the trimmed value when present and non-blank.
fn present(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Runs a PBKDF2 job off the async executor.
async fn blocking<T, F>(job: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError::internal(format!("password worker failed: {e}")))
}

// --- Auth Handlers ---

/// register
///
/// [Public Route] Creates a PATIENT or DOCTOR account and signs the caller in.
/// The role is matched case-insensitively; ADMIN and unknown roles are refused.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Missing fields or email taken", body = ErrorBody),
        (status = 403, description = "Role not self-registrable", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let (Some(name), Some(email), Some(password), Some(role)) = (
        present(payload.name),
        present(payload.email),
        payload.password.filter(|p| !p.is_empty()),
        present(payload.role),
    ) else {
        return Err(ApiError::bad_request("Missing fields"));
    };

    let role = role
        .parse::<Role>()
        .ok()
        .filter(|role| role.is_self_registrable())
        .ok_or_else(|| ApiError::forbidden("Only PATIENT or DOCTOR accounts can self-register"))?;

    if state.repo.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("Email already exists"));
    }

    let iterations = state.config.password_iterations;
    let password_hash =
        blocking(move || password::hash_password(&password, iterations)).await?;

    let user = state
        .repo
        .create_user(NewUser {
            name,
            email,
            password_hash,
            role,
        })
        .await
        .map_err(|e| match e {
            // Lost a race against a concurrent registration with the same email.
            RepositoryError::UniqueViolation => ApiError::bad_request("Email already exists"),
            other => other.into(),
        })?;

    let token = auth::issue_token(
        user.id,
        user.role,
        &state.config.jwt_secret,
        state.config.token_ttl_days,
    )?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: PublicUser::from(user),
            token,
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges email + password for a bearer token.
/// Unknown email and wrong password are indistinguishable to the client.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Missing fields", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let (Some(email), Some(password)) = (
        present(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing fields"));
    };

    let user = state
        .repo
        .get_user_by_email(&email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let stored = user.password_hash.clone();
    if !blocking(move || password::verify_password(&password, &stored)).await? {
        tracing::debug!(user_id = %user.id, "login rejected: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = auth::issue_token(
        user.id,
        user.role,
        &state.config.jwt_secret,
        state.config.token_ttl_days,
    )?;

    Ok(Json(AuthResponse {
        user: PublicUser::from(user),
        token,
    }))
}

// --- Patient Handlers ---

/// get_patients
///
/// [Authenticated Route] With `me=true`, returns the caller's own patient profile (any role).
/// Otherwise lists every patient, which only ADMIN and DOCTOR callers may do.
#[utoipa::path(
    get,
    path = "/patients",
    params(PatientQuery),
    responses(
        (status = 200, description = "Own profile (me=true) or all patients", body = [PatientWithUser]),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 403, description = "Patients cannot list patients", body = ErrorBody),
        (status = 404, description = "No patient profile (me=true)", body = ErrorBody)
    )
)]
pub async fn get_patients(
    user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PatientQuery>,
) -> ApiResult<Response> {
    if query.me.as_deref() == Some("true") {
        let profile = state
            .repo
            .get_patient_with_user(user.id)
            .await?
            .ok_or_else(|| ApiError::not_found("Patient profile not found"))?;
        return Ok(Json(profile).into_response());
    }

    user.require(
        &[Role::Admin, Role::Doctor],
        "Only admins and doctors can list patients",
    )?;
    Ok(Json(state.repo.list_patients().await?).into_response())
}

/// create_patient
///
/// [Authenticated Route] Creates the caller's patient profile. PATIENT callers only,
/// at most once per user.
#[utoipa::path(
    post,
    path = "/patients",
    request_body = CreatePatientRequest,
    responses(
        (status = 201, description = "Created", body = Patient),
        (status = 400, description = "Missing or invalid fields", body = ErrorBody),
        (status = 403, description = "Caller is not a PATIENT", body = ErrorBody),
        (status = 409, description = "Profile already exists", body = ErrorBody)
    )
)]
pub async fn create_patient(
    user: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreatePatientRequest>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    user.require(
        &[Role::Patient],
        "Only users with PATIENT role can create a patient profile.",
    )?;

    let (Some(age), Some(gender), Some(phone)) = (
        payload.age,
        present(payload.gender),
        present(payload.phone),
    ) else {
        return Err(ApiError::bad_request(
            "Missing required fields: age, gender, phone",
        ));
    };
    if age < 0 {
        return Err(ApiError::bad_request("age must not be negative"));
    }

    if state.repo.get_patient_by_user(user.id).await?.is_some() {
        return Err(ApiError::conflict("Patient profile already exists"));
    }

    let patient = state
        .repo
        .create_patient(user.id, NewPatient { age, gender, phone })
        .await
        .map_err(|e| match e {
            RepositoryError::UniqueViolation => ApiError::conflict("Patient profile already exists"),
            other => other.into(),
        })?;

    tracing::info!(user_id = %user.id, patient_id = %patient.id, "patient profile created");
    Ok((StatusCode::CREATED, Json(patient)))
}

// --- Doctor Handlers ---

/// get_doctors
///
/// [Authenticated Route] The doctor directory with each doctor's name, email and role.
#[utoipa::path(
    get,
    path = "/doctors",
    responses(
        (status = 200, description = "All doctors", body = [DoctorWithUser]),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    )
)]
pub async fn get_doctors(
    _user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DoctorWithUser>>> {
    Ok(Json(state.repo.list_doctors().await?))
}

/// create_doctor
///
/// [Authenticated Route] Creates the caller's doctor profile. DOCTOR callers only,
/// at most once per user.
#[utoipa::path(
    post,
    path = "/doctors",
    request_body = CreateDoctorRequest,
    responses(
        (status = 201, description = "Created", body = Doctor),
        (status = 400, description = "Missing fields", body = ErrorBody),
        (status = 403, description = "Caller is not a DOCTOR", body = ErrorBody),
        (status = 409, description = "Profile already exists", body = ErrorBody)
    )
)]
pub async fn create_doctor(
    user: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateDoctorRequest>,
) -> ApiResult<(StatusCode, Json<Doctor>)> {
    user.require(
        &[Role::Doctor],
        "Only users with DOCTOR role can create a doctor profile.",
    )?;

    let (Some(specialization), Some(department)) =
        (present(payload.specialization), present(payload.department))
    else {
        return Err(ApiError::bad_request(
            "Missing required fields: specialization, department",
        ));
    };

    if state.repo.get_doctor_by_user(user.id).await?.is_some() {
        return Err(ApiError::conflict("Doctor profile already exists"));
    }

    let doctor = state
        .repo
        .create_doctor(
            user.id,
            NewDoctor {
                specialization,
                department,
            },
        )
        .await
        .map_err(|e| match e {
            RepositoryError::UniqueViolation => ApiError::conflict("Doctor profile already exists"),
            other => other.into(),
        })?;

    tracing::info!(user_id = %user.id, doctor_id = %doctor.id, "doctor profile created");
    Ok((StatusCode::CREATED, Json(doctor)))
}

// --- Appointment Handlers ---

/// get_appointments
///
/// [Authenticated Route] Lists appointments visible to the caller, ordered by date.
/// See `scope::build_appointment_filter` for the `me`/`date` rules.
#[utoipa::path(
    get,
    path = "/appointments",
    params(AppointmentQuery),
    responses(
        (status = 200, description = "Appointments", body = [AppointmentDetails]),
        (status = 400, description = "Missing or invalid 'me'", body = ErrorBody),
        (status = 404, description = "Profile for 'me' not found", body = ErrorBody)
    )
)]
pub async fn get_appointments(
    user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AppointmentQuery>,
) -> ApiResult<Json<Vec<AppointmentDetails>>> {
    let filter = scope::build_appointment_filter(
        state.repo.as_ref(),
        &user,
        query.me.as_deref(),
        query.date.as_deref(),
        Local::now(),
    )
    .await?;

    Ok(Json(state.repo.list_appointments(&filter).await?))
}

/// create_appointment
///
/// [Authenticated Route] Books an appointment for the calling patient with the given
/// doctor. New appointments start as PENDING.
#[utoipa::path(
    post,
    path = "/appointments",
    request_body = CreateAppointmentRequest,
    responses(
        (status = 201, description = "Booked", body = AppointmentDetails),
        (status = 400, description = "Missing fields, bad date or unknown doctor", body = ErrorBody),
        (status = 403, description = "Caller is not a PATIENT", body = ErrorBody),
        (status = 404, description = "Caller has no patient profile", body = ErrorBody)
    )
)]
pub async fn create_appointment(
    user: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateAppointmentRequest>,
) -> ApiResult<(StatusCode, Json<AppointmentDetails>)> {
    user.require(&[Role::Patient], "Only Patients can create Appointments.")?;

    let (Some(raw_date), Some(doctor_id)) = (present(payload.date), payload.doctor_id) else {
        return Err(ApiError::bad_request(
            "Missing required fields: date, doctorId",
        ));
    };

    let date = scope::parse_appointment_date(&raw_date)?;

    let doctor = state
        .repo
        .get_doctor(doctor_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("Doctor not found"))?;

    let Profile::Patient(patient) =
        scope::resolve_profile(state.repo.as_ref(), user.id, ActingAs::Patient)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => ApiError::not_found(
                    "Patient profile not found. Please create a patient profile first.",
                ),
                other => other,
            })?
    else {
        return Err(ApiError::internal("patient lookup resolved a non-patient profile"));
    };

    let appointment = state
        .repo
        .create_appointment(patient.id, doctor.id, date)
        .await?;

    tracing::info!(
        appointment_id = %appointment.id,
        patient_id = %patient.id,
        doctor_id = %doctor.id,
        "appointment booked"
    );
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// update_appointment
///
/// [Authenticated Route] Moves an appointment to a new status.
///
/// *Authorization*: ADMIN may update any appointment, a DOCTOR only their own.
/// *Transitions*: PENDING → CONFIRMED | CANCELLED, CONFIRMED → COMPLETED | CANCELLED.
/// Re-sending the current status is accepted; anything else is a 409.
#[utoipa::path(
    put,
    path = "/appointments",
    request_body = UpdateAppointmentRequest,
    responses(
        (status = 200, description = "Updated", body = AppointmentDetails),
        (status = 400, description = "Missing fields or invalid status", body = ErrorBody),
        (status = 403, description = "Not a doctor/admin, or not the doctor's appointment", body = ErrorBody),
        (status = 404, description = "Appointment not found", body = ErrorBody),
        (status = 409, description = "Illegal transition or concurrent update", body = ErrorBody)
    )
)]
pub async fn update_appointment(
    user: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateAppointmentRequest>,
) -> ApiResult<Json<AppointmentDetails>> {
    user.require(
        &[Role::Doctor, Role::Admin],
        "Only Doctors and Admins can update appointments",
    )?;

    let (Some(id), Some(raw_status)) = (payload.id, present(payload.status)) else {
        return Err(ApiError::bad_request("Missing required fields: id, status"));
    };

    let next = raw_status
        .parse::<AppointmentStatus>()
        .map_err(|_| ApiError::bad_request("Invalid status"))?;

    let appointment = state
        .repo
        .get_appointment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;

    if user.role == Role::Doctor {
        let own_doctor = state.repo.get_doctor_by_user(user.id).await?;
        if own_doctor.is_none_or(|doctor| doctor.id != appointment.doctor_id) {
            return Err(ApiError::forbidden(
                "Doctors can only modify their own appointments",
            ));
        }
    }

    let current = appointment.status;
    if !current.can_transition_to(next) {
        return Err(ApiError::conflict(format!(
            "Cannot change appointment status from {current} to {next}"
        )));
    }

    let updated = state
        .repo
        .update_appointment_status(id, current, next)
        .await?
        .ok_or_else(|| {
            ApiError::conflict("Appointment was modified concurrently; reload and retry")
        })?;

    tracing::info!(
        appointment_id = %id,
        from = %current,
        to = %next,
        by = %user.id,
        "appointment status updated"
    );
    Ok(Json(updated))
}
