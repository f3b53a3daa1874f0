use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Authenticated Router Module
///
/// Every route here sits behind the `AuthUser` layer installed by `create_router`, so
/// handlers always receive a verified identity. Which role may do what is decided per
/// handler through `AuthUser::require`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /patients[?me=true]  - own profile, or the full list for ADMIN/DOCTOR
        // POST /patients           - PATIENT creates their profile
        .route(
            "/patients",
            get(handlers::get_patients).post(handlers::create_patient),
        )
        // GET /doctors   - directory, any authenticated role
        // POST /doctors  - DOCTOR creates their profile
        .route(
            "/doctors",
            get(handlers::get_doctors).post(handlers::create_doctor),
        )
        // GET /appointments?me=patient|doctor&date=today
        // POST /appointments  - PATIENT books
        // PUT /appointments   - DOCTOR (own) or ADMIN changes status
        .route(
            "/appointments",
            get(handlers::get_appointments)
                .post(handlers::create_appointment)
                .put(handlers::update_appointment),
        )
}
