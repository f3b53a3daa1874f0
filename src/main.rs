use std::sync::Arc;

use hospital_api::{
    AppState,
    config::{AdminSeed, AppConfig, Env},
    create_router,
    error::RepositoryError,
    models::{NewUser, Role},
    password,
    repository::{PostgresRepository, Repository, RepositoryState},
    seed,
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the database and the HTTP server, in that order.
/// Any startup failure is fatal.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hospital_api=debug,tower_http=info".into());

    // Pretty output locally, JSON for log aggregation in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    if let Some(admin) = &config.bootstrap_admin {
        if let Err(e) = ensure_admin(repo.as_ref(), admin, config.password_iterations).await {
            tracing::error!(error = %e, "failed to provision bootstrap admin");
        }
    }

    if config.seed_demo_data {
        if let Err(e) = seed_demo(repo.as_ref(), config.password_iterations).await {
            tracing::error!(error = %e, "failed to seed demo data");
        }
    }

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState { repo, config });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
    }
}

/// Creates the configured ADMIN account unless its email is already registered.
async fn ensure_admin(
    repo: &dyn Repository,
    admin: &AdminSeed,
    iterations: u32,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if repo.get_user_by_email(&admin.email).await?.is_some() {
        tracing::debug!(email = %admin.email, "bootstrap admin already present");
        return Ok(());
    }

    let plain = admin.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || {
        password::hash_password(&plain, iterations)
    })
    .await?;

    match repo
        .create_user(NewUser {
            name: admin.name.clone(),
            email: admin.email.clone(),
            password_hash,
            role: Role::Admin,
        })
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "bootstrap admin created");
            Ok(())
        }
        // Another instance created it between our check and insert.
        Err(RepositoryError::UniqueViolation) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Loads the demo data set. All demo accounts share one password hash.
async fn seed_demo(
    repo: &dyn Repository,
    iterations: u32,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let password_hash = tokio::task::spawn_blocking(move || {
        password::hash_password(seed::DEMO_PASSWORD, iterations)
    })
    .await?;

    seed::seed_demo_data(repo, &password_hash, &chrono::Local::now()).await?;
    Ok(())
}
