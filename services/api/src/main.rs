use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, init_pool},
};

use api::{
    jwt::{JwtConfig, JwtService},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    receipts::ReceiptStore,
    repositories::{CourseRepository, EnrollmentRepository, UserRepository},
    session::RefreshSessions,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting MedHome API service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    // Initialize Redis connection pool
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    let jwt_service = JwtService::new(JwtConfig::from_env()?);
    let receipts = ReceiptStore::from_env();
    tokio::fs::create_dir_all(receipts.root()).await?;
    info!("Storing receipts under {}", receipts.root().display());

    let app_state = AppState {
        user_repository: UserRepository::new(pool.clone()),
        course_repository: CourseRepository::new(pool.clone()),
        enrollment_repository: EnrollmentRepository::new(pool.clone()),
        refresh_sessions: RefreshSessions::new(redis_pool.clone()),
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
        db_pool: pool,
        redis_pool,
        jwt_service,
        receipts,
    };

    // Start the web server
    let app = api::routes::create_router(app_state);

    let bind_addr = std::env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("API service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
