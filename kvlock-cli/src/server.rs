use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::time::Instant;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use kvlock_core::infrastructure_in_memory::InMemoryLockStore;
use kvlock_core::repository::{InMemoryUserRepository, UserRepository};
use kvlock_core::service::UserService;
use kvlock_core::types::{
    FencingToken, LockKey, RegisterRequest, UpdateUserRequest, UserProfile,
};
use kvlock_core::{LockClient, LockConfig, LockError, RetryPolicy};

use crate::config::{AppConfig, DatabaseBackend, StorageBackend};
use crate::handlers::*;

/// How often the in-memory store drops expired locks.
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// Shared handler state. Cheap to clone: every field is a handle.
pub struct AppState<R: UserRepository> {
    pub locks: LockClient,
    pub users: Arc<UserService<R>>,
    pub lock_config: LockConfig,
}

impl<R: UserRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
            users: self.users.clone(),
            lock_config: self.lock_config.clone(),
        }
    }
}

impl<R: UserRepository> AppState<R> {
    pub fn new(locks: LockClient, repo: Arc<R>, lock_config: LockConfig) -> Self {
        let users = Arc::new(UserService::new(locks.clone(), repo, lock_config.clone()));
        Self {
            locks,
            users,
            lock_config,
        }
    }
}

/// Connect the configured backends and serve until ctrl-c.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let storage: StorageBackend = config.storage.parse()?;
    let database: DatabaseBackend = config.database.parse()?;
    let locks = connect_locks(&storage).await?;

    match database {
        DatabaseBackend::Memory => {
            tracing::info!("user database: in-memory");
            serve(config, locks, Arc::new(InMemoryUserRepository::new())).await
        }
        DatabaseBackend::Sqlite(path) => {
            #[cfg(feature = "sqlite")]
            {
                let repo = kvlock_core::repository_sqlite::SqliteUserRepository::open(&path)
                    .with_context(|| format!("failed to open sqlite database {}", path))?;
                tracing::info!(path = %path, "user database: sqlite");
                serve(config, locks, Arc::new(repo)).await
            }
            #[cfg(not(feature = "sqlite"))]
            {
                anyhow::bail!(
                    "database '{}' needs the sqlite feature; rebuild with --features sqlite",
                    path
                )
            }
        }
    }
}

/// Build the lock client for `backend`, failing fast if the store is
/// unreachable.
pub async fn connect_locks(backend: &StorageBackend) -> anyhow::Result<LockClient> {
    match backend {
        StorageBackend::Memory => {
            tracing::warn!("lock storage: in-memory, exclusion holds within this process only");
            let store = Arc::new(InMemoryLockStore::new());
            store.spawn_sweeper(MEMORY_SWEEP_INTERVAL);
            Ok(LockClient::new(store))
        }
        StorageBackend::Redis(url) => {
            #[cfg(feature = "redis")]
            {
                let client = LockClient::connect_redis(url)
                    .await
                    .context("failed to connect to redis lock storage")?;
                tracing::info!("lock storage: redis");
                Ok(client)
            }
            #[cfg(not(feature = "redis"))]
            {
                let _ = url;
                anyhow::bail!("redis storage needs the redis feature; rebuild with --features redis")
            }
        }
    }
}

async fn serve<R: UserRepository>(
    config: AppConfig,
    locks: LockClient,
    repo: Arc<R>,
) -> anyhow::Result<()> {
    let state = AppState::new(locks, repo, config.lock.clone());
    let app = router(state, config.server.max_concurrency);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("kvlock server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("kvlock server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

pub fn router<R: UserRepository>(state: AppState<R>, max_concurrency: usize) -> Router {
    Router::new()
        .route("/health", get(health::<R>))
        .route("/locks", post(acquire_lock::<R>))
        .route("/locks/{name}/release", post(release_lock::<R>))
        .route("/locks/{name}/refresh", post(refresh_lock::<R>))
        .route("/locks/{name}/ttl", get(lock_ttl::<R>))
        .route("/users", post(register_user::<R>))
        .route("/users/{id}", get(get_user::<R>).patch(update_user::<R>))
        .layer(ConcurrencyLimitLayer::new(max_concurrency))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health<R: UserRepository>(
    State(state): State<AppState<R>>,
) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        lock_backend: state.locks.backend().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn acquire_lock<R: UserRepository>(
    State(state): State<AppState<R>>,
    Json(req): Json<AcquireLockRequest>,
) -> ApiResult<LockResponse> {
    req.validate().map_err(ApiError::bad_request)?;
    let key = LockKey::from_name(&req.name)?;

    let defaults = &state.lock_config;
    let ttl = Duration::from_millis(req.ttl_ms.unwrap_or(defaults.ttl_ms));
    let policy = RetryPolicy::new(
        req.max_attempts.unwrap_or(defaults.max_attempts),
        Duration::from_millis(req.retry_delay_ms.unwrap_or(defaults.retry_delay_ms)),
    );

    let token = match req.deadline_ms.or(defaults.deadline_ms) {
        Some(ms) => {
            let deadline = Instant::now() + Duration::from_millis(ms);
            policy.acquire_until(&state.locks, &key, ttl, deadline).await
        }
        None => policy.acquire(&state.locks, &key, ttl).await,
    }
    .inspect_err(|err| tracing::info!(key = %key, error = %err, "lock denied"))?;

    tracing::info!(key = %key, ttl_ms = ttl.as_millis() as u64, "lock granted");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(LockResponse {
            key: key.to_string(),
            token: token.as_str().to_string(),
            ttl_ms: ttl.as_millis() as u64,
        })),
    ))
}

async fn release_lock<R: UserRepository>(
    State(state): State<AppState<R>>,
    Path(name): Path<String>,
    Json(req): Json<ReleaseLockRequest>,
) -> ApiResult<ReleaseResponse> {
    if req.token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    let key = LockKey::from_name(&name)?;

    state
        .locks
        .release(&key, &FencingToken::from_raw(req.token))
        .await?;

    tracing::info!(key = %key, "lock released");
    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(ReleaseResponse {
            key: key.to_string(),
            released: true,
        })),
    ))
}

async fn refresh_lock<R: UserRepository>(
    State(state): State<AppState<R>>,
    Path(name): Path<String>,
    Json(req): Json<RefreshLockRequest>,
) -> ApiResult<LockTtlResponse> {
    req.validate().map_err(ApiError::bad_request)?;
    let key = LockKey::from_name(&name)?;
    let ttl = Duration::from_millis(req.ttl_ms.unwrap_or(state.lock_config.ttl_ms));

    state
        .locks
        .refresh(&key, &FencingToken::from_raw(req.token), ttl)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(LockTtlResponse {
            key: key.to_string(),
            ttl_ms: ttl.as_millis() as u64,
        })),
    ))
}

async fn lock_ttl<R: UserRepository>(
    State(state): State<AppState<R>>,
    Path(name): Path<String>,
) -> ApiResult<LockTtlResponse> {
    let key = LockKey::from_name(&name)?;
    let remaining = state.locks.ttl(&key).await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(LockTtlResponse {
            key: key.to_string(),
            ttl_ms: remaining.as_millis() as u64,
        })),
    ))
}

async fn register_user<R: UserRepository>(
    State(state): State<AppState<R>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<UserProfile> {
    let profile = state.users.register(req).await?;
    tracing::info!(user_id = profile.id, "user registered");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(profile))))
}

async fn get_user<R: UserRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<i64>,
) -> ApiResult<UserProfile> {
    let profile = state.users.get_user(id)?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(profile))))
}

async fn update_user<R: UserRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<UserProfile> {
    let profile = state.users.update_user(id, req).await?;
    tracing::info!(user_id = id, "user updated");
    Ok((StatusCode::OK, Json(ApiResponse::ok(profile))))
}

/// Resolve `name` against `client` and describe what `kvlock inspect` should
/// print.
pub async fn describe_lock(client: &LockClient, name: &str) -> anyhow::Result<String> {
    let key = LockKey::from_name(name)?;
    match client.ttl(&key).await {
        Ok(remaining) => Ok(format!(
            "{} held, expires in {} ms",
            key,
            remaining.as_millis()
        )),
        Err(LockError::NotHeld { .. }) => Ok(format!("{} not held", key)),
        Err(err) => Err(err.into()),
    }
}
