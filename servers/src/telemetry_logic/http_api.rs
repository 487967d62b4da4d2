use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use super::config::Config;
use super::model::{NewRecord, RecordFilter, RecordPatch, SensorRecord};
use super::realtime;
use super::state::{AppState, RecordEvent};
use super::store::StoreError;

/// Error taxonomy for the HTTP surface. Failed creates report 400 to the
/// producer; failures on reads and updates are the server's fault and
/// report 500.
pub enum AppError {
    NotFound,
    BadRequest(String),
    CreateFailed(StoreError),
    Store(StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Record not found".to_string()),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::CreateFailed(e) => {
                log::warn!("Rejected record create: {}", e);
                (StatusCode::BAD_REQUEST, format!("Could not store record: {}", e))
            }
            AppError::Store(e) => {
                log::error!("Store operation failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/records", get(list_records).post(create_record))
        .route("/records/search", get(search_records))
        .route("/records/{id}", get(get_record).put(update_record))
        .route("/ws", get(realtime::ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the listener and serve until the shutdown channel fires.
pub async fn run(
    config: &Config,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("HTTP and WebSocket server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            log::info!("HTTP server shutting down");
        })
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "time": lib_common::utils::time_now_iso() }))
}

async fn list_records(State(state): State<AppState>) -> Result<Json<Vec<SensorRecord>>, AppError> {
    let records = state.store.list_all().await?;
    Ok(Json(records))
}

async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SensorRecord>, AppError> {
    match state.store.get_by_id(&id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound),
    }
}

async fn search_records(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
) -> Result<Json<Vec<SensorRecord>>, AppError> {
    let records = state.store.find(&filter).await?;
    Ok(Json(records))
}

async fn create_record(
    State(state): State<AppState>,
    payload: Result<Json<NewRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<SensorRecord>), AppError> {
    let Json(new) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let record = state
        .store
        .insert(new)
        .await
        .map_err(AppError::CreateFailed)?;
    log::info!("Stored record {} via HTTP", record.id);

    state.publish(RecordEvent::stored(record.clone()));
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RecordPatch>, JsonRejection>,
) -> Result<Json<SensorRecord>, AppError> {
    let Json(patch) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    match state.store.update_by_id(&id, &patch).await? {
        Some(record) => {
            log::info!("Updated record {} via HTTP", record.id);
            state.publish(RecordEvent::updated(record.clone()));
            Ok(Json(record))
        }
        None => Err(AppError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::connections::db_postgres::DbError;

    fn status_of(error: AppError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(AppError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(AppError::BadRequest("bad payload".to_string())),
            StatusCode::BAD_REQUEST
        );

        let db_error = || StoreError::Connection(DbError::ConnectionError("refused".to_string()));
        assert_eq!(
            status_of(AppError::CreateFailed(db_error())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Store(db_error())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
