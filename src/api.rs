use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::admin::{DeletionOrchestrator, NewUserInput, ProvisioningService};
use crate::error::ServiceError;
use crate::identity::IdentityProvider;
use crate::metrics;
use crate::models::{DeletionReport, DocumentEvent, NotificationCategory, UserType};
use crate::notify::Notifier;

pub struct ApiState {
    pub notifier: Arc<Notifier>,
    pub provisioning: Arc<ProvisioningService>,
    pub deletion: Arc<DeletionOrchestrator>,
    pub identity: Arc<dyn IdentityProvider>,
    pub event_sender: mpsc::Sender<DocumentEvent>,
    pub webhook_secret: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Callable operation failed");
        }
        let body = Json(json!({ "error": self.code(), "message": self.to_string() }));
        (status, body).into_response()
    }
}

pub fn create_api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/notifications/send", post(send_notification))
        .route("/admin/users", post(create_user))
        .route("/admin/users/delete", post(delete_user))
        .route("/hooks/transactions", post(transactions_hook))
        .route("/metrics", get(|| async { metrics::metrics_handler() }))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Resolves the calling uid from the bearer id token. Any verification
/// failure is unauthenticated; the caller never learns why.
async fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<String, ServiceError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ServiceError::Unauthenticated("missing bearer token".to_string())
        })?;

    state.identity.verify_id_token(token).await.map_err(|e| {
        warn!(error = %e, "Id token verification failed");
        ServiceError::Unauthenticated("invalid id token".to_string())
    })
}

#[derive(Deserialize)]
struct SendNotificationRequest {
    #[serde(rename = "userId")]
    user_id: String,
    title: String,
    body: String,
    #[serde(rename = "type")]
    category: NotificationCategory,
    #[serde(default)]
    data: HashMap<String, String>,
}

#[derive(Serialize)]
struct SendNotificationResponse {
    success: bool,
    #[serde(rename = "messageId")]
    message_id: String,
}

/// Any authenticated principal may request a send, to themself or another
/// user. The self/other capability is intentional.
async fn send_notification(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<SendNotificationResponse>, ServiceError> {
    let caller = authenticate(&state, &headers).await?;
    info!(caller = %caller, target = %req.user_id, "Callable notification send");

    let message_id = state
        .notifier
        .send_callable(&req.user_id, &req.title, &req.body, req.category, req.data)
        .await?;

    Ok(Json(SendNotificationResponse {
        success: true,
        message_id,
    }))
}

#[derive(Deserialize)]
struct CreateUserRequest {
    email: String,
    password: String,
    #[serde(rename = "displayName")]
    display_name: String,
    phone: Option<String>,
    #[serde(rename = "companyName")]
    company_name: Option<String>,
    #[serde(rename = "userType")]
    user_type: UserType,
    #[serde(rename = "isActive")]
    is_active: Option<bool>,
    #[serde(rename = "isOnline")]
    is_online: Option<bool>,
}

#[derive(Serialize)]
struct CreateUserResponse {
    success: bool,
    #[serde(rename = "userId")]
    user_id: String,
    message: String,
}

async fn create_user(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>, ServiceError> {
    let caller = authenticate(&state, &headers).await?;

    let user_id = state
        .provisioning
        .create_user(
            &caller,
            NewUserInput {
                email: req.email,
                password: req.password,
                display_name: req.display_name,
                phone: req.phone,
                company_name: req.company_name,
                user_type: req.user_type,
                is_active: req.is_active,
                is_online: req.is_online,
            },
        )
        .await?;

    Ok(Json(CreateUserResponse {
        success: true,
        user_id,
        message: "Usuário criado com sucesso".to_string(),
    }))
}

#[derive(Deserialize)]
struct DeleteUserRequest {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "userType")]
    user_type: String,
}

async fn delete_user(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<DeleteUserRequest>,
) -> Result<Json<DeletionReport>, ServiceError> {
    let caller = authenticate(&state, &headers).await?;

    let report = state
        .deletion
        .delete_user_completely(&caller, &req.user_id, &req.user_type)
        .await?;

    Ok(Json(report))
}

/// Store-change webhook feeding the trigger pipeline. Returns 202 before the
/// event is handled; delivery upstream is at-least-once.
async fn transactions_hook(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(event): Json<DocumentEvent>,
) -> Response {
    let supplied = headers
        .get("x-webhook-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !constant_time_eq(supplied.as_bytes(), state.webhook_secret.as_bytes()) {
        warn!("Rejected webhook delivery with bad secret");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.event_sender.send(event).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            error!(error = %e, "Trigger channel closed, dropping event");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
