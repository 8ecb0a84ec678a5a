//! HTTP surface of the Veritag verification service.
//!
//! Thin axum wiring over [`veritag_core::VerificationPipeline`]: product
//! registration issues encrypted QR payloads, `/verify` runs the scoring
//! pipeline, and `/alerts` exposes supplier alerts raised by the watcher
//! task. State is shared through `Arc`s; all domain logic lives in
//! `veritag-core`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use veritag_core::alerting::SupplierAlert;
use veritag_core::pipeline::{VerificationPipeline, VerificationRequest};
use veritag_core::store::MemoryStore;
use veritag_core::types::{Product, ProductStatus, QrPayload};
use veritag_core::VeritagError;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VerificationPipeline>,
    pub store: Arc<MemoryStore>,
    pub alerts: Arc<Mutex<Vec<SupplierAlert>>>,
}

/// Build the service router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/products", post(register_product))
        .route("/verify", post(verify))
        .route("/alerts", get(list_alerts))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProductRequest {
    pub org_id: String,
    pub manufacturer_id: String,
    pub name: String,
    pub sku: String,
    pub category: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProductResponse {
    pub product_id: String,
    /// The encrypted payload to print into the product's QR code.
    pub qr_payload: String,
}

/// Register a product and issue its encrypted QR payload.
async fn register_product(
    State(state): State<AppState>,
    Json(req): Json<RegisterProductRequest>,
) -> Result<(StatusCode, Json<RegisterProductResponse>), ApiError> {
    let now = Utc::now();
    let product = Product {
        product_id: Uuid::new_v4().to_string(),
        org_id: req.org_id,
        manufacturer_id: req.manufacturer_id,
        name: req.name,
        sku: req.sku,
        category: req.category,
        status: ProductStatus::Active,
        created_at: now,
    };

    let payload = QrPayload {
        product_id: product.product_id.clone(),
        org_id: product.org_id.clone(),
        manufacturer_id: product.manufacturer_id.clone(),
        issued_at: now,
    };
    let qr_payload = state.pipeline.codec().encode(&payload)?;

    let product_id = product.product_id.clone();
    state.store.insert_product(product).await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterProductResponse {
            product_id,
            qr_payload,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub encrypted_payload: String,
    pub verifier_id: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Run one scan through the verification pipeline.
///
/// Always answers 200 with a verdict when scoring completes; INVALID is
/// a verdict, not an error. Persistence failures map to 500.
async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<veritag_core::VerificationOutcome>, ApiError> {
    let outcome = state
        .pipeline
        .verify(VerificationRequest {
            encrypted_payload: req.encrypted_payload,
            verifier_id: req.verifier_id,
            location: req.location,
            image_url: req.image_url,
        })
        .await?;
    Ok(Json(outcome))
}

/// Supplier alerts raised so far, newest last.
async fn list_alerts(State(state): State<AppState>) -> Json<Vec<SupplierAlert>> {
    Json(state.alerts.lock().await.clone())
}

/// Handler-facing error wrapper mapping core errors onto HTTP statuses.
pub struct ApiError(VeritagError);

impl<E: Into<VeritagError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
