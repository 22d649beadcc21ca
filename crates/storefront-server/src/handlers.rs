//! HTTP Handlers

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use storefront_core::UserPurchases;
use storefront_payments::{
    CheckoutRequest, PageRequest, PaymentProvider, PricingTable, ProductPage, SIGNATURE_HEADER,
    WebhookHandler,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database_connected: bool,
    pub payments_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutParams {
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub checkout_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PortalParams {
    pub customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelParams {
    pub subscription_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: &'static str,
}

/// Treat `?id=` like a missing parameter
fn required(param: Option<String>) -> Result<String, ApiError> {
    param
        .filter(|p| !p.trim().is_empty())
        .ok_or(ApiError::Unauthorized)
}

fn payments(state: &AppState) -> Result<&Arc<dyn PaymentProvider>, ApiError> {
    state.payments.as_ref().ok_or(ApiError::PaymentsDisabled)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        database_connected: state.store.health_check().await,
        payments_configured: state.payments.is_some(),
    })
}

/// List catalogue products
pub async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<ProductPage>, ApiError> {
    let products = payments(&state)?
        .search_products(page)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch products", e))?;

    Ok(Json(products))
}

/// Hosted pricing table
pub async fn pricing_table(State(state): State<AppState>) -> Result<Json<PricingTable>, ApiError> {
    let table_id = state
        .settings
        .pricing_table_id
        .as_deref()
        .ok_or(ApiError::NotConfigured("Pricing table"))?;

    let table = payments(&state)?
        .pricing_table(table_id)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch pricing table", e))?;

    Ok(Json(table))
}

/// Create a checkout session for the signed-in user
pub async fn create_checkout(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(params): Query<CheckoutParams>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let product_id = required(params.product_id)?;
    let provider = payments(&state)?;

    let request = CheckoutRequest::for_user(product_id, &user, state.settings.success_url.clone());
    let session = provider
        .create_checkout(&request)
        .await
        .map_err(|e| ApiError::upstream("Failed to create checkout session", e))?;

    Ok(Json(CheckoutResponse {
        success: true,
        checkout_url: session.checkout_url,
    }))
}

/// Customer portal login link
pub async fn customer_portal(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PortalParams>,
) -> Result<Json<PortalResponse>, ApiError> {
    let customer_id = required(params.customer_id)?;

    let url = payments(&state)?
        .customer_portal_link(&customer_id)
        .await
        .map_err(|e| ApiError::upstream("Failed to create customer portal link", e))?;

    tracing::info!(user_id = %user.user_id, customer_id = %customer_id, "Issued customer portal link");
    Ok(Json(PortalResponse { url }))
}

/// Ask Creem to cancel a subscription
pub async fn cancel_subscription(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(params): Query<CancelParams>,
) -> Result<StatusCode, ApiError> {
    let subscription_id = required(params.subscription_id)?;

    payments(&state)?
        .cancel_subscription(&subscription_id)
        .await
        .map_err(|e| ApiError::upstream("Failed to cancel subscription", e))?;

    tracing::info!(user_id = %user.user_id, subscription_id = %subscription_id, "Cancellation requested");
    Ok(StatusCode::OK)
}

/// Purchase history of the signed-in user
pub async fn account(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserPurchases>, ApiError> {
    let (subscriptions, purchases) = tokio::try_join!(
        state.store.subscriptions_for_user(&user.user_id),
        state.store.purchases_for_user(&user.user_id),
    )?;

    tracing::debug!(
        user_id = %user.user_id,
        subscriptions = subscriptions.len(),
        purchases = purchases.len(),
        "Loaded account"
    );

    Ok(Json(UserPurchases::new(subscriptions, purchases)))
}

/// Creem webhook handler
pub async fn creem_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let handler = WebhookHandler::new(state.store.clone());

    let event = handler
        .parse_event(&body, signature, state.settings.webhook_secret.as_deref())
        .map_err(ApiError::Webhook)?;

    let outcome = handler.handle(event).await.map_err(ApiError::Webhook)?;
    tracing::info!(?outcome, "Webhook processed");

    Ok(Json(WebhookAck {
        success: true,
        message: "Webhook received successfully",
    }))
}
