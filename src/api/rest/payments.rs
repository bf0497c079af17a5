use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::payment::{
    PaymentMethodConfig, Transaction, TransactionType, Wallet, payment_methods,
};
use crate::services::payments;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments/methods", get(list_methods))
        .route("/payments/wallet", get(wallet))
        .route("/payments/transactions", get(list_transactions))
        .route("/payments/deposit", post(deposit))
        .route("/payments/withdraw", post(withdraw))
        .route("/payments/shipments/:id/pay", post(pay_for_shipment))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MethodsQuery {
    /// Only list methods accepting this amount, with the fee it would incur.
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentMethodQuote {
    #[serde(flatten)]
    pub method: PaymentMethodConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletResponse {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub available_balance: Decimal,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionFilter {
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AmountRequest {
    pub amount: Decimal,
    pub payment_method: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/methods",
    tag = "payments",
    params(MethodsQuery),
    responses((status = 200, description = "Available payment methods", body = [PaymentMethodQuote]))
)]
pub async fn list_methods(Query(query): Query<MethodsQuery>) -> Json<Vec<PaymentMethodQuote>> {
    let quotes = payment_methods()
        .into_iter()
        .filter(|m| query.amount.is_none_or(|amount| m.accepts(amount)))
        .map(|method| PaymentMethodQuote {
            fee: query.amount.map(|amount| method.fee_for(amount)),
            method,
        })
        .collect();
    Json(quotes)
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/wallet",
    tag = "payments",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Wallet balances", body = WalletResponse))
)]
pub async fn wallet(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<WalletResponse> {
    let wallet = payments::wallet_snapshot(&state, user.id);
    Json(WalletResponse {
        available_balance: wallet.available(),
        wallet,
    })
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<TransactionFilter>,
) -> Json<Vec<Transaction>> {
    let mut transactions: Vec<Transaction> = state
        .transactions
        .iter()
        .filter(|t| t.user_id == user.id)
        .filter(|t| {
            filter
                .transaction_type
                .is_none_or(|kind| t.transaction_type == kind)
        })
        .map(|t| t.value().clone())
        .collect();
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(transactions)
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/deposit",
    tag = "payments",
    security(("bearerAuth" = [])),
    request_body = AmountRequest,
    responses(
        (status = 201, description = "Deposit recorded, pending for cash and bank transfer", body = Transaction),
        (status = 400, description = "Amount out of range or unknown method", body = ErrorResponse),
    )
)]
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<AmountRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let transaction = payments::deposit(
        &state,
        user.id,
        payload.amount,
        payload.payment_method.trim(),
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/withdraw",
    tag = "payments",
    security(("bearerAuth" = [])),
    request_body = AmountRequest,
    responses(
        (status = 201, description = "Withdrawal recorded", body = Transaction),
        (status = 409, description = "Insufficient funds", body = ErrorResponse),
    )
)]
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<AmountRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let transaction = payments::withdraw(
        &state,
        user.id,
        payload.amount,
        payload.payment_method.trim(),
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/shipments/{id}/pay",
    tag = "payments",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Shipment id")),
    responses(
        (status = 201, description = "Price held in escrow until delivery", body = Transaction),
        (status = 409, description = "Not matched, already paid or insufficient funds", body = ErrorResponse),
    )
)]
pub async fn pay_for_shipment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let transaction = payments::pay_for_shipment(&state, user.id, id, Utc::now())?;
    Ok((StatusCode::CREATED, Json(transaction)))
}
