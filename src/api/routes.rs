//! API Route Handlers
//!
//! - POST /api/deposits - Reveal a deposit
//! - GET /api/deposits/:key - Deposit status
//! - POST /api/sweeps - Settle a proven sweep
//! - POST /api/reservations - Reserve a funding UTXO
//! - GET /api/reservations/:hash - Reservation status and expiry
//! - POST /api/reservations/:hash/redeem - Redeem before expiry
//! - POST /api/reservations/:hash/liquidate - Liquidate after expiry
//! - GET /api/depositors/:id/reservations - Reservations of a depositor
//! - GET /api/priority-redemptions/:hash - Priority redemption by UTXO hash
//! - POST /api/wallets - Register a wallet
//! - GET /api/wallets/:pkh - Wallet view with pending priority redemptions
//! - POST /api/wallets/:pkh/state - Move a wallet to another state
//! - POST /api/vaults - Set vault trust
//! - GET /api/balances/:id - Ledger balance
//! - GET /api/events?after=N - Event log tail
//! - GET /api/health - Health check
//!
//! Commands read the caller from the `x-caller-id` header.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::error::ApiError;
use super::middleware::Caller;
use super::server::SharedAppState;
use crate::settlement::{ReserveRequest, RevealRequest, SweepRequest};
use crate::types::{
    sats_to_btc_string, DepositKey, DepositStatusResponse, Identity, PubKeyHash,
    ReservationStatusResponse, WalletState,
};

/// Unwrap a JSON body, mapping extractor failures to a malformed-input error
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::malformed("INVALID_BODY", e.body_text()))
}

fn parse_key(raw: &str) -> Result<DepositKey, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::malformed("INVALID_KEY", format!("not a 32-byte hex key: {}", raw)))
}

fn parse_pubkey_hash(raw: &str) -> Result<PubKeyHash, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::malformed(
            "INVALID_WALLET",
            format!("not a 20-byte hex pubkey hash: {}", raw),
        )
    })
}

// =============================================================================
// Deposits and Sweeps
// =============================================================================

/// POST /api/deposits
pub async fn handle_reveal_deposit(
    State(state): State<SharedAppState>,
    Caller(caller): Caller,
    payload: Result<Json<RevealRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body(payload)?;
    let mut settlement = state.settlement.write().await;

    let key = settlement.reveal_deposit(&caller, &request).await?;
    let response = settlement
        .deposit(&key)
        .map(DepositStatusResponse::from)
        .ok_or_else(|| ApiError::not_found("DEPOSIT_NOT_FOUND", key.to_string()))?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/deposits/:key
pub async fn handle_get_deposit(
    State(state): State<SharedAppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key = parse_key(&key)?;
    let settlement = state.settlement.read().await;

    let record = settlement.deposit(&key).ok_or_else(|| {
        ApiError::not_found("DEPOSIT_NOT_FOUND", format!("deposit {} not found", key))
    })?;
    Ok(Json(DepositStatusResponse::from(record)))
}

/// POST /api/sweeps
pub async fn handle_settle_sweep(
    State(state): State<SharedAppState>,
    Caller(caller): Caller,
    payload: Result<Json<SweepRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body(payload)?;
    let mut settlement = state.settlement.write().await;

    let outcome = settlement.settle_sweep(&caller, &request).await?;
    Ok(Json(outcome))
}

// =============================================================================
// Reservations
// =============================================================================

/// POST /api/reservations
pub async fn handle_reserve(
    State(state): State<SharedAppState>,
    Caller(caller): Caller,
    payload: Result<Json<ReserveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body(payload)?;
    let mut settlement = state.settlement.write().await;

    let record = settlement.reserve(&caller, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReservationStatusResponse::from(&record)),
    ))
}

/// GET /api/reservations/:hash
pub async fn handle_get_reservation(
    State(state): State<SharedAppState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let utxo_hash = parse_key(&hash)?;
    let settlement = state.settlement.read().await;

    let record = settlement.reservation(&utxo_hash).ok_or_else(|| {
        ApiError::not_found(
            "RESERVATION_NOT_FOUND",
            format!("reservation {} not found", utxo_hash),
        )
    })?;
    Ok(Json(ReservationStatusResponse::from(record)))
}

/// POST /api/reservations/:hash/redeem
pub async fn handle_redeem(
    State(state): State<SharedAppState>,
    Caller(caller): Caller,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let utxo_hash = parse_key(&hash)?;
    let mut settlement = state.settlement.write().await;

    let redemption = settlement.redeem(&caller, &utxo_hash).await?;
    Ok(Json(redemption))
}

/// POST /api/reservations/:hash/liquidate
pub async fn handle_liquidate(
    State(state): State<SharedAppState>,
    Caller(caller): Caller,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let utxo_hash = parse_key(&hash)?;
    let mut settlement = state.settlement.write().await;

    let bonus = settlement.liquidate(&caller, &utxo_hash).await?;
    Ok(Json(serde_json::json!({
        "utxo_hash": utxo_hash,
        "liquidator": caller,
        "liquidation_bonus": bonus,
    })))
}

/// GET /api/depositors/:id/reservations
pub async fn handle_depositor_reservations(
    State(state): State<SharedAppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let depositor = Identity::new(id);
    let settlement = state.settlement.read().await;

    let reservations: Vec<ReservationStatusResponse> = settlement
        .reservations_of(&depositor)
        .into_iter()
        .map(ReservationStatusResponse::from)
        .collect();

    Json(serde_json::json!({
        "depositor": depositor,
        "reservations": reservations,
    }))
}

/// GET /api/priority-redemptions/:hash
pub async fn handle_get_priority_redemption(
    State(state): State<SharedAppState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let utxo_hash = parse_key(&hash)?;
    let settlement = state.settlement.read().await;

    let redemption = settlement.priority_redemption(&utxo_hash).ok_or_else(|| {
        ApiError::not_found(
            "PRIORITY_REDEMPTION_NOT_FOUND",
            format!("no priority redemption for {}", utxo_hash),
        )
    })?;
    Ok(Json(redemption.clone()))
}

// =============================================================================
// Wallets and Vaults
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterWalletRequest {
    pub wallet_pubkey_hash: PubKeyHash,
    pub state: WalletState,
}

#[derive(Debug, Deserialize)]
pub struct WalletStateRequest {
    pub state: WalletState,
}

#[derive(Debug, Deserialize)]
pub struct VaultStatusRequest {
    pub vault: Identity,
    pub trusted: bool,
}

/// POST /api/wallets
pub async fn handle_register_wallet(
    State(state): State<SharedAppState>,
    payload: Result<Json<RegisterWalletRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body(payload)?;
    let mut settlement = state.settlement.write().await;

    settlement
        .register_wallet(request.wallet_pubkey_hash, request.state)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(settlement.wallet(&request.wallet_pubkey_hash).cloned()),
    ))
}

/// GET /api/wallets/:pkh
pub async fn handle_get_wallet(
    State(state): State<SharedAppState>,
    Path(pkh): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pubkey_hash = parse_pubkey_hash(&pkh)?;
    let settlement = state.settlement.read().await;

    let wallet = settlement.wallet(&pubkey_hash).ok_or_else(|| {
        ApiError::not_found("UNKNOWN_WALLET", format!("wallet {} not registered", pubkey_hash))
    })?;

    Ok(Json(serde_json::json!({
        "wallet": wallet,
        "pending_priority_redemptions": settlement.pending_priority_redemptions(&pubkey_hash),
    })))
}

/// POST /api/wallets/:pkh/state
pub async fn handle_set_wallet_state(
    State(state): State<SharedAppState>,
    Path(pkh): Path<String>,
    payload: Result<Json<WalletStateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let pubkey_hash = parse_pubkey_hash(&pkh)?;
    let request = body(payload)?;
    let mut settlement = state.settlement.write().await;

    settlement
        .set_wallet_state(pubkey_hash, request.state)
        .await?;
    Ok(Json(settlement.wallet(&pubkey_hash).cloned()))
}

/// POST /api/vaults
pub async fn handle_set_vault_status(
    State(state): State<SharedAppState>,
    payload: Result<Json<VaultStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body(payload)?;
    let mut settlement = state.settlement.write().await;

    settlement
        .set_vault_status(request.vault.clone(), request.trusted)
        .await?;
    Ok(Json(serde_json::json!({
        "vault": request.vault,
        "trusted": request.trusted,
    })))
}

// =============================================================================
// Ledger, Events and Health
// =============================================================================

/// GET /api/balances/:id
pub async fn handle_get_balance(
    State(state): State<SharedAppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let account = Identity::new(id);
    let settlement = state.settlement.read().await;
    let balance = settlement.balance_of(&account);

    Json(serde_json::json!({
        "account": account,
        "balance": balance,
        "balance_btc": sats_to_btc_string(balance),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: u64,
}

/// GET /api/events?after=N
pub async fn handle_get_events(
    State(state): State<SharedAppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let settlement = state.settlement.read().await;

    Json(serde_json::json!({
        "after": query.after,
        "events": settlement.events_since(query.after),
    }))
}

/// GET /api/health
pub async fn handle_health(State(state): State<SharedAppState>) -> impl IntoResponse {
    let settlement = state.settlement.read().await;

    Json(serde_json::json!({
        "status": "ok",
        "service": "btc-settlement",
        "version": env!("CARGO_PKG_VERSION"),
        "events": settlement.events_since(0).len(),
    }))
}
