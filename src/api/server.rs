//! API Server Module
//!
//! Provides the Axum application builder and server startup logic.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::middleware::request_logging;
use crate::common::logging::log_system_event;
use super::routes::*;
use crate::settlement::{create_shared_service, SettlementService, SharedSettlement};

/// Application state shared by all handlers
pub struct AppState {
    /// Settlement service; commands take the write lock
    pub settlement: SharedSettlement,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn new(settlement: SharedSettlement) -> SharedAppState {
        Arc::new(Self { settlement })
    }
}

/// Create the API router with all endpoints
pub fn create_router(settlement: SharedSettlement) -> Router {
    let state = AppState::new(settlement);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        // Deposits and sweeps
        .route("/api/deposits", post(handle_reveal_deposit))
        .route("/api/deposits/:key", get(handle_get_deposit))
        .route("/api/sweeps", post(handle_settle_sweep))
        // Reservations
        .route("/api/reservations", post(handle_reserve))
        .route("/api/reservations/:hash", get(handle_get_reservation))
        .route("/api/reservations/:hash/redeem", post(handle_redeem))
        .route("/api/reservations/:hash/liquidate", post(handle_liquidate))
        .route(
            "/api/depositors/:id/reservations",
            get(handle_depositor_reservations),
        )
        .route(
            "/api/priority-redemptions/:hash",
            get(handle_get_priority_redemption),
        )
        // Setup
        .route("/api/wallets", post(handle_register_wallet))
        .route("/api/wallets/:pkh", get(handle_get_wallet))
        .route("/api/wallets/:pkh/state", post(handle_set_wallet_state))
        .route("/api/vaults", post(handle_set_vault_status))
        // Ledger and event log
        .route("/api/balances/:id", get(handle_get_balance))
        .route("/api/events", get(handle_get_events))
        .layer(middleware::from_fn(request_logging))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(service: SettlementService, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(create_shared_service(service));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== BTC Settlement API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /api/deposits                       - Reveal a deposit");
    println!("  GET  /api/deposits/:key                  - Deposit status");
    println!("  POST /api/sweeps                         - Settle a proven sweep");
    println!("  POST /api/reservations                   - Reserve a funding UTXO");
    println!("  GET  /api/reservations/:hash             - Reservation status");
    println!("  POST /api/reservations/:hash/redeem      - Redeem before expiry");
    println!("  POST /api/reservations/:hash/liquidate   - Liquidate after expiry");
    println!("  GET  /api/depositors/:id/reservations    - Reservations of a depositor");
    println!("  GET  /api/balances/:id                   - Ledger balance");
    println!("  GET  /api/events?after=N                 - Event log");
    println!("  GET  /api/health                         - Health check");
    println!();

    log_system_event(
        "settlement API listening",
        serde_json::json!({ "addr": addr.to_string() }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::btc::hash::double_sha256;
    use crate::btc::{
        BitcoinTxInfo, MemoryHeaderRelay, MerkleProofValidator, RelayedHeader, SpvProof,
    };
    use crate::ledger::MemoryLedger;
    use crate::settlement::reveal::FundingReveal;
    use crate::settlement::test_support::{funding_tx, sweep_tx, WALLET};
    use crate::settlement::{FixedClock, RevealRequest, SweepRequest};
    use crate::storage::MemoryStore;
    use crate::types::{SettlementParams, TxHash};

    const NOW: u64 = 1_700_000_000;

    async fn app() -> (Router, Arc<MemoryHeaderRelay>) {
        let params = SettlementParams::default();
        let relay = Arc::new(MemoryHeaderRelay::new());
        let service = SettlementService::load(
            params.clone(),
            Arc::new(MemoryStore::new()),
            Box::new(MemoryLedger::new(params.bridge.clone())),
            Arc::new(MerkleProofValidator::new(relay.clone(), 6)),
            Arc::new(FixedClock::new(NOW)),
        )
        .await
        .unwrap();
        (create_router(create_shared_service(service)), relay)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        caller: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(caller) = caller {
            builder = builder.header("x-caller-id", caller);
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Relay a six-deep block holding only `tx` and prove `tx` in it
    fn single_tx_proof(relay: &MemoryHeaderRelay, tx: &BitcoinTxInfo) -> SpvProof {
        let block_hash = double_sha256(&tx.hash().0);
        relay.insert(RelayedHeader {
            block_hash,
            merkle_root: tx.hash().0,
            height: 100,
        });
        relay.set_tip(105);
        SpvProof {
            block_hash,
            siblings: vec![],
            tx_index: 0,
        }
    }

    async fn register_live_wallet(app: &Router) {
        let (status, _) = send(
            app,
            "POST",
            "/api/wallets",
            None,
            Some(json!({ "wallet_pubkey_hash": WALLET, "state": "live" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    fn reveal_body(seed: u8, amount: u64) -> (RevealRequest, Value) {
        let request = RevealRequest {
            funding: FundingReveal {
                funding_tx: funding_tx(seed, &[amount]),
                funding_output_index: 0,
                wallet_pubkey_hash: WALLET,
                vault: None,
            },
            extra_data: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        (request, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _relay) = app().await;
        let (status, body) = send(&app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_commands_require_caller() {
        let (app, _relay) = app().await;
        register_live_wallet(&app).await;
        let (_, body) = reveal_body(1, 2_000_000);

        let (status, error) = send(&app, "POST", "/api/deposits", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], "MISSING_CALLER");
        assert_eq!(error["category"], "malformed");
    }

    #[tokio::test]
    async fn test_reveal_sweep_and_balance() {
        let (app, relay) = app().await;
        register_live_wallet(&app).await;
        let (request, body) = reveal_body(1, 2_000_000);

        let (status, deposit) =
            send(&app, "POST", "/api/deposits", Some("alice"), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(deposit["status"], "revealed");
        assert_eq!(deposit["amount"], 2_000_000);
        let key = deposit["key"].as_str().unwrap().to_string();

        let tx = sweep_tx(&[(request.funding.funding_tx.hash(), 0)], 1_990_000, WALLET);
        let sweep = SweepRequest {
            wallet_pubkey_hash: WALLET,
            proof: single_tx_proof(&relay, &tx),
            sweep_tx: tx,
            main_utxo: None,
            vault: None,
        };
        let (status, outcome) = send(
            &app,
            "POST",
            "/api/sweeps",
            Some("relayer"),
            Some(serde_json::to_value(&sweep).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["total_fee"], 10_000);

        let (_, deposit) = send(&app, "GET", &format!("/api/deposits/{}", key), None, None).await;
        assert_eq!(deposit["status"], "swept");

        let (_, balance) = send(&app, "GET", "/api/balances/alice", None, None).await;
        assert_eq!(balance["balance"], 1_989_000);

        let (_, events) = send(&app, "GET", "/api/events?after=2", None, None).await;
        assert_eq!(events["events"].as_array().unwrap().len(), 3);
        assert_eq!(events["events"][0]["type"], "deposit_settled");
    }

    #[tokio::test]
    async fn test_unknown_sweep_input_is_422() {
        let (app, relay) = app().await;
        register_live_wallet(&app).await;

        let tx = sweep_tx(&[(TxHash([9u8; 32]), 0)], 1_000_000, WALLET);
        let sweep = SweepRequest {
            wallet_pubkey_hash: WALLET,
            proof: single_tx_proof(&relay, &tx),
            sweep_tx: tx,
            main_utxo: None,
            vault: None,
        };
        let (status, error) = send(
            &app,
            "POST",
            "/api/sweeps",
            Some("relayer"),
            Some(serde_json::to_value(&sweep).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["code"], "UNKNOWN_SWEEP_INPUT");
        assert_eq!(error["category"], "unknown_input");
    }

    #[tokio::test]
    async fn test_unrelayed_block_is_409() {
        let (app, _relay) = app().await;
        register_live_wallet(&app).await;
        let (request, body) = reveal_body(1, 2_000_000);
        send(&app, "POST", "/api/deposits", Some("alice"), Some(body)).await;

        let tx = sweep_tx(&[(request.funding.funding_tx.hash(), 0)], 1_990_000, WALLET);
        let sweep = SweepRequest {
            wallet_pubkey_hash: WALLET,
            proof: SpvProof {
                block_hash: tx.hash().0,
                siblings: vec![],
                tx_index: 0,
            },
            sweep_tx: tx,
            main_utxo: None,
            vault: None,
        };
        let (status, error) = send(
            &app,
            "POST",
            "/api/sweeps",
            Some("alice"),
            Some(serde_json::to_value(&sweep).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["code"], "PROOF_UNKNOWN_BLOCK");

        let (_, balance) = send(&app, "GET", "/api/balances/alice", None, None).await;
        assert_eq!(balance["balance"], 0);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let (app, _relay) = app().await;

        let (status, error) = send(&app, "GET", "/api/reservations/zz", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], "INVALID_KEY");

        let missing = "00".repeat(32);
        let (status, error) = send(
            &app,
            "GET",
            &format!("/api/reservations/{}", missing),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["category"], "not_found");

        let (status, error) = send(
            &app,
            "POST",
            &format!("/api/reservations/{}/redeem", missing),
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["code"], "RESERVATION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_precondition_is_409() {
        let (app, _relay) = app().await;
        register_live_wallet(&app).await;
        let (_, body) = reveal_body(1, 2_000_000);

        let (status, _) =
            send(&app, "POST", "/api/deposits", Some("alice"), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, error) = send(&app, "POST", "/api/deposits", Some("alice"), Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["code"], "DEPOSIT_ALREADY_REVEALED");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (app, _relay) = app().await;
        let (status, error) = send(
            &app,
            "POST",
            "/api/sweeps",
            Some("relayer"),
            Some(json!({ "wallet_pubkey_hash": "nothex" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], "INVALID_BODY");
    }
}
