//! # REST + JSON-RPC API
//!
//! The axum router frontends poll for escrow state. Handlers share the
//! runtime through axum's `State`; reads take the read lock, writes the
//! write lock, and no handler awaits while holding either.
//!
//! ## Endpoints
//!
//! | Method | Path                                | Description                          |
//! |--------|-------------------------------------|--------------------------------------|
//! | GET    | `/health`                           | Liveness probe                       |
//! | GET    | `/status`                           | Chain and contract summary           |
//! | POST   | `/rpc`                              | JSON-RPC 2.0 gateway                 |
//! | GET    | `/escrows`                          | Every escrow, by id                  |
//! | GET    | `/escrows/:id`                      | One escrow                           |
//! | GET    | `/users/:address/escrows`           | Escrows an account initiated         |
//! | GET    | `/active/:initiator/:beneficiary`   | Active escrow id for a pair (0: none)|
//! | GET    | `/balances/:token`                  | Contract balance (`native` or token) |
//! | GET    | `/events?since=N`                   | Contract event log from index N      |
//! | GET    | `/tokens`                           | Registered tokens                    |
//! | GET    | `/accounts/:address`                | Native + token balances and nonce    |
//!
//! Amounts are decimal strings throughout.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use escrow_contracts::{CallError, CallReceipt, EscrowError, EscrowTransaction, LoggedEvent, SignedCall};
use escrow_protocol::config::MAX_EVENTS_PER_RESPONSE;
use escrow_protocol::storage::StateStore;
use escrow_protocol::{Address, Asset, TokenInfo};

use crate::metrics::SharedMetrics;
use crate::runtime::{FaucetError, Runtime};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    pub runtime: Arc<RwLock<Runtime>>,
    pub store: Arc<StateStore>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Saves the snapshot. Failures are logged and counted; the in-memory
    /// state stays authoritative and the next block retries.
    pub fn persist(&self, runtime: &Runtime) {
        if let Err(e) = runtime.persist(&self.store) {
            self.metrics.snapshot_failures_total.inc();
            tracing::error!(error = %e, height = runtime.chain.height(), "failed to persist snapshot");
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/escrows", get(escrows_handler))
        .route("/escrows/:id", get(escrow_by_id_handler))
        .route("/users/:address/escrows", get(user_escrows_handler))
        .route("/active/:initiator/:beneficiary", get(active_escrow_handler))
        .route("/balances/:token", get(balance_handler))
        .route("/events", get(events_handler))
        .route("/tokens", get(tokens_handler))
        .route("/accounts/:address", get(account_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    /// Positional parameters.
    pub params: Option<serde_json::Value>,
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Error code for contract reverts, signature and nonce failures.
pub const CONTRACT_ERROR_CODE: i32 = -32000;

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, format!("Invalid params: {}", message.into()))
    }

    /// `-32000` with the ABI error name in `data.name`.
    fn contract(name: &str, message: impl Into<String>) -> Self {
        Self {
            code: CONTRACT_ERROR_CODE,
            message: message.into(),
            data: Some(serde_json::json!({ "name": name })),
        }
    }
}

impl From<EscrowError> for JsonRpcError {
    fn from(e: EscrowError) -> Self {
        Self::contract(e.name(), e.to_string())
    }
}

impl From<CallError> for JsonRpcError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Encoding(msg) => Self::invalid_params(msg),
            other => Self::contract(other.name(), other.to_string()),
        }
    }
}

type RpcResult = Result<serde_json::Value, JsonRpcError>;

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub chain_id: u64,
    pub block_height: u64,
    /// Latest block time, unix seconds.
    pub block_timestamp: u64,
    pub contract: Address,
    pub owner: Address,
    pub paused: bool,
    pub custody: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<Address>,
    pub escrow_count: u64,
    /// ISO-8601 server time of the response.
    pub timestamp: String,
}

/// `GET /users/:address/escrows`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEscrowsResponse {
    pub address: Address,
    pub ids: Vec<u64>,
    pub escrows: Vec<EscrowTransaction>,
}

/// `GET /balances/:token`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Zero address for native.
    pub token: Address,
    /// The contract's own balance.
    pub balance: String,
    /// The contract's pool position (yield custody only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pooled: Option<String>,
    /// Sum of active escrows in this asset.
    pub locked: String,
}

/// One token balance of an account.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: Address,
    pub symbol: String,
    pub balance: String,
}

/// `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub native: String,
    /// Next nonce for signed calls.
    pub nonce: u64,
    pub tokens: Vec<TokenBalance>,
}

/// `escrow_sendTransaction` result.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResult {
    pub caller: Address,
    #[serde(flatten)]
    pub receipt: CallReceipt,
}

/// `escrow_faucet` parameters.
#[derive(Debug, Deserialize)]
pub struct FaucetRequest {
    /// `native`, a devnet symbol, or a token address.
    pub asset: String,
    pub to: Address,
    /// Whole tokens.
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

/// Error body for REST endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// ABI error name, for contract errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>, name: Option<&str>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            name: name.map(str::to_string),
        }),
    )
        .into_response()
}

fn parse_address(raw: &str) -> Result<Address, Response> {
    raw.parse::<Address>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string(), None))
}

// ---------------------------------------------------------------------------
// REST Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the process is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state.runtime.read();
    let contract = &runtime.contract;
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        chain_id: runtime.chain.chain_id(),
        block_height: runtime.chain.height(),
        block_timestamp: runtime.chain.timestamp(),
        contract: contract.address(),
        owner: contract.owner(),
        paused: contract.paused(),
        custody: contract.custody_kind().to_string(),
        pool: contract.pool_address(&runtime.chain),
        escrow_count: contract.counter_escrow_transactions(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn escrows_handler(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state.runtime.read();
    Json(runtime.contract.get_all_escrows_tx().to_vec())
}

async fn escrow_by_id_handler(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let runtime = state.runtime.read();
    match runtime.contract.get_escrow_transaction(id) {
        Ok(tx) => Json(tx.clone()).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string(), Some(e.name())),
    }
}

async fn user_escrows_handler(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let address = match parse_address(&raw) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let runtime = state.runtime.read();
    let contract = &runtime.contract;
    let ids = contract.get_user_escrows(&address).to_vec();
    let escrows = ids
        .iter()
        .filter_map(|id| contract.get_escrow_transaction(*id).ok().cloned())
        .collect();
    Json(UserEscrowsResponse { address, ids, escrows }).into_response()
}

async fn active_escrow_handler(
    State(state): State<AppState>,
    Path((initiator, beneficiary)): Path<(String, String)>,
) -> Response {
    let (initiator, beneficiary) = match (parse_address(&initiator), parse_address(&beneficiary)) {
        (Ok(i), Ok(b)) => (i, b),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    let runtime = state.runtime.read();
    let id = runtime
        .contract
        .get_active_escrow_transaction(&initiator, &beneficiary);
    Json(serde_json::json!({ "id": id })).into_response()
}

/// `GET /balances/:token`. `native` (or the zero address) reads the native
/// balance.
async fn balance_handler(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let runtime = state.runtime.read();
    let contract = &runtime.contract;
    let chain = &runtime.chain;

    let asset = if raw.eq_ignore_ascii_case("native") {
        Asset::Native
    } else {
        match parse_address(&raw) {
            Ok(a) => Asset::from_token_addr(a),
            Err(resp) => return resp,
        }
    };

    let response = match asset {
        Asset::Native => BalanceResponse {
            token: Address::ZERO,
            balance: contract.get_contract_ether_balance(chain).to_string(),
            pooled: None,
            locked: contract.locked_amount(&asset).to_string(),
        },
        Asset::Token(token) => {
            let balance = match contract.get_contract_balance_of(chain, &token) {
                Ok(b) => b,
                Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string(), Some(e.name())),
            };
            BalanceResponse {
                token,
                balance: balance.to_string(),
                pooled: contract
                    .pool_address(chain)
                    .map(|_| contract.get_contract_atoken_balance_of(chain, &token).to_string()),
                locked: contract.locked_amount(&asset).to_string(),
            }
        }
    };
    Json(response).into_response()
}

/// `GET /events?since=N`: at most [`MAX_EVENTS_PER_RESPONSE`] events.
async fn events_handler(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> impl IntoResponse {
    let runtime = state.runtime.read();
    Json(capped_events(runtime.contract.events_since(query.since)))
}

fn capped_events(events: &[LoggedEvent]) -> Vec<LoggedEvent> {
    events
        .iter()
        .take(MAX_EVENTS_PER_RESPONSE)
        .cloned()
        .collect()
}

async fn tokens_handler(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state.runtime.read();
    let tokens: Vec<TokenInfo> = runtime.chain.bank.token_infos();
    Json(tokens)
}

async fn account_handler(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let address = match parse_address(&raw) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let runtime = state.runtime.read();
    let bank = &runtime.chain.bank;
    let tokens = bank
        .token_infos()
        .into_iter()
        .map(|info| TokenBalance {
            balance: bank
                .token(&info.address)
                .map(|t| t.balance_of(&address))
                .unwrap_or(0)
                .to_string(),
            token: info.address,
            symbol: info.symbol,
        })
        .collect();
    Json(AccountResponse {
        address,
        native: bank.native_balance_of(&address).to_string(),
        nonce: runtime.chain.nonce(&address),
        tokens,
    })
    .into_response()
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

/// `POST /rpc`. Unknown methods return -32601.
async fn rpc_handler(State(state): State<AppState>, Json(req): Json<JsonRpcRequest>) -> impl IntoResponse {
    let outcome = if req.jsonrpc != "2.0" {
        Err(JsonRpcError::new(-32600, "Invalid Request: jsonrpc must be \"2.0\""))
    } else {
        dispatch(&state, &req.method, req.params.as_ref())
    };

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn dispatch(state: &AppState, method: &str, params: Option<&serde_json::Value>) -> RpcResult {
    match method {
        "escrow_sendTransaction" => return send_transaction(state, param(params, 0, "signed call")?),
        "escrow_faucet" => return faucet(state, param(params, 0, "{asset, to, amount}")?),
        _ => {}
    }

    let runtime = state.runtime.read();
    let contract = &runtime.contract;
    let chain = &runtime.chain;
    match method {
        "escrow_getEscrowTransaction" => {
            let id: u64 = param(params, 0, "[id]")?;
            to_json(contract.get_escrow_transaction(id)?)
        }
        "escrow_getAllEscrowsTx" => to_json(contract.get_all_escrows_tx()),
        "escrow_getUserEscrows" => {
            let account: Address = param(params, 0, "[address]")?;
            to_json(contract.get_user_escrows(&account))
        }
        "escrow_getActiveEscrowTransaction" => {
            let initiator: Address = param(params, 0, "[initiator, beneficiary]")?;
            let beneficiary: Address = param(params, 1, "[initiator, beneficiary]")?;
            to_json(contract.get_active_escrow_transaction(&initiator, &beneficiary))
        }
        "escrow_getContractEtherBalance" => to_json(contract.get_contract_ether_balance(chain).to_string()),
        "escrow_getContractBalanceOf" => {
            let token: Address = param(params, 0, "[token]")?;
            to_json(contract.get_contract_balance_of(chain, &token)?.to_string())
        }
        "escrow_getContractATokenBalanceOf" => {
            let token: Address = param(params, 0, "[token]")?;
            to_json(contract.get_contract_atoken_balance_of(chain, &token).to_string())
        }
        "escrow_getUserAccountData" => {
            let user: Address = param(params, 0, "[user]")?;
            to_json(contract.get_user_account_data(chain, &user))
        }
        "escrow_getEvents" => {
            let since: u64 = optional_param(params, 0)?.unwrap_or(0);
            to_json(capped_events(contract.events_since(since)))
        }
        "escrow_counter" => to_json(contract.counter_escrow_transactions()),
        "escrow_owner" => to_json(contract.owner()),
        "escrow_paused" => to_json(contract.paused()),
        "escrow_nonce" => {
            let account: Address = param(params, 0, "[address]")?;
            to_json(chain.nonce(&account))
        }
        "escrow_chainId" => to_json(chain.chain_id()),
        "escrow_blockNumber" => to_json(chain.height()),
        "escrow_contractAddress" => to_json(contract.address()),
        _ => Err(JsonRpcError::new(-32601, format!("Method not found: {}", method))),
    }
}

fn send_transaction(state: &AppState, signed: SignedCall) -> RpcResult {
    let method = signed.call.method();
    let timer = state.metrics.call_latency_seconds.start_timer();

    let mut runtime = state.runtime.write();
    let result = runtime.submit(&signed);
    // A verified call consumed its nonce even if it reverted.
    let consumed = matches!(&result, Ok(_) | Err(CallError::Contract(_)));
    if consumed {
        state.persist(&runtime);
        state.metrics.observe(&runtime);
    }
    drop(runtime);
    timer.observe_duration();

    match result {
        Ok((caller, receipt)) => {
            state.metrics.record_call(method, "ok");
            tracing::info!(method, caller = %caller, escrow_id = ?receipt.escrow_id, "call executed");
            to_json(SendTransactionResult { caller, receipt })
        }
        Err(e) => {
            state
                .metrics
                .record_call(method, if consumed { "reverted" } else { "rejected" });
            tracing::debug!(method, error = %e, "call failed");
            Err(e.into())
        }
    }
}

fn faucet(state: &AppState, req: FaucetRequest) -> RpcResult {
    let mut runtime = state.runtime.write();
    let minted = runtime
        .faucet(&req.asset, req.to, req.amount)
        .map_err(|e| match e {
            FaucetError::Token(inner) => JsonRpcError::new(-32603, format!("Internal error: {}", inner)),
            other => JsonRpcError::invalid_params(other.to_string()),
        })?;
    state.persist(&runtime);
    drop(runtime);

    state.metrics.faucet_mints_total.inc();
    to_json(serde_json::json!({ "to": req.to, "amount": minted.to_string() }))
}

fn param<T: DeserializeOwned>(params: Option<&serde_json::Value>, index: usize, expected: &str) -> Result<T, JsonRpcError> {
    optional_param(params, index)?.ok_or_else(|| JsonRpcError::invalid_params(format!("expected {}", expected)))
}

fn optional_param<T: DeserializeOwned>(params: Option<&serde_json::Value>, index: usize) -> Result<Option<T>, JsonRpcError> {
    match params.and_then(|p| p.as_array()).and_then(|a| a.get(index)) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| JsonRpcError::invalid_params(e.to_string())),
    }
}

fn to_json<T: Serialize>(value: T) -> RpcResult {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(-32603, format!("Internal error: {}", e)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use escrow_contracts::{Call, CustodyKind};
    use escrow_protocol::config::devnet_token_label;
    use escrow_protocol::crypto::Keypair;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::metrics::NodeMetrics;
    use crate::runtime::GenesisConfig;

    const GENESIS: u64 = 1_700_000_000;

    fn test_app_state(owner: Address, custody: CustodyKind) -> AppState {
        let store = Arc::new(StateStore::open_temporary().expect("temp store"));
        let runtime = Runtime::genesis(&GenesisConfig {
            owner,
            custody,
            timestamp: GENESIS,
        })
        .expect("genesis");
        AppState {
            version: "0.1.0-test".into(),
            network: "devnet".into(),
            runtime: Arc::new(RwLock::new(runtime)),
            store,
            metrics: Arc::new(NodeMetrics::new().expect("metrics")),
        }
    }

    fn dai() -> Address {
        Address::from_label(&devnet_token_label("DAI"))
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    async fn post_json(router: &Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn rpc(router: &Router, method: &str, params: serde_json::Value) -> serde_json::Value {
        let (status, body) = post_json(
            router,
            "/rpc",
            serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    /// Signs `call` with the account's current nonce and submits it.
    async fn send(router: &Router, state: &AppState, who: &Keypair, value: u128, call: Call) -> serde_json::Value {
        let (chain_id, nonce) = {
            let rt = state.runtime.read();
            (rt.chain.chain_id(), rt.chain.nonce(&who.address()))
        };
        let signed = SignedCall::sign(who, chain_id, nonce, value, call).unwrap();
        rpc(router, "escrow_sendTransaction", serde_json::json!([signed])).await
    }

    async fn fund(router: &Router, asset: &str, to: Address, amount: u64) {
        let body = rpc(
            router,
            "escrow_faucet",
            serde_json::json!([{ "asset": asset, "to": to, "amount": amount }]),
        )
        .await;
        assert!(body["error"].is_null(), "faucet failed: {}", body);
    }

    // -- REST ------------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state(Address::from_label("owner"), CustodyKind::Direct));
        let (status, json) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_contract_summary() {
        let owner = Address::from_label("owner");
        let router = create_router(test_app_state(owner, CustodyKind::Yield));
        let (status, json) = get(&router, "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["owner"], owner.to_string());
        assert_eq!(json["custody"], "yield");
        assert_eq!(json["paused"], false);
        assert_eq!(json["escrowCount"], 0);
        assert_eq!(json["blockTimestamp"], GENESIS);
        assert!(json["pool"].is_string());
    }

    #[tokio::test]
    async fn tokens_lists_devnet_set() {
        let router = create_router(test_app_state(Address::from_label("owner"), CustodyKind::Direct));
        let (status, json) = get(&router, "/tokens").await;
        assert_eq!(status, StatusCode::OK);
        let symbols: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["symbol"].as_str().unwrap().to_string())
            .collect();
        assert!(symbols.contains(&"DAI".to_string()));
        assert!(symbols.contains(&"WBTC".to_string()));
    }

    #[tokio::test]
    async fn unknown_escrow_is_404_with_name() {
        let router = create_router(test_app_state(Address::from_label("owner"), CustodyKind::Direct));
        let (status, json) = get(&router, "/escrows/7").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["name"], "EscrowTxNotFound");
    }

    #[tokio::test]
    async fn malformed_address_is_400() {
        let router = create_router(test_app_state(Address::from_label("owner"), CustodyKind::Direct));
        let (status, _) = get(&router, "/users/not-an-address/escrows").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(&router, "/balances/0x12").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_token_balance_is_404() {
        let router = create_router(test_app_state(Address::from_label("owner"), CustodyKind::Direct));
        let path = format!("/balances/{}", Address::from_label("nope"));
        let (status, json) = get(&router, &path).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["name"], "TokenNotSupported");
    }

    // -- JSON-RPC ----------------------------------------------------------------

    #[tokio::test]
    async fn rpc_rejects_bad_version_and_unknown_method() {
        let router = create_router(test_app_state(Address::from_label("owner"), CustodyKind::Direct));
        let (_, body) = post_json(
            &router,
            "/rpc",
            serde_json::json!({ "jsonrpc": "1.0", "method": "escrow_counter", "id": 1 }),
        )
        .await;
        assert_eq!(body["error"]["code"], -32600);

        let body = rpc(&router, "escrow_mine", serde_json::json!([])).await;
        assert_eq!(body["error"]["code"], -32601);

        let body = rpc(&router, "escrow_getEscrowTransaction", serde_json::json!([])).await;
        assert_eq!(body["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn escrow_lifecycle_over_rpc_and_rest() {
        let owner = Keypair::generate();
        let alice = Keypair::generate();
        let bob = Address::from_label("bob");
        let state = test_app_state(owner.address(), CustodyKind::Direct);
        let router = create_router(state.clone());
        let escrow = state.runtime.read().contract.address();

        fund(&router, "DAI", alice.address(), 10).await;
        let body = send(
            &router,
            &state,
            &alice,
            0,
            Call::TokenApprove {
                token: dai(),
                spender: escrow,
                amount: 500,
            },
        )
        .await;
        assert!(body["error"].is_null(), "{}", body);

        let create = Call::CreateEscrowTransaction {
            beneficiary: bob,
            token_addr: dai(),
            token_amount: 500,
            unlock_time: GENESIS,
        };
        let body = send(&router, &state, &alice, 0, create.clone()).await;
        assert_eq!(body["result"]["escrowId"], 1);
        assert_eq!(body["result"]["caller"], alice.address().to_string());
        assert_eq!(body["result"]["events"][0]["event"]["TransactionCreated"]["tokenAmount"], "500");

        // A second escrow for the same pair reverts with the ABI name.
        let body = send(&router, &state, &alice, 0, create).await;
        assert_eq!(body["error"]["code"], CONTRACT_ERROR_CODE);
        assert_eq!(body["error"]["data"]["name"], "AlreadyActiveEscrowTx");

        let (_, json) = get(&router, &format!("/active/{}/{}", alice.address(), bob)).await;
        assert_eq!(json["id"], 1);
        let (_, json) = get(&router, &format!("/balances/{}", dai())).await;
        assert_eq!(json["balance"], "500");
        assert_eq!(json["locked"], "500");

        let body = send(&router, &state, &alice, 0, Call::ApproveEscrowTransaction { id: 1 }).await;
        assert!(body["error"].is_null(), "{}", body);

        let (_, json) = get(&router, "/escrows/1").await;
        assert_eq!(json["status"], 1); // Approved
        let (_, json) = get(&router, &format!("/users/{}/escrows", alice.address())).await;
        assert_eq!(json["ids"], serde_json::json!([1]));
        let (_, json) = get(&router, "/events?since=1").await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert!(json[0]["event"]["TransactionApproved"].is_object());

        // Four submissions, including the reverted one, all used nonces.
        let body = rpc(&router, "escrow_nonce", serde_json::json!([alice.address()])).await;
        assert_eq!(body["result"], 4);
        let body = rpc(&router, "escrow_counter", serde_json::json!([])).await;
        assert_eq!(body["result"], 1);
    }

    #[tokio::test]
    async fn stale_nonce_and_bad_signature_are_rejected() {
        let owner = Keypair::generate();
        let state = test_app_state(owner.address(), CustodyKind::Direct);
        let router = create_router(state.clone());
        let chain_id = state.runtime.read().chain.chain_id();

        let signed = SignedCall::sign(&owner, chain_id, 5, 0, Call::Pause).unwrap();
        let body = rpc(&router, "escrow_sendTransaction", serde_json::json!([signed])).await;
        assert_eq!(body["error"]["data"]["name"], "InvalidNonce");

        let mut signed = SignedCall::sign(&owner, chain_id, 0, 0, Call::Pause).unwrap();
        signed.call = Call::Unpause;
        let body = rpc(&router, "escrow_sendTransaction", serde_json::json!([signed])).await;
        assert_eq!(body["error"]["data"]["name"], "InvalidSignature");

        let body = rpc(&router, "escrow_paused", serde_json::json!([])).await;
        assert_eq!(body["result"], false);
        assert_eq!(state.runtime.read().chain.nonce(&owner.address()), 0);
    }

    #[tokio::test]
    async fn owner_pause_is_persisted() {
        let owner = Keypair::generate();
        let state = test_app_state(owner.address(), CustodyKind::Direct);
        let router = create_router(state.clone());

        let body = send(&router, &state, &owner, 0, Call::Pause).await;
        assert!(body["error"].is_null(), "{}", body);

        let stored: Runtime = state.store.load(crate::runtime::SNAPSHOT_KEY).unwrap().unwrap();
        assert!(stored.contract.paused());
        let (_, json) = get(&router, "/status").await;
        assert_eq!(json["paused"], true);
    }

    #[tokio::test]
    async fn faucet_validates_input() {
        let router = create_router(test_app_state(Address::from_label("owner"), CustodyKind::Direct));
        let alice = Address::from_label("alice");

        let body = rpc(
            &router,
            "escrow_faucet",
            serde_json::json!([{ "asset": "DOGE", "to": alice, "amount": 1 }]),
        )
        .await;
        assert_eq!(body["error"]["code"], -32602);

        fund(&router, "native", alice, 3).await;
        let (_, json) = get(&router, &format!("/accounts/{}", alice)).await;
        assert_eq!(json["native"], "3000000000000000000");
        assert_eq!(json["nonce"], 0);
    }

    #[tokio::test]
    async fn yield_reads_expose_pool_position() {
        let owner = Keypair::generate();
        let alice = Keypair::generate();
        let state = test_app_state(owner.address(), CustodyKind::Yield);
        let router = create_router(state.clone());
        let escrow = state.runtime.read().contract.address();

        fund(&router, "DAI", alice.address(), 1).await;
        send(
            &router,
            &state,
            &alice,
            0,
            Call::TokenApprove {
                token: dai(),
                spender: escrow,
                amount: 1_000,
            },
        )
        .await;
        let body = send(
            &router,
            &state,
            &alice,
            0,
            Call::CreateEscrowTransaction {
                beneficiary: Address::from_label("bob"),
                token_addr: dai(),
                token_amount: 1_000,
                unlock_time: GENESIS + 60,
            },
        )
        .await;
        assert_eq!(body["result"]["escrowId"], 1);

        let body = rpc(&router, "escrow_getContractATokenBalanceOf", serde_json::json!([dai()])).await;
        assert_eq!(body["result"], "1000");
        let body = rpc(&router, "escrow_getContractBalanceOf", serde_json::json!([dai()])).await;
        assert_eq!(body["result"], "0");
        let body = rpc(&router, "escrow_getUserAccountData", serde_json::json!([escrow])).await;
        assert_eq!(body["result"]["total_collateral_base"], "1000");
    }
}
