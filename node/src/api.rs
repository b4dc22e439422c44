//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the curve engine over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                              |
//! |--------|------------------------|------------------------------------------|
//! | GET    | `/health`              | Liveness check                           |
//! | GET    | `/status`              | Engine status, issuance audit            |
//! | GET    | `/price`               | Spot price at `?supply=` (or current)    |
//! | GET    | `/quote`               | Dry-run a bond of `?value=`              |
//! | GET    | `/accounts/:address`   | Pending balances, token balance, roles   |
//! | GET    | `/ws`                  | WebSocket for live engine events         |
//! | POST   | `/bond`                | Bond native value into the curve         |
//! | POST   | `/withdraw/mint`       | Withdraw the pending mint balance        |
//! | POST   | `/withdraw/promo`      | Withdraw the pending promo balance       |
//! | POST   | `/admin/threshold`     | Set the rate-limit threshold (governor)  |
//! | POST   | `/admin/initialize`    | Mint the one-time reserve (governor)     |
//! | POST   | `/admin/roles`         | Grant or revoke a role (admin)           |
//! | POST   | `/oracle/tick`         | Publish a price tick (governor)          |
//!
//! Mutating requests name their caller in the JSON body. This node is a
//! development harness and does not authenticate that claim.
//!
//! Amounts travel as decimal strings: `u128` does not survive a round trip
//! through most JSON number implementations.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use bondline_contracts::{Role, RoleError, RoleRegistry, TokenLedger};
use bondline_protocol::engine::{
    AuthError, BalanceKind, BondError, BondReceipt, EngineStatus, InitError, NativeAmount,
    PendingAccount, Quote, WithdrawError,
};
use bondline_protocol::math::MathError;
use bondline_protocol::oracle::{OracleError, TickOracle};
use bondline_protocol::{Address, CurveEngine, Fixed};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub engine: Arc<CurveEngine>,
    pub token: Arc<TokenLedger>,
    pub roles: Arc<RoleRegistry>,
    /// Tick oracle feeding the engine's price reference.
    pub oracle: Arc<TickOracle>,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<EngineEvent>,
    pub metrics: SharedMetrics,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A bond was committed.
    Bond {
        id: String,
        caller: Address,
        value: String,
        minted: String,
        promo: String,
        supply_after: String,
    },
    /// A pending balance was minted out.
    Withdrawal {
        caller: Address,
        kind: BalanceKind,
        amount: String,
    },
    /// The one-time reserve was minted.
    ReserveInitialized { total_issued: String },
    /// Governance changed the rate-limit ceiling.
    ThresholdChanged { threshold_local: String },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/price", get(price_handler))
        .route("/quote", get(quote_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/ws", get(ws_handler))
        .route("/bond", post(bond_handler))
        .route("/withdraw/mint", post(withdraw_mint_handler))
        .route("/withdraw/promo", post(withdraw_promo_handler))
        .route("/admin/threshold", post(threshold_handler))
        .route("/admin/initialize", post(initialize_handler))
        .route("/admin/roles", post(roles_handler))
        .route("/oracle/tick", post(tick_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: String,
    pub message: String,
}

/// Handler failure, carrying the HTTP status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "unauthorized", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<BondError> for ApiError {
    fn from(e: BondError) -> Self {
        let status = match e {
            BondError::NotAuthorized => StatusCode::FORBIDDEN,
            BondError::ZeroValue
            | BondError::RateLimitExceeded { .. }
            | BondError::SlippageExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BondError::OracleUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BondError::ArithmeticOverflow => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, bond_error_code(&e), e.to_string())
    }
}

impl From<WithdrawError> for ApiError {
    fn from(e: WithdrawError) -> Self {
        let (status, code) = match e {
            WithdrawError::AccountNotOpened => (StatusCode::CONFLICT, "account_not_opened"),
            WithdrawError::NothingPending => (StatusCode::CONFLICT, "nothing_pending"),
            WithdrawError::Mint(_) => (StatusCode::INTERNAL_SERVER_ERROR, "mint_failed"),
            WithdrawError::ArithmeticOverflow => {
                (StatusCode::INTERNAL_SERVER_ERROR, "arithmetic_overflow")
            }
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::forbidden(e.to_string())
    }
}

impl From<InitError> for ApiError {
    fn from(e: InitError) -> Self {
        let (status, code) = match e {
            InitError::Unauthorized => (StatusCode::FORBIDDEN, "unauthorized"),
            InitError::AlreadyInitialized => (StatusCode::CONFLICT, "already_initialized"),
            InitError::InProgress => (StatusCode::CONFLICT, "initialization_in_progress"),
            InitError::Mint(_) => (StatusCode::INTERNAL_SERVER_ERROR, "mint_failed"),
            InitError::ArithmeticOverflow => {
                (StatusCode::INTERNAL_SERVER_ERROR, "arithmetic_overflow")
            }
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<RoleError> for ApiError {
    fn from(e: RoleError) -> Self {
        match e {
            RoleError::NotAdmin(_) => Self::forbidden(e.to_string()),
            RoleError::InvalidAddress(_) => Self::bad_request(e.to_string()),
        }
    }
}

impl From<OracleError> for ApiError {
    fn from(e: OracleError) -> Self {
        let (status, code) = match e {
            OracleError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "oracle_unavailable"),
            OracleError::InvalidObservation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_observation")
            }
            OracleError::Math(_) => (StatusCode::INTERNAL_SERVER_ERROR, "arithmetic_overflow"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<MathError> for ApiError {
    fn from(e: MathError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "arithmetic_overflow",
            e.to_string(),
        )
    }
}

/// Metric label and error code for a rejected bond.
fn bond_error_code(e: &BondError) -> &'static str {
    match e {
        BondError::NotAuthorized => "unauthorized",
        BondError::ZeroValue => "zero_value",
        BondError::RateLimitExceeded { .. } => "rate_limit_exceeded",
        BondError::SlippageExceeded { .. } => "slippage_exceeded",
        BondError::OracleUnavailable(_) => "oracle_unavailable",
        BondError::ArithmeticOverflow => "arithmetic_overflow",
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::parse(raw).ok_or_else(|| ApiError::bad_request(format!("invalid address: {raw}")))
}

fn parse_amount(field: &str, raw: &str) -> Result<u128, ApiError> {
    raw.trim()
        .parse::<u128>()
        .map_err(|_| ApiError::bad_request(format!("{field} must be a non-negative integer")))
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /bond`.
#[derive(Debug, Deserialize)]
pub struct BondRequest {
    pub caller: String,
    /// Native value in its smallest unit.
    pub value: String,
    /// Minimum acceptable minted amount. Zero when omitted.
    #[serde(default)]
    pub min_out: Option<String>,
}

/// Body of requests that carry nothing but the caller.
#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    pub caller: String,
}

/// Body of `POST /admin/threshold`.
#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    pub caller: String,
    /// New ceiling in local micro-units.
    pub threshold_local: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleAction {
    Grant,
    Revoke,
}

/// Body of `POST /admin/roles`.
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub caller: String,
    pub action: RoleAction,
    pub role: Role,
    pub account: String,
}

/// Body of `POST /oracle/tick`.
#[derive(Debug, Deserialize)]
pub struct TickRequest {
    pub caller: String,
    pub tick: i32,
}

#[derive(Debug, Deserialize)]
pub struct PriceParams {
    /// Whole normalized units. Current supply when omitted.
    pub supply: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub value: String,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Engine status with every amount rendered as a string.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusView {
    pub curve_supply: String,
    pub spot_price: String,
    pub total_issued: String,
    pub in_flight: String,
    pub collateral_received: String,
    pub collateral_received_local: String,
    pub rate_limit_threshold_local: String,
    pub rate_limit_remaining_local: String,
    pub promo_pool_remaining: String,
    pub pending_mint_total: String,
    pub pending_promo_total: String,
    pub accounts: usize,
    pub bonds: u64,
    pub initialized: bool,
}

impl From<&EngineStatus> for StatusView {
    fn from(s: &EngineStatus) -> Self {
        Self {
            curve_supply: s.curve_supply.to_string(),
            spot_price: s.spot_price.to_string(),
            total_issued: s.total_issued.to_string(),
            in_flight: s.in_flight.to_string(),
            collateral_received: s.collateral_received.to_string(),
            collateral_received_local: s.collateral_received_local.to_string(),
            rate_limit_threshold_local: s.rate_limit_threshold_local.to_string(),
            rate_limit_remaining_local: s.rate_limit_remaining_local.to_string(),
            promo_pool_remaining: s.promo_pool_remaining.to_string(),
            pending_mint_total: s.pending_mint_total.to_string(),
            pending_promo_total: s.pending_promo_total.to_string(),
            accounts: s.accounts,
            bonds: s.bonds,
            initialized: s.initialized,
        }
    }
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub engine: StatusView,
    /// `"ok"`, or the audit failure message.
    pub audit: String,
    pub token_supply: String,
    pub token_symbol: String,
    pub oracle_observations: usize,
    pub oracle_latest_tick: Option<i32>,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    pub supply: String,
    pub spot_price: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub value: String,
    pub value_local: String,
    pub delta: String,
    pub minted: String,
    pub promo: String,
    pub supply_after: String,
    pub rate_limit_remaining_local: String,
}

impl From<Quote> for QuoteResponse {
    fn from(q: Quote) -> Self {
        Self {
            value: q.value.to_string(),
            value_local: q.value_local.to_string(),
            delta: q.delta.to_string(),
            minted: q.minted.to_string(),
            promo: q.promo.to_string(),
            supply_after: q.supply_after.to_string(),
            rate_limit_remaining_local: q.rate_limit_remaining_local.to_string(),
        }
    }
}

/// Response payload for `POST /bond`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub id: String,
    pub caller: Address,
    pub value: String,
    pub value_local: String,
    pub delta: String,
    pub minted: String,
    pub promo: String,
    pub supply_after: String,
    pub spot_price_after: String,
    pub timestamp: String,
}

impl From<&BondReceipt> for ReceiptResponse {
    fn from(r: &BondReceipt) -> Self {
        Self {
            id: r.id.to_string(),
            caller: r.caller.clone(),
            value: r.value.to_string(),
            value_local: r.value_local.to_string(),
            delta: r.delta.to_string(),
            minted: r.minted.to_string(),
            promo: r.promo.to_string(),
            supply_after: r.supply_after.to_string(),
            spot_price_after: r.spot_price_after.to_string(),
            timestamp: r.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub caller: Address,
    pub kind: BalanceKind,
    pub amount: String,
    pub token_balance: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    /// Whether the address has ever bonded.
    pub opened: bool,
    pub pending_mint: String,
    pub pending_promo: String,
    pub lifetime_minted: String,
    pub lifetime_promo: String,
    pub token_balance: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleResponse {
    pub role: Role,
    /// False when the grant or revoke was a no-op.
    pub changed: bool,
    pub members: Vec<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TickResponse {
    pub tick: i32,
    pub observations: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: engine status plus an issuance audit.
///
/// The audit compares the engine's books against the token ledger. A
/// failure is reported in the body, not as an HTTP error.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.engine.status()?;
    state.metrics.observe_status(&status);

    let audit = match state.engine.audit() {
        Ok(()) => "ok".to_string(),
        Err(e) => e.to_string(),
    };

    Ok(Json(StatusResponse {
        version: state.version.clone(),
        engine: StatusView::from(&status),
        audit,
        token_supply: state.token.total_supply().to_string(),
        token_symbol: state.token.metadata().symbol.clone(),
        oracle_observations: state.oracle.len(),
        oracle_latest_tick: state.oracle.latest_tick(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /price?supply=`: spot price at a supply, or at the current one.
async fn price_handler(
    State(state): State<AppState>,
    Query(params): Query<PriceParams>,
) -> Result<Json<PriceResponse>, ApiError> {
    let (supply, price) = match params.supply {
        Some(raw) => {
            let units = parse_amount("supply", &raw)?;
            let supply = i128::try_from(units)
                .ok()
                .and_then(|u| Fixed::from_int(u).ok())
                .ok_or_else(|| ApiError::bad_request("supply out of range"))?;
            (supply, state.engine.spot_price(supply)?)
        }
        None => {
            let status = state.engine.status()?;
            (status.curve_supply, status.spot_price)
        }
    };
    Ok(Json(PriceResponse {
        supply: supply.to_string(),
        spot_price: price.to_string(),
    }))
}

/// `GET /quote?value=`: what a bond would yield right now.
async fn quote_handler(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let value = NativeAmount::new(parse_amount("value", &params.value)?);
    let quote = state.engine.quote(value)?;
    Ok(Json(quote.into()))
}

/// `GET /accounts/:address`: pending balances and token holdings.
///
/// Unknown addresses return zeroed balances with `opened: false`.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address)?;
    let account = state.engine.account(&address);
    let PendingAccount {
        pending_mint,
        pending_promo,
        lifetime_minted,
        lifetime_promo,
    } = account.unwrap_or_default();

    let roles = [
        Role::Admin,
        Role::Bonder,
        Role::Burner,
        Role::Governor,
        Role::Minter,
    ]
        .into_iter()
        .filter(|r| state.roles.has_role(*r, &address))
        .collect();

    Ok(Json(AccountResponse {
        opened: account.is_some(),
        pending_mint: pending_mint.to_string(),
        pending_promo: pending_promo.to_string(),
        lifetime_minted: lifetime_minted.to_string(),
        lifetime_promo: lifetime_promo.to_string(),
        token_balance: state.token.balance_of(&address).to_string(),
        roles,
        address,
    }))
}

/// `POST /bond`: bonds native value into the curve.
async fn bond_handler(
    State(state): State<AppState>,
    Json(req): Json<BondRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let value = NativeAmount::new(parse_amount("value", &req.value)?);
    let min_out = match req.min_out.as_deref() {
        Some(raw) => parse_amount("min_out", raw)?,
        None => 0,
    };

    let timer = state.metrics.bond_latency_seconds.start_timer();
    let result = state.engine.bond(&caller, min_out, value);
    timer.observe_duration();

    let receipt = match result {
        Ok(r) => r,
        Err(e) => {
            state
                .metrics
                .bonds_rejected_total
                .with_label_values(&[bond_error_code(&e)])
                .inc();
            return Err(e.into());
        }
    };

    state.metrics.record_bond(&receipt);
    let _ = state.event_tx.send(EngineEvent::Bond {
        id: receipt.id.to_string(),
        caller: receipt.caller.clone(),
        value: receipt.value.to_string(),
        minted: receipt.minted.to_string(),
        promo: receipt.promo.to_string(),
        supply_after: receipt.supply_after.to_string(),
    });
    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// `POST /withdraw/mint`
async fn withdraw_mint_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    withdraw(&state, &req.caller, BalanceKind::Mint)
}

/// `POST /withdraw/promo`
async fn withdraw_promo_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    withdraw(&state, &req.caller, BalanceKind::Promo)
}

fn withdraw(
    state: &AppState,
    caller: &str,
    kind: BalanceKind,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let caller = parse_address(caller)?;
    let amount = match kind {
        BalanceKind::Mint => state.engine.withdraw_mint_balance(&caller)?,
        BalanceKind::Promo => state.engine.withdraw_promo_balance(&caller)?,
    };

    state
        .metrics
        .withdrawals_total
        .with_label_values(&[kind.to_string().as_str()])
        .inc();
    let _ = state.event_tx.send(EngineEvent::Withdrawal {
        caller: caller.clone(),
        kind,
        amount: amount.to_string(),
    });

    Ok(Json(WithdrawResponse {
        token_balance: state.token.balance_of(&caller).to_string(),
        amount: amount.to_string(),
        caller,
        kind,
    }))
}

/// `POST /admin/threshold`: governor-only rate-limit change.
async fn threshold_handler(
    State(state): State<AppState>,
    Json(req): Json<ThresholdRequest>,
) -> Result<Json<StatusView>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let threshold = parse_amount("threshold_local", &req.threshold_local)?;
    state.engine.set_rate_limit_threshold(&caller, threshold)?;

    let _ = state.event_tx.send(EngineEvent::ThresholdChanged {
        threshold_local: threshold.to_string(),
    });
    Ok(Json(StatusView::from(&state.engine.status()?)))
}

/// `POST /admin/initialize`: mints the one-time reserve to the treasury.
async fn initialize_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<StatusView>, ApiError> {
    let caller = parse_address(&req.caller)?;
    state.engine.initialize_reserve(&caller)?;

    let status = state.engine.status()?;
    let _ = state.event_tx.send(EngineEvent::ReserveInitialized {
        total_issued: status.total_issued.to_string(),
    });
    Ok(Json(StatusView::from(&status)))
}

/// `POST /admin/roles`: admin-only role management.
async fn roles_handler(
    State(state): State<AppState>,
    Json(req): Json<RoleRequest>,
) -> Result<Json<RoleResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    let account = parse_address(&req.account)?;
    let changed = match req.action {
        RoleAction::Grant => state.roles.grant_role(&caller, req.role, &account)?,
        RoleAction::Revoke => state.roles.revoke_role(&caller, req.role, &account)?,
    };
    Ok(Json(RoleResponse {
        role: req.role,
        changed,
        members: state.roles.members(req.role),
    }))
}

/// `POST /oracle/tick`: records a price observation at the current time.
async fn tick_handler(
    State(state): State<AppState>,
    Json(req): Json<TickRequest>,
) -> Result<Json<TickResponse>, ApiError> {
    let caller = parse_address(&req.caller)?;
    if !state.roles.has_role(Role::Governor, &caller) {
        return Err(ApiError::forbidden(format!("{caller} may not publish ticks")));
    }
    state.oracle.record(req.tick)?;
    state.metrics.oracle_ticks_total.inc();
    tracing::debug!(tick = req.tick, "tick published");

    Ok(Json(TickResponse {
        tick: req.tick,
        observations: state.oracle.len(),
    }))
}

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`EngineEvent`] messages. Client messages
/// are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Forwards broadcast events until the client disconnects or the channel
/// closes.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use bondline_contracts::MintAuthority;
    use bondline_protocol::config::DEFAULT_TWAP_WINDOW_SECS;
    use bondline_protocol::oracle::ManualClock;
    use bondline_protocol::CurveConfig;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const T0: u64 = 1_700_000_000;
    const ONE_NATIVE: &str = "1000000000000000000";

    fn addr(n: u8) -> String {
        format!("0x{:040x}", n)
    }

    const ADMIN: u8 = 1;
    const ENGINE: u8 = 2;
    const GOVERNOR: u8 = 3;
    const BUYER: u8 = 10;

    /// State with a tick oracle pinned at tick 0 (rate 1.0) for a full window.
    fn test_app_state() -> (AppState, Arc<ManualClock>) {
        let a = |n| Address::new(addr(n));
        let roles = Arc::new(RoleRegistry::new(a(ADMIN)));
        roles.grant_role(&a(ADMIN), Role::Minter, &a(ENGINE)).unwrap();
        roles.grant_role(&a(ADMIN), Role::Governor, &a(GOVERNOR)).unwrap();
        roles.grant_role(&a(ADMIN), Role::Bonder, &a(BUYER)).unwrap();

        let token = Arc::new(TokenLedger::new("Bondline Asset", "BLA", 6, Arc::clone(&roles)));
        let clock = Arc::new(ManualClock::new(T0));
        let oracle = Arc::new(TickOracle::new(clock.clone(), 64));
        oracle.record(0).unwrap();
        clock.advance(DEFAULT_TWAP_WINDOW_SECS as u64);

        let engine = CurveEngine::new(
            &CurveConfig::default(),
            oracle.clone(),
            Arc::new(MintAuthority::new(Arc::clone(&token), a(ENGINE))),
            roles.clone(),
        )
        .unwrap();

        let (event_tx, _) = broadcast::channel(16);
        let state = AppState {
            version: "0.1.0-test".into(),
            engine: Arc::new(engine),
            token,
            roles,
            oracle,
            event_tx,
            metrics: Arc::new(crate::metrics::NodeMetrics::new().unwrap()),
        };
        (state, clock)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    fn error_code(body: &[u8]) -> String {
        serde_json::from_slice::<ErrorBody>(body).unwrap().error
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn bond_then_withdraw_round_trip() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());

        let (status, body) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": addr(BUYER), "value": ONE_NATIVE }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let receipt: ReceiptResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(receipt.value_local, "1000000");
        assert_eq!(receipt.minted, "2699986");

        let (status, body) = get(&router, &format!("/accounts/{}", addr(BUYER))).await;
        assert_eq!(status, StatusCode::OK);
        let account: AccountResponse = serde_json::from_slice(&body).unwrap();
        assert!(account.opened);
        assert_eq!(account.pending_mint, "2699986");
        assert_eq!(account.roles, vec![Role::Bonder]);

        let (status, body) = post_json(
            &router,
            "/withdraw/mint",
            serde_json::json!({ "caller": addr(BUYER) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let withdrawn: WithdrawResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(withdrawn.amount, "2699986");
        assert_eq!(withdrawn.token_balance, "2699986");

        let (status, body) = post_json(
            &router,
            "/withdraw/mint",
            serde_json::json!({ "caller": addr(BUYER) }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "nothing_pending");

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.audit, "ok");
        assert_eq!(resp.engine.bonds, 1);
        assert_eq!(resp.token_supply, "2699986");

        let metrics = state.metrics.encode().unwrap();
        assert!(metrics.contains("bondline_bonds_total 1"));
        assert!(metrics.contains("bondline_withdrawals_total{kind=\"mint\"} 1"));
    }

    #[tokio::test]
    async fn bond_errors_map_to_status_codes() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());

        let (status, _) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": addr(99), "value": ONE_NATIVE }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": addr(BUYER), "value": "0" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(&body), "zero_value");

        let (status, body) = post_json(
            &router,
            "/bond",
            serde_json::json!({
                "caller": addr(BUYER),
                "value": ONE_NATIVE,
                "min_out": "2699987",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(&body), "slippage_exceeded");

        let (status, _) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": "alice", "value": ONE_NATIVE }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": addr(BUYER), "value": "-1" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let metrics = state.metrics.encode().unwrap();
        assert!(metrics.contains("bondline_bonds_rejected_total{reason=\"zero_value\"} 1"));
    }

    #[tokio::test]
    async fn stale_oracle_is_service_unavailable() {
        let (state, _) = test_app_state();
        let clock = Arc::new(ManualClock::new(T0));
        let fresh = Arc::new(TickOracle::new(clock.clone(), 8));
        fresh.record(0).unwrap();
        clock.advance(60);
        let engine = CurveEngine::new(
            &CurveConfig::default(),
            fresh.clone(),
            Arc::new(MintAuthority::new(
                Arc::clone(&state.token),
                Address::new(addr(ENGINE)),
            )),
            state.roles.clone(),
        )
        .unwrap();
        let router = create_router(AppState {
            engine: Arc::new(engine),
            oracle: fresh,
            ..state
        });

        let (status, body) = get(&router, &format!("/quote?value={ONE_NATIVE}")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_code(&body), "oracle_unavailable");
    }

    #[tokio::test]
    async fn quote_matches_bond() {
        let (state, _) = test_app_state();
        let router = create_router(state);

        let (status, body) = get(&router, &format!("/quote?value={ONE_NATIVE}")).await;
        assert_eq!(status, StatusCode::OK);
        let quote: QuoteResponse = serde_json::from_slice(&body).unwrap();

        let (_, body) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": addr(BUYER), "value": ONE_NATIVE }),
        )
        .await;
        let receipt: ReceiptResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(quote.minted, receipt.minted);
        assert_eq!(quote.promo, receipt.promo);
        assert_eq!(quote.supply_after, receipt.supply_after);
    }

    #[tokio::test]
    async fn price_endpoint_reads_curve() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());

        let (status, body) = get(&router, "/price").await;
        assert_eq!(status, StatusCode::OK);
        let at_zero: PriceResponse = serde_json::from_slice(&body).unwrap();
        let expected = state.engine.spot_price(Fixed::ZERO).unwrap();
        assert_eq!(at_zero.spot_price, expected.to_string());

        let (_, body) = get(&router, "/price?supply=1000000").await;
        let later: PriceResponse = serde_json::from_slice(&body).unwrap();
        assert_ne!(later.spot_price, at_zero.spot_price);

        let (status, _) = get(&router, "/price?supply=lots").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn governance_endpoints_require_roles() {
        let (state, _) = test_app_state();
        let router = create_router(state.clone());

        let (status, _) = post_json(
            &router,
            "/admin/threshold",
            serde_json::json!({ "caller": addr(BUYER), "threshold_local": "5" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = post_json(
            &router,
            "/admin/threshold",
            serde_json::json!({ "caller": addr(GOVERNOR), "threshold_local": "500000" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let view: StatusView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.rate_limit_threshold_local, "500000");

        let (status, body) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": addr(BUYER), "value": ONE_NATIVE }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(&body), "rate_limit_exceeded");

        let (status, _) = post_json(
            &router,
            "/admin/initialize",
            serde_json::json!({ "caller": addr(GOVERNOR) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = post_json(
            &router,
            "/admin/initialize",
            serde_json::json!({ "caller": addr(GOVERNOR) }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "already_initialized");
        state.engine.audit().unwrap();
    }

    #[tokio::test]
    async fn admin_grants_bonder_role() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let newcomer = addr(42);

        let (status, _) = post_json(
            &router,
            "/admin/roles",
            serde_json::json!({
                "caller": addr(BUYER),
                "action": "grant",
                "role": "bonder",
                "account": newcomer,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = post_json(
            &router,
            "/admin/roles",
            serde_json::json!({
                "caller": addr(ADMIN),
                "action": "grant",
                "role": "bonder",
                "account": newcomer,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: RoleResponse = serde_json::from_slice(&body).unwrap();
        assert!(resp.changed);
        assert_eq!(resp.members.len(), 2);

        let (status, _) = post_json(
            &router,
            "/bond",
            serde_json::json!({ "caller": newcomer, "value": ONE_NATIVE }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn ticks_are_governor_only_and_validated() {
        let (state, clock) = test_app_state();
        let router = create_router(state.clone());

        let (status, _) = post_json(
            &router,
            "/oracle/tick",
            serde_json::json!({ "caller": addr(BUYER), "tick": 10 }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        clock.advance(30);
        let (status, body) = post_json(
            &router,
            "/oracle/tick",
            serde_json::json!({ "caller": addr(GOVERNOR), "tick": 10 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: TickResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.observations, 2);

        let (status, body) = post_json(
            &router,
            "/oracle/tick",
            serde_json::json!({ "caller": addr(GOVERNOR), "tick": 900_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(&body), "invalid_observation");
        assert_eq!(state.oracle.latest_tick(), Some(10));
    }

    #[tokio::test]
    async fn unknown_account_is_not_opened() {
        let (state, _) = test_app_state();
        let router = create_router(state);
        let (status, body) = get(&router, &format!("/accounts/{}", addr(77))).await;
        assert_eq!(status, StatusCode::OK);
        let account: AccountResponse = serde_json::from_slice(&body).unwrap();
        assert!(!account.opened);
        assert_eq!(account.pending_mint, "0");
        assert!(account.roles.is_empty());

        let (status, _) = get(&router, "/accounts/not-an-address").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = EngineEvent::Withdrawal {
            caller: Address::new(addr(BUYER)),
            kind: BalanceKind::Promo,
            amount: "12".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "withdrawal");
        assert_eq!(json["kind"], "promo");
    }
}
