use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use duel_domain::{DuelId, DuelRecord, TokenSymbol};
use escrow_engine::{
    CreateDuelInput, EmergencyRefundInput, EscrowEngine, EscrowError, RefundReason, SettleInput,
};
use platform_core::{ApiEnvelope, AppEnv, NetworkTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stealth_identity::constant_time_eq;
use tracing::{info, warn};

/// Fixed-window request budget per client identity.
pub const RATE_LIMIT_MAX_REQUESTS: usize = 100;
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Fixed-window rate limiter keyed by client identity (remote address).
/// Over-limit callers get the seconds left in the current window back.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    max_requests_per_window: usize,
    window: Duration,
    state: Mutex<HashMap<String, (Instant, usize)>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(max_requests_per_window: usize, window: Duration) -> Self {
        Self {
            max_requests_per_window: max_requests_per_window.max(1),
            window: if window.is_zero() {
                Duration::from_secs(1)
            } else {
                window
            },
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Ok when the request fits the window, otherwise the retry-after
    /// seconds for the caller.
    pub fn check_and_record(&self, client_id: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            // A poisoned limiter must not take the API down with it.
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = guard.entry(client_id.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        if entry.1 >= self.max_requests_per_window {
            let elapsed = now.duration_since(entry.0);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }
        entry.1 += 1;
        Ok(())
    }
}

#[derive(Clone)]
pub struct GatewayState {
    engine: Arc<EscrowEngine>,
    internal_api_key: Arc<String>,
    env: AppEnv,
    network: NetworkTag,
    rate_limiter: Arc<FixedWindowRateLimiter>,
}

impl GatewayState {
    #[must_use]
    pub fn new(
        engine: Arc<EscrowEngine>,
        internal_api_key: impl Into<String>,
        env: AppEnv,
        network: NetworkTag,
    ) -> Self {
        Self {
            engine,
            internal_api_key: Arc::new(internal_api_key.into()),
            env,
            network,
            rate_limiter: Arc::new(FixedWindowRateLimiter::new(
                RATE_LIMIT_MAX_REQUESTS,
                RATE_LIMIT_WINDOW,
            )),
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<FixedWindowRateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}

/// The full inbound surface: public health trio plus the internal duel API
/// under `/api/v1/duel`, rate limited and gated on the shared secret.
pub fn build_router(state: GatewayState) -> Router {
    let duel_routes = Router::new()
        .route("/create", post(create_duel))
        .route("/lock-stake", post(lock_stake))
        .route("/settle", post(settle))
        .route("/refund", post(refund))
        .route("/recovery/status", get(recovery_status))
        .route("/recovery/emergency-refund", post(emergency_refund))
        .route("/dust-status", get(dust_status))
        .route("/sweep-dust", post(sweep_dust))
        .route("/verify/:duel_id", get(verify_duel))
        .route("/:duel_id", get(get_duel))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_internal_secret,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/api/v1/duel", duel_routes)
        .with_state(state)
}

async fn rate_limit(State(state): State<GatewayState>, req: Request, next: Next) -> Response {
    let client_id = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match state.rate_limiter.check_and_record(&client_id) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            warn!(client = %client_id, retry_after, "rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ApiEnvelope::<Value>::err(format!(
                    "rate limit exceeded, retry in {retry_after}s"
                ))),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

/// Shared-secret gate for the internal tier. The compare is constant-time.
/// In development every duel route is additionally open for browser
/// testing.
async fn require_internal_secret(
    State(state): State<GatewayState>,
    req: Request,
    next: Next,
) -> Response {
    if state.env.is_development() {
        return next.run(req).await;
    }

    let supplied = req
        .headers()
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    let authorised = supplied.is_some_and(|secret| {
        constant_time_eq(secret.as_bytes(), state.internal_api_key.as_bytes())
    });
    if !authorised {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiEnvelope::<Value>::err("invalid internal secret")),
        )
            .into_response();
    }
    next.run(req).await
}

async fn health() -> Json<ApiEnvelope<Value>> {
    Json(ApiEnvelope::ok(
        serde_json::json!({"service": "duel-escrow", "status": "ok"}),
    ))
}

async fn health_live() -> Json<ApiEnvelope<Value>> {
    Json(ApiEnvelope::ok(serde_json::json!({"live": true})))
}

async fn health_ready(State(state): State<GatewayState>) -> Json<ApiEnvelope<Value>> {
    let stats = state.engine.store().stats();
    Json(ApiEnvelope::ok(serde_json::json!({
        "ready": true,
        "duelsCreated": stats.created,
        "duelsExpired": stats.expired,
        "duelsLive": stats.live,
    })))
}

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDuelRequest {
    player1_wallet: String,
    player2_wallet: String,
    player1_character_id: String,
    player2_character_id: String,
    player1_name: String,
    player2_name: String,
    stake_amount: f64,
    token: Option<String>,
    rules: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDuelResponse {
    duel_id: String,
    player1_stealth_id: String,
    player2_stealth_id: String,
    stake_amount_lamports: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockStakeRequest {
    duel_id: String,
    player_wallet: String,
    payment_proof: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LockStakeResponse {
    tx_signature: String,
    duel_status: String,
    both_locked: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleRequest {
    duel_id: String,
    winner_wallet: String,
    #[allow(dead_code)]
    winner_character_id: Option<String>,
    server_signature: Option<String>,
    combat_summary: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponse {
    winner_tx_signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    treasury_tx_signature: Option<String>,
    winner_payout_lamports: String,
    treasury_fee_lamports: String,
    commitment_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    commitment_tx_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequest {
    duel_id: String,
    reason: String,
    #[allow(dead_code)]
    server_signature: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundResponse {
    refund_tx_signatures: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DuelView {
    duel_id: String,
    status: String,
    player1_stealth_id: String,
    player2_stealth_id: String,
    player1_name: String,
    player2_name: String,
    player1_locked: bool,
    player2_locked: bool,
    stake_amount_lamports: String,
    token: String,
    rules: Value,
    expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner_stealth_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    combat_summary: Option<Value>,
}

impl DuelView {
    fn from_record(record: DuelRecord) -> Self {
        Self {
            duel_id: record.duel_id.as_str().to_string(),
            status: record.status.as_str().to_string(),
            player1_stealth_id: record.player1.stealth_id.as_str().to_string(),
            player2_stealth_id: record.player2.stealth_id.as_str().to_string(),
            player1_name: record.player1.display_name,
            player2_name: record.player2.display_name,
            player1_locked: record.player1.stake_locked,
            player2_locked: record.player2.stake_locked,
            stake_amount_lamports: record.player1.stake.to_string(),
            token: record.token.as_str().to_string(),
            rules: record.rules,
            expires_at: record.expires_at,
            winner_stealth_id: record
                .winner_stealth_id
                .map(|id| id.as_str().to_string()),
            combat_summary: record.combat_summary,
        }
    }
}

#[derive(Debug, Serialize)]
struct GetDuelResponse {
    duel: DuelView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryStatusResponse {
    failed_duels: Vec<String>,
    pending_settlements: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmergencyRefundRequest {
    duel_id: String,
    player1_wallet: String,
    player2_wallet: String,
    stake_per_player_lamports: String,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmergencyRefundEntry {
    player: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmergencyRefundResponse {
    refunds: Vec<EmergencyRefundEntry>,
}

#[derive(Debug, Deserialize)]
struct DustQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DustStatusResponse {
    dust_lamports: String,
    can_sweep: bool,
    minimum_to_sweep: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SweepDustRequest {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SweepDustResponse {
    swept_lamports: String,
    tx_signature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    verification: VerificationView,
    commitment: CommitmentView,
    on_chain: OnChainView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerificationView {
    duel_id: String,
    winner_stealth_id: String,
    loser_stealth_id: String,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitmentView {
    raw_data: String,
    hash: String,
    recomputed_hash: String,
    hash_matches: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OnChainView {
    posted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explorer_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

const WALLET_LEN: std::ops::RangeInclusive<usize> = 32..=44;
const NAME_LEN: std::ops::RangeInclusive<usize> = 1..=32;

fn validate_wallet(label: &str, wallet: &str) -> Result<(), String> {
    if !WALLET_LEN.contains(&wallet.trim().len()) {
        return Err(format!("{label} must be 32-44 characters"));
    }
    Ok(())
}

fn validate_name(label: &str, name: &str) -> Result<(), String> {
    if !NAME_LEN.contains(&name.len()) {
        return Err(format!("{label} must be 1-32 characters"));
    }
    Ok(())
}

fn parse_duel_id(raw: &str) -> Result<DuelId, String> {
    DuelId::parse(raw).map_err(|_| "duelId must be 32 hex characters".to_string())
}

fn parse_token(raw: Option<&str>) -> Result<TokenSymbol, String> {
    match raw {
        None => Ok(TokenSymbol::Sol),
        Some(symbol) => symbol
            .parse()
            .map_err(|_| format!("unsupported token: {symbol}")),
    }
}

impl CreateDuelRequest {
    fn validate(&self) -> Result<TokenSymbol, String> {
        validate_wallet("player1Wallet", &self.player1_wallet)?;
        validate_wallet("player2Wallet", &self.player2_wallet)?;
        if self.player1_character_id.is_empty() || self.player2_character_id.is_empty() {
            return Err("character ids must be non-empty".to_string());
        }
        validate_name("player1Name", &self.player1_name)?;
        validate_name("player2Name", &self.player2_name)?;
        if !self.stake_amount.is_finite() || self.stake_amount <= 0.0 {
            return Err("stakeAmount must be positive".to_string());
        }
        parse_token(self.token.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiEnvelope::<Value>::err(message)),
    )
        .into_response()
}

fn engine_error_response(err: EscrowError) -> Response {
    match err {
        EscrowError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ApiEnvelope::<Value>::err("duel not found")),
        )
            .into_response(),
        EscrowError::Validation(message) => bad_request(message),
        err @ (EscrowError::Precondition(_)
        | EscrowError::SettlementFailed { .. }
        | EscrowError::Transfer(_)) => {
            (StatusCode::OK, Json(ApiEnvelope::<Value>::err(err.to_string()))).into_response()
        }
        err => {
            warn!(error = %err, "internal error while handling duel request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiEnvelope::<Value>::err("internal error")),
            )
                .into_response()
        }
    }
}

fn reject_malformed(rejection: JsonRejection) -> Response {
    bad_request(format!("malformed request body: {rejection}"))
}

async fn create_duel(
    State(state): State<GatewayState>,
    body: Result<Json<CreateDuelRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return reject_malformed(rejection),
    };
    let token = match request.validate() {
        Ok(token) => token,
        Err(message) => return bad_request(message),
    };

    let result = state.engine.create_duel(CreateDuelInput {
        player1_wallet: request.player1_wallet,
        player2_wallet: request.player2_wallet,
        player1_character_id: request.player1_character_id,
        player2_character_id: request.player2_character_id,
        player1_name: request.player1_name,
        player2_name: request.player2_name,
        stake_amount: request.stake_amount,
        token,
        rules: request.rules.unwrap_or_else(|| Value::Object(Default::default())),
    });

    match result {
        Ok(created) => Json(ApiEnvelope::ok(CreateDuelResponse {
            duel_id: created.duel_id.as_str().to_string(),
            player1_stealth_id: created.player1_stealth_id.as_str().to_string(),
            player2_stealth_id: created.player2_stealth_id.as_str().to_string(),
            stake_amount_lamports: created.stake_lamports.to_string(),
            expires_at: created.expires_at,
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn lock_stake(
    State(state): State<GatewayState>,
    body: Result<Json<LockStakeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return reject_malformed(rejection),
    };
    let duel_id = match parse_duel_id(&request.duel_id) {
        Ok(duel_id) => duel_id,
        Err(message) => return bad_request(message),
    };
    if let Err(message) = validate_wallet("playerWallet", &request.player_wallet) {
        return bad_request(message);
    }
    if request.payment_proof.is_empty() {
        return bad_request("paymentProof must be non-empty");
    }

    match state
        .engine
        .lock_stake(&duel_id, &request.player_wallet, &request.payment_proof)
        .await
    {
        Ok(locked) => Json(ApiEnvelope::ok(LockStakeResponse {
            tx_signature: locked.tx_signature,
            duel_status: locked.status.as_str().to_string(),
            both_locked: locked.both_locked,
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn settle(
    State(state): State<GatewayState>,
    body: Result<Json<SettleRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return reject_malformed(rejection),
    };
    let duel_id = match parse_duel_id(&request.duel_id) {
        Ok(duel_id) => duel_id,
        Err(message) => return bad_request(message),
    };
    if let Err(message) = validate_wallet("winnerWallet", &request.winner_wallet) {
        return bad_request(message);
    }

    match state
        .engine
        .settle(SettleInput {
            duel_id,
            winner_wallet: request.winner_wallet,
            combat_summary: request.combat_summary,
            server_signature: request.server_signature,
        })
        .await
    {
        Ok(settled) => Json(ApiEnvelope::ok(SettleResponse {
            winner_tx_signature: settled.winner_tx_signature,
            treasury_tx_signature: settled.treasury_tx_signature,
            winner_payout_lamports: settled.winner_payout.to_string(),
            treasury_fee_lamports: settled.house_fee.to_string(),
            commitment_hash: settled.commitment_hash,
            commitment_tx_signature: settled.commitment_tx_signature,
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn refund(
    State(state): State<GatewayState>,
    body: Result<Json<RefundRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return reject_malformed(rejection),
    };
    let duel_id = match parse_duel_id(&request.duel_id) {
        Ok(duel_id) => duel_id,
        Err(message) => return bad_request(message),
    };
    let reason: RefundReason = match request.reason.parse() {
        Ok(reason) => reason,
        Err(_) => return bad_request("reason must be one of timeout, cancelled, error"),
    };

    match state.engine.refund(&duel_id, reason).await {
        Ok(refund_tx_signatures) => Json(ApiEnvelope::ok(RefundResponse {
            refund_tx_signatures,
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn get_duel(State(state): State<GatewayState>, Path(duel_id): Path<String>) -> Response {
    let duel_id = match parse_duel_id(&duel_id) {
        Ok(duel_id) => duel_id,
        Err(message) => return bad_request(message),
    };
    match state.engine.get_duel(&duel_id) {
        Ok(record) => Json(ApiEnvelope::ok(GetDuelResponse {
            duel: DuelView::from_record(record),
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn verify_duel(State(state): State<GatewayState>, Path(duel_id): Path<String>) -> Response {
    let duel_id = match parse_duel_id(&duel_id) {
        Ok(duel_id) => duel_id,
        Err(message) => return bad_request(message),
    };
    let record = match state.engine.commitments().get_commitment_record(&duel_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiEnvelope::<Value>::err("no commitment recorded for duel")),
            )
                .into_response();
        }
        Err(err) => return engine_error_response(err.into()),
    };

    let raw_data = match record.commitment.canonical_bytes() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => return engine_error_response(err.into()),
    };
    let recomputed_hash = record
        .commitment
        .hash_hex()
        .unwrap_or_else(|_| String::new());
    let hash_matches = recomputed_hash == record.commitment_hash;

    let explorer_url = record
        .on_chain_tx_signature
        .as_deref()
        .map(|tx| explorer_tx_url(state.network, tx));
    Json(ApiEnvelope::ok(VerifyResponse {
        verification: VerificationView {
            duel_id: duel_id.as_str().to_string(),
            winner_stealth_id: record.commitment.winner_stealth_id.as_str().to_string(),
            loser_stealth_id: record.commitment.loser_stealth_id.as_str().to_string(),
            recorded_at: record.recorded_at,
        },
        commitment: CommitmentView {
            raw_data,
            hash: record.commitment_hash,
            recomputed_hash,
            hash_matches,
        },
        on_chain: OnChainView {
            posted: record.on_chain_success,
            tx_signature: record.on_chain_tx_signature,
            explorer_url,
        },
    }))
    .into_response()
}

async fn recovery_status(State(state): State<GatewayState>) -> Response {
    match state.engine.recovery_status() {
        Ok(status) => Json(ApiEnvelope::ok(RecoveryStatusResponse {
            failed_duels: status.failed_duels,
            pending_settlements: status.pending_settlements,
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn emergency_refund(
    State(state): State<GatewayState>,
    body: Result<Json<EmergencyRefundRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return reject_malformed(rejection),
    };
    let duel_id = match parse_duel_id(&request.duel_id) {
        Ok(duel_id) => duel_id,
        Err(message) => return bad_request(message),
    };
    if let Err(message) = validate_wallet("player1Wallet", &request.player1_wallet) {
        return bad_request(message);
    }
    if let Err(message) = validate_wallet("player2Wallet", &request.player2_wallet) {
        return bad_request(message);
    }
    let token = match parse_token(request.token.as_deref()) {
        Ok(token) => token,
        Err(message) => return bad_request(message),
    };
    let stake_per_player = match request.stake_per_player_lamports.parse::<u128>() {
        Ok(value) if value > 0 => duel_domain::Lamports(value),
        _ => return bad_request("stakePerPlayerLamports must be a positive integer"),
    };

    info!(duel_id = %duel_id, "operator requested emergency refund");
    match state
        .engine
        .emergency_refund(EmergencyRefundInput {
            duel_id,
            player1_wallet: request.player1_wallet,
            player2_wallet: request.player2_wallet,
            stake_per_player,
            token,
        })
        .await
    {
        Ok(results) => Json(ApiEnvelope::ok(EmergencyRefundResponse {
            refunds: results
                .into_iter()
                .map(|result| EmergencyRefundEntry {
                    player: result.player,
                    success: result.success,
                    tx_signature: result.tx_signature,
                    error: result.error,
                })
                .collect(),
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn dust_status(
    State(state): State<GatewayState>,
    Query(query): Query<DustQuery>,
) -> Response {
    let token = match parse_token(query.token.as_deref()) {
        Ok(token) => token,
        Err(message) => return bad_request(message),
    };
    match state.engine.dust_status(token) {
        Ok(status) => Json(ApiEnvelope::ok(DustStatusResponse {
            dust_lamports: status.accumulated.to_string(),
            can_sweep: status.can_sweep,
            minimum_to_sweep: status.minimum_to_sweep.to_string(),
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

async fn sweep_dust(
    State(state): State<GatewayState>,
    body: Result<Json<SweepDustRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return reject_malformed(rejection),
    };
    let token = match parse_token(request.token.as_deref()) {
        Ok(token) => token,
        Err(message) => return bad_request(message),
    };
    match state.engine.sweep_dust(token).await {
        Ok(swept) => Json(ApiEnvelope::ok(SweepDustResponse {
            swept_lamports: swept.swept.to_string(),
            tx_signature: swept.tx_signature,
        }))
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

fn explorer_tx_url(network: NetworkTag, tx_signature: &str) -> String {
    match network {
        NetworkTag::Devnet => {
            format!("https://explorer.solana.com/tx/{tx_signature}?cluster=devnet")
        }
        NetworkTag::Mainnet => format!("https://explorer.solana.com/tx/{tx_signature}"),
    }
}
