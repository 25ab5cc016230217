//! Request handlers.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::caller::Caller;
use super::error::ApiError;
use super::ApiState;
use crate::domain::errors::DomainError;
use crate::domain::models::{EscrowRecord, Message, Session, Summon, SummonTarget, Wallet};

type ApiResult<T> = Result<T, ApiError>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;
type IdPath = Result<Path<Uuid>, PathRejection>;

#[derive(Debug, Deserialize)]
pub struct InitiateSessionRequest {
    pub recipient_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct LinkEscrowRequest {
    pub escrow_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// Escrow deposit reported by the chain watcher.
#[derive(Debug, Deserialize)]
pub struct IngestEscrowRequest {
    pub external_id: String,
    pub depositor_address: String,
    pub recipient_address: String,
    pub amount: i64,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub accept_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dispute_deadline: Option<DateTime<Utc>>,
    /// Deposit time on chain; defaults to now
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterWalletRequest {
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateSummonRequest {
    pub target_name: String,
    #[serde(default)]
    pub target_handle: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PledgeRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn initiate_session(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    payload: JsonBody<InitiateSessionRequest>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let Json(req) = payload?;
    let session = state.sessions.initiate(caller, req.recipient_id, req.amount).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
) -> ApiResult<Json<Session>> {
    let Path(id) = path?;
    Ok(Json(state.sessions.get(id, caller).await?))
}

pub async fn accept_session(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
) -> ApiResult<Json<Session>> {
    let Path(id) = path?;
    Ok(Json(state.sessions.accept(id, caller).await?))
}

pub async fn cancel_session(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
) -> ApiResult<Json<Session>> {
    let Path(id) = path?;
    Ok(Json(state.sessions.cancel(id, caller).await?))
}

/// Escrow backing the session, or `null` when none has been found yet.
pub async fn get_session_escrow(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
) -> ApiResult<Json<Option<EscrowRecord>>> {
    let Path(id) = path?;
    Ok(Json(state.sessions.escrow_for(id, caller).await?))
}

pub async fn link_session_escrow(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
    payload: JsonBody<LinkEscrowRequest>,
) -> ApiResult<Json<EscrowRecord>> {
    let Path(id) = path?;
    let Json(req) = payload?;
    Ok(Json(state.sessions.link_escrow(id, req.escrow_id, caller).await?))
}

pub async fn list_messages(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
) -> ApiResult<Json<Vec<Message>>> {
    let Path(id) = path?;
    Ok(Json(state.messages.list(id, caller).await?))
}

pub async fn post_message(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
    payload: JsonBody<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let Path(id) = path?;
    let Json(req) = payload?;
    let message = state.messages.post(id, caller, &req.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_message_read(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
) -> ApiResult<Json<Message>> {
    let Path(id) = path?;
    Ok(Json(state.messages.mark_read(id, caller).await?))
}

/// Only configured chain watchers may report deposits.
pub async fn ingest_escrow(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    payload: JsonBody<IngestEscrowRequest>,
) -> ApiResult<(StatusCode, Json<EscrowRecord>)> {
    if !state.escrow_watchers.contains(&caller) {
        tracing::warn!(%caller, "escrow ingest from a caller that is not a chain watcher");
        return Err(DomainError::Forbidden("only chain watchers can ingest escrow records".to_string()).into());
    }
    let Json(req) = payload?;

    let mut record = EscrowRecord::new(req.external_id, &req.depositor_address, &req.recipient_address, req.amount)
        .with_deadlines(req.accept_deadline, req.dispute_deadline);
    if let Some(created_at) = req.created_at {
        record = record.with_created_at(created_at);
    }
    if let Some(session_id) = req.session_id {
        record = record.with_session(session_id);
    }

    let stored = state.sessions.record_escrow(record).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn register_wallet(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    payload: JsonBody<RegisterWalletRequest>,
) -> ApiResult<(StatusCode, Json<Wallet>)> {
    let Json(req) = payload?;
    if req.address.trim().is_empty() {
        return Err(DomainError::ValidationFailed("Wallet address cannot be empty".to_string()).into());
    }

    let wallet = Wallet::new(caller, &req.address, req.is_primary);
    state.wallets.register(&wallet).await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

pub async fn create_summon(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    payload: JsonBody<CreateSummonRequest>,
) -> ApiResult<(StatusCode, Json<Summon>)> {
    let Json(req) = payload?;
    let mut target = SummonTarget::new(req.target_name);
    if let Some(handle) = req.target_handle {
        target = target.with_handle(handle);
    }
    let summon = state.pledges.create_summon(caller, target).await?;
    Ok((StatusCode::CREATED, Json(summon)))
}

pub async fn get_summon(
    State(state): State<Arc<ApiState>>,
    Caller(_): Caller,
    path: IdPath,
) -> ApiResult<Json<Summon>> {
    let Path(id) = path?;
    Ok(Json(state.pledges.get_summon(id).await?))
}

pub async fn submit_pledge(
    State(state): State<Arc<ApiState>>,
    Caller(caller): Caller,
    path: IdPath,
    payload: JsonBody<PledgeRequest>,
) -> ApiResult<Json<Summon>> {
    let Path(id) = path?;
    let Json(req) = payload?;
    Ok(Json(state.pledges.submit(id, caller, req.amount).await?))
}
