use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::warn;

use roster_core::{auth::VerifyOutcome, domain::ParseMethod, export::ExportFormat};

use crate::{error::ApiError, AppState};

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============== Request bodies ==============

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub phone: String,
    pub chat_id: i64,
    #[serde(default = "default_method")]
    pub method: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub phone: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_method() -> String {
    "both".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    Ok(payload?.0)
}

// ============== Handlers ==============

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "online",
        "service": "roster",
        "sessions": state.service.active_sessions(),
    }))
}

pub async fn send_code(
    State(state): State<AppState>,
    payload: Result<Json<PhoneRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body(payload)?;
    state.service.request_code(&req.phone).await?;
    Ok(Json(json!({ "success": true, "message": "code sent" })))
}

pub async fn verify_code(
    State(state): State<AppState>,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body(payload)?;
    let out = state.service.verify_code(&req.phone, &req.code).await?;
    Ok(Json(match out {
        VerifyOutcome::Authenticated => json!({ "success": true, "message": "authenticated" }),
        VerifyOutcome::NeedTwoFactor => json!({
            "success": true,
            "need_2fa": true,
            "message": "two-factor password required",
        }),
    }))
}

pub async fn verify_two_factor(
    State(state): State<AppState>,
    payload: Result<Json<TwoFactorRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body(payload)?;
    state
        .service
        .verify_two_factor(&req.phone, &req.password)
        .await?;
    Ok(Json(json!({ "success": true, "message": "authenticated" })))
}

pub async fn get_chats(
    State(state): State<AppState>,
    payload: Result<Json<PhoneRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body(payload)?;
    let chats = state.service.list_conversations(&req.phone).await?;
    Ok(Json(json!({ "success": true, "chats": chats })))
}

pub async fn parse(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body(payload)?;
    let method: ParseMethod = req.method.parse()?;
    let result = state.service.parse(&req.phone, req.chat_id, method).await?;
    Ok(Json(json!({
        "success": true,
        "users": result.users,
        "total": result.total(),
        "counters": result.counters,
    })))
}

pub async fn parse_stream(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let req = body(payload)?;
    let method: ParseMethod = req.method.parse()?;
    let frames = state
        .service
        .parse_stream(&req.phone, req.chat_id, method)
        .await?;

    let events = ReceiverStream::new(frames.into_inner()).map(|frame| {
        let event = Event::default().json_data(&frame).unwrap_or_else(|e| {
            warn!(error = %e, "frame serialization failed");
            Event::default().data(r#"{"type":"error","message":"frame serialization failed"}"#)
        });
        Ok(event)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn export(
    State(state): State<AppState>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body(payload)?;
    let format: ExportFormat = req.format.parse()?;
    let artifact = state.service.export(&req.phone, format).await?;

    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.body,
    )
        .into_response())
}

pub async fn disconnect(
    State(state): State<AppState>,
    payload: Result<Json<PhoneRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body(payload)?;
    state.service.logout(&req.phone).await?;
    Ok(Json(json!({ "success": true, "message": "disconnected" })))
}
