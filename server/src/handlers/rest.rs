/// REST API handlers for HTTP endpoints.
/// Handles conversations, messages, call history, profiles and search.
/// The calling principal is taken from the `x-principal` header.

use crate::error::StoreError;
use crate::store::models::*;
use crate::store::{Directory, StorePool};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use serde_json::json;

/// Header carrying the caller's principal
pub const PRINCIPAL_HEADER: &str = "x-principal";

fn caller(req: &HttpRequest) -> Result<String, StoreError> {
    req.headers()
        .get(PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|principal| !principal.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Unauthorized("missing caller principal".to_string()))
}

/// List the caller's conversation ids
/// GET /conversations
pub async fn list_conversations(
    pool: web::Data<StorePool>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    let ids = Directory::list_conversations(&pool, &caller).await?;
    Ok(HttpResponse::Ok().json(ids))
}

/// Open a conversation
/// POST /conversations
pub async fn add_conversation(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    body: web::Json<AddConversationRequest>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    match Directory::add_conversation(&pool, &caller, &body.conversation_id).await {
        Ok(conversation) => Ok(HttpResponse::Created().json(json!({
            "conversation_id": conversation.id
        }))),
        Err(e) => {
            log::warn!("Add conversation rejected for {}: {}", caller, e);
            Err(e.into())
        }
    }
}

/// Remove a conversation
/// DELETE /conversations/:id
pub async fn remove_conversation(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    conversation_id: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    match Directory::remove_conversation(&pool, &caller, &conversation_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => {
            log::warn!("Remove conversation rejected for {}: {}", caller, e);
            Err(e.into())
        }
    }
}

/// List messages of a conversation
/// GET /conversations/:id/messages
pub async fn list_messages(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    conversation_id: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    let messages = Directory::list_messages(&pool, &caller, &conversation_id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// Send a message
/// POST /conversations/:id/messages
pub async fn send_message(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    conversation_id: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    let reply =
        Directory::send_message(&pool, &caller, &conversation_id, &body.sender, &body.text)
            .await?;
    Ok(HttpResponse::Created().json(reply))
}

/// Caller's call history
/// GET /calls
pub async fn get_call_history(
    pool: web::Data<StorePool>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    let calls = Directory::get_call_history(&pool, &caller).await?;
    Ok(HttpResponse::Ok().json(calls))
}

/// Record a finished call
/// POST /calls
pub async fn record_call(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    body: web::Json<RecordCallRequest>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    let entry = Directory::record_call(&pool, &caller, &body).await?;
    Ok(HttpResponse::Created().json(entry))
}

/// Delete a call log entry
/// DELETE /calls/:id
pub async fn delete_call_entry(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    call_id: web::Path<u64>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    Directory::delete_call_entry(&pool, &caller, call_id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Look up a profile; responds with `null` when the principal has none
/// GET /profiles/:principal
pub async fn get_profile(
    pool: web::Data<StorePool>,
    principal: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let profile = Directory::get_profile(&pool, &principal).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Create the caller's profile
/// POST /profile
pub async fn create_profile(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    body: web::Json<CreateProfileRequest>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    match Directory::create_profile(&pool, &caller, &body.username, &body.display_name).await {
        Ok(profile) => Ok(HttpResponse::Created().json(profile)),
        Err(e) => {
            log::warn!("Profile creation rejected for {}: {}", caller, e);
            Err(e.into())
        }
    }
}

/// Update the caller's profile
/// PATCH /profile
pub async fn update_profile(
    pool: web::Data<StorePool>,
    req: HttpRequest,
    body: web::Json<UpdateProfileRequest>,
) -> ActixResult<HttpResponse> {
    let caller = caller(&req)?;
    let profile = Directory::update_profile(
        &pool,
        &caller,
        body.username.as_deref(),
        body.display_name.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Search the directory
/// GET /users/search?q=
pub async fn search_users(
    pool: web::Data<StorePool>,
    query: web::Query<SearchQuery>,
) -> ActixResult<HttpResponse> {
    let results = Directory::search_users(&pool, &query.q).await?;
    Ok(HttpResponse::Ok().json(results))
}

/// Health check endpoint
/// GET /health
pub async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}
