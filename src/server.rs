//! HTTP surface: the OpenAI-compatible endpoint and admin routes

use std::sync::Arc;
use std::time::Instant;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use log::{error, info};
use crate::client::Gateway;
use crate::context;
use crate::error::Error;
use crate::request::ChatCompletionRequest;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error rendered as an OpenAI-style envelope
#[derive(Debug)]
pub struct ApiError
{   pub status: StatusCode
  , pub kind: &'static str
  , pub code: &'static str
  , pub message: String
}

impl ApiError
{   fn new(
      status: StatusCode
    , kind: &'static str
    , code: &'static str
    , message: impl Into<String>
    ) -> Self
    {   ApiError
        {   status
          , kind
          , code
          , message: message.into()
        }
    }

    /// Status mapping for the admin routes: a rejected key is the
    /// caller's input problem, an unreachable provider is a 503.
    fn admin(error: Error) -> Self
    {   match error
        {   Error::AuthenticationRequired { .. } => ApiError::new(
              StatusCode::BAD_REQUEST,
              "invalid_request_error",
              "invalid_api_key",
              "Invalid API key"
            )
          , Error::ProviderUnavailable { message, .. } => ApiError::new(
              StatusCode::SERVICE_UNAVAILABLE,
              "server_error",
              "provider_unavailable",
              format!("Provider health check failed: {}", message)
            )
          , other => ApiError::from(other)
        }
    }
}

impl From<Error> for ApiError
{   fn from(error: Error) -> Self
    {   let message = error.to_string();
        match error
        {   Error::InvalidRequest(_) => ApiError::new(
              StatusCode::BAD_REQUEST,
              "invalid_request_error",
              "invalid_request",
              message
            )
          , Error::AuthenticationRequired { .. } => ApiError::new(
              StatusCode::UNAUTHORIZED,
              "invalid_request_error",
              "provider_auth_required",
              message
            )
          , Error::ProviderUnavailable { .. } => ApiError::new(
              StatusCode::TOO_MANY_REQUESTS,
              "server_error",
              "provider_unavailable",
              message
            )
          , Error::UnknownProvider(_) => ApiError::new(
              StatusCode::NOT_FOUND,
              "invalid_request_error",
              "provider_not_found",
              message
            )
          , Error::InvalidConfiguration(_) | Error::Storage(_) => {
              error!("Fatal error serving request: {}", message);
              ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "internal_error",
                message
              )
            }
        }
    }
}

impl IntoResponse for ApiError
{   fn into_response(self) -> Response
    {   let body = json!({
          "error": {
            "message": self.message,
            "type": self.kind,
            "code": self.code
          }
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Router over a shared gateway
pub fn router(gateway: Arc<Gateway>) -> Router
{   Router::new()
      .route("/v1/chat/completions", post(chat_completions))
      .route("/admin/providers", get(list_providers))
      .route(
        "/admin/providers/{provider_id}/credentials",
        get(get_credential)
          .post(set_credential)
          .delete(delete_credential)
      )
      .route(
        "/admin/providers/{provider_id}/healthcheck",
        post(healthcheck)
      )
      .route("/admin/providers/{provider_id}/logs", get(list_provider_logs))
      .route("/admin/events", get(list_events))
      .route("/healthz", get(|| async { Json(json!({"status": "ok"})) }))
      .layer(middleware::from_fn(request_context))
      .with_state(gateway)
}

/// Tag each request with an id, visible to events and interaction
/// logs while it runs, and log its outcome
async fn request_context(request: Request, next: Next) -> Response
{   let request_id = request.headers()
      .get(REQUEST_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .filter(|v| !v.is_empty())
      .map(str::to_string)
      .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = context::with_request_id(
      request_id.clone(),
      next.run(request)
    ).await;

    info!(
      "{} {} -> {} in {:.1}ms (request_id={})",
      method,
      path,
      response.status().as_u16(),
      start.elapsed().as_secs_f64() * 1000.0,
      request_id
    );
    if let Ok(value) = HeaderValue::from_str(&request_id)
    {   response.headers_mut().entry(REQUEST_ID_HEADER).or_insert(value);
    }
    response
}

async fn chat_completions(
  State(gateway): State<Arc<Gateway>>
, payload: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>
) -> ApiResult<Response>
{   let Json(request) = payload.map_err(rejected)?;
    let response = gateway.chat_completions(&request).await?;
    Ok(Json(response).into_response())
}

async fn list_providers(
  State(gateway): State<Arc<Gateway>>
) -> ApiResult<Response>
{   let providers = gateway.list_providers().await?;
    Ok(Json(json!({"providers": providers})).into_response())
}

fn rejected(rejection: JsonRejection) -> ApiError
{   ApiError::from(Error::InvalidRequest(rejection.body_text()))
}

#[derive(Debug, Deserialize)]
struct CredentialBody
{   #[serde(default)]
    api_key: Option<String>
}

async fn get_credential(
  State(gateway): State<Arc<Gateway>>
, Path(provider_id): Path<String>
) -> ApiResult<Response>
{   match gateway.get_credential(&provider_id).await?
    {   Some(summary) => Ok(Json(summary).into_response())
      , None => Err(credential_not_found())
    }
}

async fn set_credential(
  State(gateway): State<Arc<Gateway>>
, Path(provider_id): Path<String>
, payload: std::result::Result<Json<CredentialBody>, JsonRejection>
) -> ApiResult<Response>
{   let Json(body) = payload.map_err(rejected)?;
    let api_key = body.api_key
      .filter(|k| !k.trim().is_empty())
      .ok_or_else(|| {
        ApiError::from(Error::InvalidRequest("Missing api_key".into()))
      })?;
    gateway
      .set_credential(&provider_id, &api_key)
      .await
      .map_err(ApiError::admin)?;
    Ok(Json(json!({"status": "ok"})).into_response())
}

async fn delete_credential(
  State(gateway): State<Arc<Gateway>>
, Path(provider_id): Path<String>
) -> ApiResult<Response>
{   if gateway.delete_credential(&provider_id).await?
    {   Ok(Json(json!({"status": "ok"})).into_response())
    } else
    {   Err(credential_not_found())
    }
}

fn credential_not_found() -> ApiError
{   ApiError::new(
      StatusCode::NOT_FOUND,
      "invalid_request_error",
      "credential_not_found",
      "Provider credential not found"
    )
}

async fn healthcheck(
  State(gateway): State<Arc<Gateway>>
, Path(provider_id): Path<String>
) -> ApiResult<Response>
{   if gateway.registry().descriptor(&provider_id).is_none()
    {   return Err(Error::UnknownProvider(provider_id).into());
    }
    if gateway.store().get_api_key(&provider_id).await?.is_none()
    {   return Err(ApiError::new(
          StatusCode::BAD_REQUEST,
          "invalid_request_error",
          "provider_auth_required",
          "Provider API key not configured"
        ));
    }
    gateway
      .healthcheck(&provider_id)
      .await
      .map_err(ApiError::admin)?;
    Ok(Json(json!({"status": "ok"})).into_response())
}

#[derive(Debug, Deserialize)]
struct LimitQuery
{   #[serde(default)]
    limit: Option<usize>
}

async fn list_provider_logs(
  State(gateway): State<Arc<Gateway>>
, Path(provider_id): Path<String>
, Query(query): Query<LimitQuery>
) -> ApiResult<Response>
{   let logs = gateway.provider_logs(&provider_id, query.limit.unwrap_or(100))?;
    Ok(Json(json!({"provider_id": provider_id, "logs": logs})).into_response())
}

async fn list_events(
  State(gateway): State<Arc<Gateway>>
, Query(query): Query<LimitQuery>
) -> Json<serde_json::Value>
{   let events = gateway.recent_events(query.limit.unwrap_or(25));
    Json(json!({"events": events}))
}
