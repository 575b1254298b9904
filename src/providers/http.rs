//! Shared upstream call: POST JSON, map status, track errors

use reqwest::StatusCode;
use serde_json::Value;
use log::{debug, error, trace, warn};
use crate::credentials::{
  http_error_tag, CredentialStore, ERROR_AUTH, ERROR_NETWORK,
  ERROR_RATE_LIMIT
};
use crate::error::{Error, Result};
use crate::interactions::error_body;
use super::AdapterContext;

const MAX_ERROR_DETAIL_LENGTH: usize = 300;

/// How the API key is sent
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a>
{   Bearer(&'a str)
  , Header(&'static str, &'a str)
}

/// Whether outcomes are written back to the credential store and the
/// interaction log. Key validation calls touch neither.
#[derive(Clone, Copy)]
pub enum Tracking<'a>
{   Live(&'a dyn CredentialStore)
  , Probe
}

impl Tracking<'_>
{   async fn record(&self, provider_id: &str, tag: &str) -> Result<()>
    {   match self
        {   Tracking::Live(store) => {
              store.record_error(provider_id, tag).await
            }
          , Tracking::Probe => Ok(())
        }
    }

    async fn clear(&self, provider_id: &str) -> Result<()>
    {   match self
        {   Tracking::Live(store) => store.clear_error(provider_id).await
          , Tracking::Probe => Ok(())
        }
    }

    fn log(
      &self
    , ctx: &AdapterContext
    , provider_id: &str
    , request: &Value
    , response: Value
    )
    {   if let Tracking::Live(_) = self
        {   ctx.interactions.record(provider_id, request, response);
        }
    }
}

/// Issue a provider call and translate its outcome.
///
/// 401 is `AuthenticationRequired`; 402/403/429 and every other error
/// status or transport failure is `ProviderUnavailable`. Success
/// clears the recorded error before the body is parsed. Live calls
/// are written to the interaction log whatever the outcome.
pub async fn post_json(
  ctx: &AdapterContext
, provider_id: &str
, url: &str
, auth: Auth<'_>
, payload: &Value
, tracking: Tracking<'_>
) -> Result<Value>
{   trace!("{} request to {}: {}", provider_id, url, payload);

    let builder = ctx.http
      .post(url)
      .timeout(ctx.timeout)
      .header("Content-Type", "application/json")
      .json(payload);
    let builder = match auth
    {   Auth::Bearer(key) => builder.bearer_auth(key)
      , Auth::Header(name, key) => builder.header(name, key)
    };

    let response = match builder.send().await
    {   Ok(response) => response
      , Err(e) => {
          error!("{} transport error: {}", provider_id, e);
          tracking.record(provider_id, ERROR_NETWORK).await?;
          tracking.log(
            ctx,
            provider_id,
            payload,
            error_body("network", &e.to_string(), None, None)
          );
          let message = if e.is_timeout()
          {   "Provider request timed out"
          } else
          {   "Provider request failed"
          };
          return Err(Error::unavailable(provider_id, message));
        }
    };

    let status = response.status();
    debug!("{} responded {}", provider_id, status);

    if status.is_client_error() || status.is_server_error()
    {   let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);
        warn!(
          "{} upstream error {}: {}",
          provider_id,
          status,
          detail.as_deref().unwrap_or("<empty>")
        );
        let (tag, error_type) = match status
        {   StatusCode::UNAUTHORIZED => (ERROR_AUTH.to_string(), "unauthorized")
          , StatusCode::PAYMENT_REQUIRED
          | StatusCode::FORBIDDEN
          | StatusCode::TOO_MANY_REQUESTS => {
              (ERROR_RATE_LIMIT.to_string(), "rate_limit")
            }
          , _ => (http_error_tag(status.as_u16()), "http_error")
        };
        tracking.record(provider_id, &tag).await?;
        tracking.log(
          ctx,
          provider_id,
          payload,
          error_body(
            error_type,
            &format!("HTTP {}", status.as_u16()),
            Some(status.as_u16()),
            Some(&body)
          )
        );
        return Err(match status
        {   StatusCode::UNAUTHORIZED => Error::auth_required(provider_id)
          , StatusCode::PAYMENT_REQUIRED
          | StatusCode::FORBIDDEN
          | StatusCode::TOO_MANY_REQUESTS => Error::unavailable(
              provider_id,
              with_detail("Provider quota exhausted", detail)
            )
          , _ => Error::unavailable(
              provider_id,
              with_detail("Provider error", detail)
            )
        });
    }

    tracking.clear(provider_id).await?;

    let text = response.text().await.map_err(|e| {
      error!("{} body could not be read: {}", provider_id, e);
      Error::unavailable(provider_id, "Unexpected response format")
    })?;
    let data: Value = match serde_json::from_str(&text)
    {   Ok(data) => data
      , Err(e) => {
          error!("{} returned unparseable body: {}", provider_id, e);
          tracking.log(
            ctx,
            provider_id,
            payload,
            error_body(
              "unexpected_response",
              "Response was not valid JSON",
              None,
              Some(&text)
            )
          );
          return Err(Error::unavailable(
            provider_id,
            "Unexpected response format"
          ));
        }
    };
    trace!("{} response: {}", provider_id, data);
    tracking.log(ctx, provider_id, payload, data.clone());
    Ok(data)
}

fn with_detail(message: &str, detail: Option<String>) -> String
{   match detail
    {   Some(detail) => format!("{}: {}", message, detail)
      , None => message.to_string()
    }
}

/// Compact, truncated error detail from an upstream error body
pub(crate) fn error_detail(body: &str) -> Option<String>
{   let detail = match serde_json::from_str::<Value>(body)
    {   Ok(Value::Object(map)) => match map.get("error")
        {   Some(Value::Object(err)) => {
              let parts: Vec<&str> = ["status", "message"]
                .iter()
                .filter_map(|k| err.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
              if parts.is_empty()
              {   Some(Value::Object(err.clone()).to_string())
              } else
              {   Some(parts.join(" - "))
              }
            }
          , Some(Value::String(err)) => Some(err.clone())
          , _ => match map.get("message").and_then(Value::as_str)
            {   Some(message) => Some(message.to_string())
              , None if !map.is_empty() => {
                  Some(Value::Object(map.clone()).to_string())
                }
              , None => None
            }
        }
      , Ok(Value::Null) => None
      , Ok(other) => Some(other.to_string())
      , Err(_) => Some(body.to_string())
    }?;

    let compact = detail.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.is_empty()
    {   return None;
    }
    if compact.chars().count() > MAX_ERROR_DETAIL_LENGTH
    {   let cut: String = compact
          .chars()
          .take(MAX_ERROR_DETAIL_LENGTH - 3)
          .collect();
        Some(format!("{}...", cut))
    } else
    {   Some(compact)
    }
}
