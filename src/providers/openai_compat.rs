//! Adapter for providers that already speak the OpenAI chat schema
//! (Cerebras, OpenRouter)

use async_trait::async_trait;
use serde_json::{json, Value};
use log::debug;
use crate::config::ProviderDescriptor;
use crate::error::{Error, Result};
use crate::request::{
  completion_id, epoch_seconds, ChatCompletionRequest,
  ChatCompletionResponse, CHAT_COMPLETION_OBJECT
};
use super::http::{post_json, Auth, Tracking};
use super::{probe_request, AdapterContext, ProviderAdapter};

pub struct OpenAiCompatibleAdapter
{   descriptor: ProviderDescriptor
  , ctx: AdapterContext
  , tag: &'static str
}

impl OpenAiCompatibleAdapter
{   pub fn new(
      descriptor: ProviderDescriptor
    , ctx: AdapterContext
    , tag: &'static str
    ) -> Self
    {   debug!("Creating {} adapter for {}", tag, descriptor.id);
        OpenAiCompatibleAdapter
        {   descriptor
          , ctx
          , tag
        }
    }

    /// The request already is the wire payload; unset optionals are
    /// skipped by serialization.
    pub fn build_payload(request: &ChatCompletionRequest) -> Value
    {   serde_json::to_value(request).unwrap_or_else(|_| json!({}))
    }

    /// Fill missing envelope fields and coerce into the normalized shape
    pub fn normalize(
      &self
    , data: Value
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   let Value::Object(mut map) = data
        else
        {   return Err(Error::unavailable(
              &self.descriptor.id,
              "Unexpected response format"
            ));
        };
        fill_missing(&mut map, "id", || json!(completion_id(self.tag)));
        fill_missing(&mut map, "object", || json!(CHAT_COMPLETION_OBJECT));
        fill_missing(&mut map, "created", || json!(epoch_seconds()));
        fill_missing(&mut map, "model", || json!(request.model));

        let mut response: ChatCompletionResponse
          = serde_json::from_value(Value::Object(map)).map_err(|e| {
            debug!("{} reply did not normalize: {}", self.descriptor.id, e);
            Error::unavailable(
              &self.descriptor.id,
              "Unexpected response format"
            )
          })?;
        response.usage = response.usage.and_then(|u| u.completed());
        Ok(response)
    }

    async fn post(
      &self
    , payload: &Value
    , api_key: &str
    , tracking: Tracking<'_>
    ) -> Result<Value>
    {   post_json(
          &self.ctx,
          &self.descriptor.id,
          &self.descriptor.endpoint(),
          Auth::Bearer(api_key),
          payload,
          tracking
        ).await
    }
}

fn fill_missing(
  map: &mut serde_json::Map<String, Value>
, key: &str
, default: impl FnOnce() -> Value
)
{   let missing = map.get(key).map_or(true, |v| {
      v.is_null() || v.as_str().is_some_and(str::is_empty)
    });
    if missing
    {   map.insert(key.to_string(), default());
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter
{   fn provider_id(&self) -> &str
    {   &self.descriptor.id
    }

    async fn chat_completions(
      &self
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   let api_key = self.ctx.require_key(&self.descriptor.id).await?;
        let payload = Self::build_payload(request);
        let data = self.post(
          &payload,
          &api_key,
          Tracking::Live(self.ctx.store.as_ref())
        ).await?;
        self.normalize(data, request)
    }

    async fn validate_api_key(&self, api_key: &str) -> Result<()>
    {   let request = probe_request(&self.descriptor)?;
        let payload = Self::build_payload(&request);
        self.post(&payload, api_key, Tracking::Probe).await?;
        Ok(())
    }
}
