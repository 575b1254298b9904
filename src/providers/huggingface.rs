//! Hugging Face Inference API adapter

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use log::debug;
use crate::config::ProviderDescriptor;
use crate::error::{Error, Result};
use crate::request::{
  completion_id, epoch_seconds, AssistantMessage, ChatCompletionRequest,
  ChatCompletionResponse, Choice, Usage, CHAT_COMPLETION_OBJECT
};
use super::http::{post_json, Auth, Tracking};
use super::{probe_request, AdapterContext, ProviderAdapter};

pub struct HuggingFaceAdapter
{   descriptor: ProviderDescriptor
  , ctx: AdapterContext
}

impl HuggingFaceAdapter
{   pub fn new(descriptor: ProviderDescriptor, ctx: AdapterContext) -> Self
    {   debug!("Creating huggingface adapter for {}", descriptor.id);
        HuggingFaceAdapter
        {   descriptor
          , ctx
        }
    }

    pub fn url_for(&self, model: &str) -> String
    {   self.descriptor.endpoint().replace("{model_id}", model)
    }

    /// The model travels in the URL. Only sampling parameters the
    /// inference API accepts are forwarded.
    pub fn build_payload(request: &ChatCompletionRequest) -> Value
    {   let mut payload = Map::new();
        payload.insert("messages".into(), json!(request.messages));
        if let Some(v) = request.temperature
        {   payload.insert("temperature".into(), json!(v));
        }
        if let Some(v) = request.top_p
        {   payload.insert("top_p".into(), json!(v));
        }
        if let Some(v) = request.max_tokens
        {   payload.insert("max_tokens".into(), json!(v));
        }
        if let Some(v) = request.stream
        {   payload.insert("stream".into(), json!(v));
        }
        Value::Object(payload)
    }

    /// Accepts OpenAI-shaped replies and raw `generated_text` ones,
    /// including the single-element array form.
    pub fn normalize(
      &self
    , data: Value
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   let data = match data
        {   Value::Array(items) => items
              .into_iter()
              .find(Value::is_object)
              .unwrap_or(Value::Null)
          , other => other
        };
        if !data.is_object()
        {   return Err(Error::unavailable(
              &self.descriptor.id,
              "Unexpected response format"
            ));
        }

        let choices = match data.get("choices")
        {   Some(Value::Array(raw)) if !raw.is_empty() => {
              serde_json::from_value::<Vec<Choice>>(Value::Array(raw.clone()))
                .map_err(|e| {
                  debug!("{} choices did not parse: {}", self.descriptor.id, e);
                  Error::unavailable(
                    &self.descriptor.id,
                    "Unexpected response format"
                  )
                })?
            }
          , _ => vec![
              Choice
              {   index: 0
                , message: AssistantMessage::new(
                    data.get("generated_text")
                      .and_then(Value::as_str)
                      .unwrap_or_default()
                  )
                , finish_reason: Some(
                    data.get("finish_reason")
                      .and_then(Value::as_str)
                      .unwrap_or("stop")
                      .to_string()
                  )
              }
            ]
        };

        let usage = data.get("usage")
          .cloned()
          .and_then(|u| serde_json::from_value::<Usage>(u).ok())
          .and_then(Usage::completed);

        Ok(ChatCompletionResponse
        {   id: data.get("id")
              .and_then(Value::as_str)
              .map(str::to_string)
              .unwrap_or_else(|| completion_id("hf"))
          , object: data.get("object")
              .and_then(Value::as_str)
              .unwrap_or(CHAT_COMPLETION_OBJECT)
              .to_string()
          , created: data.get("created")
              .and_then(Value::as_i64)
              .unwrap_or_else(epoch_seconds)
          , model: request.model.clone()
          , choices
          , usage
        })
    }

    async fn post(
      &self
    , request: &ChatCompletionRequest
    , api_key: &str
    , tracking: Tracking<'_>
    ) -> Result<Value>
    {   post_json(
          &self.ctx,
          &self.descriptor.id,
          &self.url_for(&request.model),
          Auth::Bearer(api_key),
          &Self::build_payload(request),
          tracking
        ).await
    }
}

#[async_trait]
impl ProviderAdapter for HuggingFaceAdapter
{   fn provider_id(&self) -> &str
    {   &self.descriptor.id
    }

    async fn chat_completions(
      &self
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   let api_key = self.ctx.require_key(&self.descriptor.id).await?;
        let data = self.post(
          request,
          &api_key,
          Tracking::Live(self.ctx.store.as_ref())
        ).await?;
        self.normalize(data, request)
    }

    async fn validate_api_key(&self, api_key: &str) -> Result<()>
    {   let request = probe_request(&self.descriptor)?;
        self.post(&request, api_key, Tracking::Probe).await?;
        Ok(())
    }
}
