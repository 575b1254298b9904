//! Google Gemini `generateContent` adapter

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use log::debug;
use crate::config::ProviderDescriptor;
use crate::error::{Error, Result};
use crate::request::{
  completion_id, epoch_seconds, AssistantMessage, ChatCompletionRequest,
  ChatCompletionResponse, Choice, Role, Usage, CHAT_COMPLETION_OBJECT
};
use super::http::{post_json, Auth, Tracking};
use super::{probe_request, AdapterContext, ProviderAdapter};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiAdapter
{   descriptor: ProviderDescriptor
  , ctx: AdapterContext
}

impl GeminiAdapter
{   pub fn new(descriptor: ProviderDescriptor, ctx: AdapterContext) -> Self
    {   debug!("Creating gemini adapter for {}", descriptor.id);
        GeminiAdapter
        {   descriptor
          , ctx
        }
    }

    /// Endpoint with the `{model}` placeholder resolved
    pub fn url_for(&self, model: &str) -> String
    {   let slug = model.strip_prefix("models/").unwrap_or(model);
        self.descriptor.endpoint().replace("{model}", slug)
    }

    /// System turns become `systemInstruction`, assistant turns are
    /// sent as `model`; empty turns are dropped.
    pub fn build_payload(request: &ChatCompletionRequest) -> Value
    {   let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for message in &request.messages
        {   let text = message.content.joined_text();
            if text.is_empty()
            {   continue;
            }
            match message.role
            {   Role::System => system_parts.push(json!({"text": text}))
              , Role::Assistant => contents.push(json!({
                  "role": "model",
                  "parts": [{"text": text}]
                }))
              , Role::User | Role::Tool => contents.push(json!({
                  "role": "user",
                  "parts": [{"text": text}]
                }))
            }
        }

        let mut payload = Map::new();
        if !contents.is_empty()
        {   payload.insert("contents".into(), Value::Array(contents));
        }
        if !system_parts.is_empty()
        {   payload.insert(
              "systemInstruction".into(),
              json!({"parts": system_parts})
            );
        }

        let mut generation = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
          if let Some(value) = value
          {   generation.insert(key.to_string(), value);
          }
        };
        put("temperature", request.temperature.map(Value::from));
        put("maxOutputTokens", request.max_tokens.map(Value::from));
        put("topP", request.top_p.map(Value::from));
        put("frequencyPenalty", request.frequency_penalty.map(Value::from));
        put("presencePenalty", request.presence_penalty.map(Value::from));
        if !generation.is_empty()
        {   payload.insert(
              "generationConfig".into(),
              Value::Object(generation)
            );
        }

        Value::Object(payload)
    }

    /// Fold the first candidate into a single choice. Anything but a
    /// JSON object is an unexpected reply.
    pub fn normalize(
      &self
    , data: &Value
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   if !data.is_object()
        {   return Err(Error::unavailable(
              &self.descriptor.id,
              "Unexpected response format"
            ));
        }
        let candidate = data.get("candidates")
          .and_then(Value::as_array)
          .and_then(|c| c.iter().find(|v| v.is_object()));

        let mut text = String::new();
        let mut finish_reason = "stop".to_string();
        let mut metadata = Map::new();

        if let Some(candidate) = candidate
        {   if let Some(parts) = candidate
              .pointer("/content/parts")
              .and_then(Value::as_array)
            {   text = parts
                  .iter()
                  .filter_map(|p| p.get("text").and_then(Value::as_str))
                  .collect();
            }
            if let Some(reason) = candidate
              .get("finishReason")
              .and_then(Value::as_str)
              .filter(|r| !r.is_empty())
            {   finish_reason = reason.to_lowercase();
            }
            if let Some(safety) = candidate
              .get("safetyRatings")
              .filter(|s| non_empty(s))
            {   metadata.insert("safetyRatings".into(), safety.clone());
            }
            if let Some(citations) = candidate
              .pointer("/citationMetadata/citations")
              .filter(|c| non_empty(c))
            {   metadata.insert(
                  "gemini".into(),
                  json!({"citations": citations})
                );
            }
        }

        let mut message = AssistantMessage::new(text);
        if !metadata.is_empty()
        {   message.metadata = Some(Value::Object(metadata));
        }

        let usage = data.get("usageMetadata").and_then(|u| {
          let count = |k: &str| u.get(k).and_then(Value::as_u64);
          Usage::derive(
            count("promptTokenCount"),
            count("candidatesTokenCount"),
            count("totalTokenCount")
          )
        });

        Ok(ChatCompletionResponse
        {   id: data.get("id")
              .and_then(Value::as_str)
              .map(str::to_string)
              .unwrap_or_else(|| completion_id("gemini"))
          , object: data.get("object")
              .and_then(Value::as_str)
              .unwrap_or(CHAT_COMPLETION_OBJECT)
              .to_string()
          , created: data.get("created")
              .and_then(Value::as_i64)
              .unwrap_or_else(epoch_seconds)
          , model: request.model.clone()
          , choices: vec![
              Choice
              {   index: 0
                , message
                , finish_reason: Some(finish_reason)
              }
            ]
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
          Auth::Header(API_KEY_HEADER, api_key),
          &Self::build_payload(request),
          tracking
        ).await
    }
}

fn non_empty(value: &Value) -> bool
{   match value
    {   Value::Null => false
      , Value::Array(items) => !items.is_empty()
      , Value::Object(map) => !map.is_empty()
      , _ => true
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter
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
        self.normalize(&data, request)
    }

    async fn validate_api_key(&self, api_key: &str) -> Result<()>
    {   let request = probe_request(&self.descriptor)?;
        self.post(&request, api_key, Tracking::Probe).await?;
        Ok(())
    }
}
