//! Cohere v2 chat adapter

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use log::debug;
use crate::config::ProviderDescriptor;
use crate::error::{Error, Result};
use crate::request::{
  completion_id, epoch_seconds, AssistantMessage, ChatCompletionRequest,
  ChatCompletionResponse, Choice, ContentPart, FunctionCall, ImageUrl,
  MessageContent, ToolCall, Usage, CHAT_COMPLETION_OBJECT
};
use super::http::{post_json, Auth, Tracking};
use super::{probe_request, AdapterContext, ProviderAdapter};

const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

pub struct CohereAdapter
{   descriptor: ProviderDescriptor
  , ctx: AdapterContext
}

impl CohereAdapter
{   pub fn new(descriptor: ProviderDescriptor, ctx: AdapterContext) -> Self
    {   debug!("Creating cohere adapter for {}", descriptor.id);
        CohereAdapter
        {   descriptor
          , ctx
        }
    }

    /// Cohere rejects presence/frequency penalties and `user`; they are
    /// dropped rather than forwarded.
    pub fn build_payload(request: &ChatCompletionRequest) -> Value
    {   let messages: Vec<Value> = request.messages
          .iter()
          .map(|m| json!({
            "role": m.role,
            "content": request_content(&m.content)
          }))
          .collect();

        let mut payload = Map::new();
        payload.insert("model".into(), json!(request.model));
        payload.insert("messages".into(), Value::Array(messages));
        if let Some(v) = request.temperature
        {   payload.insert("temperature".into(), json!(v));
        }
        if let Some(v) = request.max_tokens
        {   payload.insert("max_tokens".into(), json!(v));
        }
        if let Some(v) = request.top_p
        {   payload.insert("top_p".into(), json!(v));
        }
        if let Some(v) = request.stream
        {   payload.insert("stream".into(), json!(v));
        }
        Value::Object(payload)
    }

    /// Fold the content items of a reply. Text-only replies stay a
    /// plain string; any image keeps the structured form.
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
        let message = data.get("message").unwrap_or(&Value::Null);
        let items = message.get("content")
          .and_then(Value::as_array)
          .map(Vec::as_slice)
          .unwrap_or_default();

        let mut parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut citations = Vec::new();

        for item in items
        {   match item.get("type").and_then(Value::as_str)
            {   Some("text") => {
                  if let Some(text) = item.get("text").and_then(Value::as_str)
                  {   parts.push(ContentPart::text(text));
                  }
                }
              , Some("tool_calls") => {
                  tool_calls.extend(
                    array(item, "tool_calls").iter().map(tool_call)
                  );
                }
              , Some("citation") => {
                  citations.extend(array(item, "citations").iter().cloned());
                }
              , _ => {
                  if let Some(part) = response_image(item)
                  {   parts.push(part);
                  }
                }
            }
        }
        tool_calls.extend(array(message, "tool_calls").iter().map(tool_call));
        citations.extend(array(message, "citations").iter().cloned());

        if parts.is_empty()
        {   if let Some(text) = data.get("text")
              .and_then(Value::as_str)
              .filter(|t| !t.is_empty())
            {   parts.push(ContentPart::text(text));
            }
        }

        let mut assistant = AssistantMessage::new(
          MessageContent::from_parts(parts)
        );
        if !tool_calls.is_empty()
        {   assistant.tool_calls = Some(tool_calls);
        }
        if !citations.is_empty()
        {   assistant.metadata = Some(
              json!({"cohere": {"citations": citations}})
            );
        }

        let finish_reason = [
            data.get("finish_reason")
          , message.get("finish_reason")
          , data.get("stop_reason")
          ]
          .into_iter()
          .flatten()
          .find_map(Value::as_str)
          .unwrap_or("stop")
          .to_string();

        Ok(ChatCompletionResponse
        {   id: str_field(data, "id")
              .unwrap_or_else(|| completion_id("cohere"))
          , object: str_field(data, "object")
              .unwrap_or_else(|| CHAT_COMPLETION_OBJECT.to_string())
          , created: data.get("created")
              .and_then(Value::as_i64)
              .unwrap_or_else(epoch_seconds)
          , model: str_field(data, "model")
              .unwrap_or_else(|| request.model.clone())
          , choices: vec![
              Choice
              {   index: 0
                , message: assistant
                , finish_reason: Some(finish_reason)
              }
            ]
          , usage: data.get("usage").and_then(usage)
        })
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

fn str_field(data: &Value, key: &str) -> Option<String>
{   data.get(key)
      .and_then(Value::as_str)
      .filter(|s| !s.is_empty())
      .map(str::to_string)
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value]
{   value.get(key)
      .and_then(Value::as_array)
      .map(Vec::as_slice)
      .unwrap_or_default()
}

fn request_content(content: &MessageContent) -> Value
{   match content
    {   MessageContent::Text(text) => json!([{"type": "text", "text": text}])
      , MessageContent::Parts(parts) => Value::Array(
          parts.iter().filter_map(request_part).collect()
        )
    }
}

fn request_part(part: &ContentPart) -> Option<Value>
{   match part
    {   ContentPart::Text { text } => Some(json!({"type": "text", "text": text}))
      , ContentPart::ImageUrl { image_url } => {
          image_source(&image_url.url, image_url.media_type.as_deref())
            .map(|source| json!({"type": "image", "source": source}))
        }
    }
}

/// Data URLs become base64 sources, http(s) URLs stay references
fn image_source(url: &str, media_type: Option<&str>) -> Option<Value>
{   if url.starts_with("data:")
    {   let (parsed_type, data) = parse_data_url(url)?;
        return Some(json!({
          "type": "base64",
          "media_type": parsed_type
            .or(media_type)
            .unwrap_or(DEFAULT_IMAGE_MEDIA_TYPE),
          "data": data
        }));
    }
    if url.starts_with("http://") || url.starts_with("https://")
    {   let mut source = json!({"type": "url", "url": url});
        if let Some(media_type) = media_type
        {   source["media_type"] = json!(media_type);
        }
        return Some(source);
    }
    None
}

/// `data:<type>;base64,<payload>`; only base64 payloads are accepted
fn parse_data_url(url: &str) -> Option<(Option<&str>, &str)>
{   let (header, data) = url.split_once(',')?;
    let meta = header.strip_prefix("data:")?;
    if !meta.contains(";base64")
    {   return None;
    }
    let media_type = meta.split(';').next().filter(|t| !t.is_empty());
    Some((media_type, data))
}

fn response_image(item: &Value) -> Option<ContentPart>
{   if item.get("type").and_then(Value::as_str) != Some("image")
    {   return None;
    }
    let source = item.get("source")?;
    let media_type = source.get("media_type").and_then(Value::as_str);
    let url = match source.get("type").and_then(Value::as_str)?
    {   "url" => source.get("url")?.as_str()?.to_string()
      , "base64" => format!(
          "data:{};base64,{}",
          media_type.unwrap_or(DEFAULT_IMAGE_MEDIA_TYPE),
          source.get("data")?.as_str()?
        )
      , _ => return None
    };
    let media_type = match source.get("type").and_then(Value::as_str)
    {   Some("url") => media_type.map(str::to_string)
      , _ => None
    };
    Some(ContentPart::ImageUrl
    {   image_url: ImageUrl
        {   url
          , media_type
        }
    })
}

fn tool_call(tool: &Value) -> ToolCall
{   let function = tool.get("function").filter(|f| f.is_object()).map(|f| {
      let arguments = match f.get("arguments")
      {   Some(Value::String(s)) if !s.is_empty() => s.clone()
        , Some(v @ (Value::Object(_) | Value::Array(_))) => v.to_string()
        , _ => "{}".to_string()
      };
      FunctionCall
      {   name: f.get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
        , arguments
      }
    });
    ToolCall
    {   id: str_field(tool, "id").unwrap_or_default()
      , kind: str_field(tool, "type")
          .unwrap_or_else(|| "function".to_string())
      , function
    }
}

fn usage(raw: &Value) -> Option<Usage>
{   let count = |v: &Value, keys: &[&str]| {
      keys.iter().find_map(|k| v.get(*k).and_then(Value::as_u64))
    };
    match raw.get("tokens").filter(|t| t.is_object())
    {   Some(tokens) => Usage::derive(
          count(tokens, &["input", "prompt", "input_tokens"]),
          count(tokens, &["output", "generation", "output_tokens"]),
          count(tokens, &["total"])
        )
      , None => Usage::derive(
          count(raw, &["prompt_tokens"]),
          count(raw, &["completion_tokens"]),
          count(raw, &["total_tokens"])
        )
    }
}

#[async_trait]
impl ProviderAdapter for CohereAdapter
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
        self.normalize(&data, request)
    }

    async fn validate_api_key(&self, api_key: &str) -> Result<()>
    {   let request = probe_request(&self.descriptor)?;
        let payload = Self::build_payload(&request);
        self.post(&payload, api_key, Tracking::Probe).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn data_urls_parse_only_with_base64()
    {   assert_eq!(
          parse_data_url("data:image/jpeg;base64,QUJD"),
          Some((Some("image/jpeg"), "QUJD"))
        );
        assert_eq!(parse_data_url("data:;base64,QUJD"), Some((None, "QUJD")));
        assert_eq!(parse_data_url("data:image/png,raw"), None);
        assert_eq!(parse_data_url("nocomma"), None);
    }

    #[test]
    fn image_sources_cover_data_and_http()
    {   assert_eq!(
          image_source("data:;base64,QUJD", None).unwrap(),
          json!({"type": "base64", "media_type": "image/png", "data": "QUJD"})
        );
        assert_eq!(
          image_source("https://img.example/a.jpg", Some("image/jpeg")).unwrap(),
          json!({
            "type": "url",
            "url": "https://img.example/a.jpg",
            "media_type": "image/jpeg"
          })
        );
        assert!(image_source("ftp://img.example/a.jpg", None).is_none());
    }

    #[test]
    fn tool_call_arguments_are_json_strings()
    {   let call = tool_call(&json!({
          "id": "call_1",
          "function": {"name": "lookup", "arguments": {"q": "rust"}}
        }));
        assert_eq!(call.kind, "function");
        let function = call.function.unwrap();
        assert_eq!(function.name, "lookup");
        assert_eq!(function.arguments, r#"{"q":"rust"}"#);
    }
}
