//! Normalized OpenAI-compatible request and response types

use serde::{Deserialize, Deserializer, Serialize};
use crate::error::{Error, Result};

/// Fixed `object` tag of a completion envelope
pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   System
  , User
  , Assistant
  , Tool
}

/// Image reference inside a content part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl
{   pub url: String
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>
}

/// One typed segment of multimodal content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart
{   Text
    {   text: String
    }
  , ImageUrl
    {   image_url: ImageUrl
    }
}

impl ContentPart
{   pub fn text(text: impl Into<String>) -> Self
    {   ContentPart::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str>
    {   match self
        {   ContentPart::Text { text } => Some(text)
          , _ => None
        }
    }
}

/// Plain text, or a sequence of typed parts for multimodal content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent
{   Text(String)
  , Parts(Vec<ContentPart>)
}

impl Default for MessageContent
{   fn default() -> Self
    {   MessageContent::Text(String::new())
    }
}

impl From<&str> for MessageContent
{   fn from(s: &str) -> Self
    {   MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent
{   fn from(s: String) -> Self
    {   MessageContent::Text(s)
    }
}

impl MessageContent
{   /// All text segments concatenated; non-text parts are skipped
    pub fn joined_text(&self) -> String
    {   match self
        {   MessageContent::Text(text) => text.clone()
          , MessageContent::Parts(parts) => parts
              .iter()
              .filter_map(ContentPart::as_text)
              .collect()
        }
    }

    pub fn is_empty(&self) -> bool
    {   match self
        {   MessageContent::Text(text) => text.is_empty()
          , MessageContent::Parts(parts) => parts.is_empty()
        }
    }

    /// Collapse text-only parts into a plain string. Content with any
    /// non-text part keeps its structure.
    pub fn from_parts(parts: Vec<ContentPart>) -> Self
    {   if parts.iter().all(|p| p.as_text().is_some())
        {   MessageContent::Text(
              parts.iter().filter_map(ContentPart::as_text).collect()
            )
        } else
        {   MessageContent::Parts(parts)
        }
    }
}

// upstream replies carry `"content": null` alongside tool calls
fn nullable_content<'de, D>(deserializer: D)
  -> std::result::Result<MessageContent, D::Error>
where
  D: Deserializer<'de>
{   Ok(Option::<MessageContent>::deserialize(deserializer)?
      .unwrap_or_default())
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: Role
  , #[serde(default, deserialize_with = "nullable_content")]
    pub content: MessageContent
}

impl ChatMessage
{   pub fn new(role: Role, content: impl Into<MessageContent>) -> Self
    {   ChatMessage
        {   role
          , content: content.into()
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self
    {   Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<MessageContent>) -> Self
    {   Self::new(Role::System, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self
    {   Self::new(Role::Assistant, content)
    }
}

/// Inbound chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>
}

impl ChatCompletionRequest
{   pub fn new(
      model: impl Into<String>
    , messages: Vec<ChatMessage>
    ) -> Self
    {   ChatCompletionRequest
        {   model: model.into()
          , messages
          , temperature: None
          , max_tokens: None
          , top_p: None
          , presence_penalty: None
          , frequency_penalty: None
          , stream: None
          , user: None
        }
    }

    /// Probe used to validate a candidate key: single turn,
    /// single token.
    pub fn probe(model: impl Into<String>) -> Self
    {   let mut request = Self::new(
          model,
          vec![ChatMessage::user("healthcheck")]
        );
        request.max_tokens = Some(1);
        request
    }

    pub fn validate(&self) -> Result<()>
    {   if self.model.trim().is_empty()
        {   return Err(Error::InvalidRequest(
              "model must not be empty".to_string()
            ));
        }
        if self.messages.is_empty()
        {   return Err(Error::InvalidRequest(
              "messages must contain at least one entry".to_string()
            ));
        }
        Ok(())
    }
}

/// Function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall
{   pub name: String
  , /// JSON-encoded arguments
    pub arguments: String
}

/// Tool call attached to an assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall
{   #[serde(default)]
    pub id: String
  , #[serde(rename = "type", default = "function_kind")]
    pub kind: String
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCall>
}

fn function_kind() -> String
{   "function".to_string()
}

/// Message inside a response choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage
{   pub role: Role
  , #[serde(default, deserialize_with = "nullable_content")]
    pub content: MessageContent
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>
  , /// Provider extras such as citations or safety ratings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>
}

impl AssistantMessage
{   pub fn new(content: impl Into<MessageContent>) -> Self
    {   AssistantMessage
        {   role: Role::Assistant
          , content: content.into()
          , tool_calls: None
          , metadata: None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice
{   #[serde(default)]
    pub index: u32
  , pub message: AssistantMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

/// Token accounting as reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>
}

impl Usage
{   /// Build usage, deriving the total when the provider omits it.
    /// Returns None when nothing is known.
    pub fn derive(
      prompt_tokens: Option<u64>
    , completion_tokens: Option<u64>
    , total_tokens: Option<u64>
    ) -> Option<Usage>
    {   let total_tokens = total_tokens.or(
          match (prompt_tokens, completion_tokens)
          {   (Some(p), Some(c)) => p.checked_add(c)
            , _ => None
          }
        );
        let usage = Usage
        {   prompt_tokens
          , completion_tokens
          , total_tokens
        };
        if usage == Usage::default()
        {   None
        } else
        {   Some(usage)
        }
    }

    pub fn completed(self) -> Option<Usage>
    {   Usage::derive(
          self.prompt_tokens,
          self.completion_tokens,
          self.total_tokens
        )
    }
}

/// Normalized completion envelope returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse
{   pub id: String
  , pub object: String
  , pub created: i64
  , pub model: String
  , pub choices: Vec<Choice>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>
}

impl ChatCompletionResponse
{   /// Single-choice envelope with every default filled in
    pub fn single(
      provider_tag: &str
    , model: impl Into<String>
    , message: AssistantMessage
    , finish_reason: Option<String>
    , usage: Option<Usage>
    ) -> Self
    {   ChatCompletionResponse
        {   id: completion_id(provider_tag)
          , object: CHAT_COMPLETION_OBJECT.to_string()
          , created: epoch_seconds()
          , model: model.into()
          , choices: vec![
              Choice
              {   index: 0
                , message
                , finish_reason
              }
            ]
          , usage
        }
    }
}

/// Current Unix time in seconds
pub fn epoch_seconds() -> i64
{   chrono::Utc::now().timestamp()
}

/// Synthetic id for providers that do not return one
pub fn completion_id(provider_tag: &str) -> String
{   format!(
      "chatcmpl-{}-{}",
      provider_tag,
      chrono::Utc::now().timestamp_millis()
    )
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn usage_total_is_derived()
    {   let usage = Usage::derive(Some(3), Some(4), None).unwrap();
        assert_eq!(usage.total_tokens, Some(7));
        assert_eq!(Usage::derive(None, None, None), None);
        assert_eq!(
          Usage::derive(Some(3), None, None).unwrap().total_tokens,
          None
        );
    }

    #[test]
    fn usage_total_with_huge_counts_is_dropped()
    {   let usage = Usage::derive(Some(u64::MAX), Some(1), None).unwrap();
        assert_eq!(usage.total_tokens, None);
        assert_eq!(usage.prompt_tokens, Some(u64::MAX));
    }

    #[test]
    fn text_only_parts_collapse_to_string()
    {   let content = MessageContent::from_parts(vec![
          ContentPart::text("Hello, "),
          ContentPart::text("world")
        ]);
        assert_eq!(content, MessageContent::Text("Hello, world".into()));

        let mixed = MessageContent::from_parts(vec![
          ContentPart::text("see"),
          ContentPart::ImageUrl
          {   image_url: ImageUrl
              {   url: "https://img.example/a.png".into()
                , media_type: None
              }
          }
        ]);
        assert!(matches!(mixed, MessageContent::Parts(ref p) if p.len() == 2));
        assert_eq!(mixed.joined_text(), "see");
    }

    #[test]
    fn null_content_deserializes_as_empty()
    {   let message: AssistantMessage = serde_json::from_value(
          serde_json::json!({"role": "assistant", "content": null})
        ).unwrap();
        assert!(message.content.is_empty());
    }

    #[test]
    fn validate_rejects_empty_messages()
    {   let request = ChatCompletionRequest::new("m", vec![]);
        assert!(matches!(
          request.validate(),
          Err(Error::InvalidRequest(_))
        ));
    }
}
