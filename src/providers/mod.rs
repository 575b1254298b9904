//! Provider adapters
//!
//! Each adapter translates the normalized request into one provider's
//! wire format and the reply back into a `ChatCompletionResponse`.
//! Every upstream failure leaves adapter code as either
//! `AuthenticationRequired` or `ProviderUnavailable`.

pub mod http;
pub mod openai_compat;
pub mod gemini;
pub mod cohere;
pub mod huggingface;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::config::ProviderDescriptor;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::interactions::InteractionLog;
use crate::request::{ChatCompletionRequest, ChatCompletionResponse};

pub use cohere::CohereAdapter;
pub use gemini::GeminiAdapter;
pub use huggingface::HuggingFaceAdapter;
pub use openai_compat::OpenAiCompatibleAdapter;

/// Capability every provider implements. Adapters hold no per-call
/// state and are shared across concurrent requests.
#[async_trait]
pub trait ProviderAdapter: Send + Sync
{   /// Id of the provider, also its credential record key
    fn provider_id(&self) -> &str;

    /// Serve a request using the stored key
    async fn chat_completions(
      &self
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>;

    /// Probe a candidate key. Never touches the credential store.
    async fn validate_api_key(&self, api_key: &str) -> Result<()>;
}

/// Collaborators shared by every adapter
#[derive(Clone)]
pub struct AdapterContext
{   pub store: Arc<dyn CredentialStore>
  , pub http: reqwest::Client
  , pub timeout: Duration
  , /// Live calls are logged here; key validation calls are not
    pub interactions: Arc<InteractionLog>
}

impl AdapterContext
{   pub fn new(
      store: Arc<dyn CredentialStore>
    , timeout: Duration
    ) -> Self
    {   AdapterContext
        {   store
          , http: reqwest::Client::new()
          , timeout
          , interactions: Arc::new(InteractionLog::default())
        }
    }

    /// Share an existing interaction log
    pub fn with_interactions(mut self, interactions: Arc<InteractionLog>) -> Self
    {   self.interactions = interactions;
        self
    }

    /// Stored key for a provider, or `AuthenticationRequired`
    pub async fn require_key(&self, provider_id: &str) -> Result<String>
    {   self.store
          .get_api_key(provider_id)
          .await?
          .ok_or_else(|| Error::auth_required(provider_id))
    }
}

/// Closed set of adapter implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind
{   Cerebras
  , OpenRouter
  , Gemini
  , Cohere
  , HuggingFace
}

impl AdapterKind
{   pub const ALL: [AdapterKind; 5] = [
      AdapterKind::Cerebras
    , AdapterKind::OpenRouter
    , AdapterKind::Gemini
    , AdapterKind::Cohere
    , AdapterKind::HuggingFace
    ];

    pub fn key(self) -> &'static str
    {   match self
        {   AdapterKind::Cerebras => "cerebras"
          , AdapterKind::OpenRouter => "openrouter"
          , AdapterKind::Gemini => "gemini"
          , AdapterKind::Cohere => "cohere"
          , AdapterKind::HuggingFace => "huggingface"
        }
    }

    pub fn from_key(key: &str) -> Option<Self>
    {   Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    pub fn build(
      self
    , descriptor: &ProviderDescriptor
    , ctx: &AdapterContext
    ) -> Arc<dyn ProviderAdapter>
    {   let descriptor = descriptor.clone();
        let ctx = ctx.clone();
        match self
        {   AdapterKind::Cerebras => Arc::new(
              OpenAiCompatibleAdapter::new(descriptor, ctx, "cerebras")
            )
          , AdapterKind::OpenRouter => Arc::new(
              OpenAiCompatibleAdapter::new(descriptor, ctx, "openrouter")
            )
          , AdapterKind::Gemini => Arc::new(
              GeminiAdapter::new(descriptor, ctx)
            )
          , AdapterKind::Cohere => Arc::new(
              CohereAdapter::new(descriptor, ctx)
            )
          , AdapterKind::HuggingFace => Arc::new(
              HuggingFaceAdapter::new(descriptor, ctx)
            )
        }
    }
}

/// Probe request for key validation, from `models.default`
pub(crate) fn probe_request(
  descriptor: &ProviderDescriptor
) -> Result<ChatCompletionRequest>
{   descriptor.models.default
      .as_deref()
      .map(ChatCompletionRequest::probe)
      .ok_or_else(|| {
        Error::unavailable(
          &descriptor.id,
          "Health check model not configured"
        )
      })
}
