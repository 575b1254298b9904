//! Gateway: the library entry point tying store, registry, selector
//! and event log together. The HTTP surface only delegates here.

use std::sync::Arc;
use std::time::Duration;
use log::{debug, info};
use crate::config::AppConfig;
use crate::credentials::{self, CredentialStore, CredentialSummary, ERROR_AUTH};
use crate::error::{Error, Result};
use crate::events::{self, EventFields, EventLevel, EventLog, OrchestratorEvent};
use crate::failover::Selector;
use crate::interactions::ProviderInteraction;
use crate::providers::AdapterContext;
use crate::registry::{ProviderRegistry, ProviderState};
use crate::request::{ChatCompletionRequest, ChatCompletionResponse};

pub struct Gateway
{   config: AppConfig
  , store: Arc<dyn CredentialStore>
  , registry: Arc<ProviderRegistry>
  , selector: Selector
  , events: Arc<EventLog>
}

impl Gateway
{   /// Gateway over the built-in adapters
    pub fn new(
      config: AppConfig
    , store: Arc<dyn CredentialStore>
    ) -> Result<Self>
    {   let ctx = AdapterContext::new(
          store.clone(),
          Duration::from_secs(config.http.timeout_secs)
        );
        let registry = ProviderRegistry::from_config(&config, ctx)?;
        Ok(Self::with_registry(config, store, registry))
    }

    /// Gateway over a prepared registry, e.g. one with custom factories
    pub fn with_registry(
      config: AppConfig
    , store: Arc<dyn CredentialStore>
    , registry: ProviderRegistry
    ) -> Self
    {   debug!("Creating gateway with {} providers", registry.len());
        let registry = Arc::new(registry);
        let events = Arc::new(EventLog::default());
        Gateway
        {   config
          , store
          , selector: Selector::new(registry.clone(), events.clone())
          , registry
          , events
        }
    }

    /// Seed keys from `credentials.key_ref` variables
    pub async fn seed_credentials_from_env(&self) -> Result<Vec<String>>
    {   credentials::seed_from_env(
          self.store.as_ref(),
          &self.config.providers
        ).await
    }

    pub fn config(&self) -> &AppConfig
    {   &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore>
    {   &self.store
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry>
    {   &self.registry
    }

    pub fn events(&self) -> &Arc<EventLog>
    {   &self.events
    }

    /// Validate the request, then fail over across providers
    pub async fn chat_completions(
      &self
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   request.validate()?;
        self.selector.select_provider(request).await
    }

    pub async fn list_providers(&self) -> Result<Vec<ProviderState>>
    {   self.registry.provider_states().await
    }

    /// Probe a candidate key and store it only when the probe passes.
    /// A rejected key marks the provider with `auth`.
    pub async fn set_credential(
      &self
    , provider_id: &str
    , api_key: &str
    ) -> Result<()>
    {   let api_key = api_key.trim();
        if api_key.is_empty()
        {   return Err(Error::InvalidRequest("Missing api_key".to_string()));
        }
        let adapter = self.registry.adapter(provider_id)?;

        match adapter.validate_api_key(api_key).await
        {   Ok(()) => {}
          , Err(e @ Error::AuthenticationRequired { .. }) => {
              self.store.record_error(provider_id, ERROR_AUTH).await?;
              self.events.record(
                events::CREDENTIALS_INVALID,
                EventLevel::Warning,
                EventFields::from_provider(provider_id)
                  .message("Credential validation failed: invalid API key")
              );
              return Err(e);
            }
          , Err(e) => {
              self.events.record(
                events::HEALTH_FAIL,
                EventLevel::Warning,
                EventFields::from_provider(provider_id)
                  .message(e.to_string())
              );
              return Err(e);
            }
        }

        self.store.set_api_key(provider_id, api_key).await?;
        info!("API key for {} updated", provider_id);
        self.events.record(
          events::CREDENTIALS_UPDATED,
          EventLevel::Info,
          EventFields::from_provider(provider_id)
            .message("API key saved via admin")
        );
        Ok(())
    }

    /// Probe the stored key and update the recorded error
    pub async fn healthcheck(&self, provider_id: &str) -> Result<()>
    {   let adapter = self.registry.adapter(provider_id)?;
        let api_key = self.store
          .get_api_key(provider_id)
          .await?
          .ok_or_else(|| Error::auth_required(provider_id))?;

        match adapter.validate_api_key(&api_key).await
        {   Ok(()) => {
              self.store.clear_error(provider_id).await?;
              self.events.record(
                events::HEALTH_OK,
                EventLevel::Info,
                EventFields::from_provider(provider_id)
                  .message("Health check succeeded")
              );
              Ok(())
            }
          , Err(e) => {
              let tag = match &e
              {   Error::AuthenticationRequired { .. } => ERROR_AUTH.to_string()
                , Error::ProviderUnavailable { message, .. } => message.clone()
                , _ => return Err(e)
              };
              self.store.record_error(provider_id, &tag).await?;
              self.events.record(
                events::HEALTH_FAIL,
                EventLevel::Warning,
                EventFields::from_provider(provider_id)
                  .error_code(tag)
                  .message(e.to_string())
              );
              Err(e)
            }
        }
    }

    /// Redacted credential record; None when nothing is stored
    pub async fn get_credential(
      &self
    , provider_id: &str
    ) -> Result<Option<CredentialSummary>>
    {   self.require_provider(provider_id)?;
        Ok(self.store
          .get_record(provider_id)
          .await?
          .as_ref()
          .map(CredentialSummary::from))
    }

    /// Drop a stored key; false when none existed
    pub async fn delete_credential(&self, provider_id: &str) -> Result<bool>
    {   self.require_provider(provider_id)?;
        self.store.delete_api_key(provider_id).await
    }

    pub fn recent_events(&self, limit: usize) -> Vec<OrchestratorEvent>
    {   self.events.recent(limit)
    }

    /// Today's live upstream calls for a provider, newest first
    pub fn provider_logs(
      &self
    , provider_id: &str
    , limit: usize
    ) -> Result<Vec<ProviderInteraction>>
    {   self.require_provider(provider_id)?;
        Ok(self.registry.interactions().list(provider_id, limit))
    }

    fn require_provider(&self, provider_id: &str) -> Result<()>
    {   match self.registry.descriptor(provider_id)
        {   Some(_) => Ok(())
          , None => Err(Error::UnknownProvider(provider_id.to_string()))
        }
    }
}
