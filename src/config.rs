//! Static configuration for providers and the HTTP surface

use std::collections::HashSet;
use std::path::Path;
use serde::{Deserialize, Serialize};
use log::debug;
use crate::error::{Error, Result};

fn default_priority() -> i64
{   100
}

fn default_host() -> String
{   "127.0.0.1".to_string()
}

fn default_port() -> u16
{   3001
}

fn default_timeout_secs() -> u64
{   30
}

/// Availability tuning for a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityConfig
{   /// Seconds a failed provider should stay marked unavailable.
    /// Parsed and reported, never applied as a timer.
    #[serde(default)]
    pub cooldown_seconds: Option<u64>
}

/// Where a provider's API key comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig
{   /// Environment variable holding a bootstrap key
    #[serde(default)]
    pub key_ref: Option<String>
}

/// Models known for a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig
{   /// Model used for key validation probes
    #[serde(default)]
    pub default: Option<String>
}

/// One configured provider. Read-only for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor
{   /// Unique key; also the credential record key
    pub id: String
  , /// Human-readable name
    pub name: String
  , /// Lower is tried earlier; ties keep declaration order
    #[serde(default = "default_priority")]
    pub priority: i64
  , /// Adapter kind; defaults to the provider id
    #[serde(default)]
    pub adapter: Option<String>
  , pub base_url: String
  , /// May contain `{model}` or `{model_id}` placeholders
    pub chat_completions_path: String
  , #[serde(default)]
    pub availability: AvailabilityConfig
  , #[serde(default)]
    pub credentials: CredentialsConfig
  , #[serde(default)]
    pub models: ModelsConfig
}

impl ProviderDescriptor
{   /// Minimal descriptor, everything optional left empty
    pub fn new(
      id: impl Into<String>
    , name: impl Into<String>
    , priority: i64
    , base_url: impl Into<String>
    , chat_completions_path: impl Into<String>
    ) -> Self
    {   ProviderDescriptor
        {   id: id.into()
          , name: name.into()
          , priority
          , adapter: None
          , base_url: base_url.into()
          , chat_completions_path: chat_completions_path.into()
          , availability: AvailabilityConfig::default()
          , credentials: CredentialsConfig::default()
          , models: ModelsConfig::default()
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self
    {   self.models.default = Some(model.into());
        self
    }

    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self
    {   self.adapter = Some(adapter.into());
        self
    }

    /// Key into the adapter table
    pub fn adapter_key(&self) -> &str
    {   self.adapter.as_deref().unwrap_or(&self.id)
    }

    /// Base URL joined with the chat path, placeholders untouched
    pub fn endpoint(&self) -> String
    {   format!(
          "{}{}",
          self.base_url.trim_end_matches('/'),
          self.chat_completions_path
        )
    }
}

/// Bind address for the HTTP surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig
{   #[serde(default = "default_host")]
    pub host: String
  , #[serde(default = "default_port")]
    pub port: u16
}

impl Default for ServerConfig
{   fn default() -> Self
    {   ServerConfig
        {   host: default_host()
          , port: default_port()
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig
{   /// Per upstream call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64
}

impl Default for HttpConfig
{   fn default() -> Self
    {   HttpConfig
        {   timeout_secs: default_timeout_secs()
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig
{   /// Providers in declaration order
    pub providers: Vec<ProviderDescriptor>
  , #[serde(default)]
    pub server: ServerConfig
  , #[serde(default)]
    pub http: HttpConfig
}

impl AppConfig
{   pub fn from_providers(providers: Vec<ProviderDescriptor>) -> Self
    {   AppConfig
        {   providers
          , ..AppConfig::default()
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(raw: &str) -> Result<Self>
    {   let config: AppConfig = serde_yaml::from_str(raw)
          .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        debug!("Parsed {} providers", config.providers.len());
        Ok(config)
    }

    /// Read a YAML file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self>
    {   let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|e| {
          Error::InvalidConfiguration(
            format!("{}: {}", path.display(), e)
          )
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<()>
    {   let mut seen = HashSet::new();
        for provider in &self.providers
        {   if provider.id.trim().is_empty()
            {   return Err(Error::InvalidConfiguration(
                  "provider id must not be empty".to_string()
                ));
            }
            if !seen.insert(provider.id.as_str())
            {   return Err(Error::InvalidConfiguration(
                  format!("duplicate provider id: {}", provider.id)
                ));
            }
            if provider.base_url.trim().is_empty()
            {   return Err(Error::InvalidConfiguration(
                  format!("provider {} has no base_url", provider.id)
                ));
            }
        }
        Ok(())
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderDescriptor>
    {   self.providers.iter().find(|p| p.id == id)
    }
}
