//! Provider registry: ordered descriptors and the lazy adapter cache

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use log::{debug, info};
use crate::config::{AppConfig, ProviderDescriptor};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::interactions::InteractionLog;
use crate::providers::{AdapterContext, AdapterKind, ProviderAdapter};

/// Builds an adapter for a descriptor
pub type AdapterFactory = Arc<
  dyn Fn(&ProviderDescriptor, &AdapterContext) -> Arc<dyn ProviderAdapter>
    + Send
    + Sync
>;

struct Entry
{   descriptor: ProviderDescriptor
  , factory: AdapterFactory
  , adapter: OnceLock<Arc<dyn ProviderAdapter>>
}

/// Advisory availability of one provider, for the admin listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderState
{   pub id: String
  , pub name: String
  , pub priority: i64
  , pub has_api_key: bool
  , pub last_error: Option<String>
  , pub last_error_at: Option<DateTime<Utc>>
  , pub cooldown_seconds: Option<u64>
  , pub available: bool
}

pub struct ProviderRegistry
{   entries: Vec<Entry>
  , /// Indices into `entries`, ascending priority, stable on ties
    order: Vec<usize>
  , ctx: AdapterContext
}

impl ProviderRegistry
{   /// Registry backed by the built-in adapter kinds. A provider whose
    /// adapter key is unknown is a configuration error.
    pub fn from_config(
      config: &AppConfig
    , ctx: AdapterContext
    ) -> Result<Self>
    {   let factories = AdapterKind::ALL
          .into_iter()
          .map(|kind| {
            let factory: AdapterFactory = Arc::new(
              move |d: &ProviderDescriptor, c: &AdapterContext| {
                kind.build(d, c)
              }
            );
            (kind.key().to_string(), factory)
          })
          .collect();
        Self::with_factories(config, ctx, factories)
    }

    /// Registry with an explicit adapter-key -> factory table
    pub fn with_factories(
      config: &AppConfig
    , ctx: AdapterContext
    , factories: HashMap<String, AdapterFactory>
    ) -> Result<Self>
    {   config.validate()?;
        let mut entries = Vec::with_capacity(config.providers.len());
        for descriptor in &config.providers
        {   let key = descriptor.adapter_key();
            let factory = factories.get(key).cloned().ok_or_else(|| {
              Error::InvalidConfiguration(
                format!("no adapter '{}' for provider {}", key, descriptor.id)
              )
            })?;
            debug!("Registered {} (adapter {})", descriptor.id, key);
            entries.push(Entry
            {   descriptor: descriptor.clone()
              , factory
              , adapter: OnceLock::new()
            });
        }

        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| entries[i].descriptor.priority);

        info!(
          "Provider order: {:?}",
          order.iter()
            .map(|&i| entries[i].descriptor.id.as_str())
            .collect::<Vec<_>>()
        );

        Ok(ProviderRegistry
        {   entries
          , order
          , ctx
        })
    }

    /// Descriptors in attempt order
    pub fn ordered(&self) -> Vec<&ProviderDescriptor>
    {   self.order
          .iter()
          .map(|&i| &self.entries[i].descriptor)
          .collect()
    }

    pub fn descriptor(&self, id: &str) -> Option<&ProviderDescriptor>
    {   self.entry(id).map(|e| &e.descriptor)
    }

    /// Adapter for a provider, built on first use and reused after
    pub fn adapter(&self, id: &str) -> Result<Arc<dyn ProviderAdapter>>
    {   let entry = self.entry(id)
          .ok_or_else(|| Error::UnknownProvider(id.to_string()))?;
        Ok(entry.adapter
          .get_or_init(|| {
            debug!("Instantiating adapter for {}", id);
            (entry.factory)(&entry.descriptor, &self.ctx)
          })
          .clone())
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore>
    {   &self.ctx.store
    }

    /// Log shared by every adapter built from this registry
    pub fn interactions(&self) -> &Arc<InteractionLog>
    {   &self.ctx.interactions
    }

    pub fn len(&self) -> usize
    {   self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.entries.is_empty()
    }

    /// Availability of every provider in attempt order
    pub async fn provider_states(&self) -> Result<Vec<ProviderState>>
    {   let records: HashMap<String, _> = self.ctx.store
          .list_records()
          .await?
          .into_iter()
          .map(|r| (r.provider_id.clone(), r))
          .collect();

        Ok(self.ordered()
          .into_iter()
          .map(|d| {
            let record = records.get(&d.id);
            ProviderState
            {   id: d.id.clone()
              , name: d.name.clone()
              , priority: d.priority
              , has_api_key: record.is_some_and(|r| r.has_api_key())
              , last_error: record.and_then(|r| r.last_error.clone())
              , last_error_at: record.and_then(|r| r.last_error_at)
              , cooldown_seconds: d.availability.cooldown_seconds
              , available: record.is_some_and(|r| r.is_available())
            }
          })
          .collect())
    }

    fn entry(&self, id: &str) -> Option<&Entry>
    {   self.entries.iter().find(|e| e.descriptor.id == id)
    }
}
