//! Credential & availability store
//!
//! One record per provider id. Adapters write only their own record;
//! the admin surface sets and deletes keys. Last write wins.

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use log::{debug, info, trace};
use crate::config::ProviderDescriptor;
use crate::error::Result;

/// Error tag for rejected credentials
pub const ERROR_AUTH: &str = "auth";
/// Error tag for quota or rate-limit exhaustion
pub const ERROR_RATE_LIMIT: &str = "rate_limit";
/// Error tag for transport failures
pub const ERROR_NETWORK: &str = "network";

/// Error tag for any other upstream status
pub fn http_error_tag(status: u16) -> String
{   format!("http_{}", status)
}

/// Stored state for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord
{   pub provider_id: String
  , pub api_key: Option<String>
  , pub last_error: Option<String>
  , pub last_error_at: Option<DateTime<Utc>>
  , pub updated_at: DateTime<Utc>
}

impl CredentialRecord
{   fn empty(provider_id: &str) -> Self
    {   CredentialRecord
        {   provider_id: provider_id.to_string()
          , api_key: None
          , last_error: None
          , last_error_at: None
          , updated_at: Utc::now()
        }
    }

    pub fn has_api_key(&self) -> bool
    {   self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Key present and no recorded error
    pub fn is_available(&self) -> bool
    {   self.has_api_key() && self.last_error.is_none()
    }
}

/// A record as shown on the admin surface, key redacted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary
{   pub provider_id: String
  , pub has_api_key: bool
  , /// Last four characters of the key, masked
    pub api_key_hint: Option<String>
  , pub last_error: Option<String>
  , pub last_error_at: Option<DateTime<Utc>>
  , pub updated_at: DateTime<Utc>
}

impl From<&CredentialRecord> for CredentialSummary
{   fn from(record: &CredentialRecord) -> Self
    {   CredentialSummary
        {   provider_id: record.provider_id.clone()
          , has_api_key: record.has_api_key()
          , api_key_hint: record.api_key
              .as_deref()
              .filter(|k| !k.is_empty())
              .map(redact)
          , last_error: record.last_error.clone()
          , last_error_at: record.last_error_at
          , updated_at: record.updated_at
        }
    }
}

// short keys are fully masked
fn redact(key: &str) -> String
{   let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8
    {   return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Backing store for provider credentials.
///
/// Implementations must tolerate concurrent callers; there is no
/// optimistic locking.
#[async_trait]
pub trait CredentialStore: Send + Sync
{   async fn get_api_key(&self, provider_id: &str)
      -> Result<Option<String>>;

    /// Upsert the key and clear any recorded error
    async fn set_api_key(&self, provider_id: &str, api_key: &str)
      -> Result<()>;

    async fn record_error(&self, provider_id: &str, tag: &str)
      -> Result<()>;

    /// No-op when the record has no error
    async fn clear_error(&self, provider_id: &str) -> Result<()>;

    async fn is_available(&self, provider_id: &str) -> Result<bool>
    {   Ok(self.get_record(provider_id)
          .await?
          .is_some_and(|r| r.is_available()))
    }

    async fn get_record(&self, provider_id: &str)
      -> Result<Option<CredentialRecord>>;

    async fn list_records(&self) -> Result<Vec<CredentialRecord>>;

    /// Remove the record; false when none existed
    async fn delete_api_key(&self, provider_id: &str) -> Result<bool>;
}

/// In-process store guarded by a read/write lock
#[derive(Debug, Default)]
pub struct MemoryCredentialStore
{   records: RwLock<HashMap<String, CredentialRecord>>
}

impl MemoryCredentialStore
{   pub fn new() -> Self
    {   Self::default()
    }

    /// Point-in-time copy of every record, ordered by provider id
    pub fn snapshot(&self) -> Vec<CredentialRecord>
    {   let mut records: Vec<CredentialRecord> = self.records
          .read()
          .values()
          .cloned()
          .collect();
        records.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        records
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore
{   async fn get_api_key(&self, provider_id: &str)
      -> Result<Option<String>>
    {   Ok(self.records
          .read()
          .get(provider_id)
          .and_then(|r| r.api_key.clone())
          .filter(|k| !k.is_empty()))
    }

    async fn set_api_key(&self, provider_id: &str, api_key: &str)
      -> Result<()>
    {   debug!("Storing API key for {}", provider_id);
        let mut records = self.records.write();
        let record = records
          .entry(provider_id.to_string())
          .or_insert_with(|| CredentialRecord::empty(provider_id));
        record.api_key = Some(api_key.to_string());
        record.last_error = None;
        record.last_error_at = None;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn record_error(&self, provider_id: &str, tag: &str)
      -> Result<()>
    {   debug!("Recording error '{}' for {}", tag, provider_id);
        let now = Utc::now();
        let mut records = self.records.write();
        let record = records
          .entry(provider_id.to_string())
          .or_insert_with(|| CredentialRecord::empty(provider_id));
        record.last_error = Some(tag.to_string());
        record.last_error_at = Some(now);
        record.updated_at = now;
        Ok(())
    }

    async fn clear_error(&self, provider_id: &str) -> Result<()>
    {   let mut records = self.records.write();
        if let Some(record) = records.get_mut(provider_id)
        {   if record.last_error.is_some()
            {   trace!("Clearing error for {}", provider_id);
                record.last_error = None;
                record.last_error_at = None;
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn get_record(&self, provider_id: &str)
      -> Result<Option<CredentialRecord>>
    {   Ok(self.records.read().get(provider_id).cloned())
    }

    async fn list_records(&self) -> Result<Vec<CredentialRecord>>
    {   Ok(self.snapshot())
    }

    async fn delete_api_key(&self, provider_id: &str) -> Result<bool>
    {   Ok(self.records.write().remove(provider_id).is_some())
    }
}

/// Seed keys from each provider's `credentials.key_ref` environment
/// variable. Stored keys always win. Returns the seeded provider ids.
pub async fn seed_from_env(
  store: &dyn CredentialStore
, providers: &[ProviderDescriptor]
) -> Result<Vec<String>>
{   seed_with(store, providers, |name| std::env::var(name).ok()).await
}

pub(crate) async fn seed_with<F>(
  store: &dyn CredentialStore
, providers: &[ProviderDescriptor]
, lookup: F
) -> Result<Vec<String>>
where
  F: Fn(&str) -> Option<String>
{   let mut seeded = Vec::new();
    for provider in providers
    {   let Some(key_ref) = provider.credentials.key_ref.as_deref()
        else
        {   continue;
        };
        if store.get_api_key(&provider.id).await?.is_some()
        {   continue;
        }
        match lookup(key_ref).filter(|v| !v.trim().is_empty())
        {   Some(key) => {
              store.set_api_key(&provider.id, key.trim()).await?;
              info!("Seeded {} key from ${}", provider.id, key_ref);
              seeded.push(provider.id.clone());
            }
          , None => {
              debug!("${} not set for {}", key_ref, provider.id);
            }
        }
    }
    Ok(seeded)
}
