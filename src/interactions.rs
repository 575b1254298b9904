//! Per-provider log of live upstream calls: what was sent and what
//! came back. Only the current UTC day is kept.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use log::trace;
use crate::context::current_request_id;

const DEFAULT_PER_PROVIDER: usize = 200;
const MAX_LISTED: usize = 100;

/// One request/response pair for a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInteraction
{   pub id: u64
  , pub created_at: DateTime<Utc>
  , pub provider_id: String
  , pub request_id: Option<String>
  , pub request_body: Value
  , pub response_body: Value
}

/// Response body logged in place of a reply when the call failed
pub fn error_body(
  error_type: &str
, message: &str
, status_code: Option<u16>
, body: Option<&str>
) -> Value
{   let mut error = json!({"type": error_type, "message": message});
    if let Some(status) = status_code
    {   error["status_code"] = json!(status);
    }
    if let Some(body) = body.filter(|b| !b.is_empty())
    {   error["body"] = serde_json::from_str(body)
          .unwrap_or_else(|_| Value::String(body.to_string()));
    }
    json!({"error": error})
}

/// Bounded per-provider rings of interactions
#[derive(Debug)]
pub struct InteractionLog
{   entries: Mutex<HashMap<String, VecDeque<ProviderInteraction>>>
  , per_provider: usize
  , next_id: AtomicU64
}

impl Default for InteractionLog
{   fn default() -> Self
    {   InteractionLog::with_capacity(DEFAULT_PER_PROVIDER)
    }
}

impl InteractionLog
{   pub fn with_capacity(per_provider: usize) -> Self
    {   InteractionLog
        {   entries: Mutex::new(HashMap::new())
          , per_provider: per_provider.max(1)
          , next_id: AtomicU64::new(1)
        }
    }

    /// Append an interaction, tagged with the current request id.
    /// Entries from earlier days are dropped.
    pub fn record(
      &self
    , provider_id: &str
    , request_body: &Value
    , response_body: Value
    )
    {   let now = Utc::now();
        let entry = ProviderInteraction
        {   id: self.next_id.fetch_add(1, Ordering::Relaxed)
          , created_at: now
          , provider_id: provider_id.to_string()
          , request_id: current_request_id()
          , request_body: request_body.clone()
          , response_body
        };
        trace!("Logging interaction {} for {}", entry.id, provider_id);

        let cutoff = start_of_day(now);
        let mut entries = self.entries.lock();
        for ring in entries.values_mut()
        {   while ring.front().is_some_and(|e| e.created_at < cutoff)
            {   ring.pop_front();
            }
        }
        let ring = entries.entry(provider_id.to_string()).or_default();
        if ring.len() == self.per_provider
        {   ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// Today's interactions for a provider, newest first; limit clamped
    /// to 1..=100
    pub fn list(&self, provider_id: &str, limit: usize) -> Vec<ProviderInteraction>
    {   let cutoff = start_of_day(Utc::now());
        self.entries
          .lock()
          .get(provider_id)
          .map(|ring| {
            ring.iter()
              .rev()
              .filter(|e| e.created_at >= cutoff)
              .take(limit.clamp(1, MAX_LISTED))
              .cloned()
              .collect()
          })
          .unwrap_or_default()
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc>
{   now.date_naive()
      .and_hms_opt(0, 0, 0)
      .map(|midnight| midnight.and_utc())
      .unwrap_or(now)
}
