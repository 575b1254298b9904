//! Recent orchestrator events for the admin surface

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use log::{info, warn};
use crate::context::current_request_id;

const DEFAULT_CAPACITY: usize = 500;
const MAX_LISTED: usize = 100;

pub const PROVIDER_FAIL: &str = "provider_fail";
pub const PROVIDER_SWITCHED: &str = "provider_switched";
pub const PROVIDER_SUCCESS: &str = "provider_success";
pub const CREDENTIALS_UPDATED: &str = "provider_credentials_updated";
pub const CREDENTIALS_INVALID: &str = "provider_credentials_invalid";
pub const HEALTH_OK: &str = "provider_health_ok";
pub const HEALTH_FAIL: &str = "provider_health_fail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel
{   Info
  , Warning
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorEvent
{   pub id: u64
  , pub ts: DateTime<Utc>
  , pub level: EventLevel
  , pub kind: String
  , pub provider_from: Option<String>
  , pub provider_to: Option<String>
  , pub model: Option<String>
  , pub error_code: Option<String>
  , pub message: Option<String>
  , /// Inbound request that caused the event, when there was one
    pub request_id: Option<String>
}

/// Fields of an event before it is stamped
#[derive(Debug, Clone, Default)]
pub struct EventFields
{   pub provider_from: Option<String>
  , pub provider_to: Option<String>
  , pub model: Option<String>
  , pub error_code: Option<String>
  , pub message: Option<String>
}

impl EventFields
{   pub fn from_provider(provider_id: &str) -> Self
    {   EventFields
        {   provider_from: Some(provider_id.to_string())
          , ..EventFields::default()
        }
    }

    pub fn to_provider(mut self, provider_id: &str) -> Self
    {   self.provider_to = Some(provider_id.to_string());
        self
    }

    pub fn model(mut self, model: &str) -> Self
    {   self.model = Some(model.to_string());
        self
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self
    {   self.error_code = Some(code.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self
    {   self.message = Some(message.into());
        self
    }
}

/// Bounded ring of recent events, oldest dropped first
#[derive(Debug)]
pub struct EventLog
{   events: Mutex<VecDeque<OrchestratorEvent>>
  , capacity: usize
  , next_id: AtomicU64
}

impl Default for EventLog
{   fn default() -> Self
    {   EventLog::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog
{   pub fn with_capacity(capacity: usize) -> Self
    {   EventLog
        {   events: Mutex::new(VecDeque::with_capacity(capacity))
          , capacity: capacity.max(1)
          , next_id: AtomicU64::new(1)
        }
    }

    pub fn record(
      &self
    , kind: &str
    , level: EventLevel
    , fields: EventFields
    )
    {   let event = OrchestratorEvent
        {   id: self.next_id.fetch_add(1, Ordering::Relaxed)
          , ts: Utc::now()
          , level
          , kind: kind.to_string()
          , provider_from: fields.provider_from
          , provider_to: fields.provider_to
          , model: fields.model
          , error_code: fields.error_code
          , message: fields.message
          , request_id: current_request_id()
        };
        match level
        {   EventLevel::Info => info!(
              "event={} from={:?} to={:?} message={:?}",
              event.kind, event.provider_from,
              event.provider_to, event.message
            )
          , EventLevel::Warning => warn!(
              "event={} from={:?} to={:?} error={:?} message={:?}",
              event.kind, event.provider_from, event.provider_to,
              event.error_code, event.message
            )
        }
        let mut events = self.events.lock();
        if events.len() == self.capacity
        {   events.pop_front();
        }
        events.push_back(event);
    }

    /// Newest first; limit clamped to 1..=100
    pub fn recent(&self, limit: usize) -> Vec<OrchestratorEvent>
    {   let limit = limit.clamp(1, MAX_LISTED);
        self.events
          .lock()
          .iter()
          .rev()
          .take(limit)
          .cloned()
          .collect()
    }

    pub fn len(&self) -> usize
    {   self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool
    {   self.len() == 0
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn ring_drops_oldest_and_lists_newest_first()
    {   let log = EventLog::with_capacity(2);
        for provider in ["a", "b", "c"]
        {   log.record(
              PROVIDER_FAIL,
              EventLevel::Warning,
              EventFields::from_provider(provider)
            );
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].provider_from.as_deref(), Some("c"));
        assert_eq!(recent[1].provider_from.as_deref(), Some("b"));
        assert_eq!(log.recent(0).len(), 1);
    }
}
