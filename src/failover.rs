//! Priority-ordered provider selection with failover

use std::sync::Arc;
use log::{debug, info, warn};
use crate::error::{Error, Result};
use crate::events::{self, EventFields, EventLevel, EventLog};
use crate::registry::ProviderRegistry;
use crate::request::{ChatCompletionRequest, ChatCompletionResponse};

/// Providers of one inbound request, in attempt order
#[derive(Debug, Clone)]
pub struct FailoverSequence
{   pub providers: Vec<String>
  , pub current_index: usize
}

impl FailoverSequence
{   pub fn new(providers: Vec<String>) -> Self
    {   debug!(
          "Creating failover sequence with {} providers",
          providers.len()
        );
        FailoverSequence
        {   providers
          , current_index: 0
        }
    }

    pub fn from_registry(registry: &ProviderRegistry) -> Self
    {   Self::new(
          registry.ordered().into_iter().map(|d| d.id.clone()).collect()
        )
    }

    /// Provider to try now
    pub fn current(&self) -> Option<&str>
    {   self.providers.get(self.current_index).map(String::as_str)
    }

    /// Provider that would be tried after the current one
    pub fn peek_next(&self) -> Option<&str>
    {   self.providers.get(self.current_index + 1).map(String::as_str)
    }

    /// Move to the next provider
    pub fn advance(&mut self) -> Option<&str>
    {   self.current_index += 1;
        self.current()
    }

    pub fn has_next(&self) -> bool
    {   self.current_index + 1 < self.providers.len()
    }
}

/// Runs a request against providers until one succeeds.
///
/// Candidates are tried strictly one after another and each provider
/// at most once per request. Recorded availability is not consulted;
/// only live outcomes decide.
pub struct Selector
{   registry: Arc<ProviderRegistry>
  , events: Arc<EventLog>
}

impl Selector
{   pub fn new(
      registry: Arc<ProviderRegistry>
    , events: Arc<EventLog>
    ) -> Self
    {   Selector
        {   registry
          , events
        }
    }

    pub async fn select_provider(
      &self
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   let mut sequence = FailoverSequence::from_registry(&self.registry);
        let mut failures: Vec<Error> = Vec::new();

        while let Some(provider_id) = sequence.current().map(str::to_string)
        {   let adapter = self.registry.adapter(&provider_id)?;
            debug!("Attempting {} for model {}", provider_id, request.model);

            match adapter.chat_completions(request).await
            {   Ok(response) => {
                  info!("Served by {} after {} failures",
                    provider_id, failures.len());
                  if !failures.is_empty()
                  {   self.events.record(
                        events::PROVIDER_SUCCESS,
                        EventLevel::Info,
                        EventFields::from_provider(&provider_id)
                          .model(&request.model)
                          .message(format!(
                            "served after {} failed attempts",
                            failures.len()
                          ))
                      );
                  }
                  return Ok(response);
                }
              , Err(e) if e.is_failover() => {
                  warn!("Provider {} failed: {}", provider_id, e);
                  self.events.record(
                    events::PROVIDER_FAIL,
                    EventLevel::Warning,
                    EventFields::from_provider(&provider_id)
                      .model(&request.model)
                      .error_code(error_code(&e))
                      .message(e.to_string())
                  );
                  if let Some(next) = sequence.peek_next()
                  {   self.events.record(
                        events::PROVIDER_SWITCHED,
                        EventLevel::Info,
                        EventFields::from_provider(&provider_id)
                          .to_provider(next)
                          .model(&request.model)
                      );
                  }
                  failures.push(e);
                  sequence.advance();
                }
              , Err(e) => return Err(e)
            }
        }

        Err(terminal_error(failures))
    }
}

fn error_code(error: &Error) -> &'static str
{   match error
    {   Error::AuthenticationRequired { .. } => "provider_auth_required"
      , _ => "provider_unavailable"
    }
}

fn reason(error: &Error) -> String
{   match error
    {   Error::ProviderUnavailable { message, .. } => message.clone()
      , other => other.to_string()
    }
}

/// One candidate: its own failure. Several: an aggregate
/// `ProviderUnavailable` attributed to the last attempted provider.
fn terminal_error(mut failures: Vec<Error>) -> Error
{   match failures.len()
    {   0 => Error::unavailable("none", "No providers configured")
      , 1 => failures.remove(0)
      , n => {
          let last = &failures[n - 1];
          Error::unavailable(
            last.provider_id().unwrap_or("none"),
            format!("all {} providers failed; last: {}", n, reason(last))
          )
        }
    }
}
