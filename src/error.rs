//! Error taxonomy shared by adapters, the selector and the HTTP surface

/// Errors raised by the orchestrator.
///
/// Only `AuthenticationRequired` and `ProviderUnavailable` are caught by
/// the failover selector; everything else is fatal for the request.
/// Implements Clone so failures can be kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error
{   /// Credentials for a provider are missing or were rejected
    #[error("Provider '{provider_id}' credentials missing")]
    AuthenticationRequired
    {   provider_id: String
    }
  , /// Quota exhaustion or any other upstream/transport failure
    #[error("Provider '{provider_id}' is unavailable: {message}")]
    ProviderUnavailable
    {   provider_id: String
      , message: String
    }
  , /// Inbound request failed schema validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String)
  , /// Static configuration is malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String)
  , /// Provider id is not part of the configuration
    #[error("Provider not configured: {0}")]
    UnknownProvider(String)
  , /// Credential store backend failed
    #[error("Credential storage error: {0}")]
    Storage(String)
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error
{   pub fn auth_required(provider_id: impl Into<String>) -> Self
    {   Error::AuthenticationRequired
        {   provider_id: provider_id.into()
        }
    }

    pub fn unavailable(
      provider_id: impl Into<String>
    , message: impl Into<String>
    ) -> Self
    {   Error::ProviderUnavailable
        {   provider_id: provider_id.into()
          , message: message.into()
        }
    }

    /// Provider the failure is attributed to, for the two
    /// signaling conditions.
    pub fn provider_id(&self) -> Option<&str>
    {   match self
        {   Error::AuthenticationRequired { provider_id }
          | Error::ProviderUnavailable { provider_id, .. } => {
              Some(provider_id)
            }
          , _ => None
        }
    }

    /// True when the selector may move on to the next provider.
    pub fn is_failover(&self) -> bool
    {   matches!(
          self,
          Error::AuthenticationRequired { .. }
            | Error::ProviderUnavailable { .. }
        )
    }
}
