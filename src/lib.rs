pub mod error;
pub mod context;
pub mod config;
pub mod request;
pub mod credentials;
pub mod events;
pub mod interactions;
pub mod providers;
pub mod registry;
pub mod failover;
pub mod client;
pub mod server;

/*

trial-orchestrator: one OpenAI-compatible chat completion endpoint in
front of a pool of free-tier inference providers. Providers are tried
in priority order; the first one that answers wins, the rest are
skipped.

src/
├── error.rs          # AuthenticationRequired / ProviderUnavailable + fatal kinds
├── config.rs         # providers.yaml: descriptors, server, http timeout
├── request.rs        # normalized request/response envelope
├── credentials.rs    # per-provider key + last error, env seeding
├── context.rs        # request id task-local
├── events.rs         # recent failover/admin events
├── interactions.rs   # per-provider log of live upstream calls
├── providers/        # one adapter per provider wire format
│   ├── http.rs       # shared POST + status mapping
│   ├── openai_compat.rs  # cerebras, openrouter
│   ├── gemini.rs
│   ├── cohere.rs
│   └── huggingface.rs
├── registry.rs       # ordered descriptors, lazy adapter cache
├── failover.rs       # selector
├── client.rs         # Gateway facade (chat + admin operations)
├── server.rs         # axum routes and error envelope
└── main.rs

*/

pub use client::Gateway;
pub use config::{AppConfig, ProviderDescriptor};
pub use credentials::{
  CredentialRecord, CredentialStore, CredentialSummary, MemoryCredentialStore
};
pub use error::{Error, Result};
pub use failover::Selector;
pub use interactions::{InteractionLog, ProviderInteraction};
pub use providers::{AdapterContext, AdapterKind, ProviderAdapter};
pub use registry::{AdapterFactory, ProviderRegistry, ProviderState};
pub use request::{
  AssistantMessage, ChatCompletionRequest, ChatCompletionResponse,
  ChatMessage, Choice, ContentPart, MessageContent, Role, Usage
};
