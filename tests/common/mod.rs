#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use trial_orchestrator::config::ProviderDescriptor;
use trial_orchestrator::request::AssistantMessage;
use trial_orchestrator::{
  AdapterContext, AdapterFactory, AppConfig, ChatCompletionRequest,
  ChatCompletionResponse, ChatMessage, CredentialStore, Error,
  MemoryCredentialStore, ProviderAdapter, Result
};

pub fn descriptor(
  id: &str
, priority: i64
, base_url: &str
, path: &str
) -> ProviderDescriptor
{   ProviderDescriptor::new(id, format!("{} provider", id), priority, base_url, path)
}

pub fn chat_request(model: &str) -> ChatCompletionRequest
{   ChatCompletionRequest::new(model, vec![ChatMessage::user("ping")])
}

pub fn context(store: Arc<MemoryCredentialStore>) -> AdapterContext
{   AdapterContext::new(store, Duration::from_secs(5))
}

pub async fn store_with_keys(keys: &[(&str, &str)]) -> Arc<MemoryCredentialStore>
{   let store = Arc::new(MemoryCredentialStore::new());
    for (provider_id, key) in keys
    {   store.set_api_key(provider_id, key).await.unwrap();
    }
    store
}

/// Store contents serialized, for before/after comparisons
pub fn store_bytes(store: &MemoryCredentialStore) -> Vec<u8>
{   serde_json::to_vec(&store.snapshot()).unwrap()
}

pub fn ok_response(model: &str, text: &str) -> ChatCompletionResponse
{   ChatCompletionResponse::single(
      "test",
      model,
      AssistantMessage::new(text),
      Some("stop".to_string()),
      None
    )
}

/// What a scripted adapter does when called
#[derive(Clone)]
pub enum Script
{   Succeed(String)
  , Fail(Error)
}

/// Adapter with a fixed outcome that logs every call
pub struct ScriptedAdapter
{   id: String
  , script: Script
  , calls: Arc<Mutex<Vec<String>>>
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter
{   fn provider_id(&self) -> &str
    {   &self.id
    }

    async fn chat_completions(
      &self
    , request: &ChatCompletionRequest
    ) -> Result<ChatCompletionResponse>
    {   self.calls.lock().push(self.id.clone());
        match &self.script
        {   Script::Succeed(text) => Ok(ok_response(&request.model, text))
          , Script::Fail(e) => Err(e.clone())
        }
    }

    async fn validate_api_key(&self, _api_key: &str) -> Result<()>
    {   Ok(())
    }
}

/// Factory table of scripted adapters keyed by provider id, plus the
/// shared call log and a per-id construction counter
pub struct Scripted
{   pub factories: HashMap<String, AdapterFactory>
  , pub calls: Arc<Mutex<Vec<String>>>
  , pub built: Arc<Mutex<HashMap<String, usize>>>
}

pub fn scripted(scripts: &[(&str, Script)]) -> Scripted
{   let calls = Arc::new(Mutex::new(Vec::new()));
    let built = Arc::new(Mutex::new(HashMap::new()));
    let mut factories: HashMap<String, AdapterFactory> = HashMap::new();
    for (id, script) in scripts
    {   let id = id.to_string();
        let script = script.clone();
        let calls = calls.clone();
        let built = built.clone();
        let key = id.clone();
        let factory: AdapterFactory = Arc::new(
          move |_: &ProviderDescriptor, _: &AdapterContext| {
            *built.lock().entry(id.clone()).or_insert(0) += 1;
            let adapter: Arc<dyn ProviderAdapter> = Arc::new(ScriptedAdapter
            {   id: id.clone()
              , script: script.clone()
              , calls: calls.clone()
            });
            adapter
          }
        );
        factories.insert(key, factory);
    }
    Scripted
    {   factories
      , calls
      , built
    }
}

pub fn config_of(providers: Vec<ProviderDescriptor>) -> AppConfig
{   AppConfig::from_providers(providers)
}
