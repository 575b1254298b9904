use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use trial_orchestrator::{server, AppConfig, Gateway, MemoryCredentialStore};

/// OpenAI-compatible chat completions over a failover provider pool
#[derive(Parser)]
#[command(name = "trial-orchestrator", version, about)]
struct Cli
{   /// Provider configuration file
    #[arg(
      short,
      long,
      env = "TRIAL_CONFIG",
      default_value = "config/providers.yaml"
    )]
    config: PathBuf
  , /// Bind host, overrides the config file
    #[arg(long, env = "HOST")]
    host: Option<String>
  , /// Bind port, overrides the config file
    #[arg(long, env = "PORT")]
    port: Option<u16>
}

#[tokio::main]
async fn main() -> anyhow::Result<()>
{   env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)
      .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(host) = cli.host
    {   config.server.host = host;
    }
    if let Some(port) = cli.port
    {   config.server.port = port;
    }
    if config.providers.is_empty()
    {   warn!("No providers configured; every request will fail");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let store = Arc::new(MemoryCredentialStore::new());
    let gateway = Gateway::new(config, store)?;
    let seeded = gateway.seed_credentials_from_env().await?;
    info!("Seeded {} provider keys from environment", seeded.len());

    let app = server::router(Arc::new(gateway));
    let listener = tokio::net::TcpListener::bind(&addr)
      .await
      .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
      .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
      })
      .await?;
    Ok(())
}
