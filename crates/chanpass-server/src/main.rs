//! chanpass server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, starts the reconciler and serves the payment webhook over
//! HTTP.
//!
//! # Signing a test event
//!
//! To compute the signature header for a payload saved on disk:
//!
//! ```
//! cargo run -p chanpass-server --bin chanpass -- --sign event.json
//! ```

use std::{
  io::Read as _,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chanpass_core::{catalog::Catalog, clock::SystemClock};
use chanpass_engine::{Engine, Reconciler};
use chanpass_server::{AppState, ServerConfig, signature};
use chanpass_store_sqlite::SqliteStore;
use chanpass_telegram::{BotClient, BotConfig};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "chanpass subscription server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the webhook signature for the file at PATH (`-` for stdin) and
  /// exit.
  #[arg(long, value_name = "PATH")]
  sign: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("CHANPASS")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Helper mode: sign a payload and exit.
  if let Some(path) = cli.sign {
    let body = read_payload(&path)?;
    println!("{}", signature::sign(&server_cfg.webhook_secret, &body));
    return Ok(());
  }

  let engine_cfg = server_cfg
    .engine_config()
    .context("invalid engine configuration")?;

  let catalog = Catalog::from_config(&server_cfg.products)
    .context("invalid product catalog")?;
  if catalog.is_empty() {
    tracing::warn!("product catalog is empty; every payment will be refused");
  }
  tracing::info!(products = catalog.len(), "loaded product catalog");

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let bot = BotClient::new(BotConfig {
    api_base: server_cfg.telegram_api_base.clone(),
    timeout: server_cfg.call_timeout(),
    ..BotConfig::new(server_cfg.bot_token.clone())
  })
  .context("failed to build bot client")?;

  let engine = Arc::new(Engine::new(
    store,
    bot.clone(),
    bot,
    SystemClock,
    Arc::new(catalog),
    engine_cfg,
  ));

  let reconciler =
    Reconciler::spawn(Arc::clone(&engine), server_cfg.reconcile_interval());

  // Build application state.
  let state = AppState {
    engine,
    webhook: Arc::new(server_cfg.webhook_config()),
  };

  let app = chanpass_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  reconciler.shutdown().await;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Read the payload to sign from `path`, or stdin when `path` is `-`.
fn read_payload(path: &Path) -> anyhow::Result<Vec<u8>> {
  if path == Path::new("-") {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;
    return Ok(buf);
  }
  std::fs::read(path).with_context(|| format!("failed to read {path:?}"))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
