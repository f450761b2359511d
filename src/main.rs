use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dataweaver::dbconnector::NativeConnectorFactory;
use dataweaver::server::state::ServerState;
use dataweaver::server::run_server;
use dataweaver::{AppConfig, McpRuntime, McpServerManager, PasswordCipher, SqliteMetaStore};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite metadata database file.
    pub db_path: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Base URL used when minting server endpoints. Overrides BASE_URL.
    #[clap(long)]
    pub base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let mut config = AppConfig::from_env()?;
    if let Some(base_url) = cli_args.base_url {
        config.base_url = base_url;
    }

    let cipher = PasswordCipher::new(&config.encryption_key)?;

    info!("Opening metadata database at {:?}...", cli_args.db_path);
    let store = Arc::new(SqliteMetaStore::new(&cli_args.db_path)?);

    let runtime = Arc::new(McpRuntime::new(
        store.clone(),
        cipher,
        Arc::new(NativeConnectorFactory),
    ));
    let manager = Arc::new(McpServerManager::new(store.clone(), config.base_url.clone()));

    let state = ServerState {
        runtime,
        manager,
        store,
        jwt_secret: Arc::new(config.jwt_secret.clone()),
    };

    info!("Ready to serve at port {}!", cli_args.port);
    run_server(state, cli_args.port).await
}
