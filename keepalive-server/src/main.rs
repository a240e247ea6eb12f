mod api;
mod status_page;
mod types;

use clap::Parser;
use keepalive::{
    notifier_from_config, Account, CfClient, HttpProbe, Orchestrator, RegionTable, RestartDispatcher,
    TelegramConfig, WorkerConfig,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use api::AppState;

#[derive(Parser, Debug)]
#[command(name = "keepalive-server")]
#[command(about = "Checks SAP Cloud Foundry apps and restarts them when they go offline")]
struct Args {
    /// SAP account email used for the CF API
    #[arg(long, env = "EMAIL")]
    email: String,

    /// SAP account password used for the CF API
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: String,

    /// Newline-separated app URLs to monitor
    #[arg(long, env = "APP_URLS", default_value = "")]
    app_urls: String,

    #[arg(long, env = "TG_CHAT_ID")]
    tg_chat_id: Option<String>,

    #[arg(long, env = "TG_BOT_TOKEN", hide_env_values = true)]
    tg_bot_token: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8787")]
    port: u16,

    /// Enable CORS for all origins
    #[arg(long)]
    cors: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    keepalive::init_logging();

    info!("🚀 Starting keepalive-server v{}", env!("CARGO_PKG_VERSION"));
    info!("🔧 Port: {}", args.port);
    info!("🔧 CORS: {}", if args.cors { "enabled" } else { "disabled" });

    let config = Arc::new(
        WorkerConfig::new(
            Account::new(args.email, args.password),
            &args.app_urls,
            RegionTable::default(),
        )
        .with_telegram(TelegramConfig::from_parts(args.tg_bot_token, args.tg_chat_id)),
    );
    info!("🔧 Monitoring {} app(s)", config.apps.len());

    let http = reqwest::Client::new();
    let notifier = notifier_from_config(http.clone(), config.telegram.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        Arc::new(HttpProbe::new(http.clone())),
        Arc::new(CfClient::new(http, config.credentials.clone())),
        notifier,
    ));
    let (dispatcher, _reporter) = RestartDispatcher::start(orchestrator.clone());

    let mut app = api::router(AppState {
        orchestrator,
        dispatcher,
    });

    if args.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("✅ Server listening on http://{}", addr);
    info!("🔁 Restart webhook: http://{}/webhook/restart?appUrl=...", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
