mod relay;

use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use relay::{Relay, RelayConfig, GITHUB_API};

#[derive(Parser, Debug)]
#[command(name = "uptime-relay")]
#[command(about = "Forwards Uptime Kuma down alerts to GitHub Actions")]
struct Args {
    /// Shared secret expected in the `token` query parameter
    #[arg(long, env = "SECRET_TOKEN", hide_env_values = true)]
    secret_token: Option<String>,

    /// GitHub token allowed to create repository_dispatch events
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, env = "GITHUB_API", default_value = GITHUB_API)]
    github_api: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8788")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    keepalive::init_logging();

    info!("🚀 Starting uptime-relay v{}", env!("CARGO_PKG_VERSION"));
    let config = RelayConfig::new(args.secret_token, args.github_token).with_github_api(args.github_api);
    if config.secret_token.is_none() {
        warn!("SECRET_TOKEN is not set, every request will be rejected");
    }
    if config.github_token.is_none() {
        warn!("GITHUB_TOKEN is not set, down events cannot be forwarded");
    }

    let app = relay::router(Arc::new(Relay::new(config, reqwest::Client::new())));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("✅ Relay listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
