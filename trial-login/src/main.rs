use anyhow::Context;
use clap::Parser;
use keepalive::browser::{Browser, LaunchOptions};
use keepalive::{notifier_from_config, parse_accounts, LoginBot, TelegramConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "trial-login")]
#[command(about = "Logs SAP BTP trial accounts in to keep them active")]
struct Args {
    /// JSON array of {email, password} or `email:password;email:password`
    #[arg(long, env = "SAP_ACCOUNTS", hide_env_values = true, default_value = "")]
    accounts: String,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,

    /// Chromium executable; searched on the usual paths when unset
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Where screenshots are written
    #[arg(long, default_value = ".")]
    screenshot_dir: PathBuf,

    /// Show the browser window
    #[arg(long)]
    headful: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    keepalive::init_logging();

    info!("🚀 Starting trial-login v{}", env!("CARGO_PKG_VERSION"));

    let accounts = parse_accounts(&args.accounts).inspect_err(|e| error!(error = %e, "no usable account"))?;
    info!("🔧 {} account(s) to process", accounts.len());

    tokio::fs::create_dir_all(&args.screenshot_dir)
        .await
        .with_context(|| format!("cannot create {}", args.screenshot_dir.display()))?;

    let notifier = notifier_from_config(
        reqwest::Client::new(),
        TelegramConfig::from_parts(args.telegram_bot_token, args.telegram_chat_id),
    );
    let bot = LoginBot::new(notifier, &args.screenshot_dir);

    let browser = Browser::launch(LaunchOptions {
        executable: args.chrome_path,
        headless: !args.headful,
        ..LaunchOptions::default()
    })
    .await
    .context("failed to launch Chromium")?;

    let summary = bot.run(&browser, &accounts).await;
    browser.close().await;

    if summary.all_succeeded() {
        info!("🎉 all accounts logged in");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            failed = summary.outcomes.len() - summary.success_count(),
            "some accounts failed to log in"
        );
        Ok(ExitCode::FAILURE)
    }
}
