use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod api;
mod changes;
mod clock;
mod control;
mod detect;
mod engine;
mod iteration;
mod notify;
mod output;
mod progress;
mod sequence;
mod settings;
mod status;
mod store;
mod suspend;
mod telemetry;
mod util;

use api::{ApiClientConfig, HttpBackend};
use clock::{SharedClock, SystemClock};
use engine::ControlAction;
use engine::runtime::{Channels, WatchRuntime};
use notify::channels::{TerminalBell, WebhookPush};
use settings::WatchSettings;
use store::JsonFileStore;

#[derive(Parser)]
#[command(name = "agency-watch", about = "Watch agency monitoring iterations from the terminal")]
struct Cli {
    /// Backend API root, e.g. http://127.0.0.1:8000/api/v1 (env: WATCH_API_BASE)
    #[arg(global = true, long)]
    api_base: Option<String>,
    /// Local state file for snapshots and run memo
    #[arg(global = true, long, env = "WATCH_STATE_PATH", default_value = ".agency-watch/state.json")]
    state: PathBuf,
    /// Emit JSON envelopes to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow iterations interactively; type `help` for commands
    Watch(WatchArgs),
    Status,
    Progress,
    Start,
    Stop,
    /// Trigger one iteration now
    Run,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(long)]
    progress_interval_ms: Option<u64>,
    #[arg(long)]
    refresh_interval_secs: Option<u64>,
    #[arg(long, default_value_t = false)]
    no_sound: bool,
    #[arg(long, default_value_t = false)]
    no_push: bool,
    /// Never open the summary automatically
    #[arg(long, default_value_t = false)]
    no_auto_show: bool,
    /// Start backgrounded: detect and notify, but no periodic refresh until `show`
    #[arg(long, default_value_t = false)]
    hidden: bool,
}

impl WatchArgs {
    fn apply(&self, settings: &mut WatchSettings) {
        if let Some(ms) = self.progress_interval_ms.filter(|ms| *ms > 0) {
            settings.progress_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.refresh_interval_secs.filter(|s| *s > 0) {
            settings.refresh_interval = Duration::from_secs(secs);
        }
        if self.no_sound { settings.enable_sound = false; }
        if self.no_push { settings.enable_push = false; }
        if self.no_auto_show { settings.auto_show_summary = false; }
    }
}

fn backend(api_base: Option<String>) -> Result<HttpBackend> {
    let mut cfg = ApiClientConfig::from_env();
    if let Some(base) = api_base {
        cfg.base_url = base;
    }
    HttpBackend::new(cfg).context("configure monitoring backend")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // logging goes to stderr. Respects RUST_LOG and WATCH_LOG_FORMAT
    telemetry::config::init_tracing();

    let backend = backend(cli.api_base)?;
    let clock = SystemClock;

    match cli.command {
        Commands::Watch(args) => watch(backend, cli.state, args).await?,
        Commands::Status => status::run(&backend, &clock).await?,
        Commands::Progress => status::progress(&backend, &clock, &WatchSettings::from_env()).await?,
        Commands::Start => control::run(&backend, ControlAction::Start).await?,
        Commands::Stop => control::run(&backend, ControlAction::Stop).await?,
        Commands::Run => control::run(&backend, ControlAction::ManualRun).await?,
    }

    Ok(())
}

async fn watch(backend: HttpBackend, state: PathBuf, args: WatchArgs) -> Result<()> {
    let mut settings = WatchSettings::from_env();
    args.apply(&mut settings);

    let push = WebhookPush::new(settings.push_webhook.clone(), Duration::from_secs(10))?;
    let channels = Channels { sound: Box::new(TerminalBell), push: Arc::new(push) };
    let clock: SharedClock = Arc::new(SystemClock);
    let store = JsonFileStore::open(&state);

    let runtime = WatchRuntime::new(Arc::new(backend), settings, Box::new(store), channels, clock).hidden(args.hidden);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });

    runtime.run(rx, shutdown).await
}
