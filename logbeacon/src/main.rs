//! logbeacon - CLI for the logbeacon reporting pipeline
//!
//! This tool provides commands for:
//! - Checking reporter configuration
//! - Printing the persisted device identifier
//! - Sending a one-off event through the full pipeline
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/logbeacon/config.toml (~/.config/logbeacon/config.toml)
//! - Device store: $XDG_DATA_HOME/logbeacon/storage.json (~/.local/share/logbeacon/storage.json)
//! - Logs: $XDG_STATE_HOME/logbeacon/ (~/.local/state/logbeacon/)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use logbeacon_core::platform::{
    AppState, DeviceIdentity, FileStore, HttpTransport, KeyValueStore, NativePlatform,
};
use logbeacon_core::{Config, Level, Message, Reporter, ReporterConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "logbeacon")]
#[command(about = "Client-side log and error reporting agent")]
#[command(version)]
struct Args {
    /// Verbose output (writes diagnostics to the log file)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show reporter configuration and whether it is valid
    Status,

    /// Print the persisted device identifier
    DeviceId,

    /// Send one event and wait for it to be delivered
    Send {
        /// Event level: error, info, warn, or a custom event name
        #[arg(short, long, default_value = "info")]
        level: String,

        /// Event description
        #[arg(short, long)]
        desc: Option<String>,

        /// User context attached to the event
        #[arg(short, long)]
        user: Option<String>,

        /// Parse MESSAGE as JSON
        #[arg(long)]
        json: bool,

        /// Give up waiting for delivery after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,

        /// Message text (or JSON with --json)
        message: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Held for the whole run so buffered log lines are flushed on exit
    let _log_guard = if args.verbose {
        let guard = logbeacon_core::logging::init(&config.logging)
            .context("failed to initialize logging")?;
        Some(guard)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::DeviceId => cmd_device_id(),
        Command::Send {
            level,
            desc,
            user,
            json,
            timeout_secs,
            message,
        } => {
            let message = if json {
                let value: serde_json::Value =
                    serde_json::from_str(&message).context("MESSAGE is not valid JSON")?;
                Message::from(value)
            } else {
                Message::from(message)
            };
            cmd_send(
                &config.reporter,
                Level::parse(&level),
                message,
                desc.as_deref(),
                user,
                Duration::from_secs(timeout_secs),
            )
        }
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Reporter Configuration");
    println!("======================");
    println!();

    let reporter = &config.reporter;

    println!("Config File:     {}", Config::config_path().display());
    println!("Endpoint:        {}", or_unset(&reporter.endpoint_url));
    println!("App ID:          {}", or_unset(&reporter.app_id));
    println!("App Version:     {}", or_unset(&reporter.app_version));
    println!("Batch Size:      {}", reporter.max_batch_size);
    println!("Startup Delay:   {}ms", reporter.startup_delay_ms);
    println!("Idle Wait:       {}ms", reporter.idle_wait_ms);
    println!("Success Wait:    {}ms", reporter.success_wait_ms);
    println!("Error Wait:      {}ms", reporter.error_wait_ms);
    println!("Timeout:         {}s", reporter.request_timeout_secs);
    println!("Device Store:    {}", Config::device_store_path().display());

    println!();
    match reporter.validate() {
        Ok(()) => println!("Status: Ready to report"),
        Err(e) => {
            println!("Status: Not ready ({})", e);
            println!();
            println!("Configure the reporter in config.toml:");
            println!();
            println!("  [reporter]");
            println!("  endpoint_url = \"https://logs.example.com/logstores/app/track\"");
            println!("  app_id = \"your-app-id\"");
            println!("  app_version = \"1.0.0\"");
        }
    }

    Ok(())
}

fn cmd_device_id() -> Result<()> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(Config::device_store_path()));
    let device_id = DeviceIdentity::new(store).get();
    if device_id.is_empty() {
        bail!(
            "device store at {} is unusable",
            Config::device_store_path().display()
        );
    }
    println!("{}", device_id);
    Ok(())
}

fn cmd_send(
    config: &ReporterConfig,
    level: Level,
    message: Message,
    description: Option<&str>,
    user: Option<String>,
    timeout: Duration,
) -> Result<()> {
    config
        .validate()
        .context("reporter is not configured (run 'status' for details)")?;

    // No point holding a one-shot event back
    let config = ReporterConfig {
        startup_delay_ms: 0,
        ..config.clone()
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(send_event(config, level, message, description, user, timeout))
}

async fn send_event(
    config: ReporterConfig,
    level: Level,
    message: Message,
    description: Option<&str>,
    user: Option<String>,
    timeout: Duration,
) -> Result<()> {
    let transport =
        HttpTransport::new(config.request_timeout()).context("failed to create HTTP client")?;
    let store = Arc::new(FileStore::new(Config::device_store_path()));
    let platform = Arc::new(NativePlatform::new(transport, store));
    platform.set_app_state(AppState::Foreground);

    let reporter = Reporter::new(config, platform).context("failed to create reporter")?;
    if let Some(user) = user {
        reporter.set_user_context(user);
    }
    if !reporter.log(level, message, description) {
        bail!("event could not be built");
    }
    reporter.start();
    tracing::info!(
        endpoint = %reporter.config().endpoint_url,
        timeout_secs = timeout.as_secs(),
        "Waiting for event delivery"
    );

    // Idle only counts once the loop has tried; before that the event may
    // still be sitting out the start-up delay
    let deadline = Instant::now() + timeout;
    while !(reporter.stats().upload_attempts > 0 && reporter.is_idle()) {
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let stats = reporter.stats();
    tracing::info!(
        attempts = stats.upload_attempts,
        sent = stats.events_sent,
        discarded = stats.events_discarded,
        "Send finished"
    );
    if stats.events_sent == 0 {
        if stats.events_discarded > 0 {
            bail!(
                "delivery to {} failed (run with --verbose and check {})",
                reporter.config().endpoint_url,
                logbeacon_core::logging::log_file_path().display()
            );
        }
        bail!("event was not delivered within {}s", timeout.as_secs());
    }

    println!("Sent 1 event to {}", reporter.config().endpoint_url);
    Ok(())
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "<not set>"
    } else {
        value
    }
}
