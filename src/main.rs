// MIT License - Copyright (c) 2026 Peter Wright
// DC09 transmitter daemon

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use dc09_spt::{
    CellId, Dialer, DialerConfig, EventParams, Network, PathOptions, PollSettings, Slot,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "dc09-spt")]
#[command(about = "SIA DC09 alarm transmitter with redundant receiver paths")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Event to send at startup, as TYPE:key=value,... (e.g. SIA:code=BA,zone=3)
    #[arg(long = "event", value_name = "EVENT")]
    events: Vec<String>,

    /// Exit once the startup events are delivered
    #[arg(long)]
    once: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    spt: SptToml,
    #[serde(default, rename = "path")]
    paths: Vec<PathToml>,
    #[serde(default)]
    poll: Option<PollToml>,
    #[serde(default, rename = "routine")]
    routines: Vec<EventParams>,
}

#[derive(Debug, Deserialize)]
struct SptToml {
    account: String,
    #[serde(default)]
    receiver: Option<u32>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default = "default_path_timeout")]
    path_timeout_ms: u64,
    #[serde(default = "default_send_retry_delay")]
    send_retry_delay_ms: u64,
    /// Scheduler iteration delay when only routines are configured
    #[serde(default = "default_routine_retry_delay")]
    routine_retry_delay_ms: u64,
    #[serde(default = "default_state_interval")]
    state_interval_secs: u64,
    /// How long to wait for the queue to drain on exit
    #[serde(default = "default_drain_timeout")]
    drain_timeout_secs: u64,
}

fn default_path_timeout() -> u64 {
    5000
}
fn default_send_retry_delay() -> u64 {
    500
}
fn default_routine_retry_delay() -> u64 {
    5000
}
fn default_state_interval() -> u64 {
    300
}
fn default_drain_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct PathToml {
    network: String,
    #[serde(default = "default_slot")]
    slot: String,
    host: String,
    port: u16,
    #[serde(default)]
    account: Option<String>,
    /// Hex-encoded encryption key
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    receiver: Option<u32>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

fn default_slot() -> String {
    "primary".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct PollToml {
    main_interval_secs: u64,
    #[serde(default)]
    backup_interval_secs: Option<u64>,
    #[serde(default = "default_poll_retry_delay")]
    retry_delay_secs: u64,
    #[serde(default)]
    ok: Option<EventParams>,
    #[serde(default)]
    fail: Option<EventParams>,
}

fn default_poll_retry_delay() -> u64 {
    5
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

fn build_dialer_config(toml: &SptToml) -> DialerConfig {
    let mut builder = DialerConfig::builder()
        .account(&toml.account)
        .path_timeout(Duration::from_millis(toml.path_timeout_ms))
        .send_retry_delay(Duration::from_millis(toml.send_retry_delay_ms))
        .poll_retry_delay(Duration::from_millis(toml.routine_retry_delay_ms));
    if let Some(receiver) = toml.receiver {
        builder = builder.receiver(receiver);
    }
    if let Some(line) = toml.line {
        builder = builder.line(line);
    }
    builder.build()
}

fn build_path_options(toml: &PathToml) -> Result<(Network, Slot, PathOptions)> {
    let network: Network = toml.network.parse().map_err(anyhow::Error::msg)?;
    let slot: Slot = toml.slot.parse().map_err(anyhow::Error::msg)?;

    let mut options = PathOptions::new(&toml.host, toml.port);
    if let Some(account) = &toml.account {
        options = options.account(account);
    }
    if let Some(key) = &toml.key {
        options = options.key(hex::decode(key.trim()).context("Invalid path key")?);
    }
    if let Some(receiver) = toml.receiver {
        options = options.receiver(receiver);
    }
    if let Some(line) = toml.line {
        options = options.line(line);
    }
    if let Some(ms) = toml.timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }
    Ok((network, slot, options))
}

/// Parse `TYPE:key=value,key=value`. Values are kept as text.
fn parse_event(s: &str) -> Result<(String, EventParams)> {
    let (message_type, fields) = s
        .split_once(':')
        .context("Event must be in format TYPE:key=value,...")?;
    let params = fields
        .split(',')
        .filter(|f| !f.trim().is_empty())
        .map(|f| {
            f.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .with_context(|| format!("Expected key=value, got {f:?}"))
        })
        .collect::<Result<EventParams>>()?;
    Ok((message_type.trim().to_string(), params))
}

/// What the dialer was last configured with. Setting a path again resets
/// its health and clock offset, so a reload only touches what changed.
#[derive(Debug, Default)]
struct Applied {
    paths: HashMap<CellId, PathToml>,
    poll: Option<PollToml>,
    routines: Option<Vec<EventParams>>,
}

/// Path changes needed to go from the applied paths to those of `config`.
#[derive(Debug)]
struct PathPlan {
    set: Vec<(CellId, PathToml, PathOptions)>,
    delete: Vec<CellId>,
}

fn plan_paths(applied: &HashMap<CellId, PathToml>, config: &Config) -> Result<PathPlan> {
    // A later entry for the same cell wins
    let mut wanted = HashMap::new();
    for p in &config.paths {
        let (network, slot, options) = build_path_options(p)?;
        wanted.insert(CellId::new(network, slot), (p, options));
    }

    let delete = CellId::ALL
        .into_iter()
        .filter(|cell| applied.contains_key(cell) && !wanted.contains_key(cell))
        .collect();
    let mut set = Vec::new();
    for cell in CellId::ALL {
        if let Some((toml, options)) = wanted.remove(&cell)
            && applied.get(&cell) != Some(toml)
        {
            set.push((cell, toml.clone(), options));
        }
    }
    Ok(PathPlan { set, delete })
}

/// Bring the dialer in line with the paths, polling and routines of a config.
async fn apply_config(dialer: &Dialer, config: &Config, applied: &mut Applied) -> Result<()> {
    let plan = plan_paths(&applied.paths, config)?;
    for cell in plan.delete {
        dialer.del_path(cell.network, cell.slot).await;
        applied.paths.remove(&cell);
        info!("Path {} removed", cell);
    }
    for (cell, toml, options) in plan.set {
        dialer
            .set_path(cell.network, cell.slot, options)
            .await
            .with_context(|| format!("Failed to configure {} path", cell))?;
        info!("Path {} set to {}:{}", cell, toml.host, toml.port);
        applied.paths.insert(cell, toml);
    }

    if config.poll != applied.poll {
        match &config.poll {
            Some(poll) => {
                let settings = PollSettings {
                    main_interval: Some(poll.main_interval_secs),
                    backup_interval: poll.backup_interval_secs,
                    ok_message: poll.ok.clone(),
                    fail_message: poll.fail.clone(),
                };
                dialer
                    .start_poll(settings, Duration::from_secs(poll.retry_delay_secs))
                    .await
                    .context("Invalid poll configuration")?;
            }
            None => dialer.stop_poll().await,
        }
        applied.poll = config.poll.clone();
    }

    if applied.routines.as_ref() != Some(&config.routines) {
        dialer
            .start_routines(config.routines.clone())
            .await
            .context("Invalid routine configuration")?;
        applied.routines = Some(config.routines.clone());
    }
    Ok(())
}

async fn log_state(dialer: &Dialer) {
    let state = dialer.state().await;
    match serde_json::to_string(&state) {
        Ok(json) => info!("State: {json}"),
        Err(e) => warn!("Could not serialize state: {e}"),
    }
}

async fn drain(dialer: &Dialer, timeout: Duration) {
    if !dialer.wait_idle(timeout).await {
        warn!(
            "{} message(s) still queued after {:?}",
            dialer.state().await.queued,
            timeout
        );
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=dc09_spt=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let events = cli
        .events
        .iter()
        .map(|e| parse_event(e))
        .collect::<Result<Vec<_>>>()?;

    let config = load_config(&cli.config)?;
    let drain_timeout = Duration::from_secs(config.spt.drain_timeout_secs);
    let state_interval_secs = config.spt.state_interval_secs.max(1);

    let dialer = Arc::new(Dialer::new(build_dialer_config(&config.spt)));
    let mut applied = Applied::default();
    info!("Transmitter account {}", config.spt.account);

    if cli.once {
        // One-shot mode: paths only, no polling or routines
        for p in &config.paths {
            let (network, slot, options) = build_path_options(p)?;
            dialer.set_path(network, slot, options).await?;
        }
    } else {
        apply_config(&dialer, &config, &mut applied).await?;
    }

    for (message_type, params) in &events {
        let seq = dialer
            .send_message(message_type, params)
            .await
            .with_context(|| format!("Failed to queue {message_type} event"))?;
        info!("Queued {} event as seq {}", message_type, seq);
    }

    if cli.once {
        drain(&dialer, drain_timeout).await;
        log_state(&dialer).await;
        return Ok(());
    }

    let dialer_state = Arc::clone(&dialer);
    let state_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(state_interval_secs));
        // Skip the first immediate tick
        ticker.tick().await;
        loop {
            ticker.tick().await;
            log_state(&dialer_state).await;
        }
    });

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    info!("Transmitter running. Send SIGHUP to reload, SIGINT/SIGTERM to stop.");
    loop {
        let reload = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading paths, polling and routines...");
                true
            }
        };
        if !reload {
            break;
        }

        // Identity and timings in [spt] only take effect on restart
        match load_config(&cli.config) {
            Ok(new_config) => match apply_config(&dialer, &new_config, &mut applied).await {
                Ok(()) => info!("Config reloaded successfully"),
                Err(e) => error!("Failed to apply reloaded config: {e:#}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }
    }

    state_handle.abort();
    dialer.shutdown().await;
    drain(&dialer, drain_timeout).await;
    log_state(&dialer).await;

    info!("Shutdown complete");
    Ok(())
}
