//! Pairing relay: entry point.
//!
//! Accepts WebSocket connections from displays and controllers, hands each
//! display a six-digit pairing code, pairs controllers that present the code,
//! and relays credentials and login results between the two.
//!
//! # Usage
//!
//! ```text
//! pairing-relay [OPTIONS]
//!
//! Options:
//!   --port <PORT>              Listener port [default: 443]
//!   --bind <IP>                Listener address [default: 0.0.0.0]
//!   --config <FILE>            Optional TOML file with overrides
//!   --display-label <LABEL>    Display role label in event names [default: display]
//!   --teardown <POLICY>        pairing | role [default: pairing]
//!   --outbound-buffer <N>      Per-connection outbound queue [default: 64]
//!   --command-buffer <N>       Broker command queue [default: 1024]
//!   --log-level <FILTER>       Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then flags and environment
//! variables.  A flag beats its environment variable.
//!
//! | Variable                | Flag                |
//! |-------------------------|---------------------|
//! | `PORT`                  | `--port`            |
//! | `RELAY_BIND`            | `--bind`            |
//! | `RELAY_CONFIG`          | `--config`          |
//! | `RELAY_DISPLAY_LABEL`   | `--display-label`   |
//! | `RELAY_TEARDOWN`        | `--teardown`        |
//! | `RELAY_OUTBOUND_BUFFER` | `--outbound-buffer` |
//! | `RELAY_COMMAND_BUFFER`  | `--command-buffer`  |
//! | `RELAY_LOG_LEVEL`       | `--log-level`       |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pairing_relay::domain::{ConfigLayer, RelayConfig, TeardownPolicy};
use pairing_relay::infrastructure::{load_config_layer, run_server};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket pairing-and-relay broker.
///
/// Every option is unset by default so that values from `--config` are only
/// overridden when a flag or environment variable is actually given.
#[derive(Debug, Parser)]
#[command(
    name = "pairing-relay",
    about = "Pairs displays with controllers by six-digit code and relays their events",
    version
)]
struct Cli {
    /// TCP port to listen on [default: 443].
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// IP address to bind to [default: 0.0.0.0].
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// TOML file with configuration overrides.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Label of the display role in event names, e.g. `tv` for
    /// `register-tv` / `tv-registered` [default: display].
    #[arg(long, env = "RELAY_DISPLAY_LABEL")]
    display_label: Option<String>,

    /// What a disconnect releases: `pairing` (both sides) or `role` (a
    /// leaving controller releases only itself) [default: pairing].
    #[arg(long, env = "RELAY_TEARDOWN")]
    teardown: Option<TeardownPolicy>,

    /// Capacity of each connection's outbound queue [default: 64].
    #[arg(long, env = "RELAY_OUTBOUND_BUFFER")]
    outbound_buffer: Option<usize>,

    /// Capacity of the broker's command queue [default: 1024].
    #[arg(long, env = "RELAY_COMMAND_BUFFER")]
    command_buffer: Option<usize>,

    /// Log filter used when `RUST_LOG` is not set [default: info].
    #[arg(long, env = "RELAY_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Overrides given on the command line or through the environment.
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            bind: self.bind.clone(),
            port: self.port,
            display_label: self.display_label.clone(),
            teardown_policy: self.teardown,
            outbound_buffer: self.outbound_buffer,
            command_buffer: self.command_buffer,
            log_level: self.log_level.clone(),
        }
    }

    /// Layers defaults, the optional config file and the CLI into a validated
    /// [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if any
    /// resulting value is invalid.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = RelayConfig::default();

        // The file layer goes first so flags and env vars override it.
        if let Some(path) = &self.config {
            let layer = load_config_layer(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?;
            config
                .apply(layer)
                .with_context(|| format!("invalid value in {}", path.display()))?;
        }

        config
            .apply(self.layer())
            .context("invalid command-line option")?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration errors surface before logging is set up, through the
    // `anyhow` report printed by `main`.
    let config = Cli::parse().into_relay_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "pairing relay starting: bind={}, label={}, teardown={}",
        config.bind_addr, config.display_label, config.teardown_policy
    );

    // Ctrl+C clears the flag; the accept loop notices it within one poll.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("pairing relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
