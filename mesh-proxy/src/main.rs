//! MeshCore companion radio TCP proxy
//!
//! Bridges one companion radio (serial or BLE) to any number of TCP clients.
//! Clients connect to the listen port and speak the framed companion
//! protocol exactly as they would over the serial port; the proxy arbitrates
//! access, keeps the radio link alive across outages, and optionally logs
//! the traffic it observes.

use anyhow::Context;
use clap::Parser;
use mesh_mux::{
    connect_ble, run_mux_actor, run_proxy_server, run_reconnect_supervisor, EventLogLevel,
    EventLogger, MuxCommand, MuxConfig, ReconnectPolicy, TransportConfig, TransportLink,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mesh-proxy", version, about)]
struct Cli {
    /// Serial port of the companion radio, e.g. /dev/ttyUSB0
    #[arg(long, value_name = "PORT", required_unless_present = "ble", conflicts_with = "ble")]
    serial: Option<String>,

    /// Connect over BLE, optionally to a specific device address
    #[arg(long, value_name = "ADDRESS", num_args = 0..=1, default_missing_value = "")]
    ble: Option<String>,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Serial baud rate
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// BLE pairing PIN
    #[arg(long, default_value = "123456")]
    ble_pin: String,

    /// Log no traffic at all
    #[arg(long, conflicts_with_all = ["log_events", "log_events_verbose"])]
    quiet: bool,

    /// Log one summary line per observed frame
    #[arg(long, conflicts_with = "log_events_verbose")]
    log_events: bool,

    /// Log frame summaries plus payload hex dumps
    #[arg(long)]
    log_events_verbose: bool,

    /// Emit traffic logs as JSON records
    #[arg(long)]
    json: bool,

    /// Enable debug-level diagnostics
    #[arg(long)]
    debug: bool,

    /// Give up after this many consecutive failed connection attempts
    /// (retries forever by default)
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,
}

impl Cli {
    fn event_log_level(&self) -> EventLogLevel {
        if self.quiet {
            EventLogLevel::Off
        } else if self.log_events_verbose {
            EventLogLevel::Verbose
        } else if self.log_events {
            EventLogLevel::Summary
        } else {
            EventLogLevel::Off
        }
    }

    fn transport(&self) -> TransportConfig {
        if let Some(port) = &self.serial {
            TransportConfig::Serial {
                port: port.clone(),
                baud: self.baud,
            }
        } else {
            let address = self
                .ble
                .as_deref()
                .filter(|a| !a.is_empty())
                .map(str::to_string);
            TransportConfig::Ble {
                address,
                pin: self.ble_pin.clone(),
            }
        }
    }
}

fn diagnostic_default(quiet: bool, debug: bool) -> &'static str {
    if quiet {
        "error"
    } else if debug {
        "debug"
    } else {
        "info"
    }
}

fn init_tracing(quiet: bool, debug: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(diagnostic_default(quiet, debug)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.debug);

    let logger = EventLogger::new(cli.event_log_level(), cli.json);
    let config = MuxConfig::default();
    let policy = ReconnectPolicy {
        max_retries: cli.max_retries,
        ..ReconnectPolicy::default()
    };

    let (mux_tx, mux_rx) = mpsc::channel(256);
    let actor = tokio::spawn(run_mux_actor(mux_rx, logger, config.clone()));

    let listener = TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;
    let server = tokio::spawn(run_proxy_server(listener, mux_tx.clone()));

    let write_queue = config.write_queue;
    let mut supervisor = match cli.transport() {
        TransportConfig::Serial { port, baud } => {
            info!("radio transport: serial {port} @ {baud}");
            let mux_tx = mux_tx.clone();
            tokio::spawn(async move {
                run_reconnect_supervisor(
                    || {
                        let port = port.clone();
                        async move { TransportLink::open_serial(&port, baud).await }
                    },
                    policy,
                    write_queue,
                    mux_tx,
                )
                .await
            })
        }
        TransportConfig::Ble { address, pin } => {
            match &address {
                Some(addr) => info!("radio transport: ble {addr}"),
                None => info!("radio transport: ble (scanning)"),
            }
            let mux_tx = mux_tx.clone();
            tokio::spawn(async move {
                run_reconnect_supervisor(
                    || {
                        let address = address.clone();
                        let pin = pin.clone();
                        async move { connect_ble(address.as_deref(), &pin).await }
                    },
                    policy,
                    write_queue,
                    mux_tx,
                )
                .await
            })
        }
    };

    let failure = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            supervisor.abort();
            None
        }
        result = &mut supervisor => match result {
            Ok(Err(e)) => Some(e),
            _ => None,
        },
    };

    server.abort();
    let _ = mux_tx.send(MuxCommand::Shutdown).await;
    let _ = actor.await;

    match failure {
        Some(e) => {
            error!("radio link supervision ended: {e}");
            Err(e.into())
        }
        None => Ok(()),
    }
}
