mod cli;
mod commands;

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

use connectify_common::{ConfigError, Event, EventBus};
use connectify_config::ConnectifyConfig;
use connectify_presence::{
    ChannelHost, PhoenixTransport, PresenceTracker, PresenceView, Session, TrackerConfig,
};

use commands::Command;

fn init_logging(directive: &str) {
    let directive = directive.parse::<Directive>().unwrap_or_else(|e| {
        eprintln!("Invalid log directive {directive:?} ({e}), using info");
        LevelFilter::INFO.into()
    });
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();
}

fn load_config(path: Option<&str>) -> Result<ConnectifyConfig, ConfigError> {
    match path {
        Some(path) => connectify_config::load_config_from(Path::new(path)),
        None => connectify_config::load_config(),
    }
}

fn print_who(view: &PresenceView) {
    let ids = view.online_user_ids();
    if ids.is_empty() {
        println!("nobody online");
        return;
    }
    for id in ids {
        println!("{id}\t{}", view.get_user_status(&id));
    }
}

/// Log bus events until shutdown.
async fn log_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event logger lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            Event::LocalStatusChanged { status } => tracing::info!(%status, "Local status"),
            Event::PresenceSynced { online } => tracing::info!(online, "Presence synced"),
            Event::PresenceJoined { session_id } => {
                tracing::info!(session_id = %session_id, "Presence session started")
            }
            Event::PresenceLeft => tracing::info!("Presence session ended"),
            Event::Shutdown => break,
            Event::Unknown => {}
        }
    }
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args = cli::parse();

    // Load config before logging so its level can seed the filter
    let loaded = load_config(args.config.as_deref());

    // Initialize logging
    let log_directive = match (&args.log_level, &loaded) {
        (Some(directive), _) => directive.clone(),
        (None, Ok(config)) => format!("connectify={}", config.logging.level.as_directive()),
        (None, Err(_)) => "connectify=info".to_string(),
    };
    init_logging(&log_directive);

    tracing::info!(
        "Connectify presence v{} starting...",
        env!("CARGO_PKG_VERSION")
    );
    if let Some(path) = &args.config {
        tracing::info!("Using config override: {path}");
    }

    // Apply CLI overrides
    let mut config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        ConnectifyConfig::default()
    });
    if let Some(endpoint) = &args.endpoint {
        config.realtime.endpoint = endpoint.clone();
    }
    if let Some(channel) = &args.channel {
        config.presence.channel = channel.clone();
    }
    tracing::info!(
        endpoint = %config.realtime.endpoint,
        channel = %config.presence.channel,
        "Config loaded"
    );
    if !config.presence.enabled {
        tracing::info!("Presence is disabled in config, exiting");
        return;
    }

    // Wire transport, host and tracker
    let bus = Arc::new(EventBus::new(64));
    let host = ChannelHost::new();
    let transport = Arc::new(PhoenixTransport::from(&config.realtime));
    let tracker = PresenceTracker::new(
        TrackerConfig::from(&config.presence),
        transport,
        host.clone(),
    )
    .with_event_bus(Arc::clone(&bus));
    let view = tracker.view();

    let initial = match &args.token {
        Some(token) => Session::authenticated(token.clone()),
        None => {
            tracing::info!("No token given, waiting for `login <token>`");
            Session::signed_out()
        }
    };
    let (session_tx, session_rx) = watch::channel(initial);

    let logger = tokio::spawn(log_events(bus.subscribe()));
    let driver = tokio::spawn(async move {
        let mut tracker = tracker;
        tracker.run_session(session_rx).await;
    });

    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Ok(Command::Signal(signal)) => {
                let delivered = host.emit(signal);
                tracing::debug!(?signal, delivered, "Signal emitted");
            }
            Ok(Command::Status(user_id)) => {
                println!("{user_id}\t{}", view.get_user_status(&user_id));
            }
            Ok(Command::Who) => print_who(&view),
            Ok(Command::Login(token)) => {
                session_tx.send_replace(Session::authenticated(token));
            }
            Ok(Command::Logout) => {
                session_tx.send_replace(Session::signed_out());
            }
            Ok(Command::Quit) => break,
            Err(e) => {
                println!("{e}");
                println!("{}", commands::HELP);
            }
        }
    }

    // Dropping the session sender makes the tracker tear down.
    drop(session_tx);
    if let Err(e) = driver.await {
        tracing::error!("Presence driver failed: {e}");
    }
    bus.publish(Event::Shutdown);
    let _ = logger.await;
    tracing::info!("Shutdown complete");
}
