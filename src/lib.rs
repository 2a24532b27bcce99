// Asset loader module for downloading and caching server sounds
#[path = "assetLoader/mod.rs"]
pub mod asset_loader;

// Input handler module for terminal key presses
#[path = "inputHandler/mod.rs"]
pub mod input_handler;

// Session state and command dispatch
pub mod state;

// Audio module
pub mod audio;

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod ui;

use anyhow::Context;
use audio::backend::AudioBackend;
use audio::headless::HeadlessBackend;
use audio::rodio_backend::RodioBackend;
use clap::Parser;
use config::{Cli, ClientConfig, Preferences};
use crossterm::terminal;
use input_handler::KeyPress;
use state::{Session, SessionChannels, SessionEvent};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use transport::ConnectionConfig;
use ui::{ConsoleInterface, Interface, TranscriptInterface};

/// How often finished one-shots are swept up between events.
const MAINTENANCE_INTERVAL: Duration = Duration::from_millis(250);

/// Restores the terminal however the client exits.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("Failed to put the terminal in raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            log::error!("[Session] Failed to restore terminal: {}", e);
        }
    }
}

fn open_backend(headless: bool) -> Box<dyn AudioBackend> {
    if headless {
        return Box::new(HeadlessBackend::new());
    }
    match RodioBackend::new() {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            log::warn!("[Audio] {}; continuing without sound", e);
            Box::new(HeadlessBackend::new())
        }
    }
}

async fn next_key(keys: &mut Option<UnboundedReceiver<KeyPress>>) -> Option<KeyPress> {
    match keys {
        Some(keys) => keys.recv().await,
        None => std::future::pending().await,
    }
}

/// Feeds one connection's events to its session until the connection ends.
async fn run_session(
    session: &mut Session,
    events: &mut UnboundedReceiver<SessionEvent>,
    keys: &mut Option<UnboundedReceiver<KeyPress>>,
) {
    let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !session.handle_event(event) {
                        break;
                    }
                }
                None => break,
            },
            key = next_key(keys) => match key {
                Some(press) => {
                    session.handle_event(SessionEvent::Key(press));
                }
                None => *keys = None,
            },
            _ = maintenance.tick() => session.maintain(),
        }
    }
}

/// Waits out the reconnect delay. Returns false if the user quit meanwhile.
async fn wait_to_reconnect(
    delay: Duration,
    keys: &mut Option<UnboundedReceiver<KeyPress>>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            key = next_key(keys) => match key {
                Some(press) if press.is_quit() => return false,
                Some(_) => {}
                None => *keys = None,
            },
        }
    }
}

async fn client_loop(config: ClientConfig) -> anyhow::Result<()> {
    let mut backend = open_backend(config.headless);
    let mut ui: Box<dyn Interface> = if config.headless {
        Box::new(TranscriptInterface::new())
    } else {
        Box::new(ConsoleInterface::stdout())
    };
    let mut keys = if config.headless {
        None
    } else {
        Some(input_handler::spawn_key_reader())
    };
    let connection =
        ConnectionConfig::new(config.websocket_url()).with_reconnect(config.reconnect);
    ui.set_title(None);

    loop {
        let (inbox, mut events) = unbounded_channel();
        let (outbox, outbound) = unbounded_channel();
        let (fetches, requests) = unbounded_channel();

        ui.write_special(&format!("Connecting to {}", connection.url));
        let pump = match transport::connect(&connection, inbox.clone(), outbound).await {
            Ok(pump) => pump,
            Err(e) => {
                log::error!("[Transport] {}", e);
                ui.write_message(&e.to_string(), None);
                if !connection.auto_reconnect {
                    return Err(e.into());
                }
                if !wait_to_reconnect(connection.reconnect_delay, &mut keys).await {
                    return Ok(());
                }
                continue;
            }
        };

        let loader = asset_loader::SoundLoader::new(
            config.sound_base_url(),
            config.sound_cache.clone(),
            inbox,
        );
        let loader_task = tokio::spawn(loader.run(requests));

        let mut session = Session::new(backend, ui, SessionChannels { outbox, fetches });
        session.on_open(&config.username, &config.password);
        run_session(&mut session, &mut events, &mut keys).await;

        let reconnect = session.should_reconnect() && connection.auto_reconnect;
        (backend, ui) = session.into_parts();
        loader_task.abort();
        pump.abort();

        if !reconnect {
            return Ok(());
        }
        ui.write_special("Reconnecting");
        if !wait_to_reconnect(connection.reconnect_delay, &mut keys).await {
            return Ok(());
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let prefs_path = cli.prefs.clone().or_else(Preferences::default_path);
    let prefs = match &prefs_path {
        Some(path) => Preferences::load(path)?,
        None => Preferences::default(),
    };
    let config = ClientConfig::resolve(&cli, &prefs)?;
    if let Some(path) = &prefs_path {
        if let Err(e) = config.preferences().save(path) {
            log::warn!("[Session] {}", e);
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let _raw_mode = if config.headless {
        None
    } else {
        Some(RawModeGuard::enable()?)
    };
    runtime.block_on(client_loop(config))
}
