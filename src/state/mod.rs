use crate::audio::ambience::{AmbienceController, AmbienceSlot, Ticket};
use crate::audio::backend::AudioBackend;
use crate::audio::reverb::Reverb;
use crate::audio::sfx::{play_one_shot, Placement};
use crate::audio::{AudioGraph, Output, SoundBuffer, DEFAULT_MAX_DISTANCE};
use crate::asset_loader::{Lookup, SoundCache};
use crate::error::{ProtocolError, SoundError, StaleUpdate};
use crate::input_handler::KeyPress;
use crate::protocol::{Command, Envelope, ObjectId, OutboundCommand, SoundKey};
use crate::ui::{Interface, KeyOutcome};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use uuid::Uuid;

use self::objects::SpatialObjectTable;
use self::player::Player;

/// How long an unanswered identify request holds back repeats.
pub const IDENTIFY_RETRY: Duration = Duration::from_secs(5);

mod dispatch;
pub mod objects;
pub mod player;

/// Everything that can wake a session up. All of it arrives through one
/// channel and is handled in order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A text frame from the server.
    Frame(String),
    SoundLoaded {
        key: SoundKey,
        result: Result<SoundBuffer, SoundError>,
    },
    Key(KeyPress),
    Closed {
        clean: bool,
        reason: Option<String>,
    },
}

/// What is waiting on a sound fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundWaiter {
    Ambience { slot: AmbienceSlot, ticket: Ticket },
    /// A one-shot from an object; dropped if the object is gone by then.
    Object(ObjectId),
    Placed(Placement),
    Convolver(Ticket),
}

/// Senders the session talks to the outside through.
#[derive(Debug, Clone)]
pub struct SessionChannels {
    pub outbox: UnboundedSender<OutboundCommand>,
    pub fetches: UnboundedSender<SoundKey>,
}

/// Where the player is: what the last `location` said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSettings {
    pub max_distance: f64,
    pub reverb: Map<String, Value>,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            reverb: Map::new(),
        }
    }
}

/// Per-connection state. Built when the socket opens and thrown away when
/// it closes; nothing in here survives a reconnect.
pub struct Session {
    id: Uuid,
    player: Player,
    objects: SpatialObjectTable,
    ambiences: AmbienceController,
    reverb: Reverb,
    sounds: SoundCache<SoundWaiter>,
    graph: AudioGraph,
    ui: Box<dyn Interface>,
    channels: SessionChannels,
    location: LocationSettings,
    /// Ids we have asked the server to identify and not heard back about,
    /// with when we last asked.
    identifying: HashMap<ObjectId, Instant>,
    remember_quit: bool,
    quit_requested: bool,
}

impl Session {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        ui: Box<dyn Interface>,
        channels: SessionChannels,
    ) -> Self {
        let id = Uuid::new_v4();
        log::info!("[Session] Started session {}", id);
        Self {
            id,
            player: Player::new(),
            objects: SpatialObjectTable::new(),
            ambiences: AmbienceController::new(),
            reverb: Reverb::new(),
            sounds: SoundCache::new(),
            graph: AudioGraph::new(backend),
            ui,
            channels,
            location: LocationSettings::default(),
            identifying: HashMap::new(),
            remember_quit: false,
            quit_requested: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn objects(&self) -> &SpatialObjectTable {
        &self.objects
    }

    pub fn ambiences(&self) -> &AmbienceController {
        &self.ambiences
    }

    pub fn reverb(&self) -> &Reverb {
        &self.reverb
    }

    pub fn sounds(&self) -> &SoundCache<SoundWaiter> {
        &self.sounds
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn location(&self) -> &LocationSettings {
        &self.location
    }

    /// False once the server or the user has said this close is final.
    pub fn should_reconnect(&self) -> bool {
        !(self.remember_quit || self.quit_requested)
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn send(&self, command: OutboundCommand) {
        log::debug!("[Session] -> {}", command.name);
        if self.channels.outbox.send(command).is_err() {
            log::warn!("[Session] Connection is gone; command dropped");
        }
    }

    /// Called once the socket is up.
    pub fn on_open(&mut self, username: &str, password: &str) {
        self.ui.write_special("Connected");
        self.send(OutboundCommand::login(username, password));
    }

    /// Returns false when the event ends the session.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Frame(text) => self.handle_frame(&text),
            SessionEvent::SoundLoaded { key, result } => self.on_sound_loaded(&key, result),
            SessionEvent::Key(press) => self.handle_key(&press),
            SessionEvent::Closed { clean, reason } => {
                self.on_close(clean, reason.as_deref());
                return false;
            }
        }
        self.graph.maintain();
        true
    }

    pub fn handle_frame(&mut self, text: &str) {
        let command = Envelope::parse(text)
            .map_err(ProtocolError::from)
            .and_then(|envelope| Command::decode(&envelope));
        match command {
            Ok(command) => self.dispatch(command),
            Err(e) => self.report(&e.to_string()),
        }
    }

    pub fn handle_key(&mut self, press: &KeyPress) {
        if press.is_quit() {
            self.quit();
            return;
        }
        match self.ui.handle_key(press) {
            KeyOutcome::Ignored => self.send(OutboundCommand::key(&press.key, &press.modifiers)),
            KeyOutcome::Consumed => {}
            KeyOutcome::Answered(command) => self.send(command),
        }
    }

    /// Tells the server we are leaving; the close that follows is final.
    pub fn quit(&mut self) {
        self.quit_requested = true;
        self.send(OutboundCommand::quit());
    }

    fn on_close(&mut self, clean: bool, reason: Option<&str>) {
        let mut text = if clean {
            "Connection closed cleanly".to_string()
        } else {
            "Connection lost".to_string()
        };
        if let Some(reason) = reason.filter(|reason| !reason.is_empty()) {
            text = format!("{}: {}", text, reason);
        }
        self.ui.write_special(&text);
    }

    /// Shown to the user and logged; never fatal.
    fn report(&mut self, text: &str) {
        log::warn!("[Session] {}", text);
        self.ui.write_message(text, None);
    }

    /// Gets `key` to `waiter`, now if it is cached, otherwise once the
    /// loader reports back. Identical requests share one fetch.
    pub fn request_sound(&mut self, key: SoundKey, waiter: SoundWaiter) {
        match self.sounds.request(&key, waiter) {
            Lookup::Ready(buffer, waiter) => self.deliver(&key, &buffer, waiter),
            Lookup::Pending { first: true } => {
                log::debug!("[Loader] Fetching {}", key);
                if self.channels.fetches.send(key).is_err() {
                    log::warn!("[Loader] Sound loader has stopped");
                }
            }
            Lookup::Pending { first: false } => {}
        }
    }

    pub fn on_sound_loaded(&mut self, key: &SoundKey, result: Result<SoundBuffer, SoundError>) {
        let (result, waiters) = self.sounds.complete(key, result);
        match result {
            Ok(buffer) => {
                for waiter in waiters {
                    self.deliver(key, &buffer, waiter);
                }
            }
            Err(e) => {
                self.report(&e.to_string());
                for waiter in waiters {
                    self.abandon(waiter);
                }
            }
        }
    }

    fn deliver(&mut self, key: &SoundKey, buffer: &SoundBuffer, waiter: SoundWaiter) {
        let played = match waiter {
            SoundWaiter::Ambience { slot, ticket } => {
                if let Err(stale) = self.commit_ambience(slot, &ticket, buffer) {
                    log::debug!("[Session] {}", stale);
                }
                return;
            }
            SoundWaiter::Convolver(ticket) => {
                if let Err(stale) = self.reverb.commit(&mut self.graph, &ticket, buffer) {
                    log::debug!("[Session] {}", stale);
                }
                return;
            }
            SoundWaiter::Object(id) => match self.objects.get(id) {
                Some(object) => {
                    play_one_shot(&mut self.graph, buffer, &key.path, Placement::Through(object.panner))
                }
                None => {
                    log::debug!("[Session] #{} went away before {} loaded", id, key);
                    return;
                }
            },
            SoundWaiter::Placed(placement) => {
                play_one_shot(&mut self.graph, buffer, &key.path, placement)
            }
        };
        if let Err(e) = played {
            log::warn!("[Audio] Could not play {}: {}", key, e);
        }
    }

    fn commit_ambience(
        &mut self,
        slot: AmbienceSlot,
        ticket: &Ticket,
        buffer: &SoundBuffer,
    ) -> Result<(), StaleUpdate> {
        match slot {
            AmbienceSlot::Object(id) => match self.objects.get_mut(id) {
                Some(object) => {
                    let output = Output::Node(object.panner);
                    object.ambience.commit(&mut self.graph, ticket, buffer, output)
                }
                None => Err(StaleUpdate(ticket.key.to_string())),
            },
            slot => {
                let output = AmbienceController::output(&mut self.graph, slot);
                match self.ambiences.get_mut(slot) {
                    Some(ambience) => ambience.commit(&mut self.graph, ticket, buffer, output),
                    None => Err(StaleUpdate(ticket.key.to_string())),
                }
            }
        }
    }

    fn abandon(&mut self, waiter: SoundWaiter) {
        match waiter {
            SoundWaiter::Ambience {
                slot: AmbienceSlot::Object(id),
                ticket,
            } => {
                if let Some(object) = self.objects.get_mut(id) {
                    object.ambience.abandon(&ticket);
                }
            }
            SoundWaiter::Ambience { slot, ticket } => {
                if let Some(ambience) = self.ambiences.get_mut(slot) {
                    ambience.abandon(&ticket);
                }
            }
            SoundWaiter::Convolver(ticket) => self.reverb.abandon(&ticket),
            SoundWaiter::Object(_) | SoundWaiter::Placed(_) => {}
        }
    }

    /// Periodic upkeep between events.
    pub fn maintain(&mut self) {
        self.graph.maintain();
    }

    /// Asks the server about an object we have not seen. Repeats are held
    /// back until the server answers or [`IDENTIFY_RETRY`] passes.
    fn identify_unknown(&mut self, id: ObjectId) {
        let now = Instant::now();
        if let Some(asked) = self.identifying.get(&id) {
            if now.duration_since(*asked) < IDENTIFY_RETRY {
                return;
            }
        }
        self.identifying.insert(id, now);
        self.send(OutboundCommand::identify(id));
    }

    /// Releases the session's audio and hands back what the next session
    /// can reuse.
    pub fn into_parts(mut self) -> (Box<dyn AudioBackend>, Box<dyn Interface>) {
        self.release_audio();
        log::info!("[Session] Ended session {}", self.id);
        (self.graph.shutdown(), self.ui)
    }

    fn release_audio(&mut self) {
        self.objects.release_all(&mut self.graph);
        self.ambiences.release(&mut self.graph);
        self.reverb.release(&mut self.graph);
    }
}
