use mindspace_lib::audio::ambience::AmbienceSlot;
use mindspace_lib::audio::backend::SourceId;
use mindspace_lib::audio::headless::{HeadlessBackend, VoiceEvent, VoiceLog};
use mindspace_lib::audio::SoundBuffer;
use mindspace_lib::protocol::{OutboundCommand, Position, SoundKey};
use mindspace_lib::state::{Session, SessionChannels, SessionEvent};
use mindspace_lib::ui::transcript::Transcript;
use mindspace_lib::ui::TranscriptInterface;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

struct Client {
    session: Session,
    outbox: UnboundedReceiver<OutboundCommand>,
    fetches: UnboundedReceiver<SoundKey>,
    voices: VoiceLog,
    transcript: Rc<RefCell<Transcript>>,
}

impl Client {
    fn connect() -> Self {
        let backend = HeadlessBackend::new();
        let voices = backend.log();
        let ui = TranscriptInterface::new();
        let transcript = ui.transcript();
        let (outbox, outbox_rx) = unbounded_channel();
        let (fetches, fetches_rx) = unbounded_channel();
        let mut session = Session::new(
            Box::new(backend),
            Box::new(ui),
            SessionChannels { outbox, fetches },
        );
        session.on_open("bob", "secret");
        Self {
            session,
            outbox: outbox_rx,
            fetches: fetches_rx,
            voices,
            transcript,
        }
    }

    fn receive(&mut self, name: &str, args: Value) {
        let frame = json!({"name": name, "args": args}).to_string();
        assert!(self.session.handle_event(SessionEvent::Frame(frame)));
    }

    fn load(&mut self, key: &SoundKey, samples: usize) {
        self.session.handle_event(SessionEvent::SoundLoaded {
            key: key.clone(),
            result: Ok(SoundBuffer::new(1, 8000, vec![0.2; samples])),
        });
    }

    fn sent(&mut self) -> Vec<OutboundCommand> {
        let mut sent = Vec::new();
        while let Ok(command) = self.outbox.try_recv() {
            sent.push(command);
        }
        sent
    }

    fn fetched(&mut self) -> Vec<SoundKey> {
        let mut fetched = Vec::new();
        while let Ok(key) = self.fetches.try_recv() {
            fetched.push(key);
        }
        fetched
    }

    fn started(&self) -> Vec<(SourceId, usize, bool)> {
        self.voices
            .borrow()
            .iter()
            .filter_map(|event| match event {
                VoiceEvent::Started {
                    source,
                    samples,
                    looped,
                    ..
                } => Some((*source, *samples, *looped)),
                _ => None,
            })
            .collect()
    }

    fn stopped(&self) -> Vec<SourceId> {
        self.voices
            .borrow()
            .iter()
            .filter_map(|event| match event {
                VoiceEvent::Stopped(source) => Some(*source),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn login_is_sent_on_open() {
    let mut client = Client::connect();
    assert_eq!(client.sent(), vec![OutboundCommand::login("bob", "secret")]);
}

#[test]
fn identify_then_ambience_then_delete() {
    let mut client = Client::connect();
    client.sent();

    client.receive("identify", json!([1, 1, 0, 0, null, 1.0]));
    let object = client.session.objects().get(1).unwrap();
    assert_eq!(object.position, Position::new(1.0, 0.0, 0.0));
    assert!(!object.ambience.is_playing());
    let panner = object.panner;
    assert!(client.fetched().is_empty());

    let key = SoundKey::new("a.ogg", "abc");
    client.receive("identify", json!([1, 1, 0, 0, ["a.ogg", "abc"], 0.5]));
    assert_eq!(client.fetched(), vec![key.clone()]);
    client.load(&key, 100);

    let object = client.session.objects().get(1).unwrap();
    assert!(object.ambience.is_playing());
    assert_eq!(object.panner, panner);
    let gain = object.ambience.gain().unwrap();
    let model = client.session.graph().model();
    assert_eq!(model.node(gain).unwrap().gain, 0.5);
    assert_eq!(model.node(gain).unwrap().outputs, vec![panner]);
    let started = client.started();
    assert_eq!(started.len(), 1);
    let (source, samples, looped) = started[0];
    assert_eq!(samples, 100);
    assert!(looped);

    client.receive("delete", json!([1]));
    assert!(!client.session.objects().contains(1));
    assert_eq!(client.stopped(), vec![source]);
    assert!(!client.session.graph().model().contains(panner));
    assert!(!client.session.graph().model().contains(gain));
    assert!(client.sent().is_empty());
}

#[test]
fn deleting_twice_changes_nothing() {
    let mut client = Client::connect();
    client.receive("identify", json!([4, 0, 0, 0, null, 1.0]));
    client.receive("delete", json!([4]));
    let nodes = client.session.graph().model().node_count();
    client.receive("delete", json!([4]));
    client.receive("delete", json!([12345]));
    assert_eq!(client.session.graph().model().node_count(), nodes);
    assert!(client.session.objects().is_empty());
    assert!(client.transcript.borrow().messages.is_empty());
}

#[test]
fn sound_for_unknown_object_asks_server() {
    let mut client = Client::connect();
    client.sent();
    client.receive("object_sound", json!([42, "door.wav", "d"]));
    assert_eq!(client.sent(), vec![OutboundCommand::identify(42)]);
    assert!(client.fetched().is_empty());
    assert!(client.started().is_empty());
}

#[test]
fn object_sound_plays_through_its_panner() {
    let mut client = Client::connect();
    client.receive("identify", json!([3, 2, 0, 0, null, 1.0]));
    client.receive("object_sound", json!([3, "door.wav", "d"]));
    let key = SoundKey::new("door.wav", "d");
    assert_eq!(client.fetched(), vec![key.clone()]);
    client.load(&key, 10);
    let started = client.started();
    assert_eq!(started.len(), 1);
    assert!(!started[0].2);
}

#[test]
fn identical_requests_share_one_fetch() {
    let mut client = Client::connect();
    client.receive("interface_sound", json!(["click.wav", "c"]));
    client.receive("interface_sound", json!(["click.wav", "c"]));
    let key = SoundKey::new("click.wav", "c");
    assert_eq!(client.fetched(), vec![key.clone()]);

    client.load(&key, 16);
    let started = client.started();
    assert_eq!(started.len(), 2);
    assert!(started.iter().all(|(_, samples, _)| *samples == 16));

    // Cached now: no further fetch.
    client.receive("interface_sound", json!(["click.wav", "c"]));
    assert!(client.fetched().is_empty());
    assert_eq!(client.started().len(), 3);
}

#[test]
fn new_checksum_fetches_again() {
    let mut client = Client::connect();
    client.receive("interface_sound", json!(["click.wav", "v1"]));
    client.load(&SoundKey::new("click.wav", "v1"), 4);
    client.receive("interface_sound", json!(["click.wav", "v2"]));
    assert_eq!(client.fetched(), vec![
        SoundKey::new("click.wav", "v1"),
        SoundKey::new("click.wav", "v2"),
    ]);
}

#[test]
fn freshest_zone_ambience_wins() {
    let mut client = Client::connect();
    let older = SoundKey::new("zones/rain.ogg", "1");
    let newer = SoundKey::new("zones/wind.ogg", "2");
    client.receive("zone", json!([["zones/rain.ogg", "1"], 1.0, 0.8]));
    client.receive("zone", json!([["zones/wind.ogg", "2"], 1.0, 0.8]));
    assert_eq!(client.fetched(), vec![older.clone(), newer.clone()]);

    // The newer fetch lands first, the older one afterwards.
    client.load(&newer, 20);
    client.load(&older, 10);

    let zone = client.session.ambiences().get(AmbienceSlot::Zone).unwrap();
    assert_eq!(zone.sound(), Some(&newer));
    let source = zone.source().unwrap();
    let voice = client.session.graph().model().voice(source).unwrap();
    assert_eq!(voice.label, "zones/wind.ogg");
    assert_eq!(client.started(), vec![(source, 20, true)]);
}

#[test]
fn ambience_for_deleted_object_never_starts() {
    let mut client = Client::connect();
    let key = SoundKey::new("hum.ogg", "h");
    client.receive("identify", json!([5, 0, 0, 0, ["hum.ogg", "h"], 1.0]));
    client.receive("delete", json!([5]));
    client.load(&key, 10);
    assert!(client.started().is_empty());
}

#[test]
fn quitting_ends_reconnects() {
    let mut client = Client::connect();
    client.sent();
    client.session.quit();
    assert_eq!(client.sent(), vec![OutboundCommand::quit()]);
    assert!(!client.session.should_reconnect());
    assert!(!client.session.handle_event(SessionEvent::Closed {
        clean: true,
        reason: None,
    }));
}

#[test]
fn ending_a_session_silences_everything() {
    let mut client = Client::connect();
    client.receive("identify", json!([1, 1, 0, 0, ["hum.ogg", "h"], 1.0]));
    client.receive("zone", json!([["zones/rain.ogg", "z"], 1.0, 0.5]));
    for key in client.fetched() {
        client.load(&key, 50);
    }
    assert_eq!(client.started().len(), 2);

    let Client { session, voices, .. } = client;
    let (backend, _ui) = session.into_parts();
    let backend = backend.as_any().downcast_ref::<HeadlessBackend>().unwrap();
    assert_eq!(backend.active(), 0);
    let stopped = voices
        .borrow()
        .iter()
        .filter(|event| matches!(event, VoiceEvent::Stopped(_)))
        .count();
    assert_eq!(stopped, 2);
}
