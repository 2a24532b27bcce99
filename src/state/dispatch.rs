use super::{Session, SoundWaiter};
use crate::audio::ambience::{AmbienceChange, AmbienceSlot};
use crate::audio::decode_sound;
use crate::audio::microphone::encode_transmission;
use crate::audio::sfx::{play_one_shot, Placement};
use crate::error::AudioError;
use crate::protocol::command::{Location, PlayerOptions};
use crate::protocol::{Command, ObjectId, OutboundCommand, Position, SoundKey};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

impl Session {
    /// Carries out one server command. Failures are reported to the user
    /// and never stop the session.
    pub fn dispatch(&mut self, command: Command) {
        match command {
            Command::Identify {
                id,
                position,
                ambience,
                ambience_volume,
                max_distance,
            } => self.identify(id, position, ambience, ambience_volume, max_distance),
            Command::Delete { id } => {
                self.identifying.remove(&id);
                if !self.objects.delete(&mut self.graph, id) {
                    log::debug!("[Session] Delete for unknown object #{}", id);
                }
            }
            Command::Zone {
                sound,
                rate,
                volume,
            } => self.update_ambience(AmbienceSlot::Zone, sound, volume, rate),
            Command::Location(location) => self.set_location(location),
            Command::ObjectSound { id, sound } => {
                if self.objects.contains(id) {
                    self.request_sound(sound, SoundWaiter::Object(id));
                } else {
                    self.identify_unknown(id);
                }
            }
            Command::RandomSound {
                sound,
                position,
                volume,
            } => {
                let placement = Placement::At {
                    position,
                    volume,
                    max_distance: self.location.max_distance,
                    dry: false,
                };
                self.request_sound(sound, SoundWaiter::Placed(placement));
            }
            Command::HiddenSound {
                sound,
                position,
                dry,
            } => {
                let placement = Placement::At {
                    position,
                    volume: 1.0,
                    max_distance: self.location.max_distance,
                    dry,
                };
                self.request_sound(sound, SoundWaiter::Placed(placement));
            }
            Command::InterfaceSound { sound } => {
                self.request_sound(sound, SoundWaiter::Placed(Placement::Interface));
            }
            Command::CharacterId { id } => {
                self.ui.write_message(&format!("Character: #{}.", id), None);
                if !self.objects.set_character(&mut self.graph, id) {
                    self.identify_unknown(id);
                }
            }
            Command::Speak { id, data } => self.speak(id, &data),
            Command::Options(options) => self.set_options(&options),
            Command::Message { text, channel } => self.ui.write_message(&text, channel.as_deref()),
            Command::Url { title, href } => self.ui.open_url(&title, &href),
            Command::GetText(prompt) => self.ui.get_text(prompt),
            Command::Form(form) => self.ui.show_form(form),
            Command::Menu(menu) => self.ui.show_menu(menu),
            Command::Copy { text } => self.ui.copy(&text),
            Command::Convolver { sound, volume } => {
                if let Some(ticket) = self.reverb.update(&mut self.graph, sound, volume) {
                    self.request_sound(ticket.key.clone(), SoundWaiter::Convolver(ticket));
                }
            }
            Command::RememberQuit => self.remember_quit = true,
            Command::MuteMic { muted } => {
                self.player.mic_muted = muted;
                if self.graph.has_microphone() {
                    if let Ok(microphone) = self.graph.microphone() {
                        microphone.set_muted(muted);
                    }
                }
            }
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
            Command::CancelRecording => {
                if self.graph.has_microphone() {
                    if let Ok(microphone) = self.graph.microphone() {
                        microphone.cancel();
                    }
                }
            }
            Command::ToggleRecording => {
                if self.is_recording() {
                    self.stop_recording();
                } else {
                    self.start_recording();
                }
            }
            Command::Unknown { name } => self.report(&format!("Unrecognised command: {}.", name)),
        }
    }

    fn identify(
        &mut self,
        id: ObjectId,
        position: Position,
        ambience: Option<SoundKey>,
        ambience_volume: f64,
        max_distance: Option<f64>,
    ) {
        self.identifying.remove(&id);
        let max_distance = max_distance.unwrap_or(self.location.max_distance);
        let object = self
            .objects
            .identify(&mut self.graph, id, position, max_distance);
        let change = object
            .ambience
            .update(&mut self.graph, ambience, ambience_volume, 1.0);
        if let AmbienceChange::Fetch(ticket) = change {
            let slot = AmbienceSlot::Object(id);
            self.request_sound(ticket.key.clone(), SoundWaiter::Ambience { slot, ticket });
        }
    }

    fn update_ambience(
        &mut self,
        slot: AmbienceSlot,
        sound: Option<SoundKey>,
        volume: f64,
        rate: f64,
    ) {
        let change = self
            .ambiences
            .update(&mut self.graph, slot, sound, volume, rate);
        if let AmbienceChange::Fetch(ticket) = change {
            self.request_sound(ticket.key.clone(), SoundWaiter::Ambience { slot, ticket });
        }
    }

    fn set_location(&mut self, location: Location) {
        log::info!("[Session] Entered {}", location.name);
        // Objects in the new room get a fresh chance to be identified.
        self.identifying.clear();
        self.ambiences.set_room_name(location.name);
        self.location.max_distance = location.max_distance;
        self.location.reverb = location.reverb;
        self.update_ambience(
            AmbienceSlot::Room,
            location.ambience,
            location.ambience_volume,
            1.0,
        );
        self.update_ambience(AmbienceSlot::Music, location.music, 1.0, 1.0);
    }

    fn set_options(&mut self, options: &PlayerOptions) {
        self.player.apply_options(options);
        self.graph.set_volumes(self.player.volumes);
        self.ui.set_title(Some(&options.username));
    }

    fn speak(&mut self, id: ObjectId, data: &str) {
        let panner = match self.objects.get(id) {
            Some(object) => object.panner,
            None => return self.identify_unknown(id),
        };
        let label = format!("speech from #{}", id);
        let buffer = STANDARD
            .decode(data.trim())
            .map_err(|e| format!("Unable to decode {}: {}", label, e))
            .and_then(|bytes| decode_sound(&label, bytes).map_err(|e| e.to_string()));
        let played = buffer.and_then(|buffer| {
            play_one_shot(&mut self.graph, &buffer, &label, Placement::Through(panner))
                .map_err(|e| e.to_string())
        });
        if let Err(text) = played {
            self.report(&text);
        }
    }

    fn is_recording(&mut self) -> bool {
        self.graph.has_microphone()
            && self
                .graph
                .microphone()
                .map(|microphone| microphone.is_recording())
                .unwrap_or(false)
    }

    fn start_recording(&mut self) {
        let muted = self.player.mic_muted;
        let started = self.graph.microphone().and_then(|microphone| {
            microphone.set_muted(muted);
            microphone.start()
        });
        match started {
            Ok(()) => log::debug!("[Audio] Recording started"),
            Err(e) => self.report(&e.to_string()),
        }
    }

    fn stop_recording(&mut self) {
        if !self.graph.has_microphone() {
            return;
        }
        let threshold = self.player.rms_threshold();
        let encoded: Result<Option<String>, AudioError> =
            self.graph.microphone().and_then(|microphone| match microphone.stop() {
                Some(capture) => encode_transmission(&capture, threshold),
                None => Ok(None),
            });
        match encoded {
            Ok(Some(data)) => self.send(OutboundCommand::transmit(data)),
            Ok(None) => log::debug!("[Audio] Nothing worth transmitting"),
            Err(e) => self.report(&e.to_string()),
        }
    }
}
