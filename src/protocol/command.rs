use super::{Envelope, ObjectId, Position, SoundKey};
use crate::error::ProtocolError;
use crate::ui::{FieldKind, Form, FormField, Menu, MenuItem, Reply, TextPrompt};
use serde_json::{Map, Value};

/// Everything the server can ask of the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Identify {
        id: ObjectId,
        position: Position,
        ambience: Option<SoundKey>,
        ambience_volume: f64,
        max_distance: Option<f64>,
    },
    Delete {
        id: ObjectId,
    },
    Zone {
        sound: Option<SoundKey>,
        rate: f64,
        volume: f64,
    },
    Location(Location),
    ObjectSound {
        id: ObjectId,
        sound: SoundKey,
    },
    RandomSound {
        sound: SoundKey,
        position: Position,
        volume: f64,
    },
    HiddenSound {
        sound: SoundKey,
        position: Position,
        dry: bool,
    },
    InterfaceSound {
        sound: SoundKey,
    },
    CharacterId {
        id: ObjectId,
    },
    Speak {
        id: ObjectId,
        data: String,
    },
    Options(PlayerOptions),
    Message {
        text: String,
        channel: Option<String>,
    },
    Url {
        title: String,
        href: String,
    },
    GetText(TextPrompt),
    Form(Form),
    Menu(Menu),
    Copy {
        text: String,
    },
    Convolver {
        sound: Option<SoundKey>,
        volume: f64,
    },
    RememberQuit,
    MuteMic {
        muted: bool,
    },
    ToggleRecording,
    StartRecording,
    StopRecording,
    CancelRecording,
    Unknown {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub ambience: Option<SoundKey>,
    pub ambience_volume: f64,
    pub music: Option<SoundKey>,
    pub max_distance: f64,
    pub reverb: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOptions {
    pub username: String,
    pub transmition_id: Option<i64>,
    pub recording_threshold: Option<f64>,
    pub sound_volume: f64,
    pub ambience_volume: f64,
    pub music_volume: f64,
}

impl Command {
    /// Maps a wire name and its positional arguments onto a variant.
    /// Names nobody knows about become `Unknown` rather than an error.
    pub fn decode(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let name = envelope.name.as_str();
        let command = match name {
            "identify" => {
                let a = Args::new("identify", &envelope.args);
                Command::Identify {
                    id: a.id(0)?,
                    position: a.position(1)?,
                    ambience: a.sound(4)?,
                    ambience_volume: a.f64_or(5, 1.0)?,
                    max_distance: a.opt_f64(6)?,
                }
            }
            "delete" => Command::Delete {
                id: Args::new("delete", &envelope.args).id(0)?,
            },
            "zone" => {
                let a = Args::new("zone", &envelope.args);
                Command::Zone {
                    sound: a.sound(0)?,
                    rate: a.f64_or(1, 1.0)?,
                    volume: a.f64_or(2, 1.0)?,
                }
            }
            "location" => {
                let a = Args::new("location", &envelope.args);
                Command::Location(Location {
                    name: a.string(0)?,
                    ambience: a.sound(1)?,
                    ambience_volume: a.f64_or(2, 1.0)?,
                    music: a.sound(3)?,
                    max_distance: a.f64_or(4, DEFAULT_MAX_DISTANCE)?,
                    reverb: a.object(5),
                })
            }
            "object_sound" => {
                let a = Args::new("object_sound", &envelope.args);
                Command::ObjectSound {
                    id: a.id(0)?,
                    sound: a.sound_pair(1)?,
                }
            }
            "random_sound" => {
                let a = Args::new("random_sound", &envelope.args);
                Command::RandomSound {
                    sound: a.sound_pair(0)?,
                    position: a.position(2)?,
                    volume: a.f64_or(5, 1.0)?,
                }
            }
            "hidden_sound" => {
                let a = Args::new("hidden_sound", &envelope.args);
                Command::HiddenSound {
                    sound: a.sound_pair(0)?,
                    position: a.position(2)?,
                    dry: a.bool_or(5, false),
                }
            }
            "interface_sound" => Command::InterfaceSound {
                sound: Args::new("interface_sound", &envelope.args).sound_pair(0)?,
            },
            "character_id" => Command::CharacterId {
                id: Args::new("character_id", &envelope.args).id(0)?,
            },
            "speak" => {
                let a = Args::new("speak", &envelope.args);
                Command::Speak {
                    id: a.id(0)?,
                    data: a.string(1)?,
                }
            }
            "options" => {
                let a = Args::new("options", &envelope.args);
                Command::Options(PlayerOptions {
                    username: a.string(0)?,
                    transmition_id: a.get(1).and_then(Value::as_i64),
                    recording_threshold: a.opt_f64(2)?,
                    sound_volume: a.f64_or(3, 1.0)?,
                    ambience_volume: a.f64_or(4, 1.0)?,
                    music_volume: a.f64_or(5, 1.0)?,
                })
            }
            "message" => {
                let a = Args::new("message", &envelope.args);
                Command::Message {
                    text: a.string(0)?,
                    channel: a.opt_string(1),
                }
            }
            "url" => {
                let a = Args::new("url", &envelope.args);
                Command::Url {
                    title: a.string(0)?,
                    href: a.string(1)?,
                }
            }
            "get_text" => Command::GetText(decode_text_prompt(&envelope.args)?),
            "form" => Command::Form(decode_form(&envelope.args)?),
            "menu" => Command::Menu(decode_menu(&envelope.args)?),
            "copy" => Command::Copy {
                text: Args::new("copy", &envelope.args).string(0)?,
            },
            "convolver" => {
                let a = Args::new("convolver", &envelope.args);
                Command::Convolver {
                    sound: a.sound(0)?,
                    volume: a.f64_or(1, 1.0)?,
                }
            }
            "remember_quit" => Command::RememberQuit,
            "mute_mic" => Command::MuteMic {
                muted: Args::new("mute_mic", &envelope.args).bool_or(0, true),
            },
            "toggle_recording" => Command::ToggleRecording,
            "start_recording" => Command::StartRecording,
            "stop_recording" => Command::StopRecording,
            "cancel_recording" => Command::CancelRecording,
            other => Command::Unknown {
                name: other.to_string(),
            },
        };
        Ok(command)
    }
}

/// Used when a location does not say how far sounds carry.
pub const DEFAULT_MAX_DISTANCE: f64 = 50.0;

/// Positional argument reader that names the command in its errors.
struct Args<'a> {
    command: &'static str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(command: &'static str, values: &'a [Value]) -> Self {
        Self { command, values }
    }

    fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    fn missing(&self, index: usize, what: &str) -> ProtocolError {
        ProtocolError::bad_args(self.command, format!("argument {} must be {}", index, what))
    }

    fn id(&self, index: usize) -> Result<ObjectId, ProtocolError> {
        self.get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.missing(index, "an integer id"))
    }

    fn f64(&self, index: usize) -> Result<f64, ProtocolError> {
        self.get(index)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.missing(index, "a number"))
    }

    fn opt_f64(&self, index: usize) -> Result<Option<f64>, ProtocolError> {
        match self.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.f64(index).map(Some),
        }
    }

    fn f64_or(&self, index: usize, default: f64) -> Result<f64, ProtocolError> {
        Ok(self.opt_f64(index)?.unwrap_or(default))
    }

    fn bool_or(&self, index: usize, default: bool) -> bool {
        self.get(index).and_then(Value::as_bool).unwrap_or(default)
    }

    fn string(&self, index: usize) -> Result<String, ProtocolError> {
        self.get(index)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.missing(index, "a string"))
    }

    fn opt_string(&self, index: usize) -> Option<String> {
        self.get(index).and_then(Value::as_str).map(str::to_string)
    }

    fn position(&self, first: usize) -> Result<Position, ProtocolError> {
        Ok(Position::new(
            self.f64_or(first, 0.0)?,
            self.f64_or(first + 1, 0.0)?,
            self.f64_or(first + 2, 0.0)?,
        ))
    }

    /// A `[path, checksum]` pair or `null`.
    fn sound(&self, index: usize) -> Result<Option<SoundKey>, ProtocolError> {
        match self.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|_| self.missing(index, "a [path, checksum] pair")),
        }
    }

    /// A path and checksum spread over two consecutive arguments.
    fn sound_pair(&self, first: usize) -> Result<SoundKey, ProtocolError> {
        Ok(SoundKey::new(self.string(first)?, self.string(first + 1)?))
    }

    fn array(&self, index: usize) -> Vec<Value> {
        match self.get(index) {
            Some(Value::Array(values)) => values.clone(),
            _ => Vec::new(),
        }
    }

    fn object(&self, index: usize) -> Map<String, Value> {
        match self.get(index) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    fn reply(&self, command: usize) -> Result<Reply, ProtocolError> {
        Ok(Reply {
            command: self.string(command)?,
            args: self.array(command + 1),
            kwargs: self.object(command + 2),
        })
    }
}

fn decode_text_prompt(values: &[Value]) -> Result<TextPrompt, ProtocolError> {
    let a = Args::new("get_text", values);
    Ok(TextPrompt {
        message: a.string(0)?,
        // The reply's arguments trail the prompt settings.
        reply: Reply {
            command: a.string(1)?,
            args: a.array(5),
            kwargs: a.object(6),
        },
        value: a.opt_string(2).unwrap_or_default(),
        multiline: a.bool_or(3, false),
        escapable: a.bool_or(4, true),
    })
}

fn decode_menu(values: &[Value]) -> Result<Menu, ProtocolError> {
    let a = Args::new("menu", values);
    let mut items = Vec::new();
    for entry in a.array(1) {
        let parts = match entry {
            Value::Array(parts) => parts,
            _ => return Err(ProtocolError::bad_args("menu", "items must be lists")),
        };
        let item = Args::new("menu", &parts);
        let action = match item.opt_string(1).filter(|command| !command.is_empty()) {
            Some(_) => Some(item.reply(1)?),
            None => None,
        };
        items.push(MenuItem {
            name: item.string(0)?,
            action,
        });
    }
    Ok(Menu {
        title: a.string(0)?,
        items,
        escapable: a.bool_or(2, false),
    })
}

fn decode_form(values: &[Value]) -> Result<Form, ProtocolError> {
    let a = Args::new("form", values);
    let mut fields = Vec::new();
    for entry in a.array(1) {
        let kind = entry.get("type").and_then(Value::as_str).unwrap_or_default();
        let parts = match entry.get("values") {
            Some(Value::Array(parts)) => parts.clone(),
            _ => return Err(ProtocolError::bad_args("form", "fields need values")),
        };
        let field = Args::new("form", &parts);
        if kind == "Label" {
            fields.push(FormField::Label(field.string(0)?));
            continue;
        }
        let name = field.string(0)?;
        let title = field.opt_string(3).unwrap_or_else(|| name.clone());
        fields.push(FormField::Input {
            kind: field_kind(field.get(2), field.bool_or(4, false)),
            value: field.get(1).cloned().unwrap_or(Value::Null),
            name,
            title,
        });
    }
    Ok(Form {
        title: a.string(0)?,
        fields,
        reply: a.reply(2)?,
        ok: a.opt_string(5).unwrap_or_else(|| "OK".to_string()),
        cancel: a.opt_string(6),
    })
}

fn field_kind(kind: Option<&Value>, hidden: bool) -> FieldKind {
    match kind {
        Some(Value::String(name)) => match name.as_str() {
            "text" => FieldKind::Text,
            "int" => FieldKind::Int,
            "float" => FieldKind::Float,
            _ => FieldKind::Line { hidden },
        },
        Some(Value::Array(options)) => FieldKind::Choice(
            options
                .iter()
                .map(|option| {
                    let label = value_label(option);
                    (label.clone(), label)
                })
                .collect(),
        ),
        Some(Value::Object(options)) => FieldKind::Choice(
            options
                .iter()
                .map(|(key, label)| (key.clone(), value_label(label)))
                .collect(),
        ),
        _ => FieldKind::Line { hidden },
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
