use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Device identifier, as configured by the host
pub type DeviceId = String;

/// Effective state of the device as seen by a media player host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Off,
    On,
    Playing,
    Paused,
}

impl PlayerState {
    pub fn is_on(&self) -> bool {
        !matches!(self, PlayerState::Off)
    }
}

/// Externally visible attributes tracked for change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    State,
    Volume,
    Muted,
    Source,
    SourceList,
    SoundMode,
    SoundModeList,
    MediaTitle,
    MediaArtist,
    MediaPosition,
    MediaDuration,
    MediaImageUrl,
}

/// New value of a changed attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    State(PlayerState),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(Option<String>),
    List(Vec<String>),
}

/// Attribute name → new value, for every attribute that changed
pub type Changeset = BTreeMap<Attribute, AttributeValue>;

/// Outcome of a facade operation, reported to the host instead of raw errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum CommandStatus {
    Ok,
    BadRequest,
}

impl CommandStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandStatus::Ok)
    }
}

/// Simple commands a remote can send, toggling a feature or stepping the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundbarCommand {
    InputNext,
    NightMode,
    AutoVolumeControl,
    DynamicRangeCompression,
    NeuralX,
    TvRemote,
    AutoDisplay,
}

impl SoundbarCommand {
    pub const ALL: [SoundbarCommand; 7] = [
        SoundbarCommand::InputNext,
        SoundbarCommand::NightMode,
        SoundbarCommand::AutoVolumeControl,
        SoundbarCommand::DynamicRangeCompression,
        SoundbarCommand::NeuralX,
        SoundbarCommand::TvRemote,
        SoundbarCommand::AutoDisplay,
    ];

    /// Identifier used by the remote-control host
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundbarCommand::InputNext => "INPUT_NEXT",
            SoundbarCommand::NightMode => "MODE_NIGHT",
            SoundbarCommand::AutoVolumeControl => "MODE_AUTO_VOLUME_CONTROL",
            SoundbarCommand::DynamicRangeCompression => "MODE_DYNAMIC_RANGE_COMPRESSION",
            SoundbarCommand::NeuralX => "MODE_NEURALX",
            SoundbarCommand::TvRemote => "MODE_TV_REMOTE",
            SoundbarCommand::AutoDisplay => "MODE_AUTO_DISPLAY",
        }
    }
}

impl fmt::Display for SoundbarCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundbarCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoundbarCommand::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| format!("Unknown command: {}", s))
    }
}
