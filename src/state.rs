//! Device state model.
//!
//! [`DeviceState`] holds the raw values reported by the soundbar. Responses are
//! partial: only fields present in a payload are merged. After each merge the
//! derived [`DeviceAttributes`] are compared with a snapshot taken before it and
//! the difference, restricted to the attributes the message kind can affect, is
//! returned as a [`Changeset`].

use crate::protocol::{
    EqualizerInfo, FunctionInfo, Message, MessageKind, PlayInfo, ProductInfo, SettingsInfo, SpeakerInfo,
};
use crate::tables::{self, EQUALIZERS, FUNCTIONS, PLAY_CONTROL_PAUSED, STREAM_TYPES};
use crate::types::{Attribute, AttributeValue, Changeset, PlayerState};
use serde::Serialize;
use std::collections::BTreeSet;

/// A level with its device-reported bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Level {
    pub value: i32,
    pub min: i32,
    pub max: i32,
}

/// Feature toggles of the settings block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Features {
    pub night_mode: bool,
    pub auto_volume_control: bool,
    pub dynamic_range_compression: bool,
    pub neural_x: bool,
    pub tv_remote: bool,
    pub auto_display: bool,
}

/// Raw device state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub power: bool,
    pub volume: i32,
    pub volume_min: i32,
    pub volume_max: i32,
    pub muted: bool,

    /// Active source function, -1 when unknown
    pub function: i32,
    /// Source functions seen so far; never shrinks
    pub functions: BTreeSet<i32>,

    /// Active equalizer, -1 when unknown
    pub equalizer: i32,
    /// Equalizers seen so far; never shrinks
    pub equalizers: BTreeSet<i32>,

    pub stream_type: i32,
    pub play_control: i32,

    pub bass: i32,
    pub treble: i32,
    pub rear: Level,
    pub woofer: Level,

    pub device_name: String,
    pub features: Features,

    pub media_title: String,
    pub media_artist: String,
    pub media_position: i64,
    pub media_duration: i64,
    pub media_image_url: String,

    pub serial_number: Option<String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: false,
            volume: 0,
            volume_min: 0,
            volume_max: 0,
            muted: false,
            function: -1,
            functions: BTreeSet::new(),
            equalizer: -1,
            equalizers: BTreeSet::new(),
            stream_type: 0,
            play_control: 0,
            bass: 0,
            treble: 0,
            rear: Level::default(),
            woofer: Level::default(),
            device_name: "LG".to_string(),
            features: Features::default(),
            media_title: String::new(),
            media_artist: String::new(),
            media_position: 0,
            media_duration: 0,
            media_image_url: String::new(),
            serial_number: None,
        }
    }
}

/// Snapshot of every externally visible attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceAttributes {
    pub state: PlayerState,
    pub volume: f64,
    pub muted: bool,
    pub source: Option<String>,
    pub source_list: Vec<String>,
    pub sound_mode: Option<String>,
    pub sound_mode_list: Vec<String>,
    pub media_title: String,
    pub media_artist: String,
    pub media_position: i64,
    pub media_duration: i64,
    pub media_image_url: String,
}

impl DeviceAttributes {
    /// Current value of one attribute
    pub fn value(&self, attribute: Attribute) -> AttributeValue {
        match attribute {
            Attribute::State => AttributeValue::State(self.state),
            Attribute::Volume => AttributeValue::Number(self.volume),
            Attribute::Muted => AttributeValue::Bool(self.muted),
            Attribute::Source => AttributeValue::Text(self.source.clone()),
            Attribute::SourceList => AttributeValue::List(self.source_list.clone()),
            Attribute::SoundMode => AttributeValue::Text(self.sound_mode.clone()),
            Attribute::SoundModeList => AttributeValue::List(self.sound_mode_list.clone()),
            Attribute::MediaTitle => AttributeValue::Text(Some(self.media_title.clone())),
            Attribute::MediaArtist => AttributeValue::Text(Some(self.media_artist.clone())),
            Attribute::MediaPosition => AttributeValue::Integer(self.media_position),
            Attribute::MediaDuration => AttributeValue::Integer(self.media_duration),
            Attribute::MediaImageUrl => AttributeValue::Text(Some(self.media_image_url.clone())),
        }
    }
}

const ALL_ATTRIBUTES: [Attribute; 12] = [
    Attribute::State,
    Attribute::Volume,
    Attribute::Muted,
    Attribute::Source,
    Attribute::SourceList,
    Attribute::SoundMode,
    Attribute::SoundModeList,
    Attribute::MediaTitle,
    Attribute::MediaArtist,
    Attribute::MediaPosition,
    Attribute::MediaDuration,
    Attribute::MediaImageUrl,
];

/// Every attribute whose value differs between two snapshots, with its new value
pub fn diff(before: &DeviceAttributes, after: &DeviceAttributes) -> Changeset {
    ALL_ATTRIBUTES
        .iter()
        .filter_map(|&attribute| {
            let new = after.value(attribute);
            (before.value(attribute) != new).then_some((attribute, new))
        })
        .collect()
}

/// Attributes a message kind is allowed to report as changed
pub fn affected_attributes(kind: MessageKind) -> &'static [Attribute] {
    match kind {
        MessageKind::SpeakerInfo => &[
            Attribute::State,
            Attribute::Volume,
            Attribute::Muted,
            Attribute::Source,
            Attribute::SourceList,
        ],
        MessageKind::Equalizer => &[Attribute::SoundMode, Attribute::SoundModeList],
        MessageKind::Function => &[Attribute::Source, Attribute::SourceList],
        MessageKind::Settings => &[Attribute::SoundMode],
        MessageKind::Play => &[
            Attribute::State,
            Attribute::MediaTitle,
            Attribute::MediaArtist,
            Attribute::MediaPosition,
            Attribute::MediaDuration,
            Attribute::MediaImageUrl,
        ],
        MessageKind::ProductInfo => &[],
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one message and return the attributes it changed
    pub fn apply(&mut self, message: &Message) -> Changeset {
        let Some(kind) = message.kind() else {
            return Changeset::new();
        };

        let before = self.attributes();
        let forced = match message {
            Message::Equalizer(info) => self.apply_equalizer(info),
            Message::SpeakerInfo(info) => self.apply_speaker_info(info),
            Message::Function(info) => self.apply_function(info),
            Message::Settings(info) => self.apply_settings(info),
            Message::Play(info) => self.apply_play(info),
            Message::ProductInfo(info) => self.apply_product_info(info),
            Message::Other(_) => false,
        };
        let after = self.attributes();

        let scope = affected_attributes(kind);
        let mut changes = diff(&before, &after);
        changes.retain(|attribute, _| scope.contains(attribute));
        if forced {
            changes.insert(Attribute::SourceList, after.value(Attribute::SourceList));
        }
        changes
    }

    fn apply_equalizer(&mut self, info: &EqualizerInfo) -> bool {
        merge(&mut self.bass, info.i_bass);
        merge(&mut self.treble, info.i_treble);
        if let Some(list) = &info.ai_eq_list {
            accumulate(&mut self.equalizers, list, "equalizer");
        }
        merge(&mut self.equalizer, info.i_curr_eq);
        false
    }

    fn apply_speaker_info(&mut self, info: &SpeakerInfo) -> bool {
        merge(&mut self.power, info.b_powerstatus);
        merge(&mut self.volume, info.i_vol);
        merge(&mut self.volume_min, info.i_vol_min);
        merge(&mut self.volume_max, info.i_vol_max);
        merge(&mut self.muted, info.b_mute);
        info.i_curr_func.is_some_and(|function| self.observe_function(function))
    }

    fn apply_function(&mut self, info: &FunctionInfo) -> bool {
        let added = info.i_curr_func.is_some_and(|function| self.observe_function(function));
        if let Some(list) = &info.ai_func_list {
            accumulate(&mut self.functions, list, "source");
        }
        added
    }

    fn apply_settings(&mut self, info: &SettingsInfo) -> bool {
        merge(&mut self.rear.min, info.i_rear_min);
        merge(&mut self.rear.max, info.i_rear_max);
        merge(&mut self.rear.value, info.i_rear_level);
        merge(&mut self.woofer.min, info.i_woofer_min);
        merge(&mut self.woofer.max, info.i_woofer_max);
        merge(&mut self.woofer.value, info.i_woofer_level);
        merge(&mut self.equalizer, info.i_curr_eq);
        merge(&mut self.device_name, info.s_user_name.clone());
        merge(&mut self.features.night_mode, info.b_night_mode);
        merge(&mut self.features.auto_volume_control, info.b_auto_vol);
        merge(&mut self.features.dynamic_range_compression, info.b_drc);
        merge(&mut self.features.neural_x, info.b_neuralx);
        merge(&mut self.features.tv_remote, info.b_tv_remote);
        merge(&mut self.features.auto_display, info.b_auto_display);
        false
    }

    fn apply_play(&mut self, info: &PlayInfo) -> bool {
        merge(&mut self.media_title, info.s_title.clone());
        merge(&mut self.media_artist, info.s_artist.clone());
        merge(&mut self.media_position, info.i_position.map(|p| p.max(0)));
        merge(&mut self.media_duration, info.i_duration.map(|d| d.max(0)));
        merge(&mut self.media_image_url, info.s_albumart.clone());
        merge(&mut self.stream_type, info.i_stream_type);
        merge(&mut self.play_control, info.i_play_ctrl);
        false
    }

    fn apply_product_info(&mut self, info: &ProductInfo) -> bool {
        if let Some(uuid) = &info.s_uuid {
            self.serial_number = Some(uuid.clone());
        }
        false
    }

    /// Set the active source, adding it to the known set. Returns whether it was new.
    fn observe_function(&mut self, function: i32) -> bool {
        self.function = function;
        function >= 0 && self.functions.insert(function)
    }

    /// Derived player state; playback status only overrides a device that is on
    pub fn player_state(&self) -> PlayerState {
        if !self.power {
            return PlayerState::Off;
        }
        if self.stream_type == 0 {
            return PlayerState::On;
        }
        if self.play_control == PLAY_CONTROL_PAUSED {
            PlayerState::Paused
        } else {
            PlayerState::Playing
        }
    }

    /// Volume in percent of the device range
    pub fn volume_percent(&self) -> f64 {
        let range = self.volume_range();
        if range == 0 {
            return 0.0;
        }
        let offset = (i64::from(self.volume) - i64::from(self.volume_min)).abs();
        100.0 * offset as f64 / range as f64
    }

    /// Raw volume for a percentage of the device range, clamped to the bounds
    pub fn volume_for_percent(&self, percent: f64) -> i32 {
        let offset = (percent * self.volume_range() as f64 / 100.0).round() as i64;
        let target = offset.saturating_add(i64::from(self.volume_min));
        self.clamp_volume(target)
    }

    /// Raw volume one step away from the current one; a step is at least one unit
    pub fn volume_stepped(&self, step_percent: f64, up: bool) -> i32 {
        let step = (step_percent * self.volume_range() as f64 / 100.0).round().max(1.0) as i64;
        let volume = i64::from(self.volume);
        let target = if up {
            volume.saturating_add(step)
        } else {
            volume.saturating_sub(step)
        };
        self.clamp_volume(target)
    }

    /// `max - min`, widened so any pair of reported bounds fits
    fn volume_range(&self) -> i64 {
        i64::from(self.volume_max) - i64::from(self.volume_min)
    }

    fn clamp_volume(&self, volume: i64) -> i32 {
        let (low, high) = if self.volume_min <= self.volume_max {
            (self.volume_min, self.volume_max)
        } else {
            (self.volume_max, self.volume_min)
        };
        // Within [low, high], so it fits an i32
        volume.clamp(i64::from(low), i64::from(high)) as i32
    }

    /// Streaming service feeding the device, if any
    pub fn stream_name(&self) -> Option<&'static str> {
        if self.stream_type == 0 {
            return None;
        }
        tables::lookup(&STREAM_TYPES, self.stream_type)
    }

    pub fn source(&self) -> Option<&'static str> {
        tables::lookup(&FUNCTIONS, self.function)
    }

    pub fn source_list(&self) -> Vec<String> {
        sorted_names(&FUNCTIONS, &self.functions)
    }

    pub fn sound_mode(&self) -> Option<&'static str> {
        tables::lookup(&EQUALIZERS, self.equalizer)
    }

    pub fn sound_mode_list(&self) -> Vec<String> {
        sorted_names(&EQUALIZERS, &self.equalizers)
    }

    pub fn attributes(&self) -> DeviceAttributes {
        DeviceAttributes {
            state: self.player_state(),
            volume: self.volume_percent(),
            muted: self.muted,
            source: self.source().map(str::to_string),
            source_list: self.source_list(),
            sound_mode: self.sound_mode().map(str::to_string),
            sound_mode_list: self.sound_mode_list(),
            media_title: self.media_title.clone(),
            media_artist: self.media_artist.clone(),
            media_position: self.media_position,
            media_duration: self.media_duration,
            media_image_url: self.media_image_url.clone(),
        }
    }
}

fn merge<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn accumulate(known: &mut BTreeSet<i32>, reported: &[i32], what: &str) {
    let missing: Vec<i32> = known.iter().filter(|i| !reported.contains(i)).copied().collect();
    if !missing.is_empty() {
        tracing::warn!("Device no longer lists {} indices {:?}, keeping them", what, missing);
    }
    known.extend(reported.iter().copied().filter(|i| *i >= 0));
}

fn sorted_names(table: &[&'static str], indices: &BTreeSet<i32>) -> Vec<String> {
    let mut names: Vec<String> = indices
        .iter()
        .filter_map(|&i| tables::lookup(table, i))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}
