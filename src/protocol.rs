use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Data mapping carried by commands and responses
pub type Data = Map<String, Value>;

/// Command verb
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Set,
}

/// Message type tags understood by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Equalizer block (`EQ_VIEW_INFO`)
    Equalizer,
    /// Power and volume block (`SPK_LIST_VIEW_INFO`)
    SpeakerInfo,
    /// Source function block (`FUNC_VIEW_INFO`)
    Function,
    /// Settings block (`SETTING_VIEW_INFO`)
    Settings,
    /// Playback block (`PLAY_INFO`)
    Play,
    /// Product information (`PRODUCT_INFO`)
    ProductInfo,
}

impl MessageKind {
    /// Subsystems requested by every poll pass, in request order
    pub const POLLED: [MessageKind; 5] = [
        MessageKind::Equalizer,
        MessageKind::SpeakerInfo,
        MessageKind::Function,
        MessageKind::Settings,
        MessageKind::Play,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Equalizer => "EQ_VIEW_INFO",
            MessageKind::SpeakerInfo => "SPK_LIST_VIEW_INFO",
            MessageKind::Function => "FUNC_VIEW_INFO",
            MessageKind::Settings => "SETTING_VIEW_INFO",
            MessageKind::Play => "PLAY_INFO",
            MessageKind::ProductInfo => "PRODUCT_INFO",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "EQ_VIEW_INFO" => Some(MessageKind::Equalizer),
            "SPK_LIST_VIEW_INFO" => Some(MessageKind::SpeakerInfo),
            "FUNC_VIEW_INFO" => Some(MessageKind::Function),
            "SETTING_VIEW_INFO" => Some(MessageKind::Settings),
            "PLAY_INFO" => Some(MessageKind::Play),
            "PRODUCT_INFO" => Some(MessageKind::ProductInfo),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub cmd: Method,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Data>,
}

impl Command {
    /// Create a command without data
    pub fn new(cmd: Method, msg: impl Into<String>) -> Self {
        Self {
            cmd,
            msg: msg.into(),
            data: None,
        }
    }

    /// Read request for one subsystem
    pub fn get(kind: MessageKind) -> Self {
        Self::new(Method::Get, kind.as_str())
    }

    /// Write request setting a single key of one subsystem
    pub fn set(kind: MessageKind, key: &str, value: impl Into<Value>) -> Self {
        let mut data = Data::new();
        data.insert(key.to_string(), value.into());
        Self::new(Method::Set, kind.as_str()).with_data(data)
    }

    /// Set the command data
    pub fn with_data(mut self, data: Data) -> Self {
        self.data = Some(data);
        self
    }

    pub fn power(on: bool) -> Self {
        Self::set(MessageKind::SpeakerInfo, "b_powerkey", on)
    }

    pub fn set_volume(volume: i32) -> Self {
        Self::set(MessageKind::SpeakerInfo, "i_vol", volume)
    }

    pub fn set_mute(muted: bool) -> Self {
        Self::set(MessageKind::SpeakerInfo, "b_mute", muted)
    }

    pub fn set_function(index: i32) -> Self {
        Self::set(MessageKind::Function, "i_curr_func", index)
    }

    pub fn set_equalizer(index: i32) -> Self {
        Self::set(MessageKind::Equalizer, "i_curr_eq", index)
    }

    pub fn set_setting(setting: Setting, value: SettingValue) -> Self {
        Self::set(MessageKind::Settings, setting.key(), value)
    }
}

/// Inbound message as decoded from the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Data>,
}

impl Response {
    pub fn new(msg: impl Into<String>, data: Data) -> Self {
        Self {
            msg: msg.into(),
            data: Some(data),
        }
    }

    /// Data mapping; absent or `null` data reads as empty
    pub fn data(&self) -> Data {
        self.data.clone().unwrap_or_default()
    }

    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(&self.msg)
    }
}

/// `EQ_VIEW_INFO` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EqualizerInfo {
    pub i_bass: Option<i32>,
    pub i_treble: Option<i32>,
    pub ai_eq_list: Option<Vec<i32>>,
    pub i_curr_eq: Option<i32>,
}

/// `SPK_LIST_VIEW_INFO` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeakerInfo {
    pub b_powerstatus: Option<bool>,
    pub i_vol: Option<i32>,
    pub i_vol_min: Option<i32>,
    pub i_vol_max: Option<i32>,
    pub b_mute: Option<bool>,
    pub i_curr_func: Option<i32>,
}

/// `FUNC_VIEW_INFO` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FunctionInfo {
    pub i_curr_func: Option<i32>,
    pub ai_func_list: Option<Vec<i32>>,
}

/// `SETTING_VIEW_INFO` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettingsInfo {
    pub i_rear_min: Option<i32>,
    pub i_rear_max: Option<i32>,
    pub i_rear_level: Option<i32>,
    pub i_woofer_min: Option<i32>,
    pub i_woofer_max: Option<i32>,
    pub i_woofer_level: Option<i32>,
    pub i_curr_eq: Option<i32>,
    pub s_user_name: Option<String>,
    pub b_night_mode: Option<bool>,
    pub b_auto_vol: Option<bool>,
    pub b_drc: Option<bool>,
    pub b_neuralx: Option<bool>,
    pub b_tv_remote: Option<bool>,
    pub b_auto_display: Option<bool>,
}

/// `PLAY_INFO` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayInfo {
    pub s_title: Option<String>,
    pub s_artist: Option<String>,
    pub i_position: Option<i64>,
    pub i_duration: Option<i64>,
    pub s_albumart: Option<String>,
    pub i_stream_type: Option<i32>,
    pub i_play_ctrl: Option<i32>,
}

/// `PRODUCT_INFO` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProductInfo {
    pub s_uuid: Option<String>,
}

/// Typed inbound message, one variant per consumed subsystem
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Equalizer(EqualizerInfo),
    SpeakerInfo(SpeakerInfo),
    Function(FunctionInfo),
    Settings(SettingsInfo),
    Play(PlayInfo),
    ProductInfo(ProductInfo),
    /// A tag the client does not consume
    Other(String),
}

impl Message {
    /// Convert a decoded response into its typed payload
    pub fn from_response(response: &Response) -> Result<Self> {
        let Some(kind) = response.kind() else {
            return Ok(Message::Other(response.msg.clone()));
        };
        let data = Value::Object(response.data());

        Ok(match kind {
            MessageKind::Equalizer => Message::Equalizer(serde_json::from_value(data)?),
            MessageKind::SpeakerInfo => Message::SpeakerInfo(serde_json::from_value(data)?),
            MessageKind::Function => Message::Function(serde_json::from_value(data)?),
            MessageKind::Settings => Message::Settings(serde_json::from_value(data)?),
            MessageKind::Play => Message::Play(serde_json::from_value(data)?),
            MessageKind::ProductInfo => Message::ProductInfo(serde_json::from_value(data)?),
        })
    }

    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Message::Equalizer(_) => Some(MessageKind::Equalizer),
            Message::SpeakerInfo(_) => Some(MessageKind::SpeakerInfo),
            Message::Function(_) => Some(MessageKind::Function),
            Message::Settings(_) => Some(MessageKind::Settings),
            Message::Play(_) => Some(MessageKind::Play),
            Message::ProductInfo(_) => Some(MessageKind::ProductInfo),
            Message::Other(_) => None,
        }
    }
}

/// Writable keys of the settings block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    NightMode,
    AutoVolume,
    DynamicRangeCompression,
    NeuralX,
    AvSync,
    WooferLevel,
    RearControl,
    RearLevel,
    TopLevel,
    CenterLevel,
    TvRemote,
    AutoPower,
    AutoDisplay,
    BluetoothStandby,
    BluetoothRestrict,
    SleepTime,
    UserName,
}

impl Setting {
    pub fn key(&self) -> &'static str {
        match self {
            Setting::NightMode => "b_night_mode",
            Setting::AutoVolume => "b_auto_vol",
            Setting::DynamicRangeCompression => "b_drc",
            Setting::NeuralX => "b_neuralx",
            Setting::AvSync => "i_av_sync",
            Setting::WooferLevel => "i_woofer_level",
            Setting::RearControl => "b_rear",
            Setting::RearLevel => "i_rear_level",
            Setting::TopLevel => "i_top_level",
            Setting::CenterLevel => "i_center_level",
            Setting::TvRemote => "b_tv_remote",
            Setting::AutoPower => "b_auto_power",
            Setting::AutoDisplay => "b_auto_display",
            Setting::BluetoothStandby => "b_bt_standby",
            Setting::BluetoothRestrict => "b_conn_bt_limit",
            Setting::SleepTime => "i_sleep_time",
            Setting::UserName => "s_user_name",
        }
    }

    /// Whether `value` has the type the device expects for this key
    pub fn accepts(&self, value: &SettingValue) -> bool {
        match self.key().as_bytes()[0] {
            b'b' => matches!(value, SettingValue::Bool(_)),
            b'i' => matches!(value, SettingValue::Int(_)),
            _ => matches!(value, SettingValue::Text(_)),
        }
    }
}

/// Value written to a [`Setting`]
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i32),
    Text(String),
}

impl From<SettingValue> for Value {
    fn from(value: SettingValue) -> Self {
        match value {
            SettingValue::Bool(b) => json!(b),
            SettingValue::Int(i) => json!(i),
            SettingValue::Text(s) => json!(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_serializes_without_empty_data() {
        let json = serde_json::to_value(Command::get(MessageKind::Play)).unwrap();
        assert_eq!(json, json!({"cmd": "get", "msg": "PLAY_INFO"}));
    }

    #[test]
    fn set_command_carries_data() {
        let json = serde_json::to_value(Command::set_volume(12)).unwrap();
        assert_eq!(
            json,
            json!({"cmd": "set", "msg": "SPK_LIST_VIEW_INFO", "data": {"i_vol": 12}})
        );
        let json = serde_json::to_value(Command::power(true)).unwrap();
        assert_eq!(json["data"]["b_powerkey"], json!(true));
    }

    #[test]
    fn response_null_data_is_empty() {
        let response: Response = serde_json::from_str(r#"{"msg":"PLAY_INFO","data":null}"#).unwrap();
        assert!(response.data().is_empty());
        let response: Response = serde_json::from_str(r#"{"msg":"PLAY_INFO"}"#).unwrap();
        assert!(response.data().is_empty());
    }

    #[test]
    fn message_dispatches_on_tag() {
        let response: Response = serde_json::from_str(
            r#"{"msg":"SPK_LIST_VIEW_INFO","data":{"i_vol":5,"b_mute":true,"s_extra":"x"}}"#,
        )
        .unwrap();
        match Message::from_response(&response).unwrap() {
            Message::SpeakerInfo(info) => {
                assert_eq!(info.i_vol, Some(5));
                assert_eq!(info.b_mute, Some(true));
                assert_eq!(info.b_powerstatus, None);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn unknown_tag_is_other() {
        let response = Response::new("RADIO_VIEW_INFO", Data::new());
        assert_eq!(
            Message::from_response(&response).unwrap(),
            Message::Other("RADIO_VIEW_INFO".to_string())
        );
    }

    #[test]
    fn mistyped_field_is_parse_error() {
        let response: Response =
            serde_json::from_str(r#"{"msg":"EQ_VIEW_INFO","data":{"i_curr_eq":"loud"}}"#).unwrap();
        let err = Message::from_response(&response).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn setting_value_types() {
        assert!(Setting::NightMode.accepts(&SettingValue::Bool(true)));
        assert!(!Setting::NightMode.accepts(&SettingValue::Int(1)));
        assert!(Setting::WooferLevel.accepts(&SettingValue::Int(3)));
        assert!(Setting::UserName.accepts(&SettingValue::Text("Den".to_string())));
        let json = serde_json::to_value(Command::set_setting(Setting::RearLevel, SettingValue::Int(-2))).unwrap();
        assert_eq!(json["data"]["i_rear_level"], json!(-2));
    }
}
