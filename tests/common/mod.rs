//! Mock soundbar for integration tests.
//!
//! Accepts connections on an ephemeral port, decrypts every frame it receives
//! and records the command. `get` requests are answered with the configured
//! reply for the tag; `set` requests are merged into that reply and echoed back,
//! the way the firmware reports the new state after a change.

#![allow(dead_code)]

use lgsoundbar::{codec, frame, Command, Data, DeviceConfig, Method, Response};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Shared {
    replies: Mutex<HashMap<String, Data>>,
    received: Mutex<Vec<Command>>,
    connections: AtomicUsize,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    close: Notify,
}

pub struct MockDevice {
    port: u16,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl MockDevice {
    /// A powered-on soundbar on HDMI with the "Bass" sound mode
    pub async fn start() -> Self {
        Self::start_with(default_replies()).await
    }

    pub async fn start_with(replies: HashMap<String, Data>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared {
            replies: Mutex::new(replies),
            ..Default::default()
        });

        let accept_shared = shared.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, accept_shared.clone()));
            }
        });

        Self { port, shared, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Client configuration with short timings
    pub fn config(&self) -> DeviceConfig {
        DeviceConfig::new("test-bar", "Test bar", "127.0.0.1")
            .with_port(self.port)
            .with_poll_interval(Duration::from_millis(20))
            .with_connect_timeout(Duration::from_millis(500))
            .with_command_reconnect_timeout(Duration::from_millis(500))
    }

    /// Replace a field of the reply for `tag`
    pub fn set_reply_field(&self, tag: &str, key: &str, value: Value) {
        let mut replies = self.shared.replies.lock().unwrap();
        replies.entry(tag.to_string()).or_default().insert(key.to_string(), value);
    }

    pub fn received(&self) -> Vec<Command> {
        self.shared.received.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.shared.received.lock().unwrap().len()
    }

    /// Set commands received for `tag`, in order
    pub fn sets(&self, tag: &str) -> Vec<Data> {
        self.received()
            .into_iter()
            .filter(|c| c.cmd == Method::Set && c.msg == tag)
            .filter_map(|c| c.data)
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Write raw bytes to the most recent connection
    pub async fn send_raw(&self, bytes: &[u8]) {
        let mut writer = self.shared.writer.lock().await;
        let writer = writer.as_mut().expect("no client connected");
        writer.write_all(bytes).await.unwrap();
        writer.flush().await.unwrap();
    }

    /// Push an unsolicited message to the most recent connection
    pub async fn push(&self, tag: &str, data: Value) {
        let data = data.as_object().cloned().unwrap_or_default();
        self.send_raw(&codec::encode(&Response::new(tag, data)).unwrap()).await;
    }

    /// Close every open connection from the device side
    pub async fn close_connections(&self) {
        self.shared.close.notify_waiters();
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let (reader, writer) = stream.into_split();
    *shared.writer.lock().await = Some(writer);
    let mut reader = BufReader::new(reader);

    loop {
        let payload = tokio::select! {
            _ = shared.close.notified() => break,
            payload = frame::read_frame(&mut reader) => payload,
        };
        let Ok(Some(payload)) = payload else {
            break;
        };
        let Ok(command) = codec::decode_as::<Command>(&payload) else {
            continue;
        };
        shared.received.lock().unwrap().push(command.clone());

        let reply = {
            let mut replies = shared.replies.lock().unwrap();
            if command.cmd == Method::Set {
                for (key, value) in command.data.clone().unwrap_or_default() {
                    // The power key is write-only; the device reports the result as b_powerstatus
                    let key = if key == "b_powerkey" { "b_powerstatus".to_string() } else { key };
                    // Fields shared between views (i_curr_func, i_curr_eq) stay consistent
                    for data in replies.values_mut().filter(|d| d.contains_key(&key)) {
                        data.insert(key.clone(), value.clone());
                    }
                    replies.entry(command.msg.clone()).or_default().insert(key, value);
                }
            }
            replies.get(&command.msg).cloned()
        };

        if let Some(data) = reply {
            let frame = codec::encode(&Response::new(command.msg.clone(), data)).unwrap();
            let mut writer = shared.writer.lock().await;
            if let Some(writer) = writer.as_mut() {
                if writer.write_all(&frame).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn object(value: Value) -> Data {
    value.as_object().cloned().unwrap_or_default()
}

pub fn default_replies() -> HashMap<String, Data> {
    HashMap::from([
        (
            "EQ_VIEW_INFO".to_string(),
            object(json!({"i_bass": 0, "i_treble": 0, "ai_eq_list": [0, 1, 2, 7], "i_curr_eq": 1})),
        ),
        (
            "SPK_LIST_VIEW_INFO".to_string(),
            object(json!({
                "b_powerstatus": true,
                "i_vol": 10,
                "i_vol_min": 0,
                "i_vol_max": 40,
                "b_mute": false,
                "i_curr_func": 6
            })),
        ),
        (
            "FUNC_VIEW_INFO".to_string(),
            object(json!({"i_curr_func": 6, "ai_func_list": [0, 4, 6]})),
        ),
        (
            "SETTING_VIEW_INFO".to_string(),
            object(json!({
                "s_user_name": "Living room bar",
                "b_night_mode": false,
                "b_auto_vol": true,
                "b_drc": false,
                "b_neuralx": false,
                "b_tv_remote": false,
                "b_auto_display": true,
                "i_curr_eq": 1
            })),
        ),
        (
            "PLAY_INFO".to_string(),
            object(json!({
                "i_stream_type": 0,
                "i_play_ctrl": 0,
                "s_title": "",
                "s_artist": "",
                "i_position": -1,
                "i_duration": -1,
                "s_albumart": ""
            })),
        ),
        ("PRODUCT_INFO".to_string(), object(json!({"s_uuid": "SB-0042"}))),
    ])
}

/// Replies of a soundbar in standby
pub fn standby_replies() -> HashMap<String, Data> {
    let mut replies = default_replies();
    if let Some(speaker) = replies.get_mut("SPK_LIST_VIEW_INFO") {
        speaker.insert("b_powerstatus".to_string(), json!(false));
    }
    replies
}

/// Poll `condition` until it holds or two seconds have passed
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
