use crate::config::DeviceConfig;
use crate::error::{Result, SoundbarError};
use crate::poller::Poller;
use crate::protocol::{Command, Message, MessageKind, Response, Setting, SettingValue};
use crate::state::{diff, DeviceAttributes, DeviceState, Features};
use crate::subscription::{DeviceEvent, EventReceiver};
use crate::supervisor::{PollDecision, ReconnectSupervisor, SupervisorState};
use crate::tables::{self, EQUALIZERS, FUNCTIONS};
use crate::transport::{InboundHandler, LinkState, Transport};
use crate::types::{Changeset, CommandStatus, DeviceId, PlayerState, SoundbarCommand};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::time::timeout;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Client for one LG soundbar
///
/// The `Soundbar` owns the connection to the device, keeps a change-tracked
/// copy of its state up to date by polling, and exposes the user-facing
/// commands. Cloning is cheap; clones share the same connection and state.
///
/// # Example
///
/// ```no_run
/// use lgsoundbar::{DeviceConfig, Soundbar};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let soundbar = Soundbar::new(DeviceConfig::new("living", "Living room", "192.168.1.40"))?;
///     let mut events = soundbar.subscribe();
///     soundbar.connect().await?;
///
///     let _ = soundbar.set_volume_level(25.0).await;
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Soundbar {
    inner: Arc<Inner>,
}

/// State and event fan-out, shared with the receive loop
struct DeviceCore {
    id: DeviceId,
    state: Mutex<DeviceState>,
    events: broadcast::Sender<DeviceEvent>,
}

impl DeviceCore {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: DeviceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_changes(&self, changes: Changeset) {
        if changes.is_empty() {
            return;
        }
        tracing::debug!("Device {} changed: {:?}", self.id, changes);
        self.emit(DeviceEvent::Update {
            device_id: self.id.clone(),
            changes,
        });
    }

    /// Apply a decoded message and notify subscribers of the changes
    fn apply(&self, message: &Message) {
        let mut state = self.lock();
        let changes = state.apply(message);
        self.emit_changes(changes);
    }

    /// Change local state without a device report and notify what changed
    fn update_local(&self, update: impl FnOnce(&mut DeviceState)) {
        let mut state = self.lock();
        let before = state.attributes();
        update(&mut state);
        let changes = diff(&before, &state.attributes());
        self.emit_changes(changes);
    }
}

impl InboundHandler for DeviceCore {
    fn on_response(&self, response: Response) {
        match Message::from_response(&response) {
            Ok(Message::Other(msg)) => tracing::trace!("Ignoring {} from device {}", msg, self.id),
            Ok(message) => self.apply(&message),
            Err(e) => tracing::warn!("Invalid {} payload from device {}: {}", response.msg, self.id, e),
        }
    }

    fn on_closed(&self) {
        tracing::info!("Device {} closed the connection", self.id);
        self.emit(DeviceEvent::Disconnected(self.id.clone()));
    }
}

pub(crate) struct Inner {
    config: DeviceConfig,
    core: Arc<DeviceCore>,
    transport: Transport,
    /// Serializes poll passes; a pass that finds it taken is skipped
    update_lock: tokio::sync::Mutex<()>,
    supervisor: Mutex<ReconnectSupervisor>,
    poller: Mutex<Option<Poller>>,
}

impl Inner {
    pub(crate) fn id(&self) -> &str {
        &self.config.id
    }

    fn supervisor(&self) -> MutexGuard<'_, ReconnectSupervisor> {
        self.supervisor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn poller(&self) -> MutexGuard<'_, Option<Poller>> {
        self.poller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one read pass across all subsystems.
    ///
    /// A regular pass is skipped while another is in flight. A full pass waits
    /// for it, so product info is always requested on connect.
    pub(crate) async fn update(&self, full: bool) -> Result<()> {
        let _guard = if full {
            self.update_lock.lock().await
        } else {
            match self.update_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!("Update of device {} already in progress, skipping", self.id());
                    return Ok(());
                }
            }
        };

        self.transport.connect().await?;
        for kind in MessageKind::POLLED {
            self.transport.send(&Command::get(kind)).await?;
        }
        if full {
            self.transport.send(&Command::get(MessageKind::ProductInfo)).await?;
        }
        Ok(())
    }

    /// Feed the current player state to the supervisor
    pub(crate) fn observe_cycle(&self) -> PollDecision {
        let state = self.core.lock().player_state();
        self.supervisor().observe(state)
    }

    /// Release the connection once polling gave up
    pub(crate) async fn release_after_give_up(&self) {
        let still_giving_up = self.supervisor().state() == SupervisorState::GivingUp;
        if still_giving_up && !self.config.always_on {
            self.transport.disconnect().await;
        }
    }

    fn start_polling(self: &Arc<Self>) {
        let mut poller = self.poller();
        let giving_up = self.supervisor().state() == SupervisorState::GivingUp;
        if poller.as_ref().is_some_and(|p| p.is_running()) && !giving_up {
            return;
        }

        tracing::debug!("Start polling task for device {}", self.id());
        self.supervisor().resume();
        if let Some(previous) = poller.take() {
            previous.abort();
        }
        *poller = Some(Poller::spawn(Arc::downgrade(self), self.config.poll_interval));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(poller) = self.poller().take() {
            poller.abort();
        }
    }
}

impl Soundbar {
    /// Create a client for the configured device. Nothing is connected yet.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = Arc::new(DeviceCore {
            id: config.id.clone(),
            state: Mutex::new(DeviceState::new()),
            events,
        });
        let transport = Transport::new(config.socket_address(), config.connect_timeout, core.clone());
        let supervisor = ReconnectSupervisor::new(config.always_on);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                core,
                transport,
                update_lock: tokio::sync::Mutex::new(()),
                supervisor: Mutex::new(supervisor),
                poller: Mutex::new(None),
            }),
        })
    }

    // ========== Connection ==========

    /// Connect, read the full device state and start polling
    pub async fn connect(&self) -> Result<()> {
        self.inner.transport.connect().await?;
        self.inner.update(true).await?;
        self.start_polling().await;
        self.inner.core.emit(DeviceEvent::Connected(self.id().clone()));
        Ok(())
    }

    /// Stop polling and close the connection
    pub async fn disconnect(&self) {
        self.stop_polling().await;
        self.inner.transport.disconnect().await;
        self.inner.core.emit(DeviceEvent::Disconnected(self.id().clone()));
    }

    /// Request the state of every subsystem; `full` also requests product info.
    ///
    /// A regular pass is skipped without error while another pass is in flight;
    /// a full pass waits for it to finish.
    pub async fn update(&self, full: bool) -> Result<()> {
        self.inner.update(full).await
    }

    /// Start the poll task unless it is already running
    pub async fn start_polling(&self) {
        self.inner.start_polling();
    }

    /// Stop the poll task
    pub async fn stop_polling(&self) {
        let poller = self.inner.poller().take();
        self.inner.supervisor().stop();
        if let Some(poller) = poller {
            poller.stop().await;
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller().as_ref().is_some_and(|p| p.is_running())
    }

    /// Subscribe to device events
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.inner.core.events.subscribe())
    }

    // ========== Accessors ==========

    pub fn id(&self) -> &DeviceId {
        &self.inner.config.id
    }

    /// Display name from the configuration
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn link_state(&self) -> LinkState {
        self.inner.transport.state()
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.inner.supervisor().state()
    }

    /// Snapshot of all externally visible attributes
    pub fn attributes(&self) -> DeviceAttributes {
        self.inner.core.lock().attributes()
    }

    /// Snapshot of the raw device state
    pub fn device_state(&self) -> DeviceState {
        self.inner.core.lock().clone()
    }

    pub fn state(&self) -> PlayerState {
        self.inner.core.lock().player_state()
    }

    pub fn is_on(&self) -> bool {
        self.state().is_on()
    }

    /// Volume in percent of the device range
    pub fn volume(&self) -> f64 {
        self.inner.core.lock().volume_percent()
    }

    pub fn muted(&self) -> bool {
        self.inner.core.lock().muted
    }

    pub fn source(&self) -> Option<String> {
        self.inner.core.lock().source().map(str::to_string)
    }

    pub fn source_list(&self) -> Vec<String> {
        self.inner.core.lock().source_list()
    }

    pub fn sound_mode(&self) -> Option<String> {
        self.inner.core.lock().sound_mode().map(str::to_string)
    }

    pub fn sound_mode_list(&self) -> Vec<String> {
        self.inner.core.lock().sound_mode_list()
    }

    /// Streaming service feeding the device, e.g. "Spotify Connect"
    pub fn stream_name(&self) -> Option<String> {
        self.inner.core.lock().stream_name().map(str::to_string)
    }

    pub fn media_title(&self) -> String {
        self.inner.core.lock().media_title.clone()
    }

    pub fn media_artist(&self) -> String {
        self.inner.core.lock().media_artist.clone()
    }

    pub fn media_position(&self) -> i64 {
        self.inner.core.lock().media_position
    }

    pub fn media_duration(&self) -> i64 {
        self.inner.core.lock().media_duration
    }

    pub fn media_image_url(&self) -> String {
        self.inner.core.lock().media_image_url.clone()
    }

    /// Unique id reported by the device, once product info has been read
    pub fn serial_number(&self) -> Option<String> {
        self.inner.core.lock().serial_number.clone()
    }

    /// Name the user gave the soundbar on the device
    pub fn device_name(&self) -> String {
        self.inner.core.lock().device_name.clone()
    }

    pub fn features(&self) -> Features {
        self.inner.core.lock().features
    }

    // ========== Power ==========

    pub async fn turn_on(&self) -> CommandStatus {
        self.execute("turn_on", Command::power(true)).await
    }

    pub async fn turn_off(&self) -> CommandStatus {
        self.execute("turn_off", Command::power(false)).await
    }

    pub async fn toggle(&self) -> CommandStatus {
        let on = self.state() == PlayerState::Off;
        self.execute("toggle", Command::power(on)).await
    }

    // ========== Source and Sound Mode ==========

    /// Select a source by its name, as listed in [`Soundbar::source_list`]
    pub async fn select_source(&self, source: &str) -> CommandStatus {
        let Some(index) = tables::index_of(&FUNCTIONS, source) else {
            tracing::warn!("Unknown source {} for device {}", source, self.id());
            return CommandStatus::BadRequest;
        };
        self.execute("select_source", Command::set_function(index)).await
    }

    /// Select the next source of the known source list, wrapping around
    pub async fn source_next(&self) -> CommandStatus {
        let next = {
            let state = self.inner.core.lock();
            let Some(current) = state.source() else {
                tracing::debug!("No current source to step from: {}", state.function);
                return CommandStatus::BadRequest;
            };
            let sources = state.source_list();
            let position = sources.iter().position(|s| s == current).unwrap_or(0);
            sources
                .get((position + 1) % sources.len().max(1))
                .and_then(|name| tables::index_of(&FUNCTIONS, name))
        };
        let Some(next) = next else {
            return CommandStatus::BadRequest;
        };

        let status = self.execute("source_next", Command::set_function(next)).await;
        if status.is_ok() {
            self.inner.core.update_local(|state| state.function = next);
            if let Err(e) = self.inner.transport.send(&Command::get(MessageKind::Function)).await {
                tracing::debug!("Failed to refresh source of device {}: {}", self.id(), e);
            }
        }
        status
    }

    /// Select a sound mode by its name, as listed in [`Soundbar::sound_mode_list`]
    pub async fn select_sound_mode(&self, sound_mode: &str) -> CommandStatus {
        let Some(index) = tables::index_of(&EQUALIZERS, sound_mode) else {
            tracing::warn!("Unknown sound mode {} for device {}", sound_mode, self.id());
            return CommandStatus::BadRequest;
        };
        self.execute("select_sound_mode", Command::set_equalizer(index)).await
    }

    // ========== Volume Control ==========

    /// Set the volume in percent of the device range (0..=100)
    pub async fn set_volume_level(&self, level: f64) -> CommandStatus {
        if !level.is_finite() {
            return CommandStatus::BadRequest;
        }
        let target = self.inner.core.lock().volume_for_percent(level.clamp(0.0, 100.0));
        self.set_raw_volume("set_volume_level", target).await
    }

    pub async fn volume_up(&self) -> CommandStatus {
        let target = self.inner.core.lock().volume_stepped(self.inner.config.volume_step, true);
        self.set_raw_volume("volume_up", target).await
    }

    pub async fn volume_down(&self) -> CommandStatus {
        let target = self.inner.core.lock().volume_stepped(self.inner.config.volume_step, false);
        self.set_raw_volume("volume_down", target).await
    }

    /// Local volume follows once the command is on the wire
    async fn set_raw_volume(&self, operation: &str, target: i32) -> CommandStatus {
        let status = self.execute(operation, Command::set_volume(target)).await;
        if status.is_ok() {
            self.inner.core.update_local(|state| state.volume = target);
        }
        status
    }

    // ========== Mute Control ==========

    pub async fn mute(&self) -> CommandStatus {
        self.set_mute("mute", true).await
    }

    pub async fn unmute(&self) -> CommandStatus {
        self.set_mute("unmute", false).await
    }

    pub async fn mute_toggle(&self) -> CommandStatus {
        let muted = !self.muted();
        self.set_mute("mute_toggle", muted).await
    }

    async fn set_mute(&self, operation: &str, muted: bool) -> CommandStatus {
        tracing::debug!("Sending mute: {}", muted);
        let status = self.execute(operation, Command::set_mute(muted)).await;
        if status.is_ok() {
            self.inner.core.update_local(|state| state.muted = muted);
        }
        status
    }

    // ========== Settings ==========

    /// Flip a feature toggle, or step to the next input
    pub async fn send_command(&self, command: SoundbarCommand) -> CommandStatus {
        let features = self.features();
        let (setting, enabled) = match command {
            SoundbarCommand::InputNext => return self.source_next().await,
            SoundbarCommand::NightMode => (Setting::NightMode, features.night_mode),
            SoundbarCommand::AutoVolumeControl => (Setting::AutoVolume, features.auto_volume_control),
            SoundbarCommand::DynamicRangeCompression => {
                (Setting::DynamicRangeCompression, features.dynamic_range_compression)
            }
            SoundbarCommand::NeuralX => (Setting::NeuralX, features.neural_x),
            SoundbarCommand::TvRemote => (Setting::TvRemote, features.tv_remote),
            SoundbarCommand::AutoDisplay => (Setting::AutoDisplay, features.auto_display),
        };
        self.execute(command.as_str(), Command::set_setting(setting, SettingValue::Bool(!enabled)))
            .await
    }

    /// Write one value of the settings block
    pub async fn set_setting(&self, setting: Setting, value: SettingValue) -> CommandStatus {
        if !setting.accepts(&value) {
            tracing::warn!("Invalid value {:?} for setting {}", value, setting.key());
            return CommandStatus::BadRequest;
        }
        self.execute(setting.key(), Command::set_setting(setting, value)).await
    }

    // ========== Command Execution ==========

    /// Send a command; on failure reconnect once (bounded) and retry
    async fn execute(&self, operation: &str, command: Command) -> CommandStatus {
        let error = match self.inner.transport.send(&command).await {
            Ok(()) => {
                self.start_polling().await;
                return CommandStatus::Ok;
            }
            Err(e) => e,
        };

        // A device that is off is expected to refuse commands
        let expected = self.state() == PlayerState::Off;
        self.log_failure(
            expected,
            operation,
            &error,
            "trying to reconnect and send the command again",
        );

        match timeout(self.inner.config.command_reconnect_timeout, self.connect()).await {
            Err(_) => {
                self.log_failure(
                    expected,
                    operation,
                    &SoundbarError::ConnectionClosed,
                    "timeout for reconnect, command won't be sent",
                );
                CommandStatus::BadRequest
            }
            Ok(Err(e)) => {
                self.log_failure(expected, operation, &e, "reconnect failed, command won't be sent");
                CommandStatus::BadRequest
            }
            Ok(Ok(())) => match self.inner.transport.send(&command).await {
                Ok(()) => CommandStatus::Ok,
                Err(e) => {
                    self.log_failure(expected, operation, &e, "giving up");
                    CommandStatus::BadRequest
                }
            },
        }
    }

    fn log_failure(&self, expected: bool, operation: &str, error: &SoundbarError, next: &str) {
        if expected {
            tracing::debug!("Error calling {} on device {}: {}, {}", operation, self.id(), error, next);
        } else {
            tracing::error!("Error calling {} on device {}: {}, {}", operation, self.id(), error, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A client for a port nothing listens on
    async fn unreachable() -> Soundbar {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = DeviceConfig::new("bar", "Bar", "127.0.0.1")
            .with_port(port)
            .with_connect_timeout(Duration::from_millis(200));
        Soundbar::new(config).unwrap()
    }

    #[tokio::test]
    async fn overlapping_poll_pass_is_skipped() {
        let soundbar = unreachable().await;
        let in_flight = soundbar.inner.update_lock.lock().await;

        // Skipped before any connect attempt, so no error
        assert!(soundbar.update(false).await.is_ok());
        assert_eq!(soundbar.link_state(), LinkState::Disconnected);

        drop(in_flight);
        assert!(matches!(
            soundbar.update(false).await,
            Err(SoundbarError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn full_pass_waits_for_the_pass_in_flight() {
        let soundbar = unreachable().await;
        let in_flight = soundbar.inner.update_lock.lock().await;

        let full = tokio::spawn({
            let soundbar = soundbar.clone();
            async move { soundbar.update(true).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!full.is_finished());

        drop(in_flight);
        let result = full.await.unwrap();
        assert!(matches!(result, Err(SoundbarError::Connect { .. })));
    }
}
