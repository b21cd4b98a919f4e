//! Reconnect supervisor.
//!
//! A powered-off soundbar still accepts connections but there is nothing worth
//! polling. The supervisor counts consecutive poll cycles that find the device
//! off and gives up once the count exceeds [`MAX_RETRIES`], unless the device
//! is configured as always-on.
//!
//! ```text
//!            resume()                    off cycle #11
//!   ┌──────┐ ───────> ┌────────┐ ─────────────────────> ┌──────────┐
//!   │ Idle │          │ Active │                        │ GivingUp │
//!   └──────┘ <─────── └────────┘ <───────────────────── └──────────┘
//!             stop()                  resume()
//! ```

use crate::types::PlayerState;

/// Consecutive off cycles tolerated before polling stops
pub const MAX_RETRIES: u32 = 10;

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Polling is not running
    Idle,
    /// Polling, device on or failures still tolerated
    Active,
    /// Retry ceiling exceeded; polling stopped until the next external command
    GivingUp,
}

/// What the poll loop should do after a cycle has been observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Continue,
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    state: SupervisorState,
    failures: u32,
    always_on: bool,
}

impl ReconnectSupervisor {
    pub fn new(always_on: bool) -> Self {
        Self {
            state: SupervisorState::Idle,
            failures: 0,
            always_on,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Consecutive cycles that found the device off
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn always_on(&self) -> bool {
        self.always_on
    }

    /// (Re)enter `Active` with a clean counter
    pub fn resume(&mut self) {
        if self.state != SupervisorState::Active {
            tracing::debug!("Supervisor resuming from {:?}", self.state);
        }
        self.state = SupervisorState::Active;
        self.failures = 0;
    }

    /// Polling was stopped on request
    pub fn stop(&mut self) {
        self.state = SupervisorState::Idle;
    }

    /// Record the device state seen at the start of a poll cycle
    pub fn observe(&mut self, state: PlayerState) -> PollDecision {
        if self.state == SupervisorState::GivingUp {
            return PollDecision::GiveUp;
        }
        if self.always_on {
            return PollDecision::Continue;
        }

        if state.is_on() {
            if self.failures > 0 {
                tracing::debug!("Device is on again after {} off cycle(s)", self.failures);
            }
            self.failures = 0;
            self.state = SupervisorState::Active;
            return PollDecision::Continue;
        }

        self.failures += 1;
        if self.failures > MAX_RETRIES {
            tracing::debug!("Device stayed off for {} cycles, giving up", self.failures);
            self.state = SupervisorState::GivingUp;
            return PollDecision::GiveUp;
        }
        tracing::debug!("Device is off, retry {}", self.failures);
        PollDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gives_up_after_eleven_off_cycles() {
        let mut supervisor = ReconnectSupervisor::new(false);
        assert!(!supervisor.always_on());
        supervisor.resume();
        for _ in 0..MAX_RETRIES {
            assert_eq!(supervisor.observe(PlayerState::Off), PollDecision::Continue);
        }
        assert_eq!(supervisor.state(), SupervisorState::Active);
        assert_eq!(supervisor.observe(PlayerState::Off), PollDecision::GiveUp);
        assert_eq!(supervisor.state(), SupervisorState::GivingUp);
        assert_eq!(supervisor.observe(PlayerState::On), PollDecision::GiveUp);
    }

    #[test]
    fn on_cycle_resets_counter() {
        let mut supervisor = ReconnectSupervisor::new(false);
        supervisor.resume();
        for _ in 0..5 {
            supervisor.observe(PlayerState::Off);
        }
        assert_eq!(supervisor.failures(), 5);
        assert_eq!(supervisor.observe(PlayerState::Paused), PollDecision::Continue);
        assert_eq!(supervisor.failures(), 0);
    }

    #[test]
    fn always_on_never_gives_up() {
        let mut supervisor = ReconnectSupervisor::new(true);
        assert!(supervisor.always_on());
        supervisor.resume();
        for _ in 0..100 {
            assert_eq!(supervisor.observe(PlayerState::Off), PollDecision::Continue);
        }
        assert_eq!(supervisor.failures(), 0);
    }

    #[test]
    fn resume_leaves_giving_up() {
        let mut supervisor = ReconnectSupervisor::new(false);
        supervisor.resume();
        for _ in 0..=MAX_RETRIES {
            supervisor.observe(PlayerState::Off);
        }
        assert_eq!(supervisor.state(), SupervisorState::GivingUp);

        supervisor.resume();
        assert_eq!(supervisor.state(), SupervisorState::Active);
        assert_eq!(supervisor.failures(), 0);
        assert_eq!(supervisor.observe(PlayerState::Off), PollDecision::Continue);

        supervisor.stop();
        assert_eq!(supervisor.state(), SupervisorState::Idle);
    }
}
