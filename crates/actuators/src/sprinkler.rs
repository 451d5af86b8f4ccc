//! Timed spray with cooldown enforcement
//!
//! `Idle -> Activating -> Cooling -> Idle`. The guard's check-and-mark runs
//! under one mutex so two concurrent `activate()` calls can never both fire.
//! The hold itself happens outside the lock and can be cut short by `stop()`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::relay::Relay;
use crate::ActuatorError;

/// Sprinkler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SprinklerConfig {
    /// BCM GPIO line driving the relay
    pub relay_pin: u32,

    /// Relay switches on when the line is high
    pub active_high: bool,

    /// How long one spray holds the relay (ms)
    pub spray_duration_ms: u64,

    /// Minimum time between the start of two sprays (ms)
    pub spray_cooldown_ms: u64,
}

impl Default for SprinklerConfig {
    fn default() -> Self {
        Self {
            relay_pin: 17,
            active_high: true,
            spray_duration_ms: 2000,
            spray_cooldown_ms: 5000,
        }
    }
}

impl SprinklerConfig {
    pub fn spray_duration(&self) -> Duration {
        Duration::from_millis(self.spray_duration_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.spray_cooldown_ms)
    }
}

/// Result of one `activate()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprayOutcome {
    /// The relay was engaged; `cancelled` when `stop()` cut the hold short
    Fired { cancelled: bool },

    /// Rejected: last spray started less than one cooldown ago
    SkippedCooldown { remaining: Duration },

    /// Rejected: a spray is already in progress
    SkippedBusy,

    /// `stop()` arrived before the relay engaged; nothing was dispensed
    Aborted,
}

impl SprayOutcome {
    pub fn fired(&self) -> bool {
        matches!(self, SprayOutcome::Fired { .. })
    }
}

/// Side-effect free view of whether `activate()` would fire now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Engaged,
    CoolingDown(Duration),
}

/// Timed dispenser capability
#[async_trait]
pub trait ActuatorPort: Send + Sync {
    /// Spray for the configured duration unless cooling down or busy
    async fn activate(&self) -> Result<SprayOutcome, ActuatorError>;

    /// Force the dispenser off from any state; idempotent
    async fn stop(&self) -> Result<(), ActuatorError>;

    /// Current readiness without side effects
    fn readiness(&self) -> Readiness;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Activating,
}

#[derive(Debug)]
struct Guard {
    phase: Phase,
    /// Engage instant of the last spray that actually fired
    last_activated_at: Option<Instant>,
    /// Identifies the activation that owns the current hold; `stop()` retires it
    session: u64,
    cancel: Option<Arc<Notify>>,
}

/// Relay-driven sprinkler owning the cooldown guard
pub struct Sprinkler {
    relay: Arc<dyn Relay>,
    spray_duration: Duration,
    cooldown: Duration,
    guard: Mutex<Guard>,
    /// Serializes relay switching with the ownership check
    switch: AsyncMutex<()>,
}

impl Sprinkler {
    pub fn new(relay: Arc<dyn Relay>, config: &SprinklerConfig) -> Self {
        info!(
            "Sprinkler ready: {}ms spray, {}ms cooldown",
            config.spray_duration_ms, config.spray_cooldown_ms
        );
        Self {
            relay,
            spray_duration: config.spray_duration(),
            cooldown: config.cooldown(),
            guard: Mutex::new(Guard {
                phase: Phase::Idle,
                last_activated_at: None,
                session: 0,
                cancel: None,
            }),
            switch: AsyncMutex::new(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Guard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_engaged(&self) -> bool {
        self.lock().phase == Phase::Activating
    }

    /// Check cooldown and busy, then mark the guard as activating
    fn try_begin(&self) -> Result<Begun, SprayOutcome> {
        let mut guard = self.lock();
        let now = Instant::now();

        if guard.phase == Phase::Activating {
            return Err(SprayOutcome::SkippedBusy);
        }
        if let Some(last) = guard.last_activated_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return Err(SprayOutcome::SkippedCooldown {
                    remaining: self.cooldown - elapsed,
                });
            }
        }

        let previous = guard.last_activated_at.replace(now);
        let cancel = Arc::new(Notify::new());
        guard.phase = Phase::Activating;
        guard.session += 1;
        guard.cancel = Some(cancel.clone());
        Ok(Begun {
            session: guard.session,
            cancel,
            marked_at: now,
            previous,
        })
    }

    fn owns(&self, session: u64) -> bool {
        let guard = self.lock();
        guard.session == session && guard.phase == Phase::Activating
    }

    /// Return to idle if `session` still owns the guard
    fn finish(&self, session: u64) {
        let mut guard = self.lock();
        if guard.session == session && guard.phase == Phase::Activating {
            guard.phase = Phase::Idle;
            guard.cancel = None;
        }
    }

    /// Undo the cooldown mark of an activation that never dispensed
    fn unmark(&self, begun: &Begun) {
        let mut guard = self.lock();
        if guard.last_activated_at == Some(begun.marked_at) {
            guard.last_activated_at = begun.previous;
        }
    }

    /// Retire whichever activation owns the guard and wake its hold
    fn retire(&self) {
        let cancel = {
            let mut guard = self.lock();
            guard.phase = Phase::Idle;
            guard.session += 1;
            guard.cancel.take()
        };
        if let Some(cancel) = cancel {
            debug!("Cancelling spray in progress");
            cancel.notify_one();
        }
    }
}

/// One activation that passed the guard
struct Begun {
    session: u64,
    cancel: Arc<Notify>,
    /// Instant recorded as `last_activated_at`
    marked_at: Instant,
    /// `last_activated_at` before this activation
    previous: Option<Instant>,
}

#[async_trait]
impl ActuatorPort for Sprinkler {
    async fn activate(&self) -> Result<SprayOutcome, ActuatorError> {
        let begun = match self.try_begin() {
            Ok(begun) => begun,
            Err(skipped) => {
                let reason = match skipped {
                    SprayOutcome::SkippedBusy => "busy",
                    _ => "cooldown",
                };
                debug!("Sprinkler activation skipped: {}", reason);
                counter!("rover_spray_skipped_total", "reason" => reason).increment(1);
                return Ok(skipped);
            }
        };

        {
            let _switch = self.switch.lock().await;
            if !self.owns(begun.session) {
                // stop() got in before the relay switched on
                self.unmark(&begun);
                debug!("Sprinkler activation aborted before engaging");
                return Ok(SprayOutcome::Aborted);
            }
            if let Err(e) = self.relay.engage().await {
                warn!("Sprinkler engage failed: {}. Forcing stop.", e);
                // Nothing was dispensed, so the cooldown window does not start
                self.unmark(&begun);
                self.retire();
                if let Err(stop_err) = self.relay.disengage().await {
                    warn!("Sprinkler disengage after failed engage also failed: {}", stop_err);
                }
                return Err(e);
            }
        }

        info!("Sprinkler ON for {}ms", self.spray_duration.as_millis());
        counter!("rover_sprays_total").increment(1);

        let cancelled = tokio::select! {
            _ = tokio::time::sleep(self.spray_duration) => false,
            _ = begun.cancel.notified() => true,
        };

        let _switch = self.switch.lock().await;
        if !self.owns(begun.session) {
            // stop() already switched the relay off; a newer spray may own it now
            info!("Sprinkler OFF (stopped early)");
            return Ok(SprayOutcome::Fired { cancelled: true });
        }
        let released = self.relay.disengage().await;
        self.finish(begun.session);

        if cancelled {
            info!("Sprinkler OFF (stopped early)");
        } else {
            info!("Sprinkler OFF");
        }
        released?;
        Ok(SprayOutcome::Fired { cancelled })
    }

    async fn stop(&self) -> Result<(), ActuatorError> {
        let _switch = self.switch.lock().await;
        self.retire();
        self.relay.disengage().await
    }

    fn readiness(&self) -> Readiness {
        let guard = self.lock();
        if guard.phase == Phase::Activating {
            return Readiness::Engaged;
        }
        match guard.last_activated_at {
            Some(last) => {
                let elapsed = Instant::now().saturating_duration_since(last);
                if elapsed < self.cooldown {
                    Readiness::CoolingDown(self.cooldown - elapsed)
                } else {
                    Readiness::Ready
                }
            }
            None => Readiness::Ready,
        }
    }
}
