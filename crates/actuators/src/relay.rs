//! Dispenser relay boundary

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::gpio::GpioPin;
use crate::ActuatorError;

/// On/off switch in front of the pump or valve
#[async_trait]
pub trait Relay: Send + Sync {
    /// Start dispensing
    async fn engage(&self) -> Result<(), ActuatorError>;

    /// Stop dispensing; must be safe to call when already off
    async fn disengage(&self) -> Result<(), ActuatorError>;
}

/// Relay module on a sysfs GPIO line
pub struct SysfsRelay {
    pin: GpioPin,
    active_high: bool,
}

impl SysfsRelay {
    /// Claim the line with the relay initially off
    pub async fn open(root: &Path, pin: u32, active_high: bool) -> Result<Self, ActuatorError> {
        let line = GpioPin::output(root, pin, !active_high)
            .await
            .map_err(|e| ActuatorError::Gpio {
                pin,
                reason: e.to_string(),
            })?;
        info!(
            "Sprinkler relay on GPIO {} ({})",
            pin,
            if active_high { "active high" } else { "active low" }
        );
        Ok(Self {
            pin: line,
            active_high,
        })
    }

    async fn drive(&self, on: bool) -> Result<(), ActuatorError> {
        self.pin
            .set(on == self.active_high)
            .await
            .map_err(|e| ActuatorError::Gpio {
                pin: self.pin.pin(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Relay for SysfsRelay {
    async fn engage(&self) -> Result<(), ActuatorError> {
        self.drive(true).await
    }

    async fn disengage(&self) -> Result<(), ActuatorError> {
        self.drive(false).await
    }
}

/// In-memory relay for the simulated backend and tests
#[derive(Debug, Default)]
pub struct SimulatedRelay {
    engaged: AtomicBool,
    engage_count: AtomicU32,
    fail_engage: AtomicBool,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    /// Number of successful engage calls
    pub fn engage_count(&self) -> u32 {
        self.engage_count.load(Ordering::SeqCst)
    }

    /// Make subsequent engage calls fail (fault injection)
    pub fn set_fail_engage(&self, fail: bool) {
        self.fail_engage.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Relay for SimulatedRelay {
    async fn engage(&self) -> Result<(), ActuatorError> {
        if self.fail_engage.load(Ordering::SeqCst) {
            return Err(ActuatorError::Relay("simulated engage fault".to_string()));
        }
        self.engage_count.fetch_add(1, Ordering::SeqCst);
        self.engaged.store(true, Ordering::SeqCst);
        debug!("[SIM] Relay ON");
        Ok(())
    }

    async fn disengage(&self) -> Result<(), ActuatorError> {
        self.engaged.store(false, Ordering::SeqCst);
        debug!("[SIM] Relay OFF");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::tests::{fake_sysfs, read};

    #[tokio::test]
    async fn test_active_high_relay() {
        let root = fake_sysfs("relay-high", &[17], &[]);
        let gpio = root.join("gpio");

        let relay = SysfsRelay::open(&gpio, 17, true).await.unwrap();
        assert_eq!(read(gpio.join("gpio17/direction")), "low");

        relay.engage().await.unwrap();
        assert_eq!(read(gpio.join("gpio17/value")), "1");
        relay.disengage().await.unwrap();
        assert_eq!(read(gpio.join("gpio17/value")), "0");
    }

    #[tokio::test]
    async fn test_active_low_relay() {
        let root = fake_sysfs("relay-low", &[18], &[]);
        let gpio = root.join("gpio");

        let relay = SysfsRelay::open(&gpio, 18, false).await.unwrap();
        assert_eq!(read(gpio.join("gpio18/direction")), "high");

        relay.engage().await.unwrap();
        assert_eq!(read(gpio.join("gpio18/value")), "0");
        relay.disengage().await.unwrap();
        assert_eq!(read(gpio.join("gpio18/value")), "1");
    }

    #[tokio::test]
    async fn test_simulated_relay_fault() {
        let relay = SimulatedRelay::new();
        relay.set_fail_engage(true);
        assert!(relay.engage().await.is_err());
        assert!(!relay.is_engaged());
        assert_eq!(relay.engage_count(), 0);

        relay.set_fail_engage(false);
        relay.engage().await.unwrap();
        assert!(relay.is_engaged());
        assert_eq!(relay.engage_count(), 1);
    }
}
