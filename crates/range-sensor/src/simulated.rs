//! Simulated ranging sensor for runs without hardware

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::{Distance, SensorConfig, SensorError, SensorPort};

/// Returns uniformly distributed readings inside a configured band
pub struct SimulatedRangeSensor {
    rng: Mutex<StdRng>,
    min_cm: f64,
    max_cm: f64,
    max_range_cm: f64,
}

impl SimulatedRangeSensor {
    /// Create a simulated sensor seeded from entropy
    pub fn new(config: &SensorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a reproducible simulated sensor
    pub fn seeded(config: &SensorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SensorConfig, rng: StdRng) -> Self {
        let min_cm = config.simulated_min_cm.min(config.simulated_max_cm);
        let max_cm = config.simulated_min_cm.max(config.simulated_max_cm);
        info!("Creating simulated range sensor ({:.0}-{:.0}cm)", min_cm, max_cm);
        Self {
            rng: Mutex::new(rng),
            min_cm,
            max_cm,
            max_range_cm: config.max_range_cm,
        }
    }
}

#[async_trait]
impl SensorPort for SimulatedRangeSensor {
    async fn read(&self) -> Result<Distance, SensorError> {
        let cm = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|e| SensorError::Hardware(format!("Lock error: {}", e)))?;
            if self.max_cm > self.min_cm {
                rng.gen_range(self.min_cm..self.max_cm)
            } else {
                self.min_cm
            }
        };
        Distance::from_cm(cm, self.max_range_cm)
    }
}
