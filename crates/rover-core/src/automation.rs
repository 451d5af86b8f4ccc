//! Periodic automation loop
//!
//! Each cycle: bounded sensor read, state update, decision against the
//! latest fresh detections, actuation, telemetry. A spray runs on its own
//! task so the hold never stalls the cycle; the loop only tracks it.

use std::sync::Arc;
use std::time::Duration;

use actuators::{ActuatorPort, Readiness};
use metrics::{counter, gauge};
use range_sensor::{SensorError, SensorPort};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::decision::{decide, ControlConfig, Decision};
use crate::state::{RoverState, RoverStatus};
use crate::telemetry::{TelemetryHub, TelemetrySnapshot};

/// Default bound on one sensor read
const DEFAULT_SENSOR_TIMEOUT: Duration = Duration::from_millis(100);

/// What the cycle did with the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    /// Nothing to do
    None,
    /// A spray task was started
    Dispatched,
    /// Spray wanted but one is already in progress
    AlreadySpraying,
    /// Spray wanted but the actuator is cooling down
    CoolingDown(Duration),
    /// An engaged spray was stopped for safety
    Stopped,
}

/// Outcome of one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub distance_cm: Option<f64>,
    pub decision: Decision,
    pub actuation: Actuation,
    pub status: RoverStatus,
}

/// The control loop; owns distance and status writes
pub struct AutomationLoop {
    sensor: Arc<dyn SensorPort>,
    actuator: Arc<dyn ActuatorPort>,
    state: Arc<RoverState>,
    telemetry: Arc<TelemetryHub>,
    config: ControlConfig,
    sensor_timeout: Duration,
    cycle: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl AutomationLoop {
    pub fn new(
        sensor: Arc<dyn SensorPort>,
        actuator: Arc<dyn ActuatorPort>,
        state: Arc<RoverState>,
        telemetry: Arc<TelemetryHub>,
        config: ControlConfig,
    ) -> Self {
        Self {
            sensor,
            actuator,
            state,
            telemetry,
            config,
            sensor_timeout: DEFAULT_SENSOR_TIMEOUT,
            cycle: 0,
            in_flight: None,
        }
    }

    pub fn with_sensor_timeout(mut self, sensor_timeout: Duration) -> Self {
        self.sensor_timeout = sensor_timeout;
        self
    }

    async fn read_distance(&self) -> Option<f64> {
        let reading = match timeout(self.sensor_timeout, self.sensor.read()).await {
            Ok(reading) => reading,
            Err(_) => Err(SensorError::Timeout(self.sensor_timeout.as_millis() as u64)),
        };

        match reading {
            Ok(distance) => {
                gauge!("rover_distance_cm").set(distance.cm());
                Some(distance.cm())
            }
            Err(e) => {
                warn!("Sensor read failed: {}", e);
                counter!("rover_sensor_faults_total").increment(1);
                None
            }
        }
    }

    fn spray_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    fn dispatch_spray(&mut self) -> Actuation {
        if self.spray_in_flight() {
            return Actuation::AlreadySpraying;
        }
        match self.actuator.readiness() {
            Readiness::Engaged => Actuation::AlreadySpraying,
            Readiness::CoolingDown(remaining) => {
                debug!("Spray withheld: cooling down for {}ms", remaining.as_millis());
                Actuation::CoolingDown(remaining)
            }
            Readiness::Ready => {
                let actuator = self.actuator.clone();
                self.in_flight = Some(tokio::spawn(async move {
                    match actuator.activate().await {
                        Ok(outcome) => debug!("Spray finished: {:?}", outcome),
                        Err(e) => {
                            warn!("Spray failed: {}. Forcing stop.", e);
                            if let Err(e) = actuator.stop().await {
                                error!("Sprinkler stop failed: {}", e);
                            }
                        }
                    }
                }));
                self.telemetry.log("Auto-spray triggered");
                Actuation::Dispatched
            }
        }
    }

    async fn force_stop(&self) -> Actuation {
        if !self.spray_in_flight() && self.actuator.readiness() != Readiness::Engaged {
            return Actuation::None;
        }
        warn!("Stopping spray in progress");
        if let Err(e) = self.actuator.stop().await {
            error!("Sprinkler stop failed: {}", e);
        }
        Actuation::Stopped
    }

    /// Run one control cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let previous = self.state.status();

        let distance_cm = self.read_distance().await;
        self.state.update_distance(distance_cm);
        self.state.update_status(match distance_cm {
            Some(_) => RoverStatus::Scanning,
            None => RoverStatus::SensorFault,
        });

        let snapshot = self.state.snapshot();
        let age = snapshot.detections.age(Instant::now());
        let fresh = age.map_or(false, |age| age <= self.config.detection_max_age());
        let detections: &[detector::Detection] = if fresh {
            &snapshot.detections.detections
        } else {
            &[]
        };

        let decision = decide(distance_cm, detections, &self.config);
        let actuation = match decision {
            Decision::Spray => self.dispatch_spray(),
            Decision::WithholdTooClose => self.force_stop().await,
            _ if distance_cm.is_none() => self.force_stop().await,
            _ => Actuation::None,
        };

        let spraying = actuation == Actuation::Dispatched
            || self.spray_in_flight()
            || self.actuator.readiness() == Readiness::Engaged;
        let status = if distance_cm.is_none() {
            RoverStatus::SensorFault
        } else if decision == Decision::WithholdTooClose {
            RoverStatus::ObstacleBlocked
        } else if spraying {
            RoverStatus::Spraying
        } else {
            RoverStatus::Idle
        };

        self.state.update_status(status);
        if previous != status {
            match status {
                RoverStatus::ObstacleBlocked => {
                    warn!("Obstacle at {:.1}cm, spraying blocked", distance_cm.unwrap_or_default())
                }
                RoverStatus::SensorFault => warn!("Distance sensor fault, spraying suspended"),
                _ => info!("Status {} -> {}", previous.as_str(), status.as_str()),
            }
        }

        self.telemetry.publish(TelemetrySnapshot {
            timestamp: chrono::Utc::now(),
            distance_cm,
            status,
            detections: snapshot.detections.detections.as_ref().clone(),
            detections_fresh: fresh,
            detections_age_ms: age.map(|age| age.as_millis() as u64),
            detections_generation: snapshot.detections.generation,
            decision,
            cycle: self.cycle,
        });

        debug!(
            "Cycle {}: distance={:?} decision={:?} status={:?}",
            self.cycle, distance_cm, decision, status
        );

        CycleReport {
            cycle: self.cycle,
            distance_cm,
            decision,
            actuation,
            status,
        }
    }

    /// Start the loop on its own task at the configured period
    pub fn spawn(self) -> AutomationHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        AutomationHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Automation loop started ({}ms period)", self.config.period_ms);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        if let Err(e) = self.actuator.stop().await {
            error!("Sprinkler stop on shutdown failed: {}", e);
        }
        if let Some(task) = self.in_flight.take() {
            let _ = task.await;
        }
        info!("Automation loop stopped after {} cycles", self.cycle);
    }
}

/// Running automation loop
pub struct AutomationHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutomationHandle {
    /// Stop the loop, stop any spray in progress and wait for both
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Automation loop task failed: {}", e);
        }
    }
}
