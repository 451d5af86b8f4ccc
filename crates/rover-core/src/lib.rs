//! Rover Coordination Core
//!
//! Ties the rover's ports into one closed control cycle:
//! - Frame pipeline: camera -> detector -> shared detections + preview
//! - Automation loop: sensor -> decision -> sprinkler -> telemetry
//! - Command ingress: operator commands -> motors
//!
//! Ports are constructed once by the caller and injected here; nothing in
//! this crate knows which backend sits behind them.

pub mod automation;
pub mod decision;
pub mod ingress;
pub mod pipeline;
pub mod state;
pub mod telemetry;

pub use automation::{Actuation, AutomationHandle, AutomationLoop, CycleReport};
pub use decision::{decide, ControlConfig, Decision};
pub use ingress::{CommandIngress, IngressOutcome, RawCommand};
pub use pipeline::{FramePipeline, JpegFrame};
pub use state::{DetectionSet, RoverState, RoverStatus, StateSnapshot};
pub use telemetry::{RoverEvent, TelemetryHub, TelemetrySnapshot};

use std::sync::Arc;
use std::time::Duration;

use actuators::{ActuatorPort, MotionPort};
use camera_capture::FrameSource;
use detector::DetectionPort;
use range_sensor::SensorPort;
use tokio::sync::watch;
use tracing::{error, info};

/// Every port the core needs, built once at startup
pub struct Ports {
    pub sensor: Arc<dyn SensorPort>,
    pub camera: Box<dyn FrameSource>,
    pub detector: Box<dyn DetectionPort>,
    pub actuator: Arc<dyn ActuatorPort>,
    pub motion: Arc<dyn MotionPort>,
}

/// Timing knobs owned by the ports' configs
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub sensor_timeout: Duration,
    pub frame_interval: Duration,
}

/// The running rover
pub struct Rover {
    pub state: Arc<RoverState>,
    pub telemetry: Arc<TelemetryHub>,
    pub ingress: Arc<CommandIngress>,
    automation: AutomationHandle,
    pipeline: FramePipeline,
}

impl Rover {
    /// Start the frame pipeline and the automation loop.
    ///
    /// Must be called from within a tokio runtime, exactly once per process.
    pub fn start(ports: Ports, control: ControlConfig, timing: Timing) -> Self {
        let state = Arc::new(RoverState::new());
        let telemetry = Arc::new(TelemetryHub::new());
        let ingress = Arc::new(CommandIngress::new(
            ports.motion.clone(),
            ports.actuator.clone(),
        ));

        let pipeline = FramePipeline::spawn(
            ports.camera,
            ports.detector,
            state.clone(),
            timing.frame_interval,
        );

        let automation = AutomationLoop::new(
            ports.sensor,
            ports.actuator,
            state.clone(),
            telemetry.clone(),
            control,
        )
        .with_sensor_timeout(timing.sensor_timeout)
        .spawn();

        info!("Rover started");
        Self {
            state,
            telemetry,
            ingress,
            automation,
            pipeline,
        }
    }

    /// Latest annotated camera preview
    pub fn preview(&self) -> watch::Receiver<Option<JpegFrame>> {
        self.pipeline.preview()
    }

    /// Stop the loops, then the motors and the sprinkler
    pub async fn shutdown(self) {
        info!("Stopping rover...");
        self.automation.shutdown().await;

        let pipeline = self.pipeline;
        if let Err(e) = tokio::task::spawn_blocking(move || pipeline.shutdown()).await {
            error!("Frame pipeline shutdown failed: {}", e);
        }

        self.ingress.halt().await;
        info!("Shutdown complete.");
    }
}
