//! End-to-end spray cycle scenarios

use std::sync::Arc;
use std::time::Duration;

use actuators::{
    ActuatorPort, LoggingMotorDriver, SimulatedRelay, SprayOutcome, Sprinkler, SprinklerConfig,
};
use async_trait::async_trait;
use camera_capture::SyntheticCamera;
use detector::{BoundingBox, Detection, DetectorConfig, VegetationIndexDetector};
use range_sensor::{Distance, SensorError, SensorPort};
use rover_core::{
    Actuation, AutomationLoop, ControlConfig, Decision, IngressOutcome, Ports, Rover, RoverState,
    RoverStatus, TelemetryHub, Timing,
};

/// Always reports the same distance
struct FixedSensor(f64);

#[async_trait]
impl SensorPort for FixedSensor {
    async fn read(&self) -> Result<Distance, SensorError> {
        Distance::from_cm(self.0, 400.0)
    }
}

fn target() -> Detection {
    Detection {
        label: "pest".to_string(),
        confidence: 0.8,
        bbox: BoundingBox::new(100.0, 100.0, 180.0, 160.0),
        class_id: 1,
    }
}

fn scenario_config() -> (ControlConfig, SprinklerConfig) {
    let control = ControlConfig {
        min_spray_distance_cm: 20.0,
        max_spray_distance_cm: 100.0,
        obstacle_stop_distance_cm: 10.0,
        ..Default::default()
    };
    let sprinkler = SprinklerConfig {
        spray_duration_ms: 2000,
        spray_cooldown_ms: 5000,
        ..Default::default()
    };
    (control, sprinkler)
}

#[tokio::test(start_paused = true)]
async fn spray_is_rate_limited_by_cooldown() {
    let (control, sprinkler_config) = scenario_config();
    let relay = Arc::new(SimulatedRelay::new());
    let sprinkler = Arc::new(Sprinkler::new(relay.clone(), &sprinkler_config));
    let state = Arc::new(RoverState::new());
    let telemetry = Arc::new(TelemetryHub::new());
    let mut automation = AutomationLoop::new(
        Arc::new(FixedSensor(50.0)),
        sprinkler.clone(),
        state.clone(),
        telemetry,
        control,
    );

    let start = tokio::time::Instant::now();
    let cycle_at = |secs: u64| {
        let state = state.clone();
        async move {
            tokio::time::sleep_until(start + Duration::from_secs(secs)).await;
            state.replace_detections(vec![target()]);
        }
    };

    // t=0: target in range, sprinkler ready
    cycle_at(0).await;
    let report = automation.run_cycle().await;
    assert_eq!(report.decision, Decision::Spray);
    assert_eq!(report.actuation, Actuation::Dispatched);
    tokio::task::yield_now().await;
    assert_eq!(relay.engage_count(), 1);

    // t=1: still holding, no second activation. The loop sees the spray
    // in flight and does not ask again; asked directly, the guard refuses.
    cycle_at(1).await;
    let report = automation.run_cycle().await;
    assert_eq!(report.decision, Decision::Spray);
    assert_eq!(report.actuation, Actuation::AlreadySpraying);
    assert_eq!(report.status, RoverStatus::Spraying);
    assert_eq!(sprinkler.activate().await.unwrap(), SprayOutcome::SkippedBusy);
    assert_eq!(relay.engage_count(), 1);

    // t=3: hold finished, cooldown until t=5
    cycle_at(3).await;
    assert!(!relay.is_engaged());
    let report = automation.run_cycle().await;
    assert!(matches!(report.actuation, Actuation::CoolingDown(_)));
    assert_eq!(report.status, RoverStatus::Idle);
    assert!(matches!(
        sprinkler.activate().await.unwrap(),
        SprayOutcome::SkippedCooldown { .. }
    ));
    assert_eq!(relay.engage_count(), 1);

    // t=6: cooldown elapsed
    cycle_at(6).await;
    let report = automation.run_cycle().await;
    assert_eq!(report.actuation, Actuation::Dispatched);
    tokio::task::yield_now().await;
    assert_eq!(relay.engage_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn obstacle_overrides_target() {
    let (control, sprinkler_config) = scenario_config();
    let relay = Arc::new(SimulatedRelay::new());
    let state = Arc::new(RoverState::new());
    let mut automation = AutomationLoop::new(
        Arc::new(FixedSensor(8.0)),
        Arc::new(Sprinkler::new(relay.clone(), &sprinkler_config)),
        state.clone(),
        Arc::new(TelemetryHub::new()),
        control,
    );

    state.replace_detections(vec![target()]);
    let report = automation.run_cycle().await;
    assert_eq!(report.decision, Decision::WithholdTooClose);
    assert_eq!(report.status, RoverStatus::ObstacleBlocked);
    assert_eq!(relay.engage_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manual_stop_disengages_running_spray() {
    let (mut control, sprinkler_config) = scenario_config();
    control.period_ms = 50;

    let relay = Arc::new(SimulatedRelay::new());
    let motors = Arc::new(LoggingMotorDriver::new());
    let ports = Ports {
        sensor: Arc::new(FixedSensor(50.0)),
        camera: Box::new(SyntheticCamera::new(160, 120)),
        detector: Box::new(VegetationIndexDetector::new(&DetectorConfig::default())),
        actuator: Arc::new(Sprinkler::new(relay.clone(), &sprinkler_config)),
        motion: motors.clone(),
    };
    let rover = Rover::start(
        ports,
        control,
        Timing {
            sensor_timeout: Duration::from_millis(100),
            frame_interval: Duration::from_millis(20),
        },
    );

    // The synthetic camera always shows a plant; wait for the first spray
    let engaged = tokio::time::timeout(Duration::from_secs(5), async {
        while !relay.is_engaged() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(engaged.is_ok(), "sprinkler never engaged");

    let outcome = rover.ingress.handle_json(r#"{"action":"stop"}"#).await;
    assert!(matches!(outcome, IngressOutcome::Applied { .. }));
    assert!(!relay.is_engaged());
    assert_eq!(relay.engage_count(), 1);

    let latest = rover.telemetry.latest().expect("telemetry published");
    assert_eq!(latest.distance_cm, Some(50.0));

    rover.shutdown().await;
    assert!(!relay.is_engaged());
    assert_eq!(
        motors.last_command(),
        Some((actuators::Direction::Stop, 0.0))
    );
}
