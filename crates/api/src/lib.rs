//! Rover Backend Server
//!
//! HTTP and WebSocket front end for the rover dashboard. Builds the ports
//! from configuration, starts the rover core and serves telemetry, manual
//! control, the camera preview and Prometheus metrics.

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod config;
mod routes;

pub use config::{ConfigError, HardwareBackend, LoggingConfig, RoverConfig};

use actuators::{
    ActuatorError, GpioMotorDriver, LoggingMotorDriver, MotionError, MotionPort, Relay,
    SimulatedRelay, Sprinkler, SysfsRelay,
};
use camera_capture::CameraError;
use detector::DetectionError;
use range_sensor::{IioRangeSensor, SensorError, SensorPort, SimulatedRangeSensor};
use rover_core::{CommandIngress, JpegFrame, Ports, Rover, RoverState, TelemetryHub, Timing};

/// Startup and serving errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Sensor setup failed: {0}")]
    Sensor(#[from] SensorError),

    #[error("Camera setup failed: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector setup failed: {0}")]
    Detector(#[from] DetectionError),

    #[error("Sprinkler setup failed: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Motor setup failed: {0}")]
    Motion(#[from] MotionError),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers
pub struct AppState {
    pub state: Arc<RoverState>,
    pub telemetry: Arc<TelemetryHub>,
    pub ingress: Arc<CommandIngress>,
    /// Latest annotated camera frame
    pub preview: watch::Receiver<Option<JpegFrame>>,
    /// Prometheus render handle, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Flips to true when the server starts shutting down
    pub closing: watch::Receiver<bool>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        rover: &Rover,
        metrics: Option<PrometheusHandle>,
        closing: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state: rover.state.clone(),
            telemetry: rover.telemetry.clone(),
            ingress: rover.ingress.clone(),
            preview: rover.preview(),
            metrics,
            closing,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::telemetry::banner))
        .route("/api/v1/health", get(routes::telemetry::health))
        .route("/api/v1/telemetry", get(routes::telemetry::latest))
        .route("/api/v1/control", post(routes::control::control))
        .route("/api/v1/frame", get(routes::video::frame))
        .route("/video_feed", get(routes::video::video_feed))
        .route("/ws", get(routes::ws::ws_handler))
        .route("/metrics", get(routes::telemetry::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    }
}

/// Construct every port for the configured backend
pub async fn build_ports(config: &RoverConfig) -> Result<Ports, ApiError> {
    let (sensor, relay, motion): (Arc<dyn SensorPort>, Arc<dyn Relay>, Arc<dyn MotionPort>) =
        match config.hardware.backend {
            HardwareBackend::Simulated => {
                info!("Using simulated hardware");
                let sensor: Arc<dyn SensorPort> = Arc::new(SimulatedRangeSensor::new(&config.sensor));
                let relay: Arc<dyn Relay> = Arc::new(SimulatedRelay::new());
                let motion: Arc<dyn MotionPort> = Arc::new(LoggingMotorDriver::new());
                (sensor, relay, motion)
            }
            HardwareBackend::Sysfs => {
                let sensor: Arc<dyn SensorPort> = Arc::new(IioRangeSensor::open(&config.sensor).await?);

                // Without a working relay or motors the rover can still
                // observe; it just cannot act.
                let relay: Arc<dyn Relay> = match SysfsRelay::open(
                    Path::new(actuators::gpio::SYSFS_GPIO_ROOT),
                    config.sprinkler.relay_pin,
                    config.sprinkler.active_high,
                )
                .await
                {
                    Ok(relay) => Arc::new(relay),
                    Err(e) => {
                        warn!("Failed to initialize sprinkler GPIO: {}. Using simulated relay.", e);
                        Arc::new(SimulatedRelay::new())
                    }
                };
                let motion: Arc<dyn MotionPort> = match GpioMotorDriver::open(&config.motors).await {
                    Ok(driver) => Arc::new(driver),
                    Err(e) => {
                        warn!("Failed to initialize motor driver: {}. Logging commands only.", e);
                        Arc::new(LoggingMotorDriver::new())
                    }
                };
                (sensor, relay, motion)
            }
        };

    Ok(Ports {
        sensor,
        camera: camera_capture::open(&config.camera)?,
        detector: detector::open(&config.detector)?,
        actuator: Arc::new(Sprinkler::new(relay, &config.sprinkler)),
        motion,
    })
}

async fn shutdown_signal(closing: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    closing.send_replace(true);
}

/// Run the server until Ctrl-C
pub async fn run_server(config: RoverConfig) -> Result<(), ApiError> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))?;

    let ports = build_ports(&config).await?;
    let rover = Rover::start(
        ports,
        config.control.clone(),
        Timing {
            sensor_timeout: config.sensor.timeout(),
            frame_interval: config.camera.frame_interval(),
        },
    );

    let (closing_tx, closing_rx) = watch::channel(false);
    let state = Arc::new(AppState::new(&rover, Some(metrics), closing_rx.clone()));
    let app = create_router(state);

    info!("Starting API server on {}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    tokio::spawn(shutdown_signal(closing_tx));

    let mut closed = closing_rx;
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = closed.wait_for(|closing| *closing).await;
        })
        .await;

    rover.shutdown().await;
    result.map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actuators::SprinklerConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use rover_core::{Decision, RoverStatus, TelemetrySnapshot};
    use serde_json::Value;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: Arc<AppState>,
        preview: watch::Sender<Option<JpegFrame>>,
        _closing: watch::Sender<bool>,
    }

    fn harness() -> Harness {
        let relay: Arc<dyn Relay> = Arc::new(SimulatedRelay::new());
        let sprinkler = Arc::new(Sprinkler::new(relay, &SprinklerConfig::default()));
        let (preview, preview_rx) = watch::channel(None);
        let (closing, closing_rx) = watch::channel(false);

        let state = Arc::new(AppState {
            state: Arc::new(RoverState::new()),
            telemetry: Arc::new(TelemetryHub::new()),
            ingress: Arc::new(CommandIngress::new(
                Arc::new(LoggingMotorDriver::new()),
                sprinkler,
            )),
            preview: preview_rx,
            metrics: None,
            closing: closing_rx,
            version: "test".to_string(),
            start_time: Instant::now(),
        });

        Harness {
            app: create_router(state.clone()),
            state,
            preview,
            _closing: closing,
        }
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn post_control(app: &Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/control")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_banner_links_video_feed() {
        let h = harness();
        let (status, body) = get(&h.app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("/video_feed"));
    }

    #[tokio::test]
    async fn test_health_reports_sensor_fault_as_degraded() {
        let h = harness();
        let (status, body) = get(&h.app, "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "healthy");
        assert!(health["distance_cm"].is_null());

        h.state.state.update_distance(None);
        h.state.state.update_status(RoverStatus::SensorFault);
        let (_, body) = get(&h.app, "/api/v1/health").await;
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["rover_status"], "SensorFault");
    }

    #[tokio::test]
    async fn test_telemetry_unavailable_until_published() {
        let h = harness();
        let (status, _) = get(&h.app, "/api/v1/telemetry").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        h.state.telemetry.publish(TelemetrySnapshot {
            timestamp: chrono::Utc::now(),
            distance_cm: Some(42.0),
            status: RoverStatus::Idle,
            detections: Vec::new(),
            detections_fresh: false,
            detections_age_ms: None,
            detections_generation: 0,
            decision: Decision::WithholdNoTarget,
            cycle: 3,
        });

        let (status, body) = get(&h.app, "/api/v1/telemetry").await;
        assert_eq!(status, StatusCode::OK);
        let telemetry: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(telemetry["distance_cm"], 42.0);
        assert_eq!(telemetry["cycle"], 3);
    }

    #[tokio::test]
    async fn test_control_applies_and_rejects() {
        let h = harness();

        let (status, outcome) = post_control(&h.app, r#"{"action":"forward","speed":0.5}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["result"], "applied");
        assert_eq!(outcome["direction"], "forward");

        let (status, outcome) = post_control(&h.app, r#"{"action":"jump"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome["result"], "ignored");

        let (status, outcome) = post_control(&h.app, "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome["result"], "ignored");
    }

    #[tokio::test]
    async fn test_frame_served_once_available() {
        let h = harness();
        let (status, _) = get(&h.app, "/api/v1/frame").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        h.preview
            .send_replace(Some(Arc::new(vec![0xFF, 0xD8, 0xFF, 0xD9])));
        let response = h
            .app
            .clone()
            .oneshot(Request::get("/api/v1/frame").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn test_metrics_absent_without_recorder() {
        let h = harness();
        let (status, _) = get(&h.app, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
