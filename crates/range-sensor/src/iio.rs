//! IIO-backed ultrasonic sensor
//!
//! The kernel driver owns the trigger/echo pins; userspace reads the
//! measurement through sysfs. Units after applying the scale are meters.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{Distance, SensorConfig, SensorError, SensorPort};

/// Scale used when the driver does not expose `in_distance_scale` (millimeters)
const DEFAULT_SCALE_M: f64 = 0.001;

/// Ultrasonic sensor read through `in_distance_raw`
pub struct IioRangeSensor {
    raw_path: PathBuf,
    scale_m: f64,
    timeout: Duration,
    max_range_cm: f64,
}

impl IioRangeSensor {
    /// Open the IIO device named in the configuration
    pub async fn open(config: &SensorConfig) -> Result<Self, SensorError> {
        let device = config.iio_device.as_path();
        let raw_path = device.join("in_distance_raw");
        if tokio::fs::metadata(&raw_path).await.is_err() {
            return Err(SensorError::Hardware(format!(
                "{} does not exist",
                raw_path.display()
            )));
        }

        let scale_m = read_scale(device).await;
        info!(
            "Opened IIO range sensor at {} (scale {} m/unit)",
            device.display(),
            scale_m
        );

        Ok(Self {
            raw_path,
            scale_m,
            timeout: config.timeout(),
            max_range_cm: config.max_range_cm,
        })
    }

    async fn read_raw(&self) -> Result<f64, SensorError> {
        let text = tokio::fs::read_to_string(&self.raw_path).await?;
        text.trim()
            .parse::<f64>()
            .map_err(|_| SensorError::InvalidReading(text.trim().to_string()))
    }
}

async fn read_scale(device: &Path) -> f64 {
    match tokio::fs::read_to_string(device.join("in_distance_scale")).await {
        Ok(text) => match text.trim().parse::<f64>() {
            Ok(scale) if scale > 0.0 => scale,
            _ => {
                warn!("Unparseable in_distance_scale {:?}, assuming millimeters", text.trim());
                DEFAULT_SCALE_M
            }
        },
        Err(_) => DEFAULT_SCALE_M,
    }
}

#[async_trait]
impl SensorPort for IioRangeSensor {
    async fn read(&self) -> Result<Distance, SensorError> {
        let raw = timeout(self.timeout, self.read_raw())
            .await
            .map_err(|_| SensorError::Timeout(self.timeout.as_millis() as u64))??;

        let cm = raw * self.scale_m * 100.0;
        debug!("IIO range raw={} -> {:.1}cm", raw, cm);
        Distance::from_cm(cm, self.max_range_cm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_device(name: &str, raw: &str, scale: Option<&str>) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rover-iio-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("in_distance_raw"), raw).unwrap();
        if let Some(scale) = scale {
            std::fs::write(dir.join("in_distance_scale"), scale).unwrap();
        }
        dir
    }

    fn config_for(dir: PathBuf) -> SensorConfig {
        SensorConfig {
            iio_device: dir,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reads_millimeters_by_default() {
        let dir = fake_device("mm", "523\n", None);
        let sensor = IioRangeSensor::open(&config_for(dir)).await.unwrap();
        let distance = sensor.read().await.unwrap();
        assert!((distance.cm() - 52.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_applies_driver_scale() {
        let dir = fake_device("scale", "12\n", Some("0.010000\n"));
        let sensor = IioRangeSensor::open(&config_for(dir)).await.unwrap();
        let distance = sensor.read().await.unwrap();
        assert!((distance.cm() - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_garbage_reading_is_an_error() {
        let dir = fake_device("garbage", "EIO\n", None);
        let sensor = IioRangeSensor::open(&config_for(dir)).await.unwrap();
        assert!(matches!(
            sensor.read().await,
            Err(SensorError::InvalidReading(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_reading_rejected() {
        let dir = fake_device("far", "9000\n", None);
        let sensor = IioRangeSensor::open(&config_for(dir)).await.unwrap();
        assert!(matches!(sensor.read().await, Err(SensorError::OutOfRange(_))));
    }

    #[tokio::test]
    async fn test_missing_device() {
        let config = config_for(PathBuf::from("/nonexistent/iio:device9"));
        assert!(matches!(
            IioRangeSensor::open(&config).await,
            Err(SensorError::Hardware(_))
        ));
    }
}
