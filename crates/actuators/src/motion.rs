//! Differential drive motion
//!
//! Two motor channels (left, right), each with a forward and a backward
//! direction pin on an H-bridge and a PWM enable for speed. Turning is done
//! in place by running the sides in opposite directions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gpio::{GpioPin, PwmChannel, SYSFS_GPIO_ROOT, SYSFS_PWM_ROOT};
use crate::MotionError;

/// Motion command direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }

    /// Signed (left, right) wheel directions
    fn wheels(&self) -> (i8, i8) {
        match self {
            Direction::Forward => (1, 1),
            Direction::Backward => (-1, -1),
            Direction::Left => (-1, 1),
            Direction::Right => (1, -1),
            Direction::Stop => (0, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "stop" => Ok(Direction::Stop),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Directional motion capability
#[async_trait]
pub trait MotionPort: Send + Sync {
    /// Apply a direction at `speed` in [0, 1]
    async fn drive(&self, direction: Direction, speed: f32) -> Result<(), MotionError>;
}

fn check_speed(speed: f32) -> Result<f32, MotionError> {
    if speed.is_finite() && (0.0..=1.0).contains(&speed) {
        Ok(speed)
    } else {
        Err(MotionError::InvalidSpeed(speed))
    }
}

/// Motor driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub left_forward_pin: u32,
    pub left_backward_pin: u32,
    pub right_forward_pin: u32,
    pub right_backward_pin: u32,

    /// sysfs PWM chip index
    pub pwm_chip: u32,
    pub left_pwm_channel: u32,
    pub right_pwm_channel: u32,

    /// PWM period (ns); 1 kHz by default
    pub pwm_period_ns: u64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            left_forward_pin: 23,
            left_backward_pin: 24,
            right_forward_pin: 27,
            right_backward_pin: 22,
            pwm_chip: 0,
            left_pwm_channel: 0,
            right_pwm_channel: 1,
            pwm_period_ns: 1_000_000,
        }
    }
}

/// Motor driver that only records and logs commands (no motors attached)
#[derive(Debug, Default)]
pub struct LoggingMotorDriver {
    last: Mutex<Option<(Direction, f32)>>,
}

impl LoggingMotorDriver {
    pub fn new() -> Self {
        info!("Initializing motor driver (logging only)");
        Self::default()
    }

    /// Most recent accepted command
    pub fn last_command(&self) -> Option<(Direction, f32)> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MotionPort for LoggingMotorDriver {
    async fn drive(&self, direction: Direction, speed: f32) -> Result<(), MotionError> {
        let speed = check_speed(speed)?;
        info!("MOTORS: {} at {:.0}%", direction, speed * 100.0);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some((direction, speed));
        Ok(())
    }
}

/// One side of the drive: H-bridge direction pins plus PWM enable
struct MotorChannel {
    forward: GpioPin,
    backward: GpioPin,
    pwm: PwmChannel,
}

impl MotorChannel {
    async fn apply(&self, sign: i8, speed: f32) -> Result<(), MotionError> {
        // Release both pins before raising one so the bridge never shorts
        self.forward.set(false).await?;
        self.backward.set(false).await?;
        match sign {
            1 => self.forward.set(true).await?,
            -1 => self.backward.set(true).await?,
            _ => {}
        }
        let duty = if sign == 0 { 0.0 } else { speed };
        self.pwm.set_duty(duty).await?;
        Ok(())
    }
}

/// Differential drive on sysfs GPIO and PWM
pub struct GpioMotorDriver {
    left: MotorChannel,
    right: MotorChannel,
}

impl GpioMotorDriver {
    /// Claim the pins under the standard sysfs roots
    pub async fn open(config: &MotorConfig) -> Result<Self, MotionError> {
        Self::open_at(
            PathBuf::from(SYSFS_GPIO_ROOT),
            PathBuf::from(SYSFS_PWM_ROOT),
            config,
        )
        .await
    }

    pub async fn open_at(
        gpio_root: PathBuf,
        pwm_root: PathBuf,
        config: &MotorConfig,
    ) -> Result<Self, MotionError> {
        let channel = |forward: u32, backward: u32, pwm: u32| {
            let gpio_root = gpio_root.clone();
            let pwm_root = pwm_root.clone();
            async move {
                Ok::<_, MotionError>(MotorChannel {
                    forward: GpioPin::output(&gpio_root, forward, false).await?,
                    backward: GpioPin::output(&gpio_root, backward, false).await?,
                    pwm: PwmChannel::open(&pwm_root, config.pwm_chip, pwm, config.pwm_period_ns)
                        .await?,
                })
            }
        };

        let left = channel(
            config.left_forward_pin,
            config.left_backward_pin,
            config.left_pwm_channel,
        )
        .await?;
        let right = channel(
            config.right_forward_pin,
            config.right_backward_pin,
            config.right_pwm_channel,
        )
        .await?;

        info!(
            "Motor driver ready on GPIO {}/{} {}/{}, pwmchip{}",
            config.left_forward_pin,
            config.left_backward_pin,
            config.right_forward_pin,
            config.right_backward_pin,
            config.pwm_chip
        );
        Ok(Self { left, right })
    }
}

#[async_trait]
impl MotionPort for GpioMotorDriver {
    async fn drive(&self, direction: Direction, speed: f32) -> Result<(), MotionError> {
        let speed = check_speed(speed)?;
        let (left, right) = direction.wheels();
        debug!("Drive {} at {:.2}", direction, speed);
        self.left.apply(left, speed).await?;
        self.right.apply(right, speed).await?;
        Ok(())
    }
}
