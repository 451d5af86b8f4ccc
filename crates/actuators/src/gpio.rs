//! Linux sysfs GPIO and PWM lines
//!
//! Thin wrappers over `/sys/class/gpio` and `/sys/class/pwm`. Roots are
//! injectable so the drivers can be exercised against a scratch directory.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Default sysfs GPIO root
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Default sysfs PWM root
pub const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

/// One exported GPIO output line
#[derive(Debug, Clone)]
pub struct GpioPin {
    pin: u32,
    value_path: PathBuf,
}

impl GpioPin {
    /// Export `pin` (if needed) and configure it as an output at `initial` level
    pub async fn output(root: &Path, pin: u32, initial: bool) -> io::Result<Self> {
        let line = root.join(format!("gpio{}", pin));
        if tokio::fs::metadata(&line).await.is_err() {
            debug!("Exporting GPIO {}", pin);
            tokio::fs::write(root.join("export"), pin.to_string()).await?;
        }

        // "high"/"low" set the direction and the initial level in one write
        let direction = if initial { "high" } else { "low" };
        tokio::fs::write(line.join("direction"), direction).await?;

        Ok(Self {
            pin,
            value_path: line.join("value"),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Drive the line high or low
    pub async fn set(&self, high: bool) -> io::Result<()> {
        tokio::fs::write(&self.value_path, if high { "1" } else { "0" }).await
    }
}

/// One PWM channel of a sysfs PWM chip
#[derive(Debug, Clone)]
pub struct PwmChannel {
    channel_dir: PathBuf,
    period_ns: u64,
}

impl PwmChannel {
    /// Export the channel, set its period and enable it at 0% duty
    pub async fn open(root: &Path, chip: u32, channel: u32, period_ns: u64) -> io::Result<Self> {
        let chip_dir = root.join(format!("pwmchip{}", chip));
        let channel_dir = chip_dir.join(format!("pwm{}", channel));
        if tokio::fs::metadata(&channel_dir).await.is_err() {
            debug!("Exporting PWM {}:{}", chip, channel);
            tokio::fs::write(chip_dir.join("export"), channel.to_string()).await?;
        }

        let pwm = Self {
            channel_dir,
            period_ns,
        };
        tokio::fs::write(pwm.channel_dir.join("duty_cycle"), "0").await?;
        tokio::fs::write(pwm.channel_dir.join("period"), period_ns.to_string()).await?;
        tokio::fs::write(pwm.channel_dir.join("enable"), "1").await?;
        Ok(pwm)
    }

    /// Set the duty cycle as a fraction of the period
    pub async fn set_duty(&self, fraction: f32) -> io::Result<()> {
        let duty = (self.period_ns as f64 * f64::from(fraction.clamp(0.0, 1.0))).round() as u64;
        tokio::fs::write(self.channel_dir.join("duty_cycle"), duty.to_string()).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Scratch sysfs tree with pre-exported GPIO lines and PWM channels
    pub(crate) fn fake_sysfs(name: &str, pins: &[u32], pwm_channels: &[u32]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("rover-sysfs-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        for pin in pins {
            std::fs::create_dir_all(root.join(format!("gpio/gpio{}", pin))).unwrap();
        }
        for channel in pwm_channels {
            std::fs::create_dir_all(root.join(format!("pwm/pwmchip0/pwm{}", channel))).unwrap();
        }
        std::fs::create_dir_all(root.join("gpio")).unwrap();
        std::fs::create_dir_all(root.join("pwm")).unwrap();
        root
    }

    pub(crate) fn read(path: PathBuf) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_gpio_output_and_set() {
        let root = fake_sysfs("gpio", &[17], &[]);
        let gpio = root.join("gpio");

        let pin = GpioPin::output(&gpio, 17, false).await.unwrap();
        assert_eq!(read(gpio.join("gpio17/direction")), "low");

        pin.set(true).await.unwrap();
        assert_eq!(read(gpio.join("gpio17/value")), "1");
        pin.set(false).await.unwrap();
        assert_eq!(read(gpio.join("gpio17/value")), "0");
    }

    #[tokio::test]
    async fn test_gpio_exports_missing_line() {
        let root = fake_sysfs("export", &[], &[]);
        let gpio = root.join("gpio");

        // Nothing creates gpio5/ here, so configuring it fails after the export write
        assert!(GpioPin::output(&gpio, 5, false).await.is_err());
        assert_eq!(read(gpio.join("export")), "5");
    }

    #[tokio::test]
    async fn test_pwm_duty() {
        let root = fake_sysfs("pwm", &[], &[1]);
        let pwm_root = root.join("pwm");

        let pwm = PwmChannel::open(&pwm_root, 0, 1, 1_000_000).await.unwrap();
        let dir = pwm_root.join("pwmchip0/pwm1");
        assert_eq!(read(dir.join("period")), "1000000");
        assert_eq!(read(dir.join("enable")), "1");

        pwm.set_duty(0.25).await.unwrap();
        assert_eq!(read(dir.join("duty_cycle")), "250000");
        pwm.set_duty(3.0).await.unwrap();
        assert_eq!(read(dir.join("duty_cycle")), "1000000");
    }
}
