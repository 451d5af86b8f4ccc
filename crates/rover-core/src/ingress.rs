//! Operator command ingress
//!
//! Manual commands bypass the decision engine and go straight to the motion
//! port. Anything that does not parse into a valid command is dropped.

use std::sync::Arc;

use actuators::{ActuatorPort, Direction, MotionPort};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Speed used when a command carries none
pub const DEFAULT_SPEED: f32 = 1.0;

/// Command as received on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCommand {
    /// Direction name; older dashboards send it as `command`
    #[serde(alias = "command")]
    pub action: String,

    /// Speed in [0, 1]
    #[serde(default)]
    pub speed: Option<f32>,
}

/// What happened to a command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IngressOutcome {
    Applied { direction: Direction, speed: f32 },
    Ignored { reason: String },
    Failed { reason: String },
}

/// Validates operator commands and forwards them to the motors
pub struct CommandIngress {
    motion: Arc<dyn MotionPort>,
    actuator: Arc<dyn ActuatorPort>,
}

impl CommandIngress {
    pub fn new(motion: Arc<dyn MotionPort>, actuator: Arc<dyn ActuatorPort>) -> Self {
        Self { motion, actuator }
    }

    fn ignore(reason: String) -> IngressOutcome {
        warn!("Ignoring command: {}", reason);
        counter!("rover_commands_total", "result" => "ignored").increment(1);
        IngressOutcome::Ignored { reason }
    }

    /// Handle a JSON-encoded command
    pub async fn handle_json(&self, text: &str) -> IngressOutcome {
        match serde_json::from_str::<RawCommand>(text) {
            Ok(command) => self.handle(command).await,
            Err(e) => Self::ignore(format!("malformed command: {}", e)),
        }
    }

    /// Validate and apply one command
    pub async fn handle(&self, command: RawCommand) -> IngressOutcome {
        let direction = match command.action.parse::<Direction>() {
            Ok(direction) => direction,
            Err(reason) => return Self::ignore(reason),
        };
        let speed = command.speed.unwrap_or(DEFAULT_SPEED);
        if !speed.is_finite() || !(0.0..=1.0).contains(&speed) {
            return Self::ignore(format!("speed {} outside [0, 1]", speed));
        }

        if direction == Direction::Stop {
            // Stop means stop everything, including a spray in progress
            if let Err(e) = self.actuator.stop().await {
                error!("Sprinkler stop failed: {}", e);
            }
        }

        match self.motion.drive(direction, speed).await {
            Ok(()) => {
                debug!("Applied {} at {:.2}", direction, speed);
                counter!("rover_commands_total", "result" => "applied").increment(1);
                IngressOutcome::Applied { direction, speed }
            }
            Err(e) => {
                error!("Motor command {} failed: {}", direction, e);
                counter!("rover_commands_total", "result" => "failed").increment(1);
                IngressOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Stop motors and sprinkler, used on shutdown
    pub async fn halt(&self) {
        info!("Halting motors and sprinkler");
        if let Err(e) = self.motion.drive(Direction::Stop, 0.0).await {
            error!("Motor stop failed: {}", e);
        }
        if let Err(e) = self.actuator.stop().await {
            error!("Sprinkler stop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actuators::{LoggingMotorDriver, SimulatedRelay, Sprinkler, SprinklerConfig};
    use std::time::Duration;

    struct Rig {
        ingress: CommandIngress,
        motors: Arc<LoggingMotorDriver>,
        sprinkler: Arc<Sprinkler>,
        relay: Arc<SimulatedRelay>,
    }

    fn rig() -> Rig {
        let motors = Arc::new(LoggingMotorDriver::new());
        let relay = Arc::new(SimulatedRelay::new());
        let sprinkler = Arc::new(Sprinkler::new(relay.clone(), &SprinklerConfig::default()));
        Rig {
            ingress: CommandIngress::new(motors.clone(), sprinkler.clone()),
            motors,
            sprinkler,
            relay,
        }
    }

    #[tokio::test]
    async fn test_valid_commands_reach_motors() {
        let rig = rig();

        let outcome = rig.ingress.handle_json(r#"{"action":"forward","speed":0.4}"#).await;
        assert_eq!(
            outcome,
            IngressOutcome::Applied {
                direction: Direction::Forward,
                speed: 0.4
            }
        );
        assert_eq!(rig.motors.last_command(), Some((Direction::Forward, 0.4)));

        // Legacy field name, default speed
        rig.ingress.handle_json(r#"{"command":"left"}"#).await;
        assert_eq!(rig.motors.last_command(), Some((Direction::Left, 1.0)));
    }

    #[tokio::test]
    async fn test_invalid_commands_are_ignored() {
        let rig = rig();
        rig.ingress.handle_json(r#"{"action":"right","speed":0.5}"#).await;

        for text in [
            "not json",
            r#"{"speed":0.5}"#,
            r#"{"action":"jump"}"#,
            r#"{"action":"forward","speed":1.5}"#,
            r#"{"action":"forward","speed":-0.1}"#,
        ] {
            assert!(
                matches!(rig.ingress.handle_json(text).await, IngressOutcome::Ignored { .. }),
                "{} was not ignored",
                text
            );
        }
        assert_eq!(rig.motors.last_command(), Some((Direction::Right, 0.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cuts_spray_immediately() {
        let rig = rig();
        let spray = tokio::spawn({
            let sprinkler = rig.sprinkler.clone();
            async move { sprinkler.activate().await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rig.relay.is_engaged());

        let outcome = rig.ingress.handle_json(r#"{"action":"stop"}"#).await;
        assert!(matches!(outcome, IngressOutcome::Applied { direction: Direction::Stop, .. }));
        assert!(!rig.relay.is_engaged());
        assert_eq!(rig.motors.last_command(), Some((Direction::Stop, 1.0)));

        let outcome = spray.await.unwrap().unwrap();
        assert_eq!(outcome, actuators::SprayOutcome::Fired { cancelled: true });
    }

    #[test]
    fn test_outcome_wire_format() {
        let json = serde_json::to_value(IngressOutcome::Applied {
            direction: Direction::Backward,
            speed: 0.5,
        })
        .unwrap();
        assert_eq!(json["result"], "applied");
        assert_eq!(json["direction"], "backward");
    }
}
