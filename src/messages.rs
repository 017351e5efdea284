// Message types exchanged with the control side over zenoh

use serde::{Deserialize, Serialize};

use crate::kangaroo::DriverState;

// Velocity command from the controller -> driver, rad/s per joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointVelocityCommand {
    pub velocity: [f64; 2],
}

// Joint telemetry from driver -> controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub name: [String; 2],
    pub position: [f64; 2],
    pub velocity: [f64; 2],
}

impl JointState {
    /// Label a driver snapshot with the configured joint names
    pub fn new(names: &[String; 2], state: &DriverState) -> Self {
        Self {
            name: names.clone(),
            position: state.position,
            velocity: state.velocity,
        }
    }
}

/// Health status published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DriverHealth {
    Ok,
    CmdStale,
    Recovering,
}
