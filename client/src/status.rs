//! Connection status of the WebSocket and of the robot behind it
//!
//! The robot side is inferred from a heartbeat topic: the server can stay reachable while
//! robot code is stopped, so a silent heartbeat marks the robot disconnected on its own.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotState {
    Unknown,
    Connected,
    Disconnected,
}

#[derive(Debug)]
pub struct StatusTracker {
    transport: TransportState,
    robot: RobotState,
    last_heartbeat: Option<Instant>,
    robot_timeout: Duration,
}

impl StatusTracker {
    pub fn new(robot_timeout: Duration) -> StatusTracker {
        StatusTracker {
            transport: TransportState::Disconnected,
            robot: RobotState::Unknown,
            last_heartbeat: None,
            robot_timeout,
        }
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn robot(&self) -> RobotState {
        self.robot
    }

    pub fn is_connected(&self) -> bool {
        self.transport == TransportState::Connected
    }

    pub fn is_robot_connected(&self) -> bool {
        self.robot == RobotState::Connected
    }

    /// Moves the transport state machine. A transport disconnect takes the robot down with it.
    pub fn set_transport(&mut self, state: TransportState) {
        if self.transport == state {
            return;
        }
        log::debug!("Transport {:?} -> {:?}", self.transport, state);
        self.transport = state;

        if state == TransportState::Disconnected {
            self.last_heartbeat = None;
            if self.robot == RobotState::Connected {
                self.robot = RobotState::Disconnected;
            }
        }
    }

    pub fn heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = Some(now);
        if self.robot != RobotState::Connected {
            log::info!("Robot heartbeat received, robot connected");
            self.robot = RobotState::Connected;
        }
    }

    /// Expires the robot connection when the heartbeat has been silent for too long
    pub fn check(&mut self, now: Instant) {
        if self.robot != RobotState::Connected {
            return;
        }
        let silent = self
            .last_heartbeat
            .map_or(true, |last| now.saturating_duration_since(last) > self.robot_timeout);
        if silent {
            log::warn!(
                "No robot heartbeat for more than {:?}, robot disconnected",
                self.robot_timeout
            );
            self.robot = RobotState::Disconnected;
        }
    }
}
