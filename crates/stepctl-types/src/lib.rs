use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// errno values used as command status codes.
pub mod errno {
    pub const ENOEXEC: i32 = 8;
    pub const EIO: i32 = 5;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ECANCELED: i32 = 125;
}

/// Micro-step resolution of a stepper driver, expressed as the number of
/// micro-steps per full step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum MicroStepResolution {
    Full,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    OneTwentyEighth,
    TwoFiftySixth,
}

impl MicroStepResolution {
    /// All resolutions, coarsest first.
    pub const ALL: [MicroStepResolution; 9] = [
        MicroStepResolution::Full,
        MicroStepResolution::Half,
        MicroStepResolution::Quarter,
        MicroStepResolution::Eighth,
        MicroStepResolution::Sixteenth,
        MicroStepResolution::ThirtySecond,
        MicroStepResolution::SixtyFourth,
        MicroStepResolution::OneTwentyEighth,
        MicroStepResolution::TwoFiftySixth,
    ];

    /// Micro-steps per full step.
    pub fn divisor(self) -> u32 {
        match self {
            MicroStepResolution::Full => 1,
            MicroStepResolution::Half => 2,
            MicroStepResolution::Quarter => 4,
            MicroStepResolution::Eighth => 8,
            MicroStepResolution::Sixteenth => 16,
            MicroStepResolution::ThirtySecond => 32,
            MicroStepResolution::SixtyFourth => 64,
            MicroStepResolution::OneTwentyEighth => 128,
            MicroStepResolution::TwoFiftySixth => 256,
        }
    }
}

impl TryFrom<u32> for MicroStepResolution {
    type Error = StepperError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|res| res.divisor() == value)
            .ok_or_else(|| StepperError::InvalidArgument {
                what: "micro-step resolution".to_string(),
                value: value.to_string(),
            })
    }
}

impl From<MicroStepResolution> for u32 {
    fn from(res: MicroStepResolution) -> Self {
        res.divisor()
    }
}

impl fmt::Display for MicroStepResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.divisor())
    }
}

/// Rotation direction of a stepper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Negative,
    Positive,
}

impl Direction {
    /// Look up a direction by its name (`positive` / `negative`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "positive" => Some(Direction::Positive),
            "negative" => Some(Direction::Negative),
            _ => None,
        }
    }

    /// Signed unit step for this direction.
    pub fn sign(self) -> i32 {
        match self {
            Direction::Negative => -1,
            Direction::Positive => 1,
        }
    }
}

impl TryFrom<i64> for Direction {
    type Error = StepperError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Negative),
            1 => Ok(Direction::Positive),
            other => Err(StepperError::InvalidArgument {
                what: "direction".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Negative => write!(f, "negative"),
            Direction::Positive => write!(f, "positive"),
        }
    }
}

/// Result code posted by a driver when a motion request ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalResult {
    /// Every requested step was executed.
    StepsCompleted,
    StallDetected,
    LeftEndStopDetected,
    RightEndStopDetected,
    /// Motion was stopped before reaching its target.
    Stopped,
}

impl SignalResult {
    /// Numeric code, as reported by the driver.
    pub fn code(self) -> i32 {
        match self {
            SignalResult::StepsCompleted => 0,
            SignalResult::StallDetected => 1,
            SignalResult::LeftEndStopDetected => 2,
            SignalResult::RightEndStopDetected => 3,
            SignalResult::Stopped => 4,
        }
    }
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SignalResult::StepsCompleted => "steps completed",
            SignalResult::StallDetected => "stall detected",
            SignalResult::LeftEndStopDetected => "left end stop detected",
            SignalResult::RightEndStopDetected => "right end stop detected",
            SignalResult::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// Error type shared by the driver layer and the command shell.
///
/// Every variant maps onto an errno-style status code via
/// [`StepperError::code`], which is what a command reports as its result.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepperError {
    #[error("Stepper device {0} not found")]
    DeviceNotFound(String),

    #[error("Invalid {what} value: {value}")]
    InvalidArgument { what: String, value: String },

    /// A driver call returned a non-zero error code.
    #[error("Error: {0}")]
    OperationFailed(i32),

    #[error("Cannot start poll thread: {0}")]
    ListenerStartFailed(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Wrong parameter count for {command}, usage: {command} {usage}")]
    MissingArguments { command: String, usage: String },
}

impl StepperError {
    /// Negative errno-style status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            StepperError::DeviceNotFound(_) => -errno::ENODEV,
            StepperError::InvalidArgument { .. }
            | StepperError::UnknownCommand(_)
            | StepperError::MissingArguments { .. } => -errno::EINVAL,
            StepperError::OperationFailed(code) => *code,
            StepperError::ListenerStartFailed(_) => -errno::ENOEXEC,
        }
    }
}
