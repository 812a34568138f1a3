use std::sync::Arc;

use thiserror::Error;

use crate::position::ParameterId;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HmcError {
    #[error("Step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),
    #[error("The number of leapfrog steps per trajectory must be at least one")]
    InvalidLeapfrogSteps,
    #[error("The number of steps between samples must be at least one")]
    InvalidStepsBetweenSamples,
    #[error("Target acceptance rate must lie in (0, 1), got {0}")]
    InvalidTargetAccept(f64),
    #[error("Invalid mass matrix: {0}")]
    InvalidMass(String),
    #[error("Invalid bounds for `{id}`[{index}]: lower {lower} must be below upper {upper}")]
    InvalidBounds {
        id: ParameterId,
        index: usize,
        lower: f64,
        upper: f64,
    },

    #[error("Parameter `{id}` has dimension {found}, expected {expected}")]
    DimensionMismatch {
        id: ParameterId,
        expected: usize,
        found: usize,
    },
    #[error("Parameter `{0}` is not part of the parameter layout")]
    UnknownParameter(ParameterId),
    #[error("Parameter `{0}` is missing")]
    MissingParameter(ParameterId),
    #[error("Flat vector has length {found}, expected {expected}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Could not draw an initial position from the priors")]
    PriorSample(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Burn-in failed")]
    BurnInFailed(#[source] Arc<HmcError>),
    #[error("Could not start the telemetry thread")]
    TelemetryThread(#[source] std::io::Error),
}

impl HmcError {
    /// Whether the error was caused by invalid sampler settings or bounds.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            HmcError::InvalidStepSize(_)
                | HmcError::InvalidLeapfrogSteps
                | HmcError::InvalidStepsBetweenSamples
                | HmcError::InvalidTargetAccept(_)
                | HmcError::InvalidMass(_)
                | HmcError::InvalidBounds { .. }
        )
    }

    /// Whether a position did not match the canonical parameter layout.
    pub fn is_dimension_mismatch(&self) -> bool {
        match self {
            HmcError::DimensionMismatch { .. }
            | HmcError::UnknownParameter(_)
            | HmcError::MissingParameter(_)
            | HmcError::LengthMismatch { .. } => true,
            HmcError::BurnInFailed(inner) => inner.is_dimension_mismatch(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, HmcError>;
