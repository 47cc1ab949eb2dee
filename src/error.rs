use thiserror::Error;

/// Failures surfaced by the graphics host or the simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FluidError {
    /// No drawing context, or no usable render-target format. Fatal to the simulation.
    #[error("graphics capability missing: {0}")]
    CapabilityMissing(String),

    #[error("failed to allocate {label} ({width}x{height}): {reason}")]
    AllocationFailure {
        label: String,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("graphics backend error: {0}")]
    Backend(String),

    /// The presentation surface must be reconfigured before the next frame.
    #[error("presentation surface lost")]
    SurfaceLost,
}

impl FluidError {
    pub fn allocation(label: impl Into<String>, width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::AllocationFailure {
            label: label.into(),
            width,
            height,
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SurfaceLost)
    }
}

pub type FluidResult<T> = Result<T, FluidError>;
