use crate::field::FieldId;
use crate::kernel::Kernel;

/// Errors raised while configuring or stepping a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load kernel {kernel}: {message}")]
    KernelLoad { kernel: Kernel, message: String },

    #[error("compute device error: {0}")]
    Device(String),

    #[error("invalid recipe at step {step} ({op}): {message}")]
    Recipe {
        step: usize,
        op: String,
        message: String,
    },

    #[error("{kernel} reads field {field:?} before a barrier published its last write")]
    MissingBarrier { kernel: Kernel, field: FieldId },

    #[error("{kernel} reads and writes field {field:?} in the same dispatch")]
    Aliased { kernel: Kernel, field: FieldId },

    #[error("{kernel} expects {expected} inputs, got {got}")]
    Arity {
        kernel: Kernel,
        expected: usize,
        got: usize,
    },

    #[error("unknown field handle {0:?}")]
    UnknownField(FieldId),

    #[error("readback failed: {0}")]
    Readback(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SimError::Config(message.into())
    }
}
