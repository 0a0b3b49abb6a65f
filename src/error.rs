//! Error types for tensorloop

use crate::dtype::DType;
use thiserror::Error;

/// Result type alias using tensorloop's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building operands, dispatching kernels, or
/// reading results back.
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch in an operation
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Shapes cannot be broadcast together
    #[error("Cannot broadcast shapes {lhs:?} and {rhs:?}")]
    BroadcastError {
        /// Left-hand side shape
        lhs: Vec<usize>,
        /// Right-hand side shape
        rhs: Vec<usize>,
    },

    /// DType mismatch between an operand and the requested element type
    #[error("DType mismatch: {lhs:?} vs {rhs:?}")]
    DTypeMismatch {
        /// Left-hand side dtype
        lhs: DType,
        /// Right-hand side dtype
        rhs: DType,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Operand count does not match the function's arity
    #[error("Arity mismatch in {op}: expected {expected} operands, got {got}")]
    ArityMismatch {
        /// Dispatch entry point that detected the mismatch
        op: &'static str,
        /// Operand count required by the function signature
        expected: usize,
        /// Operand count supplied by the iterator
        got: usize,
    },

    /// Operand is not resident on the parallel device
    #[error("Operand {operand} is not resident on a device")]
    NotOnDevice {
        /// Index of the offending operand
        operand: usize,
    },

    /// Device mismatch between operands
    #[error("Device mismatch: operand {operand} is on device {got}, expected {expected}")]
    DeviceMismatch {
        /// Index of the offending operand
        operand: usize,
        /// Device id of operand 0
        expected: usize,
        /// Device id of the offending operand
        got: usize,
    },

    /// Iteration space cannot be addressed with the native 32-bit index
    #[error("{numel} elements exceed the native index width (limit {limit})")]
    IndexWidthExceeded {
        /// Total number of elements in the iteration space
        numel: usize,
        /// Largest addressable index
        limit: u64,
    },

    /// Launch geometry rejected by the device
    #[error("Invalid launch configuration for kernel '{kernel}': {reason}")]
    InvalidLaunch {
        /// Kernel name
        kernel: &'static str,
        /// Why the geometry was rejected
        reason: String,
    },

    /// Asynchronous fault raised by a previously enqueued kernel
    #[error("Device fault on stream {stream}: {message}")]
    DeviceFault {
        /// Stream the faulting kernel was enqueued on
        stream: u64,
        /// Fault description
        message: String,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Malformed or truncated pickle stream
    #[error("Pickle error: {0}")]
    Pickle(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create a broadcast error
    pub fn broadcast(lhs: &[usize], rhs: &[usize]) -> Self {
        Self::BroadcastError {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create a pickle error
    pub fn pickle(reason: impl Into<String>) -> Self {
        Self::Pickle(reason.into())
    }

    /// Returns true for errors raised asynchronously by the device
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::DeviceFault { .. } | Self::InvalidLaunch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ArityMismatch {
            op: "launch_elementwise",
            expected: 3,
            got: 2,
        };
        assert_eq!(
            err.to_string(),
            "Arity mismatch in launch_elementwise: expected 3 operands, got 2"
        );

        let err = Error::IndexWidthExceeded {
            numel: 10,
            limit: 7,
        };
        assert!(err.to_string().contains("limit 7"));
    }

    #[test]
    fn test_device_fault_classification() {
        let fault = Error::DeviceFault {
            stream: 0,
            message: "boom".into(),
        };
        assert!(fault.is_device_fault());
        assert!(!Error::NotOnDevice { operand: 1 }.is_device_fault());
    }
}
