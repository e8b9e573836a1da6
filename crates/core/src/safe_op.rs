//! Boolean wrapper for call sites that would rather log a failure than
//! propagate it.

use tracing::error;

/// Run `op`; on failure log the full error chain and return `false`.
pub fn perform_safe_op<T, E, F>(op: F) -> bool
where
    F: FnOnce() -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    match op() {
        Ok(_) => true,
        Err(err) => {
            let err: anyhow::Error = err.into();
            error!(error = %format!("{err:#}"), "Operation failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;
    use crate::blob::StridedBlob;
    use crate::error::TensorError;

    #[test]
    fn test_success_returns_true() {
        assert!(perform_safe_op(|| StridedBlob::new(vec![0u8; 4], vec![2, 2])));
    }

    #[test]
    fn test_tensor_error_returns_false() {
        assert!(!perform_safe_op(|| StridedBlob::new(vec![0u8; 3], vec![2, 2])));
        assert!(!perform_safe_op(|| -> Result<(), TensorError> {
            Err(TensorError::EmptyBatch)
        }));
    }

    #[test]
    fn test_anyhow_chain_returns_false() {
        assert!(!perform_safe_op(|| {
            std::fs::read("/nonexistent/tensorprep/input.bin").context("failed to read input")
        }));
    }
}
