//! Fatal fault reporting seam.
//!
//! Integrity mismatches and medium failures are security-relevant conditions
//! that must reach the platform's alert/countermeasure path. The controller
//! only reports; reacting (alerts, escalation, reset policy) is the
//! collaborator's job. Sinks must not panic and must not re-enter the
//! controller.

use core::fmt;

use crate::layout::PartitionId;
use crate::medium::MediumError;

/// A fatal condition detected by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Recomputed digest disagrees with the stored digest.
    IntegrityMismatch { partition: PartitionId },
    /// The storage collaborator failed an array access.
    MediumFailure {
        partition: PartitionId,
        error: MediumError,
    },
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::IntegrityMismatch { partition } => {
                write!(f, "Integrity mismatch in partition {:?}", partition)
            }
            FaultKind::MediumFailure { partition, error } => {
                write!(f, "Medium failure in partition {:?}: {}", partition, error)
            }
        }
    }
}

/// Receiver for fatal faults.
pub trait FaultSink {
    fn on_fault(&self, fault: FaultKind);
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate alloc;
    use alloc::format;

    #[test]
    fn test_fault_display() {
        let fault = FaultKind::IntegrityMismatch {
            partition: PartitionId::Secret2,
        };
        assert!(format!("{}", fault).contains("Secret2"));
    }
}
