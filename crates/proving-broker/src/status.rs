use serde::Serialize;

use crate::errors::BrokerError;

/// Status of a job held by the broker.
///
/// ## State Transitions
///
/// - `Queued` -> `InProgress`: an agent picked the job up.
/// - `InProgress` -> `Completed`: the agent reported a proof.
/// - `InProgress` -> `Queued`: the agent reported a retriable failure and retries remain.
/// - `Failed` -> `Queued`: the same request was enqueued again after a final failure.
/// - Any state -> `Failed`: final failure or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProvingJobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl ProvingJobStatus {
    /// Attempts to move to `target`, leaving the status untouched if the transition is invalid.
    pub fn transition(&mut self, target: ProvingJobStatus) -> Result<(), BrokerError> {
        use ProvingJobStatus::*;

        let is_valid = matches!(
            (*self, target),
            (_, Failed)
                | (Queued, InProgress)
                | (InProgress, Completed)
                | (InProgress, Queued)
                | (Failed, Queued)
        );

        if is_valid {
            *self = target;
            Ok(())
        } else {
            Err(BrokerError::InvalidStatusTransition(*self, target))
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, ProvingJobStatus::Completed | ProvingJobStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_to_failed() {
        for mut current in [
            ProvingJobStatus::Queued,
            ProvingJobStatus::InProgress,
            ProvingJobStatus::Completed,
            ProvingJobStatus::Failed,
        ] {
            let original = current;
            assert!(
                current.transition(ProvingJobStatus::Failed).is_ok(),
                "failed to transition {original:?} to Failed"
            );
            assert_eq!(current, ProvingJobStatus::Failed);
        }
    }

    #[test]
    fn test_happy_path() {
        let mut status = ProvingJobStatus::Queued;
        status.transition(ProvingJobStatus::InProgress).unwrap();
        status.transition(ProvingJobStatus::Completed).unwrap();
        assert!(status.is_settled());
    }

    #[test]
    fn test_retry_path() {
        let mut status = ProvingJobStatus::InProgress;
        status.transition(ProvingJobStatus::Queued).unwrap();
        status.transition(ProvingJobStatus::InProgress).unwrap();
        assert!(!status.is_settled());
    }

    #[test]
    fn test_invalid_transitions() {
        let invalid = [
            (ProvingJobStatus::Completed, ProvingJobStatus::Queued),
            (ProvingJobStatus::Completed, ProvingJobStatus::InProgress),
            (ProvingJobStatus::Queued, ProvingJobStatus::Completed),
            (ProvingJobStatus::Failed, ProvingJobStatus::InProgress),
        ];

        for (current, target) in invalid {
            let mut status = current;
            let res = status.transition(target);
            assert!(
                matches!(res, Err(BrokerError::InvalidStatusTransition(from, to)) if from == current && to == target),
                "transition from {current:?} to {target:?} should be invalid"
            );
            assert_eq!(status, current, "status must not change on invalid transition");
        }
    }
}
