use serde::{Deserialize, Serialize};

/// Phase of the refinement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    #[default]
    Generating,
    Critiquing,
    Evaluating,
    Succeeded,
    FailedIterationBoundExceeded,
    FailedHardError,
}

/// Things that move the loop from one phase to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    ArtifactProduced,
    GenerationFailed,
    CritiqueProduced,
    CritiqueFailed,
    ScoreAboveThreshold,
    ScoreBelowThreshold { iterations_remain: bool },
}

impl LoopPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoopPhase::Succeeded
                | LoopPhase::FailedIterationBoundExceeded
                | LoopPhase::FailedHardError
        )
    }

    /// Phase after `event`, or `None` if the event is not valid here.
    pub fn next(self, event: PhaseEvent) -> Option<LoopPhase> {
        use LoopPhase::*;
        use PhaseEvent::*;

        match (self, event) {
            (Generating, ArtifactProduced) => Some(Critiquing),
            (Generating, GenerationFailed) => Some(FailedHardError),
            (Critiquing, CritiqueProduced) => Some(Evaluating),
            (Critiquing, CritiqueFailed) => Some(FailedHardError),
            (Evaluating, ScoreAboveThreshold) => Some(Succeeded),
            (Evaluating, ScoreBelowThreshold { iterations_remain: true }) => Some(Generating),
            (Evaluating, ScoreBelowThreshold { iterations_remain: false }) => {
                Some(FailedIterationBoundExceeded)
            }
            // Unparseable scores surface as a critique failure during evaluation
            (Evaluating, CritiqueFailed) => Some(FailedHardError),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let phase = LoopPhase::default();
        assert_eq!(phase, LoopPhase::Generating);
        let phase = phase.next(PhaseEvent::ArtifactProduced).unwrap();
        assert_eq!(phase, LoopPhase::Critiquing);
        let phase = phase.next(PhaseEvent::CritiqueProduced).unwrap();
        assert_eq!(phase, LoopPhase::Evaluating);
        let phase = phase.next(PhaseEvent::ScoreAboveThreshold).unwrap();
        assert_eq!(phase, LoopPhase::Succeeded);
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_below_threshold_loops_or_exhausts() {
        assert_eq!(
            LoopPhase::Evaluating.next(PhaseEvent::ScoreBelowThreshold {
                iterations_remain: true
            }),
            Some(LoopPhase::Generating)
        );
        assert_eq!(
            LoopPhase::Evaluating.next(PhaseEvent::ScoreBelowThreshold {
                iterations_remain: false
            }),
            Some(LoopPhase::FailedIterationBoundExceeded)
        );
    }

    #[test]
    fn test_failures_are_hard_errors() {
        assert_eq!(
            LoopPhase::Generating.next(PhaseEvent::GenerationFailed),
            Some(LoopPhase::FailedHardError)
        );
        assert_eq!(
            LoopPhase::Critiquing.next(PhaseEvent::CritiqueFailed),
            Some(LoopPhase::FailedHardError)
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(LoopPhase::Generating.next(PhaseEvent::CritiqueProduced), None);
        assert_eq!(LoopPhase::Critiquing.next(PhaseEvent::ScoreAboveThreshold), None);
        assert_eq!(LoopPhase::Succeeded.next(PhaseEvent::ArtifactProduced), None);
        assert_eq!(LoopPhase::FailedHardError.next(PhaseEvent::ArtifactProduced), None);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!LoopPhase::Generating.is_terminal());
        assert!(!LoopPhase::Critiquing.is_terminal());
        assert!(!LoopPhase::Evaluating.is_terminal());
        assert!(LoopPhase::FailedIterationBoundExceeded.is_terminal());
        assert!(LoopPhase::FailedHardError.is_terminal());
    }
}
