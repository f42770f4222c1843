// strategy/src/events.rs

use crate::{
    orchestrator::{RecoveryAction, StepOutcome},
    venue::{VenueHandle, VenueKind},
};
use custody_core::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// Record appended by every orchestrator state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorEvent {
    pub ts: Timestamp,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    AssetsConfigured {
        base: Address,
        quote: Address,
    },
    OperatorSet {
        previous: Address,
        operator: Address,
    },
    Deposited {
        user: Address,
        asset: Address,
        amount: Amount,
    },
    Withdrawn {
        user: Address,
        asset: Address,
        amount: Amount,
    },
    Retracted {
        venue: VenueKind,
        base: Amount,
        quote: Amount,
    },
    Provisioned {
        venue: VenueKind,
        handle: VenueHandle,
        base: Amount,
        quote: Amount,
    },
    /// One emergency sub-step, successful or not
    RecoveryStep {
        action: RecoveryAction,
        outcome: StepOutcome,
    },
    EmergencyCompleted {
        previous: Option<VenueKind>,
        failures: usize,
    },
}

impl OrchestratorEvent {
    pub fn new(ts: Timestamp, kind: EventKind) -> Self {
        Self { ts, kind }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::RecoveryStep {
                outcome: StepOutcome::Failed(_),
                ..
            }
        )
    }
}
