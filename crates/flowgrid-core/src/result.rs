use crate::fixed::{FLOW_EPSILON, Fixed64, FlowAmount};
use crate::id::FlowKindId;
use serde::{Deserialize, Serialize};

/// Completion state of a container mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueState {
    /// The operation has not been resolved yet.
    Incomplete,
    /// The full desired amount was applied.
    Completed,
    /// Only part of the desired amount fit; the rest was never taken.
    CompletedWithExcess,
    /// Less than the desired amount was available.
    CompletedWithShortage,
    /// Nothing was applied.
    Failed,
}

/// Signed change applied to one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindDelta {
    pub kind: FlowKindId,
    pub delta: Fixed64,
}

/// Outcome of a container mutation. Always returned by value; rejection is
/// an ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueResult {
    pub state: ValueState,
    pub desired: FlowAmount,
    pub actual: FlowAmount,
    pub deltas: Vec<KindDelta>,
}

impl ValueResult {
    /// Start an unresolved result for `desired`.
    pub fn begin(desired: FlowAmount) -> Self {
        Self {
            state: ValueState::Incomplete,
            desired,
            actual: Fixed64::ZERO,
            deltas: Vec::new(),
        }
    }

    /// A result that applied nothing.
    pub fn failed(desired: FlowAmount) -> Self {
        Self {
            state: ValueState::Failed,
            ..Self::begin(desired)
        }
    }

    /// Record a signed delta for `kind`, merging with an existing entry.
    pub fn with_delta(mut self, kind: FlowKindId, delta: Fixed64) -> Self {
        self.push_delta(kind, delta);
        self
    }

    pub(crate) fn push_delta(&mut self, kind: FlowKindId, delta: Fixed64) {
        if let Some(existing) = self.deltas.iter_mut().find(|d| d.kind == kind) {
            existing.delta += delta;
        } else {
            self.deltas.push(KindDelta { kind, delta });
        }
    }

    /// Resolve with `actual` applied. The state is `Completed` even when
    /// `actual` fell short; the shortfall stays visible through
    /// [`shortfall`](Self::shortfall).
    pub fn complete(mut self, actual: FlowAmount) -> Self {
        self.actual = actual;
        self.state = ValueState::Completed;
        self
    }

    /// Resolve an operation clamped by the receiving side. Short of
    /// `desired` means the rest did not fit.
    pub fn complete_clamped(mut self, actual: FlowAmount) -> Self {
        self.actual = actual;
        self.state = if self.desired - actual > FLOW_EPSILON {
            ValueState::CompletedWithExcess
        } else {
            ValueState::Completed
        };
        self
    }

    /// Resolve an outbound operation. Short of `desired` means the rest was
    /// not available.
    pub fn complete_outbound(mut self, actual: FlowAmount) -> Self {
        self.actual = actual;
        self.state = if self.desired - actual > FLOW_EPSILON {
            ValueState::CompletedWithShortage
        } else {
            ValueState::Completed
        };
        self
    }

    /// True for any of the `Completed*` states.
    pub fn is_success(&self) -> bool {
        matches!(
            self.state,
            ValueState::Completed
                | ValueState::CompletedWithExcess
                | ValueState::CompletedWithShortage
        )
    }

    pub fn is_failed(&self) -> bool {
        self.state == ValueState::Failed
    }

    /// `desired - actual`, never negative.
    pub fn shortfall(&self) -> FlowAmount {
        (self.desired - self.actual).max(Fixed64::ZERO)
    }

    /// The recorded delta for `kind`, zero when untouched.
    pub fn delta_of(&self, kind: FlowKindId) -> Fixed64 {
        self.deltas
            .iter()
            .find(|d| d.kind == kind)
            .map(|d| d.delta)
            .unwrap_or(Fixed64::ZERO)
    }
}
