//! Typed, capacity-bounded flow containers.
//!
//! A [`FlowContainer`] is the unit of exchange between network parts. It
//! stores amounts per [`FlowKindId`], applies per-kind [`FilterSettings`],
//! and reports every mutation as a [`ValueResult`]. Committed changes are
//! queued as [`ContainerChange`] records that the owning part drains with
//! [`FlowContainer::take_changes`].
//!
//! # Capacity
//!
//! Kinds with `shares_capacity` compete for the whole pool. Other kinds get
//! their own allowance of `capacity * capacity_factor / accepted_count`
//! (never more than the pool). Headroom for any kind is the smaller of its
//! own allowance minus what it holds and the pool minus the total stored,
//! so `total_stored <= capacity` holds for every mix of kinds.

use crate::fixed::{FLOW_EPSILON, Fixed64, FlowAmount};
use crate::id::FlowKindId;
use crate::kind::{Color, KindRegistry};
use crate::result::ValueResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Settings and derived state
// ---------------------------------------------------------------------------

/// Per-kind capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// The kind may flow into the container.
    pub can_receive: bool,
    /// The kind may stay in the container. Storage parts purge kinds that
    /// lose this flag.
    pub can_store: bool,
    /// The kind may flow out of the container.
    pub can_transfer: bool,
}

impl FilterSettings {
    pub const ALLOW_ALL: FilterSettings = FilterSettings {
        can_receive: true,
        can_store: true,
        can_transfer: true,
    };

    pub const DENY_ALL: FilterSettings = FilterSettings {
        can_receive: false,
        can_store: false,
        can_transfer: false,
    };
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self::ALLOW_ALL
    }
}

/// Coarse fill level of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FillState {
    Empty,
    Partial,
    Full,
}

/// The registry data a container keeps for one accepted kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindInfo {
    pub id: FlowKindId,
    pub shares_capacity: bool,
    pub capacity_factor: Fixed64,
    pub color: Color,
}

/// Construction template for a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub capacity: FlowAmount,
    pub accepted: Vec<FlowKindId>,
    /// Hold at most one kind at a time.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub default_filter: FilterSettings,
}

impl ContainerConfig {
    pub fn new(capacity: FlowAmount, accepted: Vec<FlowKindId>) -> Self {
        Self {
            capacity,
            accepted,
            exclusive: false,
            default_filter: FilterSettings::ALLOW_ALL,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// One committed mutation, queued for the owning part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerChange {
    pub kind: FlowKindId,
    /// Signed amount applied to `kind`.
    pub delta: Fixed64,
    pub previous: FillState,
    pub current: FillState,
}

impl ContainerChange {
    pub fn fill_state_changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Persisted form of a container. Restored onto a container freshly built
/// from its template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    pub capacity: FlowAmount,
    pub stored: BTreeMap<FlowKindId, FlowAmount>,
    pub filters: BTreeMap<FlowKindId, FilterSettings>,
    pub accepted: Vec<FlowKindId>,
    pub exclusive: bool,
}

// ---------------------------------------------------------------------------
// FlowContainer
// ---------------------------------------------------------------------------

/// Capacity-bounded store of one or more flow value kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowContainer {
    capacity: FlowAmount,
    /// Keys exist only while the amount is positive.
    stored: BTreeMap<FlowKindId, FlowAmount>,
    filters: BTreeMap<FlowKindId, FilterSettings>,
    accepted: Vec<KindInfo>,
    exclusive: bool,
    /// Blend of stored kind colors, weighted by share of capacity.
    color: Color,
    #[serde(skip)]
    changes: Vec<ContainerChange>,
}

impl FlowContainer {
    /// Build a container from a template. Kinds missing from the registry
    /// are skipped with a warning; a container with nothing to accept is
    /// still built but logged as a configuration mistake.
    pub fn new(config: &ContainerConfig, registry: &KindRegistry) -> Self {
        let mut accepted: Vec<KindInfo> = Vec::with_capacity(config.accepted.len());
        for &id in &config.accepted {
            let Some(def) = registry.get(id) else {
                tracing::warn!(kind = ?id, "container accepts an unregistered flow kind; ignoring it");
                continue;
            };
            if accepted.iter().any(|k| k.id == id) {
                continue;
            }
            accepted.push(KindInfo {
                id,
                shares_capacity: def.shares_capacity,
                capacity_factor: def.capacity_factor,
                color: def.color,
            });
        }
        if accepted.is_empty() {
            tracing::warn!(
                capacity = %config.capacity,
                "flow container constructed with no accepted kinds"
            );
        }

        let filters = accepted
            .iter()
            .map(|k| (k.id, config.default_filter))
            .collect();

        Self {
            capacity: config.capacity.max(Fixed64::ZERO),
            stored: BTreeMap::new(),
            filters,
            accepted,
            exclusive: config.exclusive,
            color: Color::CLEAR,
            changes: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn capacity(&self) -> FlowAmount {
        self.capacity
    }

    pub fn total_stored(&self) -> FlowAmount {
        self.stored
            .values()
            .fold(Fixed64::ZERO, |acc, v| acc + *v)
    }

    pub fn stored_of(&self, kind: FlowKindId) -> FlowAmount {
        self.stored.get(&kind).copied().unwrap_or(Fixed64::ZERO)
    }

    /// Stored amounts keyed by kind. Every value is positive.
    pub fn stored(&self) -> &BTreeMap<FlowKindId, FlowAmount> {
        &self.stored
    }

    pub fn stored_kinds(&self) -> impl Iterator<Item = FlowKindId> + '_ {
        self.stored.keys().copied()
    }

    pub fn accepted_kinds(&self) -> impl Iterator<Item = FlowKindId> + '_ {
        self.accepted.iter().map(|k| k.id)
    }

    pub fn kind_info(&self, kind: FlowKindId) -> Option<&KindInfo> {
        self.accepted.iter().find(|k| k.id == kind)
    }

    pub fn accepts(&self, kind: FlowKindId) -> bool {
        self.kind_info(kind).is_some()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Current filter for `kind`. Kinds the container does not accept get
    /// [`FilterSettings::DENY_ALL`].
    pub fn filter(&self, kind: FlowKindId) -> FilterSettings {
        self.filters
            .get(&kind)
            .copied()
            .unwrap_or(FilterSettings::DENY_ALL)
    }

    /// Replace the filter for an accepted kind. Returns false for kinds the
    /// container does not accept.
    pub fn set_filter(&mut self, kind: FlowKindId, settings: FilterSettings) -> bool {
        if !self.accepts(kind) {
            return false;
        }
        self.filters.insert(kind, settings);
        true
    }

    /// The most `kind` may ever occupy.
    pub fn capacity_of(&self, kind: FlowKindId) -> FlowAmount {
        match self.kind_info(kind) {
            None => Fixed64::ZERO,
            Some(info) if info.shares_capacity => self.capacity,
            Some(info) => {
                let count = Fixed64::from_num(self.accepted.len());
                (self.capacity * info.capacity_factor / count).min(self.capacity)
            }
        }
    }

    /// How much more of `kind` fits right now.
    pub fn headroom(&self, kind: FlowKindId) -> FlowAmount {
        if !self.accepts(kind) {
            return Fixed64::ZERO;
        }
        let pool_room = self.capacity - self.total_stored();
        let own_room = self.capacity_of(kind) - self.stored_of(kind);
        pool_room.min(own_room).max(Fixed64::ZERO)
    }

    pub fn is_kind_full(&self, kind: FlowKindId) -> bool {
        self.headroom(kind) <= FLOW_EPSILON
    }

    pub fn is_full(&self) -> bool {
        self.capacity - self.total_stored() <= FLOW_EPSILON
    }

    pub fn is_empty(&self) -> bool {
        self.total_stored() <= FLOW_EPSILON
    }

    pub fn fill_state(&self) -> FillState {
        if self.is_empty() {
            FillState::Empty
        } else if self.is_full() {
            FillState::Full
        } else {
            FillState::Partial
        }
    }

    /// `total_stored / capacity`, zero for a zero-capacity container.
    pub fn fill_fraction(&self) -> Fixed64 {
        if self.capacity <= FLOW_EPSILON {
            return Fixed64::ZERO;
        }
        self.total_stored() / self.capacity
    }

    pub fn color(&self) -> Color {
        self.color
    }

    fn exclusive_allows(&self, kind: FlowKindId) -> bool {
        !self.exclusive || self.stored.is_empty() || self.stored.contains_key(&kind)
    }

    /// Whether an inbound transfer of `kind` could succeed right now.
    pub fn can_receive(&self, kind: FlowKindId) -> bool {
        self.accepts(kind)
            && self.filter(kind).can_receive
            && self.exclusive_allows(kind)
            && !self.is_kind_full(kind)
    }

    pub fn can_store(&self, kind: FlowKindId) -> bool {
        self.filter(kind).can_store
    }

    pub fn can_transfer(&self, kind: FlowKindId) -> bool {
        self.filter(kind).can_transfer
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Add up to `desired` of `kind`. Whatever does not fit is reported as
    /// the result's shortfall, never silently dropped.
    pub fn try_add(&mut self, kind: FlowKindId, desired: FlowAmount) -> ValueResult {
        if desired <= FLOW_EPSILON || !self.can_receive(kind) {
            return ValueResult::failed(desired);
        }
        let excess = (desired - self.headroom(kind)).max(Fixed64::ZERO);
        let actual = desired - excess;
        if actual <= FLOW_EPSILON {
            return ValueResult::failed(desired);
        }
        self.commit(kind, actual);
        ValueResult::begin(desired)
            .with_delta(kind, actual)
            .complete(actual)
    }

    /// Remove up to `desired` of `kind`. Asking for more than is stored
    /// takes what is there and reports `CompletedWithShortage`.
    pub fn try_remove(&mut self, kind: FlowKindId, desired: FlowAmount) -> ValueResult {
        if desired <= FLOW_EPSILON
            || !self.stored.contains_key(&kind)
            || !self.can_transfer(kind)
        {
            return ValueResult::failed(desired);
        }
        self.remove_unchecked(kind, desired)
    }

    /// Move up to `amount` of `kind` into `other`. The movable amount is
    /// bounded by what `other` can accept before anything leaves `self`.
    pub fn try_transfer_to(
        &mut self,
        other: &mut FlowContainer,
        kind: FlowKindId,
        amount: FlowAmount,
    ) -> ValueResult {
        let available = self.stored_of(kind);
        if amount <= FLOW_EPSILON || available <= Fixed64::ZERO || !self.can_transfer(kind) {
            return ValueResult::failed(amount);
        }
        if !other.can_receive(kind) {
            return ValueResult::failed(amount);
        }

        let room = other.headroom(kind);
        let movable = amount.min(available).min(room);
        if movable <= FLOW_EPSILON {
            return ValueResult::failed(amount);
        }

        let removed = self.remove_unchecked(kind, movable).actual;
        let added = other.try_add(kind, removed);
        let landed = if added.is_success() {
            added.actual
        } else {
            Fixed64::ZERO
        };
        let leftover = removed - landed;
        if leftover > Fixed64::ZERO {
            self.commit(kind, leftover);
        }
        if landed <= Fixed64::ZERO {
            return ValueResult::failed(amount);
        }

        let result = ValueResult::begin(amount).with_delta(kind, -landed);
        if room < amount && room <= available {
            result.complete_clamped(landed)
        } else {
            result.complete_outbound(landed)
        }
    }

    /// Consume `amount` drawn across all stored kinds in kind order.
    /// All-or-nothing: fails without touching anything when the total
    /// stored is short.
    pub fn try_consume(&mut self, amount: FlowAmount) -> ValueResult {
        if amount <= FLOW_EPSILON || self.total_stored() + FLOW_EPSILON < amount {
            return ValueResult::failed(amount);
        }
        let mut result = ValueResult::begin(amount);
        let mut remaining = amount;
        let kinds: Vec<FlowKindId> = self.stored.keys().copied().collect();
        for kind in kinds {
            if remaining <= FLOW_EPSILON {
                break;
            }
            let take = remaining.min(self.stored_of(kind));
            let removed = self.remove_unchecked(kind, take).actual;
            remaining -= removed;
            result.push_delta(kind, -removed);
        }
        let consumed = amount - remaining;
        result.complete(consumed)
    }

    /// Consume exactly `amount` of one kind, or nothing.
    pub fn try_consume_kind(&mut self, kind: FlowKindId, amount: FlowAmount) -> ValueResult {
        if amount <= FLOW_EPSILON || self.stored_of(kind) + FLOW_EPSILON < amount {
            return ValueResult::failed(amount);
        }
        let removed = self.remove_unchecked(kind, amount);
        let actual = removed.actual;
        ValueResult::begin(amount)
            .with_delta(kind, -actual)
            .complete(actual)
    }

    /// Remove everything, one kind at a time, so every kind produces its own
    /// change record.
    pub fn clear(&mut self) -> ValueResult {
        let total = self.total_stored();
        let mut result = ValueResult::begin(total);
        let kinds: Vec<(FlowKindId, FlowAmount)> =
            self.stored.iter().map(|(k, v)| (*k, *v)).collect();
        for (kind, amount) in kinds {
            let removed = self.remove_unchecked(kind, amount).actual;
            result.push_delta(kind, -removed);
        }
        result.complete(total)
    }

    /// Set a new capacity. Existing contents are never evicted; inflow is
    /// refused until usage drops below the new capacity.
    pub fn change_capacity(&mut self, capacity: FlowAmount) {
        self.capacity = capacity.max(Fixed64::ZERO);
        self.refresh_color();
    }

    /// Replace this container's contents with a copy of `other`'s, limited to
    /// the kinds and capacity this container has.
    pub fn copy_from(&mut self, other: &FlowContainer) {
        self.clear();
        for (&kind, &amount) in &other.stored {
            if !self.accepts(kind) {
                continue;
            }
            let fits = amount.min(self.headroom(kind));
            if fits > Fixed64::ZERO {
                self.commit(kind, fits);
            }
            if let Some(settings) = other.filters.get(&kind) {
                self.filters.insert(kind, *settings);
            }
        }
    }

    /// Drain the queued change records.
    pub fn take_changes(&mut self) -> Vec<ContainerChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save_state(&self) -> ContainerState {
        ContainerState {
            capacity: self.capacity,
            stored: self.stored.clone(),
            filters: self.filters.clone(),
            accepted: self.accepted_kinds().collect(),
            exclusive: self.exclusive,
        }
    }

    /// Load persisted values onto a container built from its template.
    /// Amounts of kinds the template no longer accepts are dropped with a
    /// warning. No change records are queued.
    pub fn restore_state(&mut self, state: &ContainerState) {
        self.capacity = state.capacity.max(Fixed64::ZERO);
        self.exclusive = state.exclusive;
        for (&kind, &settings) in &state.filters {
            if self.accepts(kind) {
                self.filters.insert(kind, settings);
            }
        }
        self.stored.clear();
        for (&kind, &amount) in &state.stored {
            if !self.accepts(kind) {
                tracing::warn!(kind = ?kind, amount = %amount, "dropping restored amount of a kind the container no longer accepts");
                continue;
            }
            if amount > Fixed64::ZERO {
                self.stored.insert(kind, amount);
            }
        }
        self.refresh_color();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Remove without filter checks. A remainder within epsilon is taken too
    /// so no dust is left behind.
    fn remove_unchecked(&mut self, kind: FlowKindId, desired: FlowAmount) -> ValueResult {
        let stored = self.stored_of(kind);
        if stored <= Fixed64::ZERO {
            return ValueResult::failed(desired);
        }
        let mut actual = desired.min(stored);
        if stored - actual <= FLOW_EPSILON {
            actual = stored;
        }
        self.commit(kind, -actual);
        ValueResult::begin(desired)
            .with_delta(kind, -actual)
            .complete_outbound(actual)
    }

    fn commit(&mut self, kind: FlowKindId, delta: Fixed64) {
        let previous = self.fill_state();
        let entry = self.stored.entry(kind).or_insert(Fixed64::ZERO);
        *entry += delta;
        if *entry <= Fixed64::ZERO {
            self.stored.remove(&kind);
        }
        self.refresh_color();
        self.changes.push(ContainerChange {
            kind,
            delta,
            previous,
            current: self.fill_state(),
        });
    }

    fn refresh_color(&mut self) {
        if self.capacity <= FLOW_EPSILON {
            self.color = Color::CLEAR;
            return;
        }
        let mut color = Color::CLEAR;
        for (&kind, &amount) in &self.stored {
            if let Some(info) = self.kind_info(kind) {
                let share = (amount / self.capacity).to_num::<f32>();
                color = color.saturating_add(info.color.scaled(share));
            }
        }
        self.color = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ValueState;
    use crate::test_utils::*;

    fn container(capacity: f64) -> FlowContainer {
        let registry = standard_registry();
        FlowContainer::new(
            &ContainerConfig::new(fixed(capacity), vec![gas_a(), gas_b()]),
            &registry,
        )
    }

    // -----------------------------------------------------------------------
    // Add
    // -----------------------------------------------------------------------

    #[test]
    fn add_into_empty_container() {
        let mut c = container(100.0);
        let result = c.try_add(gas_a(), fixed(60.0));
        assert_eq!(result.state, ValueState::Completed);
        assert_eq!(result.actual, fixed(60.0));
        assert_eq!(c.total_stored(), fixed(60.0));
        assert_eq!(c.fill_state(), FillState::Partial);
    }

    #[test]
    fn add_beyond_capacity_clamps_and_reports_excess() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(60.0));
        let result = c.try_add(gas_a(), fixed(50.0));
        assert_eq!(result.state, ValueState::Completed);
        assert_eq!(result.actual, fixed(40.0));
        assert_eq!(result.shortfall(), fixed(10.0));
        assert_eq!(c.total_stored(), fixed(100.0));
        assert_eq!(c.fill_state(), FillState::Full);
    }

    #[test]
    fn add_exactly_filling_remaining_capacity() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(70.0));
        let result = c.try_add(gas_b(), fixed(30.0));
        assert_eq!(result.state, ValueState::Completed);
        assert_eq!(result.actual, result.desired);
        assert!(c.is_full());
    }

    #[test]
    fn add_into_full_container_fails() {
        let mut c = container(10.0);
        c.try_add(gas_a(), fixed(10.0));
        let result = c.try_add(gas_b(), fixed(1.0));
        assert!(result.is_failed());
        assert_eq!(c.stored_of(gas_b()), Fixed64::ZERO);
    }

    #[test]
    fn add_unaccepted_kind_fails() {
        let mut c = container(10.0);
        assert!(c.try_add(fluid(), fixed(1.0)).is_failed());
    }

    #[test]
    fn add_respects_receive_filter() {
        let mut c = container(10.0);
        c.set_filter(
            gas_a(),
            FilterSettings {
                can_receive: false,
                ..FilterSettings::ALLOW_ALL
            },
        );
        assert!(c.try_add(gas_a(), fixed(1.0)).is_failed());
        assert!(c.try_add(gas_b(), fixed(1.0)).is_success());
    }

    #[test]
    fn exclusive_container_holds_one_kind() {
        let registry = standard_registry();
        let mut c = FlowContainer::new(
            &ContainerConfig::new(fixed(10.0), vec![gas_a(), gas_b()]).exclusive(),
            &registry,
        );
        assert!(c.is_exclusive());
        assert!(c.try_add(gas_a(), fixed(2.0)).is_success());
        assert!(c.try_add(gas_b(), fixed(2.0)).is_failed());
        c.try_remove(gas_a(), fixed(2.0));
        assert!(c.try_add(gas_b(), fixed(2.0)).is_success());
    }

    #[test]
    fn non_sharing_kind_capped_by_own_allowance() {
        let registry = standard_registry();
        let mut c = FlowContainer::new(
            &ContainerConfig::new(fixed(100.0), vec![gas_a(), fluid()]),
            &registry,
        );
        // Two accepted kinds: the fluid's own slice is 100 * 1 / 2.
        assert_eq!(c.capacity_of(fluid()), fixed(50.0));
        assert_eq!(c.capacity_of(gas_a()), fixed(100.0));

        let result = c.try_add(fluid(), fixed(80.0));
        assert_eq!(result.actual, fixed(50.0));
        assert!(c.is_kind_full(fluid()));
        assert!(!c.can_receive(fluid()));

        // The shared kind still sees the remaining pool.
        let result = c.try_add(gas_a(), fixed(80.0));
        assert_eq!(result.actual, fixed(50.0));
        assert_eq!(c.total_stored(), fixed(100.0));
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    #[test]
    fn remove_absent_kind_fails() {
        let mut c = container(10.0);
        assert!(c.try_remove(gas_a(), fixed(1.0)).is_failed());
    }

    #[test]
    fn remove_more_than_available_caps() {
        let mut c = container(10.0);
        c.try_add(gas_a(), fixed(4.0));
        let result = c.try_remove(gas_a(), fixed(10.0));
        assert_eq!(result.state, ValueState::CompletedWithShortage);
        assert_eq!(result.actual, fixed(4.0));
        assert!(!c.stored().contains_key(&gas_a()));
        assert_eq!(c.fill_state(), FillState::Empty);
    }

    #[test]
    fn remove_blocked_by_transfer_filter() {
        let mut c = container(10.0);
        c.try_add(gas_a(), fixed(4.0));
        c.set_filter(
            gas_a(),
            FilterSettings {
                can_transfer: false,
                ..FilterSettings::ALLOW_ALL
            },
        );
        assert!(c.try_remove(gas_a(), fixed(1.0)).is_failed());
        assert_eq!(c.stored_of(gas_a()), fixed(4.0));
    }

    #[test]
    fn remove_then_add_round_trip() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(30.0));
        let before = c.stored_of(gas_a());
        c.try_remove(gas_a(), fixed(12.5));
        c.try_add(gas_a(), fixed(12.5));
        assert_eq!(c.stored_of(gas_a()), before);
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    #[test]
    fn transfer_between_containers() {
        let mut a = container(100.0);
        let mut b = container(100.0);
        a.try_add(gas_a(), fixed(100.0));

        let result = a.try_transfer_to(&mut b, gas_a(), fixed(30.0));
        assert_eq!(result.state, ValueState::Completed);
        assert_eq!(a.stored_of(gas_a()), fixed(70.0));
        assert_eq!(b.stored_of(gas_a()), fixed(30.0));
        assert_eq!(result.delta_of(gas_a()), fixed(-30.0));
    }

    #[test]
    fn transfer_limited_by_receiver_headroom() {
        let mut a = container(100.0);
        let mut b = container(20.0);
        a.try_add(gas_a(), fixed(50.0));
        b.try_add(gas_b(), fixed(15.0));

        let result = a.try_transfer_to(&mut b, gas_a(), fixed(30.0));
        assert_eq!(result.state, ValueState::CompletedWithExcess);
        assert_eq!(result.actual, fixed(5.0));
        assert_eq!(a.stored_of(gas_a()), fixed(45.0));
        assert_eq!(b.total_stored(), fixed(20.0));
    }

    #[test]
    fn transfer_limited_by_sender_stock() {
        let mut a = container(100.0);
        let mut b = container(100.0);
        a.try_add(gas_a(), fixed(5.0));
        let result = a.try_transfer_to(&mut b, gas_a(), fixed(30.0));
        assert_eq!(result.state, ValueState::CompletedWithShortage);
        assert_eq!(b.stored_of(gas_a()), fixed(5.0));
        assert!(a.is_empty());
    }

    #[test]
    fn transfer_to_full_receiver_moves_nothing() {
        let mut a = container(100.0);
        let mut b = container(10.0);
        a.try_add(gas_a(), fixed(50.0));
        b.try_add(gas_b(), fixed(10.0));
        let result = a.try_transfer_to(&mut b, gas_a(), fixed(5.0));
        assert!(result.is_failed());
        assert_eq!(a.stored_of(gas_a()), fixed(50.0));
    }

    #[test]
    fn transfer_to_exclusive_receiver_holding_other_kind_fails() {
        let registry = standard_registry();
        let mut a = container(100.0);
        let mut pipe = FlowContainer::new(
            &ContainerConfig::new(fixed(10.0), vec![gas_a(), gas_b()]).exclusive(),
            &registry,
        );
        a.try_add(gas_a(), fixed(5.0));
        pipe.try_add(gas_b(), fixed(1.0));
        assert!(a.try_transfer_to(&mut pipe, gas_a(), fixed(1.0)).is_failed());
        assert_eq!(a.stored_of(gas_a()), fixed(5.0));
    }

    // -----------------------------------------------------------------------
    // Consume / clear / capacity
    // -----------------------------------------------------------------------

    #[test]
    fn consume_any_draws_across_kinds() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(3.0));
        c.try_add(gas_b(), fixed(5.0));
        let result = c.try_consume(fixed(6.0));
        assert_eq!(result.state, ValueState::Completed);
        assert_eq!(result.actual, fixed(6.0));
        assert_eq!(result.delta_of(gas_a()), fixed(-3.0));
        assert_eq!(result.delta_of(gas_b()), fixed(-3.0));
        assert_eq!(c.total_stored(), fixed(2.0));
    }

    #[test]
    fn consume_is_all_or_nothing() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(3.0));
        let result = c.try_consume(fixed(4.0));
        assert!(result.is_failed());
        assert_eq!(c.stored_of(gas_a()), fixed(3.0));
        assert!(c.try_consume_kind(gas_a(), fixed(3.5)).is_failed());
        assert!(c.try_consume_kind(gas_a(), fixed(3.0)).is_success());
        assert!(c.is_empty());
    }

    #[test]
    fn clear_emits_one_change_per_kind() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(3.0));
        c.try_add(gas_b(), fixed(5.0));
        c.take_changes();

        let result = c.clear();
        assert_eq!(result.actual, fixed(8.0));
        assert!(c.is_empty());
        let changes = c.take_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].current, FillState::Empty);
    }

    #[test]
    fn shrinking_capacity_keeps_contents_but_blocks_inflow() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(80.0));
        c.change_capacity(fixed(50.0));
        assert_eq!(c.stored_of(gas_a()), fixed(80.0));
        assert!(c.try_add(gas_a(), fixed(1.0)).is_failed());
        c.try_remove(gas_a(), fixed(40.0));
        assert!(c.try_add(gas_a(), fixed(5.0)).is_success());
    }

    // -----------------------------------------------------------------------
    // Notifications, color, persistence
    // -----------------------------------------------------------------------

    #[test]
    fn changes_record_signed_deltas_and_fill_transitions() {
        let mut c = container(10.0);
        c.try_add(gas_a(), fixed(10.0));
        c.try_remove(gas_a(), fixed(4.0));
        let changes = c.take_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].delta, fixed(10.0));
        assert_eq!(changes[0].previous, FillState::Empty);
        assert_eq!(changes[0].current, FillState::Full);
        assert_eq!(changes[1].delta, fixed(-4.0));
        assert!(changes[1].fill_state_changed());
        assert!(!c.has_pending_changes());
    }

    #[test]
    fn failed_operations_queue_no_changes() {
        let mut c = container(10.0);
        c.try_remove(gas_a(), fixed(1.0));
        c.try_add(fluid(), fixed(1.0));
        assert!(!c.has_pending_changes());
    }

    #[test]
    fn color_blends_by_share_of_capacity() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(50.0));
        let color = c.color();
        // gas_a is pure red in the standard registry.
        assert!((color.r - 0.5).abs() < 1e-4);
        assert_eq!(color.b, 0.0);

        c.try_add(gas_b(), fixed(50.0));
        let color = c.color();
        assert!((color.b - 0.5).abs() < 1e-4);
        assert!((color.a - 1.0).abs() < 1e-4);
    }

    #[test]
    fn save_and_restore_state() {
        let mut c = container(100.0);
        c.try_add(gas_a(), fixed(25.0));
        c.set_filter(gas_b(), FilterSettings::DENY_ALL);
        let state = c.save_state();

        let mut restored = container(10.0);
        restored.restore_state(&state);
        assert_eq!(restored.capacity(), fixed(100.0));
        assert_eq!(restored.stored_of(gas_a()), fixed(25.0));
        assert_eq!(restored.filter(gas_b()), FilterSettings::DENY_ALL);
        assert!(!restored.has_pending_changes());
        assert_eq!(restored.color(), c.color());
    }

    #[test]
    fn copy_from_peer() {
        let mut a = container(100.0);
        a.try_add(gas_a(), fixed(30.0));
        let mut b = container(20.0);
        b.try_add(gas_b(), fixed(5.0));
        b.copy_from(&a);
        assert_eq!(b.stored_of(gas_b()), Fixed64::ZERO);
        assert_eq!(b.stored_of(gas_a()), fixed(20.0));
    }

    #[test]
    fn no_accepted_kinds_still_constructs() {
        let registry = standard_registry();
        let c = FlowContainer::new(&ContainerConfig::new(fixed(10.0), vec![]), &registry);
        assert_eq!(c.accepted_kinds().count(), 0);
        assert_eq!(c.fill_state(), FillState::Empty);
    }
}
