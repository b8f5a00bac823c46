//! Transfer helpers between parts held in the arena.

use crate::container::FlowContainer;
use crate::fixed::{FLOW_EPSILON, Fixed64, FlowAmount};
use crate::id::{FlowKindId, NodeId};
use crate::part::NetworkPart;
use crate::result::ValueResult;
use slotmap::SlotMap;

/// Move up to `amount` of `kind` from one part's container to another's.
pub fn transfer(
    parts: &mut SlotMap<NodeId, NetworkPart>,
    from: NodeId,
    to: NodeId,
    kind: FlowKindId,
    amount: FlowAmount,
) -> ValueResult {
    let Some([source, target]) = parts.get_disjoint_mut([from, to]) else {
        return ValueResult::failed(amount);
    };
    match (source.container_mut(), target.container_mut()) {
        (Some(a), Some(b)) => a.try_transfer_to(b, kind, amount),
        _ => ValueResult::failed(amount),
    }
}

/// How much of `kind` should move from `from` to `to` so both end up at
/// the same fill fraction, capped by `unit` and by what `from` holds.
///
/// Solves `(Tf - x) / Cf = (Tt + x) / Ct` for `x`.
pub fn equalize_amount(
    from: &FlowContainer,
    to: &FlowContainer,
    kind: FlowKindId,
    unit: FlowAmount,
) -> FlowAmount {
    let cf = from.capacity();
    let ct = to.capacity();
    let combined = cf + ct;
    if combined <= FLOW_EPSILON || ct <= FLOW_EPSILON {
        return Fixed64::ZERO;
    }
    let gap = from.fill_fraction() - to.fill_fraction();
    if gap <= Fixed64::ZERO {
        return Fixed64::ZERO;
    }
    // cf * ct / (cf + ct), arranged to stay inside Q32.32 range.
    let x = gap * (cf / combined) * ct;
    x.min(unit)
        .min(from.stored_of(kind))
        .min(to.headroom(kind))
        .max(Fixed64::ZERO)
}

/// Move one equalizing step of `kind` from `from` toward `to`.
pub fn equalize(
    parts: &mut SlotMap<NodeId, NetworkPart>,
    from: NodeId,
    to: NodeId,
    kind: FlowKindId,
    unit: FlowAmount,
) -> ValueResult {
    let amount = match (
        parts.get(from).and_then(NetworkPart::container),
        parts.get(to).and_then(NetworkPart::container),
    ) {
        (Some(a), Some(b)) => equalize_amount(a, b, kind, unit),
        _ => Fixed64::ZERO,
    };
    if amount <= FLOW_EPSILON {
        return ValueResult::failed(amount);
    }
    transfer(parts, from, to, kind, amount)
}

/// Move one `unit_for(kind)` of every stored kind selected by `select` from
/// `from` to `to`. `select` sees the source container, the receiving
/// container and the kind. Kinds `to` cannot receive are skipped.
pub fn transfer_filtered(
    parts: &mut SlotMap<NodeId, NetworkPart>,
    from: NodeId,
    to: NodeId,
    unit_for: impl Fn(FlowKindId) -> FlowAmount,
    select: impl Fn(&FlowContainer, &FlowContainer, FlowKindId) -> bool,
) -> Vec<(FlowKindId, ValueResult)> {
    let kinds: Vec<FlowKindId> = match (
        parts.get(from).and_then(NetworkPart::container),
        parts.get(to).and_then(NetworkPart::container),
    ) {
        (Some(source), Some(target)) => source
            .stored_kinds()
            .filter(|k| target.can_receive(*k) && select(source, target, *k))
            .collect(),
        _ => return Vec::new(),
    };
    let mut results = Vec::new();
    for kind in kinds {
        let result = transfer(parts, from, to, kind, unit_for(kind));
        if result.is_success() {
            results.push((kind, result));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::FilterSettings;
    use crate::test_utils::*;

    fn two_tanks(cap_a: f64, cap_b: f64) -> (SlotMap<NodeId, NetworkPart>, NodeId, NodeId) {
        let registry = standard_registry();
        let mut parts = SlotMap::with_key();
        let a = parts.insert(NetworkPart::from_spec(&storage_spec("a", cap_a), &registry));
        let b = parts.insert(NetworkPart::from_spec(&storage_spec("b", cap_b), &registry));
        (parts, a, b)
    }

    fn stored(parts: &SlotMap<NodeId, NetworkPart>, node: NodeId, kind: FlowKindId) -> Fixed64 {
        parts[node].container().unwrap().stored_of(kind)
    }

    #[test]
    fn transfer_moves_between_parts() {
        let (mut parts, a, b) = two_tanks(100.0, 100.0);
        parts[a].container_mut().unwrap().try_add(gas_a(), fixed(40.0));
        let result = transfer(&mut parts, a, b, gas_a(), fixed(15.0));
        assert!(result.is_success());
        assert_eq!(stored(&parts, a, gas_a()), fixed(25.0));
        assert_eq!(stored(&parts, b, gas_a()), fixed(15.0));
    }

    #[test]
    fn transfer_to_self_fails() {
        let (mut parts, a, _) = two_tanks(100.0, 100.0);
        parts[a].container_mut().unwrap().try_add(gas_a(), fixed(40.0));
        assert!(transfer(&mut parts, a, a, gas_a(), fixed(1.0)).is_failed());
    }

    #[test]
    fn equalize_amount_targets_equal_fill() {
        let registry = standard_registry();
        let config = storage_spec("x", 100.0).container.unwrap();
        let mut from = FlowContainer::new(&config, &registry);
        let mut to = FlowContainer::new(&config, &registry);
        from.change_capacity(fixed(100.0));
        to.change_capacity(fixed(300.0));
        from.try_add(gas_a(), fixed(50.0));

        // (50 * 300 - 0 * 100) / 400
        assert_eq!(equalize_amount(&from, &to, gas_a(), fixed(1000.0)), fixed(37.5));
        assert_eq!(equalize_amount(&from, &to, gas_a(), fixed(1.0)), fixed(1.0));
        assert_eq!(equalize_amount(&to, &from, gas_a(), fixed(1.0)), Fixed64::ZERO);
    }

    #[test]
    fn equalize_step_moves_one_unit() {
        let (mut parts, a, b) = two_tanks(100.0, 100.0);
        parts[a].container_mut().unwrap().try_add(gas_a(), fixed(10.0));
        let result = equalize(&mut parts, a, b, gas_a(), fixed(1.0));
        assert_eq!(result.actual, fixed(1.0));
        assert_eq!(stored(&parts, b, gas_a()), fixed(1.0));
    }

    #[test]
    fn filtered_transfer_moves_only_selected_kinds() {
        let (mut parts, a, b) = two_tanks(100.0, 100.0);
        {
            let c = parts[a].container_mut().unwrap();
            c.try_add(gas_a(), fixed(5.0));
            c.try_add(gas_b(), fixed(5.0));
            c.set_filter(
                gas_b(),
                FilterSettings {
                    can_store: false,
                    ..FilterSettings::ALLOW_ALL
                },
            );
        }
        let moved = transfer_filtered(&mut parts, a, b, |_| fixed(2.0), |c, _, k| !c.can_store(k));
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].0, gas_b());
        assert_eq!(stored(&parts, b, gas_b()), fixed(2.0));
        assert_eq!(stored(&parts, b, gas_a()), Fixed64::ZERO);
    }
}
