use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::model::ElementId;

/// One node of a precedence graph as the layering pass sees it: the id and
/// both relation directions. Either list alone may be incomplete for a
/// given node, so adjacency is merged from both.
#[derive(Debug, Clone)]
pub struct LayerNode {
    pub id: ElementId,
    pub predecessors: Vec<ElementId>,
    pub successors: Vec<ElementId>,
}

/// Successor map merged from both relation directions, restricted to ids
/// present in `nodes`, deduplicated.
pub fn merged_adjacency(nodes: &[LayerNode]) -> BTreeMap<ElementId, Vec<ElementId>> {
    let known: BTreeSet<ElementId> = nodes.iter().map(|n| n.id).collect();
    let mut adjacency: BTreeMap<ElementId, Vec<ElementId>> = BTreeMap::new();
    for node in nodes {
        adjacency.entry(node.id).or_default();
    }
    let push = |from: ElementId, to: ElementId, adjacency: &mut BTreeMap<ElementId, Vec<ElementId>>| {
        if !known.contains(&from) || !known.contains(&to) {
            return;
        }
        let successors = adjacency.entry(from).or_default();
        if !successors.contains(&to) {
            successors.push(to);
        }
    };
    for node in nodes {
        for successor in &node.successors {
            push(node.id, *successor, &mut adjacency);
        }
        for predecessor in &node.predecessors {
            push(*predecessor, node.id, &mut adjacency);
        }
    }
    adjacency
}

/// Kahn's algorithm. When the graph contains a cycle the result omits the
/// cyclic remainder; callers fall back to input order for those nodes
/// rather than failing.
pub fn kahn_order(adjacency: &BTreeMap<ElementId, Vec<ElementId>>) -> Vec<ElementId> {
    let mut in_degree: BTreeMap<ElementId, usize> =
        adjacency.keys().map(|id| (*id, 0)).collect();
    for successors in adjacency.values() {
        for successor in successors {
            if let Some(degree) = in_degree.get_mut(successor) {
                *degree += 1;
            }
        }
    }
    let mut queue: VecDeque<ElementId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        if let Some(successors) = adjacency.get(&current) {
            for successor in successors {
                if let Some(degree) = in_degree.get_mut(successor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*successor);
                    }
                }
            }
        }
    }
    order
}

/// The ordering the layering pass walks: Kahn order when complete, input
/// order for any nodes a cycle left unresolved (appended after the ordered
/// prefix, deduplicated).
pub fn order_with_fallback(
    adjacency: &BTreeMap<ElementId, Vec<ElementId>>,
    input_order: &[ElementId],
) -> Vec<ElementId> {
    let ordered = kahn_order(adjacency);
    if ordered.len() == adjacency.len() {
        return ordered;
    }
    let seen: BTreeSet<ElementId> = ordered.iter().copied().collect();
    let mut order = ordered;
    for id in input_order {
        if !seen.contains(id) {
            order.push(*id);
        }
    }
    order
}

/// Longest-path layering: a node's layer is one past the deepest of its
/// predecessors, zero with none. Walking in (topological) `order` makes one
/// pass sufficient; on the cyclic fallback portion the result is merely
/// deterministic, not minimal.
pub fn assign_layers(
    adjacency: &BTreeMap<ElementId, Vec<ElementId>>,
    order: &[ElementId],
) -> BTreeMap<usize, Vec<ElementId>> {
    let mut predecessors: BTreeMap<ElementId, Vec<ElementId>> = BTreeMap::new();
    for (from, successors) in adjacency {
        for to in successors {
            predecessors.entry(*to).or_default().push(*from);
        }
    }

    let mut layer_of: BTreeMap<ElementId, usize> =
        order.iter().map(|id| (*id, 0usize)).collect();
    for id in order {
        let layer = predecessors
            .get(id)
            .map(|preds| {
                preds
                    .iter()
                    .map(|p| layer_of.get(p).copied().unwrap_or(0))
                    .max()
                    .map(|max| max + 1)
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        layer_of.insert(*id, layer);
    }

    let mut layers: BTreeMap<usize, Vec<ElementId>> = BTreeMap::new();
    for id in order {
        let layer = layer_of.get(id).copied().unwrap_or(0);
        layers.entry(layer).or_default().push(*id);
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: ElementId, predecessors: &[ElementId], successors: &[ElementId]) -> LayerNode {
        LayerNode {
            id,
            predecessors: predecessors.to_vec(),
            successors: successors.to_vec(),
        }
    }

    #[test]
    fn adjacency_merges_both_directions() {
        // The edge 1->2 is only recorded on 2's predecessor list.
        let nodes = vec![node(1, &[], &[]), node(2, &[1], &[]), node(3, &[], &[])];
        let adjacency = merged_adjacency(&nodes);
        assert_eq!(adjacency.get(&1).unwrap(), &vec![2]);
        assert!(adjacency.get(&3).unwrap().is_empty());
    }

    #[test]
    fn adjacency_ignores_unknown_ids() {
        let nodes = vec![node(1, &[99], &[98])];
        let adjacency = merged_adjacency(&nodes);
        assert!(adjacency.get(&1).unwrap().is_empty());
        assert_eq!(adjacency.len(), 1);
    }

    #[test]
    fn kahn_orders_a_chain() {
        let nodes = vec![node(1, &[], &[2]), node(2, &[], &[3]), node(3, &[], &[])];
        let adjacency = merged_adjacency(&nodes);
        assert_eq!(kahn_order(&adjacency), vec![1, 2, 3]);
    }

    #[test]
    fn cycle_falls_back_to_input_order() {
        let nodes = vec![node(1, &[], &[2]), node(2, &[], &[1]), node(3, &[], &[])];
        let adjacency = merged_adjacency(&nodes);
        let order = order_with_fallback(&adjacency, &[1, 2, 3]);
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], 3); // the only zero in-degree node
        assert_eq!(&order[1..], &[1, 2]);
    }

    #[test]
    fn layers_follow_longest_path_not_topo_position() {
        // Diamond with a long arm: 1 -> 2 -> 3 -> 5, 1 -> 4 -> 5.
        let nodes = vec![
            node(1, &[], &[2, 4]),
            node(2, &[], &[3]),
            node(3, &[], &[5]),
            node(4, &[], &[5]),
            node(5, &[], &[]),
        ];
        let adjacency = merged_adjacency(&nodes);
        let order = order_with_fallback(&adjacency, &[1, 2, 3, 4, 5]);
        let layers = assign_layers(&adjacency, &order);

        assert_eq!(layers.get(&0).unwrap(), &vec![1]);
        assert!(layers.get(&1).unwrap().contains(&2));
        assert!(layers.get(&1).unwrap().contains(&4));
        assert_eq!(layers.get(&2).unwrap(), &vec![3]);
        // 5 waits for the deepest arm.
        assert_eq!(layers.get(&3).unwrap(), &vec![5]);
    }

    #[test]
    fn isolated_nodes_share_layer_zero() {
        let nodes = vec![node(1, &[], &[]), node(2, &[], &[]), node(3, &[], &[])];
        let adjacency = merged_adjacency(&nodes);
        let order = order_with_fallback(&adjacency, &[1, 2, 3]);
        let layers = assign_layers(&adjacency, &order);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers.get(&0).unwrap().len(), 3);
    }
}
