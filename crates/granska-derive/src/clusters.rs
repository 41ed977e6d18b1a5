//! Network clusters: connected components over structural relationships.

use petgraph::unionfind::UnionFind;
use std::collections::HashMap;

use granska_core::EntityId;

/// Connected components of the multigraph given by `edges`. Returns a map
/// from member to component id, where the component id is the smallest
/// member id. Entities without edges do not appear.
pub fn components(edges: &[(EntityId, EntityId)]) -> HashMap<EntityId, EntityId> {
    let mut index_of: HashMap<EntityId, usize> = HashMap::new();
    let mut nodes: Vec<EntityId> = Vec::new();
    for (a, b) in edges {
        for id in [a, b] {
            if !index_of.contains_key(id) {
                index_of.insert(*id, nodes.len());
                nodes.push(*id);
            }
        }
    }

    let mut uf: UnionFind<usize> = UnionFind::new(nodes.len());
    for (a, b) in edges {
        uf.union(index_of[a], index_of[b]);
    }

    // Smallest member id per component root
    let mut smallest: HashMap<usize, EntityId> = HashMap::new();
    for (i, id) in nodes.iter().enumerate() {
        let root = uf.find(i);
        smallest
            .entry(root)
            .and_modify(|s| {
                if id < s {
                    *s = *id;
                }
            })
            .or_insert(*id);
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, smallest[&uf.find(i)]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(n: u8) -> EntityId {
        // Deterministic, ordered ids
        EntityId(Uuid::from_bytes([
            n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]))
    }

    #[test]
    fn two_components_get_smallest_member_ids() {
        let edges = vec![(id(3), id(1)), (id(1), id(2)), (id(5), id(6))];
        let map = components(&edges);
        assert_eq!(map[&id(1)], id(1));
        assert_eq!(map[&id(2)], id(1));
        assert_eq!(map[&id(3)], id(1));
        assert_eq!(map[&id(5)], id(5));
        assert_eq!(map[&id(6)], id(5));
        assert!(!map.contains_key(&id(9)));
    }

    #[test]
    fn empty_graph_yields_empty_map() {
        assert!(components(&[]).is_empty());
    }
}
