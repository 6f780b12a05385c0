use std::collections::HashSet;

use crate::{
    database::{MeshElement, MeshNode},
    datatypes::{Label, Node, ZoiBox},
};

/// Number of filtered nodes an element needs to be kept as a quad
pub const DEFAULT_MIN_ELEMENT_NODES: usize = 4;

/// Selects the nodes lying inside the zone of interest
///
/// # Arguments
/// * `nodes` - Every node of the mesh instance
/// * `zoi` - The zone of interest
/// * `tolerance` - Expansion applied to every side of the box
///
/// # Returns
/// The kept nodes in traversal order
pub fn filter_nodes(nodes: &[MeshNode], zoi: &ZoiBox, tolerance: f64) -> Vec<Node> {
    let (lo, hi) = zoi.bounds(tolerance);

    nodes
        .iter()
        .filter(|node| {
            let c = &node.coordinates;
            (lo.x..=hi.x).contains(&c.x)
                && (lo.y..=hi.y).contains(&c.y)
                && (lo.z..=hi.z).contains(&c.z)
        })
        .map(|node| Node {
            label: node.label,
            coords: node.coordinates,
            temperature: None,
        })
        .collect()
}

/// Selects the elements with enough of their nodes inside the filtered set
///
/// # Arguments
/// * `elements` - Every element of the mesh instance
/// * `kept_nodes` - Labels of the filtered nodes
/// * `min_count` - Filtered nodes required to keep an element
///
/// # Returns
/// Each kept element with its connectivity reduced to the filtered nodes,
/// still in source order
pub fn filter_elements(
    elements: &[MeshElement],
    kept_nodes: &HashSet<Label>,
    min_count: usize,
) -> Vec<MeshElement> {
    elements
        .iter()
        .filter_map(|element| {
            let connectivity: Vec<Label> = element
                .connectivity
                .iter()
                .copied()
                .filter(|label| kept_nodes.contains(label))
                .collect();

            if connectivity.len() >= min_count {
                Some(MeshElement {
                    label: element.label,
                    connectivity,
                })
            } else {
                None
            }
        })
        .collect()
}
