use std::collections::HashMap;

use nalgebra::Point2;

use crate::{
    connectivity::{project, signed_area},
    datatypes::{Label, ResultSet, Tensor6},
    error::ZoiError,
};

/// Four-node planar element of the rebuilt mesh
#[derive(Debug, Clone, PartialEq)]
pub struct QuadElement {
    pub label: Label,
    pub nodes: [Label; 4],
    pub peeq: Option<f64>,
    pub stress: Option<Tensor6>,
}

/// Planar mesh in the X-Z plane of the source
#[derive(Debug, Clone, Default)]
pub struct PlanarMesh {
    pub nodes: HashMap<Label, Point2<f64>>,
    pub elements: Vec<QuadElement>,
}

impl PlanarMesh {
    fn corners(&self, element: &QuadElement) -> [Point2<f64>; 4] {
        element.nodes.map(|label| self.nodes[&label])
    }

    pub fn centroid(&self, element: &QuadElement) -> Point2<f64> {
        let corners = self.corners(element);
        let sum = corners.iter().fold(Point2::origin(), |acc, p| acc + p.coords);
        sum / 4.0
    }

    /// Signed area, positive for counter-clockwise connectivity
    pub fn area(&self, element: &QuadElement) -> f64 {
        signed_area(&self.corners(element))
    }
}

/// Rebuilds one source as a planar quad mesh
///
/// # Arguments
/// * `result` - The source as read from the data document
///
/// # Returns
/// A mesh taking X from axis 0 and Y from axis 2, with connectivity used
/// verbatim
pub fn planar_mesh(result: &ResultSet) -> Result<PlanarMesh, ZoiError> {
    let nodes: HashMap<Label, Point2<f64>> = result
        .nodes()
        .iter()
        .map(|n| (n.label, project(&n.coords)))
        .collect();

    let mut elements = Vec::with_capacity(result.elements().len());
    for element in result.elements() {
        let quad: [Label; 4] = match element.connectivity.as_slice().try_into() {
            Ok(q) => q,
            Err(_) => {
                return Err(ZoiError::Extraction(format!(
                    "element {} has {} nodes, a quad needs 4",
                    element.label,
                    element.connectivity.len()
                )))
            }
        };
        if let Some(missing) = quad.iter().find(|label| !nodes.contains_key(*label)) {
            return Err(ZoiError::Extraction(format!(
                "element {} references node {missing} which is not in the data",
                element.label
            )));
        }

        elements.push(QuadElement {
            label: element.label,
            nodes: quad,
            peeq: element.peeq,
            stress: element.stress,
        });
    }

    Ok(PlanarMesh { nodes, elements })
}
