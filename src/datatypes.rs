use std::collections::HashMap;
use std::fmt::Display;

use nalgebra::Point3;

/// Node or element label as numbered by the result database
pub type Label = u64;

/// Symmetric tensor in S11, S22, S33, S12, S13, S23 order
pub type Tensor6 = [f64; 6];

/// Axis-aligned zone of interest given by two corner values per axis, in
/// any order.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoiBox {
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
}

impl ZoiBox {
    /// Normalizes every axis pair into (min, max) and grows it by
    /// `tolerance` on both sides.
    ///
    /// # Returns
    /// The lower and upper corners of the expanded box
    pub fn bounds(&self, tolerance: f64) -> (Point3<f64>, Point3<f64>) {
        let (x_min, x_max) = ordered(self.x);
        let (y_min, y_max) = ordered(self.y);
        let (z_min, z_max) = ordered(self.z);

        (
            Point3::new(x_min - tolerance, y_min - tolerance, z_min - tolerance),
            Point3::new(x_max + tolerance, y_max + tolerance, z_max + tolerance),
        )
    }
}

fn ordered(pair: [f64; 2]) -> (f64, f64) {
    if pair[0] <= pair[1] {
        (pair[0], pair[1])
    } else {
        (pair[1], pair[0])
    }
}

/// The four physical quantities carried over to the relaxation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    EquivalentPlasticStrain,
    PlasticStrain,
    Stress,
    Temperature,
}

impl Quantity {
    /// Extraction order within one source
    pub const ALL: [Quantity; 4] = [
        Quantity::EquivalentPlasticStrain,
        Quantity::PlasticStrain,
        Quantity::Stress,
        Quantity::Temperature,
    ];

    /// Attribute name used in the output document
    pub fn key(&self) -> &'static str {
        match self {
            Quantity::EquivalentPlasticStrain => "PEEQ",
            Quantity::PlasticStrain => "PE",
            Quantity::Stress => "S",
            Quantity::Temperature => "NT11",
        }
    }

    pub fn is_nodal(&self) -> bool {
        matches!(self, Quantity::Temperature)
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub label: Label,
    pub coords: Point3<f64>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub label: Label,
    pub connectivity: Vec<Label>,
    pub peeq: Option<f64>,
    pub plastic_strain: Option<Tensor6>,
    pub stress: Option<Tensor6>,
}

impl Element {
    pub fn new(label: Label, connectivity: Vec<Label>) -> Element {
        Element {
            label,
            connectivity,
            peeq: None,
            plastic_strain: None,
            stress: None,
        }
    }
}

/// Filtered nodes and elements of one source, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    nodes: Vec<Node>,
    elements: Vec<Element>,
    node_index: HashMap<Label, usize>,
    element_index: HashMap<Label, usize>,
}

impl ResultSet {
    pub fn new() -> ResultSet {
        ResultSet::default()
    }

    /// Inserts a node, replacing any node already stored under its label
    pub fn insert_node(&mut self, node: Node) {
        match self.node_index.get(&node.label) {
            Some(&idx) => self.nodes[idx] = node,
            None => {
                self.node_index.insert(node.label, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Inserts an element, replacing any element already stored under its label
    pub fn insert_element(&mut self, element: Element) {
        match self.element_index.get(&element.label) {
            Some(&idx) => self.elements[idx] = element,
            None => {
                self.element_index.insert(element.label, self.elements.len());
                self.elements.push(element);
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn node(&self, label: Label) -> Option<&Node> {
        self.node_index.get(&label).map(|&idx| &self.nodes[idx])
    }

    pub fn node_mut(&mut self, label: Label) -> Option<&mut Node> {
        self.node_index.get(&label).map(|&idx| &mut self.nodes[idx])
    }

    #[cfg(test)]
    pub fn element(&self, label: Label) -> Option<&Element> {
        self.element_index.get(&label).map(|&idx| &self.elements[idx])
    }

    pub fn element_mut(&mut self, label: Label) -> Option<&mut Element> {
        self.element_index
            .get(&label)
            .map(|&idx| &mut self.elements[idx])
    }
}
