use std::fmt::Display;

use nalgebra::{Point2, Point3, Vector2};

use crate::{datatypes::Label, error::ZoiError};

/// Relative tolerance used when deciding whether projected positions
/// coincide or span no area
const DEGENERACY_TOLERANCE: f64 = 1e-9;

/// Ways a reordered element can fail to form a simple planar quad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    DuplicatePosition,
    Collinear,
}

impl Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degeneracy::DuplicatePosition => write!(f, "duplicate projected position"),
            Degeneracy::Collinear => write!(f, "collinear projected positions"),
        }
    }
}

/// Drops the out-of-plane axis (axis 1) of a 3D coordinate
pub fn project(coords: &Point3<f64>) -> Point2<f64> {
    Point2::new(coords.x, coords.z)
}

fn projected_nodes<F>(node_ids: &[Label], lookup: F) -> Result<Vec<(Label, Point2<f64>)>, ZoiError>
where
    F: Fn(Label) -> Option<Point3<f64>>,
{
    node_ids
        .iter()
        .map(|&id| match lookup(id) {
            Some(coords) => Ok((id, project(&coords))),
            None => Err(ZoiError::Extraction(format!(
                "connectivity references node {id} which is not in the filtered node set"
            ))),
        })
        .collect()
}

/// Orders element nodes counter-clockwise around their projected centroid
///
/// # Arguments
/// * `node_ids` - The filtered connectivity of one element
/// * `lookup` - Resolves a node label to its 3D coordinates
///
/// # Returns
/// A permutation of `node_ids` sorted by ascending angle to the centroid
pub fn reorder<F>(node_ids: &[Label], lookup: F) -> Result<Vec<Label>, ZoiError>
where
    F: Fn(Label) -> Option<Point3<f64>>,
{
    let mut projected = projected_nodes(node_ids, lookup)?;
    if projected.is_empty() {
        return Ok(Vec::new());
    }

    let centroid = centroid(&projected);

    // stable sort, so ties keep their input order
    projected.sort_by(|(_, a), (_, b)| angle(a, &centroid).total_cmp(&angle(b, &centroid)));

    Ok(projected.into_iter().map(|(id, _)| id).collect())
}

fn centroid(projected: &[(Label, Point2<f64>)]) -> Point2<f64> {
    let sum: Vector2<f64> = projected.iter().map(|(_, p)| p.coords).sum();
    Point2::from(sum / projected.len() as f64)
}

fn angle(point: &Point2<f64>, centroid: &Point2<f64>) -> f64 {
    let d = point - centroid;
    d.y.atan2(d.x)
}

/// Checks whether ordered nodes fail to span a proper polygon once projected
///
/// # Arguments
/// * `node_ids` - Connectivity in polygon order
/// * `lookup` - Resolves a node label to its 3D coordinates
///
/// # Returns
/// The first degeneracy found, if any
pub fn degeneracy<F>(node_ids: &[Label], lookup: F) -> Result<Option<Degeneracy>, ZoiError>
where
    F: Fn(Label) -> Option<Point3<f64>>,
{
    let projected = projected_nodes(node_ids, lookup)?;
    let points: Vec<Point2<f64>> = projected.iter().map(|(_, p)| *p).collect();

    let scale = points
        .iter()
        .flat_map(|a| points.iter().map(move |b| (a - b).norm()))
        .fold(0.0, f64::max);

    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            if (a - b).norm() <= DEGENERACY_TOLERANCE * scale.max(f64::MIN_POSITIVE) {
                return Ok(Some(Degeneracy::DuplicatePosition));
            }
        }
    }

    if signed_area(&points).abs() <= DEGENERACY_TOLERANCE * scale * scale {
        return Ok(Some(Degeneracy::Collinear));
    }

    Ok(None)
}

/// Shoelace area of a polygon, positive when counter-clockwise
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    0.5 * twice
}
