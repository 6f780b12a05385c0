use std::io::Write;
use std::path::Path;

use crate::{error::ZoiError, rebuild::PlanarMesh};

/// Writes one row per stressed element: its centroid, area, S11 and PEEQ
///
/// # Arguments
/// * `mesh` - The rebuilt planar mesh
/// * `elements_output` - The filename of the output csv
///
/// # Returns
/// The number of rows written
pub fn csv_output(mesh: &PlanarMesh, elements_output: &Path) -> Result<usize, ZoiError> {
    let mut elements_file = match std::fs::File::create(elements_output) {
        Ok(f) => f,
        Err(err) => {
            return Err(ZoiError::Output(format!(
                "Failed to create {}: {err}",
                elements_output.display()
            )));
        }
    };

    let mut contents = String::from("label,x,z,area,s11,peeq\n");
    let mut rows = 0;
    for element in &mesh.elements {
        let stress = match element.stress {
            Some(s) => s,
            None => continue,
        };
        let centroid = mesh.centroid(element);
        let peeq = match element.peeq {
            Some(p) => p.to_string(),
            None => String::new(),
        };

        contents.push_str(&format!(
            "{label},{x},{z},{area},{s11},{peeq}\n",
            label = element.label,
            x = centroid.x,
            z = centroid.y,
            area = mesh.area(element),
            s11 = stress[0],
        ));
        rows += 1;
    }

    if let Err(err) = elements_file.write_all(contents.as_bytes()) {
        return Err(ZoiError::Output(format!(
            "Failed to write {}: {err}",
            elements_output.display()
        )));
    }

    Ok(rows)
}
