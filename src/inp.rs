use std::path::Path;

use crate::{datatypes::ResultSet, error::ZoiError};

/// Deck comment the initial conditions are inserted in front of
pub const PREDEFINED_FIELDS_MARKER: &str = "** PREDEFINED FIELDS";

/// Builds the STRESS and HARDENING initial-condition data lines
///
/// Stress is mapped onto the plane of the rebuilt mesh: S11, S33, S22 and
/// S13 of the source fill S11, S22, S33 and S12 of the planar element.
/// Elements without a stress or PEEQ value get no line in that block.
///
/// # Arguments
/// * `result` - The extracted source
/// * `instance` - Instance name of the rebuilt part in the target deck
///
/// # Returns
/// The stress lines and the hardening lines, in element order
pub fn initial_condition_lines(result: &ResultSet, instance: &str) -> (Vec<String>, Vec<String>) {
    let mut stress_lines = Vec::new();
    let mut hardening_lines = Vec::new();

    for element in result.elements() {
        if let Some(s) = element.stress {
            stress_lines.push(format!(
                "{instance}.{}, {:?}, {:?}, {:?}, {:?}, 0., 0.",
                element.label, s[0], s[2], s[1], s[4]
            ));
        }
        if let Some(peeq) = element.peeq {
            hardening_lines.push(format!(
                "{instance}.{}, {:?}, 0., 0., 0., 0., 0., 0.",
                element.label, peeq
            ));
        }
    }

    (stress_lines, hardening_lines)
}

/// Inserts the initial conditions in front of the predefined fields marker
///
/// # Arguments
/// * `deck` - The input deck text
/// * `result` - The extracted source
/// * `instance` - Instance name of the rebuilt part in the deck
pub fn patch_deck(deck: &str, result: &ResultSet, instance: &str) -> Result<String, ZoiError> {
    let (stress_lines, hardening_lines) = initial_condition_lines(result, instance);

    let mut patched = String::with_capacity(deck.len());
    let mut inserted = false;

    for line in deck.split_inclusive('\n') {
        if !inserted
            && line
                .trim()
                .to_uppercase()
                .starts_with(PREDEFINED_FIELDS_MARKER)
        {
            patched.push_str("*Initial Conditions, type=STRESS\n");
            for l in &stress_lines {
                patched.push_str(l);
                patched.push('\n');
            }
            patched.push_str("*Initial Conditions, type=HARDENING\n");
            for l in &hardening_lines {
                patched.push_str(l);
                patched.push('\n');
            }
            inserted = true;
        }
        patched.push_str(line);
    }

    if !inserted {
        return Err(ZoiError::Output(format!(
            "Input deck has no '{PREDEFINED_FIELDS_MARKER}' section"
        )));
    }

    Ok(patched)
}

/// Reads a deck, patches it and writes the result
pub fn patch_file(
    deck_path: &Path,
    output_path: &Path,
    result: &ResultSet,
    instance: &str,
) -> Result<(), ZoiError> {
    let deck = match std::fs::read_to_string(deck_path) {
        Ok(d) => d,
        Err(err) => {
            return Err(ZoiError::Config(format!(
                "Unable to open input deck {}: {err}",
                deck_path.display()
            )))
        }
    };

    let patched = patch_deck(&deck, result, instance)?;

    if let Err(err) = std::fs::write(output_path, patched) {
        return Err(ZoiError::Output(format!(
            "Failed to write {}: {err}",
            output_path.display()
        )));
    }

    Ok(())
}
