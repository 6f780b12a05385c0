use json::JsonValue;

use crate::{
    database::StepSelector,
    datatypes::{Quantity, ZoiBox},
    error::ZoiError,
    filter::DEFAULT_MIN_ELEMENT_NODES,
};

/// Frame field-output keys for each extracted quantity
#[derive(Debug, Clone, PartialEq)]
pub struct FieldKeys {
    pub peeq: String,
    pub plastic_strain: String,
    pub stress: String,
    pub temperature: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        FieldKeys {
            peeq: Quantity::EquivalentPlasticStrain.key().to_owned(),
            plastic_strain: Quantity::PlasticStrain.key().to_owned(),
            stress: Quantity::Stress.key().to_owned(),
            temperature: Quantity::Temperature.key().to_owned(),
        }
    }
}

impl FieldKeys {
    pub fn key(&self, quantity: Quantity) -> &str {
        match quantity {
            Quantity::EquivalentPlasticStrain => &self.peeq,
            Quantity::PlasticStrain => &self.plastic_strain,
            Quantity::Stress => &self.stress,
            Quantity::Temperature => &self.temperature,
        }
    }
}

/// Extraction settings for one result database
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub odb_path: String,
    pub step: StepSelector,
    pub frame_target: i64,
    pub instance_name: String,
    pub node_set_name: String,
    pub zoi: ZoiBox,
    pub tolerance: f64,
    pub min_element_nodes: usize,
    pub field_keys: FieldKeys,
}

/// Sources in the order they appear in the configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub sources: Vec<SourceConfig>,
}

/// Reads and parses the extraction configuration
///
/// # Arguments
/// * `config_file` - The path to the configuration json
pub fn load_config(config_file: &str) -> Result<ExtractionConfig, ZoiError> {
    let file_string = match std::fs::read_to_string(config_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(ZoiError::Config(format!(
                "Unable to open config file {config_file}: {err}"
            )))
        }
    };

    let config_json = match json::parse(&file_string) {
        Ok(f) => f,
        Err(err) => {
            return Err(ZoiError::Config(format!(
                "Error in config file json: {err}"
            )))
        }
    };

    parse_config(&config_json)
}

/// Parses every source entry of a configuration object
pub fn parse_config(config_json: &JsonValue) -> Result<ExtractionConfig, ZoiError> {
    if !config_json.is_object() {
        return Err(ZoiError::Config(
            "Config must be an object keyed by source name".to_owned(),
        ));
    }

    let mut sources = Vec::new();
    for (name, source_json) in config_json.entries() {
        sources.push(parse_source(name, source_json)?);
    }

    Ok(ExtractionConfig { sources })
}

fn required<'a>(name: &str, source_json: &'a JsonValue, key: &str) -> Result<&'a JsonValue, ZoiError> {
    if !source_json.has_key(key) {
        return Err(ZoiError::Config(format!(
            "Source '{name}' is missing {key} field"
        )));
    }
    Ok(&source_json[key])
}

fn required_str(name: &str, source_json: &JsonValue, key: &str) -> Result<String, ZoiError> {
    match required(name, source_json, key)?.as_str() {
        Some(s) => Ok(s.to_owned()),
        None => Err(ZoiError::Config(format!(
            "Bad value for {key} in '{name}', expected a string"
        ))),
    }
}

fn required_f64(name: &str, parent: &JsonValue, key: &str) -> Result<f64, ZoiError> {
    match required(name, parent, key)?.as_f64() {
        Some(v) => Ok(v),
        None => Err(ZoiError::Config(format!(
            "Bad value for {key} in '{name}', expected a number"
        ))),
    }
}

/// `step_name` wins over `step_index`. A key that is present must have the
/// right type even when the other one would do.
fn parse_step(name: &str, source_json: &JsonValue) -> Result<StepSelector, ZoiError> {
    let step_index = if source_json.has_key("step_index") {
        match source_json["step_index"].as_usize() {
            Some(idx) => Some(idx),
            None => {
                return Err(ZoiError::Config(format!(
                    "Bad value for step_index in '{name}', expected a non-negative integer"
                )))
            }
        }
    } else {
        None
    };

    if source_json.has_key("step_name") {
        return Ok(StepSelector::Name(required_str(name, source_json, "step_name")?));
    }
    match step_index {
        Some(idx) => Ok(StepSelector::Index(idx)),
        None => Err(ZoiError::Config(format!(
            "Source '{name}' needs a step_name or a step_index"
        ))),
    }
}

fn parse_zoi(name: &str, source_json: &JsonValue) -> Result<(ZoiBox, f64), ZoiError> {
    let zoi_json = required(name, source_json, "zoi_coordinates")?;

    let zoi = ZoiBox {
        x: [
            required_f64(name, zoi_json, "x1")?,
            required_f64(name, zoi_json, "x2")?,
        ],
        y: [
            required_f64(name, zoi_json, "y1")?,
            required_f64(name, zoi_json, "y2")?,
        ],
        z: [
            required_f64(name, zoi_json, "z1")?,
            required_f64(name, zoi_json, "z2")?,
        ],
    };

    let tolerance = required_f64(name, zoi_json, "tolerance")?;
    if tolerance < 0.0 || !tolerance.is_finite() {
        return Err(ZoiError::Config(format!(
            "Source '{name}' has a negative or non-finite tolerance"
        )));
    }

    Ok((zoi, tolerance))
}

fn parse_field_keys(name: &str, source_json: &JsonValue) -> Result<FieldKeys, ZoiError> {
    let mut keys = FieldKeys::default();
    if !source_json.has_key("field_keys") {
        return Ok(keys);
    }
    if !source_json["field_keys"].is_object() {
        return Err(ZoiError::Config(format!(
            "Bad value for field_keys in '{name}', expected an object"
        )));
    }

    for (quantity_key, value) in source_json["field_keys"].entries() {
        let key = match value.as_str() {
            Some(k) => k.to_owned(),
            None => {
                return Err(ZoiError::Config(format!(
                    "Bad value for field_keys.{quantity_key} in '{name}'"
                )))
            }
        };
        match quantity_key {
            "PEEQ" => keys.peeq = key,
            "PE" => keys.plastic_strain = key,
            "S" => keys.stress = key,
            "NT11" => keys.temperature = key,
            other => {
                return Err(ZoiError::Config(format!(
                    "Unknown quantity {other} in field_keys of '{name}'"
                )))
            }
        }
    }

    Ok(keys)
}

fn parse_source(name: &str, source_json: &JsonValue) -> Result<SourceConfig, ZoiError> {
    let frame_target = match required(name, source_json, "frame_target")?.as_i64() {
        Some(f) => f,
        None => {
            return Err(ZoiError::Config(format!(
                "Bad value for frame_target in '{name}', expected an integer"
            )))
        }
    };

    let min_element_nodes = if source_json.has_key("min_element_nodes") {
        match source_json["min_element_nodes"].as_usize() {
            Some(n) if n > 0 => n,
            _ => {
                return Err(ZoiError::Config(format!(
                    "Bad value for min_element_nodes in '{name}'"
                )))
            }
        }
    } else {
        DEFAULT_MIN_ELEMENT_NODES
    };

    let (zoi, tolerance) = parse_zoi(name, source_json)?;

    Ok(SourceConfig {
        name: name.to_owned(),
        odb_path: required_str(name, source_json, "odb_path")?,
        step: parse_step(name, source_json)?,
        frame_target,
        instance_name: required_str(name, source_json, "instance_name")?,
        node_set_name: required_str(name, source_json, "node_set_name")?,
        zoi,
        tolerance,
        min_element_nodes,
        field_keys: parse_field_keys(name, source_json)?,
    })
}
