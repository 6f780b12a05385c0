use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use nalgebra::Point3;
use serde_json::Value;

use crate::{datatypes::Label, error::ZoiError};

#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    pub label: Label,
    pub coordinates: Point3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshElement {
    pub label: Label,
    pub connectivity: Vec<Label>,
}

/// Named group of nodes and elements inside one instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSet {
    pub nodes: Vec<Label>,
    pub elements: Vec<Label>,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceData {
    pub name: String,
    pub nodes: Vec<MeshNode>,
    pub elements: Vec<MeshElement>,
    pub sets: HashMap<String, RegionSet>,
}

impl InstanceData {
    /// Resolves a named set into the node labels it covers: its own nodes
    /// plus every node of its elements.
    pub fn region(&self, set_name: &str) -> Result<HashSet<Label>, ZoiError> {
        let set = match self.sets.get(set_name) {
            Some(s) => s,
            None => {
                return Err(ZoiError::Database(format!(
                    "instance {} has no set named {set_name}",
                    self.name
                )))
            }
        };

        let set_elements: HashSet<Label> = set.elements.iter().copied().collect();
        let mut labels: HashSet<Label> = set.nodes.iter().copied().collect();
        for element in &self.elements {
            if set_elements.contains(&element.label) {
                labels.extend(element.connectivity.iter().copied());
            }
        }

        Ok(labels)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// One value of a field output, held by a node or an element
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub label: Label,
    pub instance: Option<String>,
    pub data: FieldValue,
}

#[derive(Debug, Clone, Default)]
pub struct FieldOutput {
    pub values: Vec<FieldRecord>,
}

impl FieldOutput {
    /// Restricts the records to the labels of a region
    pub fn subset<'a>(&'a self, region: &'a HashSet<Label>) -> impl Iterator<Item = &'a FieldRecord> {
        self.values
            .iter()
            .filter(move |record| region.contains(&record.label))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameData {
    pub fields: HashMap<String, FieldOutput>,
}

impl FrameData {
    pub fn field(&self, key: &str) -> Result<&FieldOutput, ZoiError> {
        match self.fields.get(key) {
            Some(f) => Ok(f),
            None => Err(ZoiError::Extraction(format!(
                "field output {key} is absent from the frame"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepData {
    pub name: String,
    pub frames: Vec<FrameData>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepSelector {
    Name(String),
    Index(usize),
}

/// Read access to a simulation result database
pub trait ResultDatabase {
    fn path(&self) -> &str;

    fn instance(&self, name: &str) -> Result<&InstanceData, ZoiError>;

    fn steps(&self) -> Result<&[StepData], ZoiError>;

    /// Releases the underlying handle. Further reads fail.
    fn close(&mut self);

    /// Resolves a frame of a step. Negative frame indices count back from
    /// the last frame.
    fn frame(&self, step: &StepSelector, frame_target: i64) -> Result<&FrameData, ZoiError> {
        let steps = self.steps()?;
        let step_data = match step {
            StepSelector::Name(name) => steps.iter().find(|s| &s.name == name),
            StepSelector::Index(idx) => steps.get(*idx),
        };
        let step_data = match step_data {
            Some(s) => s,
            None => {
                return Err(ZoiError::Database(format!(
                    "step {step:?} not found in {}",
                    self.path()
                )))
            }
        };

        let count = step_data.frames.len() as i64;
        let idx = if frame_target < 0 {
            count + frame_target
        } else {
            frame_target
        };
        if idx < 0 || idx >= count {
            return Err(ZoiError::Database(format!(
                "frame {frame_target} out of range for step {} with {count} frames",
                step_data.name
            )));
        }

        Ok(&step_data.frames[idx as usize])
    }
}

/// Opens result databases by path
pub trait DatabaseOpener {
    type Database: ResultDatabase;

    fn open(&self, path: &str) -> Result<Self::Database, ZoiError>;
}

/// Guard that closes its database when dropped
pub struct OpenDatabase<D: ResultDatabase> {
    inner: D,
}

impl<D: ResultDatabase> OpenDatabase<D> {
    pub fn new(inner: D) -> OpenDatabase<D> {
        OpenDatabase { inner }
    }
}

impl<D: ResultDatabase> Deref for OpenDatabase<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.inner
    }
}

impl<D: ResultDatabase> DerefMut for OpenDatabase<D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.inner
    }
}

impl<D: ResultDatabase> Drop for OpenDatabase<D> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

struct Contents {
    instances: HashMap<String, InstanceData>,
    steps: Vec<StepData>,
}

/// Result database exported as a JSON dump
///
/// Layout:
/// ```text
/// { "instances": { "<name>": { "nodes": [{"label", "coordinates": [x, y, z]}],
///                              "elements": [{"label", "connectivity": [..]}],
///                              "sets": { "<set>": {"nodes": [..], "elements": [..]} } } },
///   "steps": [ { "name", "frames": [ { "fields": { "<key>": [ {"label", "instance"?, "data"} ] } } ] } ] }
/// ```
pub struct JsonResultDatabase {
    path: String,
    contents: Option<Contents>,
}

impl JsonResultDatabase {
    /// Parses a result dump
    ///
    /// # Arguments
    /// * `path` - Where the dump was read from, used in messages
    /// * `source` - The dump contents
    pub fn parse(path: &str, source: &str) -> Result<JsonResultDatabase, ZoiError> {
        let root: Value = match serde_json::from_str(source) {
            Ok(r) => r,
            Err(err) => {
                return Err(ZoiError::Database(format!(
                    "result database {path} is not valid json: {err}"
                )))
            }
        };

        if !root["instances"].is_object() {
            return Err(ZoiError::Database(format!(
                "result database {path} has no instances object"
            )));
        }
        if !root["steps"].is_array() {
            return Err(ZoiError::Database(format!(
                "result database {path} has no steps array"
            )));
        }

        let mut instances = HashMap::new();
        for (name, instance_json) in entries(&root["instances"]) {
            instances.insert(name.to_owned(), parse_instance(path, name, instance_json)?);
        }

        let mut steps = Vec::new();
        for step_json in members(&root["steps"]) {
            steps.push(parse_step(path, step_json)?);
        }

        Ok(JsonResultDatabase {
            path: path.to_owned(),
            contents: Some(Contents { instances, steps }),
        })
    }

    fn contents(&self) -> Result<&Contents, ZoiError> {
        match &self.contents {
            Some(c) => Ok(c),
            None => Err(ZoiError::Database(format!(
                "result database {} is closed",
                self.path
            ))),
        }
    }
}

impl ResultDatabase for JsonResultDatabase {
    fn path(&self) -> &str {
        &self.path
    }

    fn instance(&self, name: &str) -> Result<&InstanceData, ZoiError> {
        match self.contents()?.instances.get(name) {
            Some(i) => Ok(i),
            None => Err(ZoiError::Database(format!(
                "instance {name} not found in {}",
                self.path
            ))),
        }
    }

    fn steps(&self) -> Result<&[StepData], ZoiError> {
        Ok(&self.contents()?.steps)
    }

    fn close(&mut self) {
        self.contents = None;
    }
}

/// Opens result dumps from the filesystem
pub struct JsonDatabaseOpener;

impl DatabaseOpener for JsonDatabaseOpener {
    type Database = JsonResultDatabase;

    fn open(&self, path: &str) -> Result<JsonResultDatabase, ZoiError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                return Err(ZoiError::Config(format!(
                    "Unable to open result database {path}: {err}"
                )))
            }
        };

        JsonResultDatabase::parse(path, &contents)
    }
}

fn members(value: &Value) -> &[Value] {
    match value.as_array() {
        Some(a) => a.as_slice(),
        None => &[],
    }
}

fn entries(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value.as_object().into_iter().flatten()
}

fn parse_label(path: &str, value: &Value, context: &str) -> Result<Label, ZoiError> {
    match value.as_u64() {
        Some(l) => Ok(l),
        None => Err(ZoiError::Database(format!(
            "bad label {value} in {context} of {path}"
        ))),
    }
}

fn parse_labels(path: &str, value: &Value, context: &str) -> Result<Vec<Label>, ZoiError> {
    members(value)
        .iter()
        .map(|v| parse_label(path, v, context))
        .collect()
}

fn parse_instance(path: &str, name: &str, value: &Value) -> Result<InstanceData, ZoiError> {
    let context = format!("instance {name}");

    let mut nodes = Vec::with_capacity(members(&value["nodes"]).len());
    for node_json in members(&value["nodes"]) {
        let label = parse_label(path, &node_json["label"], &context)?;
        let coords: Vec<f64> = members(&node_json["coordinates"])
            .iter()
            .filter_map(|c| c.as_f64())
            .collect();
        if coords.len() != 3 {
            return Err(ZoiError::Database(format!(
                "node {label} of {context} in {path} does not have 3 coordinates"
            )));
        }
        nodes.push(MeshNode {
            label,
            coordinates: Point3::new(coords[0], coords[1], coords[2]),
        });
    }

    let mut elements = Vec::with_capacity(members(&value["elements"]).len());
    for element_json in members(&value["elements"]) {
        let label = parse_label(path, &element_json["label"], &context)?;
        if !element_json["connectivity"].is_array() {
            return Err(ZoiError::Database(format!(
                "element {label} of {context} in {path} has no connectivity"
            )));
        }
        elements.push(MeshElement {
            label,
            connectivity: parse_labels(path, &element_json["connectivity"], &context)?,
        });
    }

    let mut sets = HashMap::new();
    for (set_name, set_json) in entries(&value["sets"]) {
        sets.insert(
            set_name.to_owned(),
            RegionSet {
                nodes: parse_labels(path, &set_json["nodes"], &context)?,
                elements: parse_labels(path, &set_json["elements"], &context)?,
            },
        );
    }

    Ok(InstanceData {
        name: name.to_owned(),
        nodes,
        elements,
        sets,
    })
}

fn parse_step(path: &str, value: &Value) -> Result<StepData, ZoiError> {
    let name = match value["name"].as_str() {
        Some(n) => n.to_owned(),
        None => {
            return Err(ZoiError::Database(format!(
                "step without a name in {path}"
            )))
        }
    };

    let mut frames = Vec::with_capacity(members(&value["frames"]).len());
    for frame_json in members(&value["frames"]) {
        let mut fields = HashMap::new();
        for (key, records_json) in entries(&frame_json["fields"]) {
            let context = format!("field {key} of step {name}");
            let mut values = Vec::with_capacity(members(records_json).len());
            for record in members(records_json) {
                values.push(FieldRecord {
                    label: parse_label(path, &record["label"], &context)?,
                    instance: record["instance"].as_str().map(|s| s.to_owned()),
                    data: parse_field_value(path, &record["data"], &context)?,
                });
            }
            fields.insert(key.to_owned(), FieldOutput { values });
        }
        frames.push(FrameData { fields });
    }

    Ok(StepData { name, frames })
}

fn parse_field_value(path: &str, value: &Value, context: &str) -> Result<FieldValue, ZoiError> {
    if let Some(v) = value.as_f64() {
        return Ok(FieldValue::Scalar(v));
    }
    if let Some(array) = value.as_array() {
        let mut components = Vec::with_capacity(array.len());
        for c in array {
            match c.as_f64() {
                Some(v) => components.push(v),
                None => {
                    return Err(ZoiError::Database(format!(
                        "non-numeric component {c} in {context} of {path}"
                    )))
                }
            }
        }
        return Ok(FieldValue::Vector(components));
    }

    Err(ZoiError::Database(format!(
        "bad field data {value} in {context} of {path}"
    )))
}
