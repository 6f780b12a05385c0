use std::path::Path;

use nalgebra::Point3;
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Serializer, Value};

use crate::{
    datatypes::{Element, Label, Node, ResultSet, Tensor6},
    error::ZoiError,
    observer::ExtractionObserver,
};

/// Result sets of every processed source, keyed by source name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    sources: Vec<(String, ResultSet)>,
}

impl Dataset {
    pub fn new() -> Dataset {
        Dataset::default()
    }

    /// Adds a source, replacing an earlier source of the same name
    pub fn insert(&mut self, name: &str, result: ResultSet) {
        match self.sources.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = result,
            None => self.sources.push((name.to_owned(), result)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResultSet> {
        self.sources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, result)| result)
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Builds the output document
    pub fn to_json(&self) -> Value {
        let mut document = Map::new();

        for (name, result) in &self.sources {
            let nodes: Map<String, Value> = result
                .nodes()
                .iter()
                .map(|node| (node.label.to_string(), node_json(node)))
                .collect();
            let elements: Map<String, Value> = result
                .elements()
                .iter()
                .map(|element| (element.label.to_string(), element_json(element)))
                .collect();

            let mut source = Map::new();
            source.insert("nodes".to_owned(), Value::Object(nodes));
            source.insert("elements".to_owned(), Value::Object(elements));
            document.insert(name.clone(), Value::Object(source));
        }

        Value::Object(document)
    }

    /// Rebuilds a dataset from an output document
    pub fn from_json(document: &Value) -> Result<Dataset, ZoiError> {
        let sources = match document.as_object() {
            Some(s) => s,
            None => {
                return Err(ZoiError::Config(
                    "Data document must be an object keyed by source name".to_owned(),
                ))
            }
        };

        let mut dataset = Dataset::new();
        for (name, source_json) in sources {
            let mut result = ResultSet::new();

            for (label, node_json) in section(name, source_json, "nodes")? {
                result.insert_node(parse_node(name, label, node_json)?);
            }
            for (label, element_json) in section(name, source_json, "elements")? {
                result.insert_element(parse_element(name, label, element_json)?);
            }

            dataset.insert(name, result);
        }

        Ok(dataset)
    }

    /// Serializes the document with a four space indent. Floats are written
    /// in their shortest form that reads back to the same bits.
    pub fn render(&self) -> Result<String, ZoiError> {
        let mut buffer = Vec::new();
        let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
        if let Err(err) = self.to_json().serialize(&mut serializer) {
            return Err(ZoiError::Output(format!("Failed to build document: {err}")));
        }

        match String::from_utf8(buffer) {
            Ok(s) => Ok(s),
            Err(err) => Err(ZoiError::Output(format!("Failed to build document: {err}"))),
        }
    }

    pub fn parse(contents: &str) -> Result<Dataset, ZoiError> {
        match serde_json::from_str::<Value>(contents) {
            Ok(document) => Dataset::from_json(&document),
            Err(err) => Err(ZoiError::Config(format!(
                "Error in data file json: {err}"
            ))),
        }
    }

    /// Writes the document to `path`, creating parent directories
    pub fn save(&self, path: &Path, observer: &mut dyn ExtractionObserver) -> Result<(), ZoiError> {
        let document = self.render()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    return Err(ZoiError::Output(format!(
                        "Failed to create {}: {err}",
                        parent.display()
                    )));
                }
            }
        }

        if let Err(err) = std::fs::write(path, document) {
            return Err(ZoiError::Output(format!(
                "Failed to write {}: {err}",
                path.display()
            )));
        }

        observer.document_saved(path, self.sources.len());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Dataset, ZoiError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Dataset::parse(&contents),
            Err(err) => Err(ZoiError::Config(format!(
                "Unable to open data file {}: {err}",
                path.display()
            ))),
        }
    }
}

fn section<'a>(source: &str, source_json: &'a Value, key: &str) -> Result<&'a Map<String, Value>, ZoiError> {
    match source_json[key].as_object() {
        Some(s) => Ok(s),
        None => Err(ZoiError::Config(format!(
            "Source '{source}' has no {key} object"
        ))),
    }
}

fn node_json(node: &Node) -> Value {
    let mut value = Map::new();
    value.insert(
        "coords".to_owned(),
        Value::from(vec![node.coords.x, node.coords.y, node.coords.z]),
    );
    if let Some(t) = node.temperature {
        value.insert("NT11".to_owned(), Value::from(t));
    }
    Value::Object(value)
}

fn element_json(element: &Element) -> Value {
    let mut value = Map::new();
    value.insert(
        "connectivity".to_owned(),
        Value::from(element.connectivity.clone()),
    );
    if let Some(peeq) = element.peeq {
        value.insert("PEEQ".to_owned(), Value::from(peeq));
    }
    if let Some(pe) = element.plastic_strain {
        value.insert("PE".to_owned(), Value::from(pe.to_vec()));
    }
    if let Some(s) = element.stress {
        value.insert("S".to_owned(), Value::from(s.to_vec()));
    }
    Value::Object(value)
}

fn parse_label(source: &str, label: &str) -> Result<Label, ZoiError> {
    match label.parse() {
        Ok(l) => Ok(l),
        Err(_) => Err(ZoiError::Config(format!(
            "Label '{label}' in source '{source}' is not an integer"
        ))),
    }
}

fn parse_floats(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn parse_tensor(source: &str, label: &str, key: &str, value: &Value) -> Result<Option<Tensor6>, ZoiError> {
    if value.is_null() {
        return Ok(None);
    }
    match parse_floats(value) {
        Some(v) if v.len() == 6 => Ok(Some([v[0], v[1], v[2], v[3], v[4], v[5]])),
        _ => Err(ZoiError::Config(format!(
            "Bad {key} on element {label} in source '{source}'"
        ))),
    }
}

fn parse_scalar(source: &str, label: &str, key: &str, value: &Value) -> Result<Option<f64>, ZoiError> {
    if value.is_null() {
        return Ok(None);
    }
    match value.as_f64() {
        Some(v) => Ok(Some(v)),
        None => Err(ZoiError::Config(format!(
            "Bad {key} on {label} in source '{source}'"
        ))),
    }
}

fn parse_node(source: &str, label: &str, value: &Value) -> Result<Node, ZoiError> {
    let coords = match parse_floats(&value["coords"]) {
        Some(c) if c.len() == 3 => Point3::new(c[0], c[1], c[2]),
        _ => {
            return Err(ZoiError::Config(format!(
                "Node {label} in source '{source}' needs 3 coords"
            )))
        }
    };

    Ok(Node {
        label: parse_label(source, label)?,
        coords,
        temperature: parse_scalar(source, label, "NT11", &value["NT11"])?,
    })
}

fn parse_element(source: &str, label: &str, value: &Value) -> Result<Element, ZoiError> {
    let connectivity: Option<Vec<Label>> = value["connectivity"]
        .as_array()
        .and_then(|nodes| nodes.iter().map(Value::as_u64).collect());
    let connectivity = match connectivity {
        Some(c) => c,
        None => {
            return Err(ZoiError::Config(format!(
                "Bad connectivity on element {label} in source '{source}'"
            )))
        }
    };

    Ok(Element {
        label: parse_label(source, label)?,
        connectivity,
        peeq: parse_scalar(source, label, "PEEQ", &value["PEEQ"])?,
        plastic_strain: parse_tensor(source, label, "PE", &value["PE"])?,
        stress: parse_tensor(source, label, "S", &value["S"])?,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tempfile::tempdir;

    use super::*;
    use crate::observer::tests::NullObserver;

    fn sample() -> Dataset {
        let mut result = ResultSet::new();
        result.insert_node(Node {
            label: 12,
            coords: Point3::new(0.125, -3.5, 1e-7),
            temperature: Some(812.25),
        });
        result.insert_node(Node {
            label: 3,
            coords: Point3::new(1.0 / 3.0, 0.0, 2.0),
            temperature: None,
        });
        result.insert_element(Element {
            label: 40,
            connectivity: vec![12, 3, 5, 7],
            peeq: Some(0.1 + 0.2),
            plastic_strain: Some([1e-3, -2e-3, 5e-4, 0.0, 1.5e-4, -7e-5]),
            stress: Some([-115.84507314747549, 120.0, 33.3, 5e-324, -5.5, f64::MAX]),
        });
        result.insert_element(Element::new(41, vec![3, 5, 7, 9]));

        let mut dataset = Dataset::new();
        dataset.insert("BIGGER", result);
        dataset.insert("SMALLER", ResultSet::new());
        dataset
    }

    fn bits(values: &[f64]) -> Vec<u64> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn document_has_the_consumer_shape() {
        let document = sample().to_json();

        let node = &document["BIGGER"]["nodes"]["12"];
        assert_eq!(node["coords"].as_array().unwrap().len(), 3);
        assert_eq!(node["NT11"].as_f64(), Some(812.25));
        assert!(document["BIGGER"]["nodes"]["3"].get("NT11").is_none());

        let element = &document["BIGGER"]["elements"]["40"];
        assert_eq!(element["connectivity"][0].as_u64(), Some(12));
        assert_eq!(element["S"].as_array().unwrap().len(), 6);
        assert!(document["BIGGER"]["elements"]["41"].get("S").is_none());

        assert!(document["SMALLER"]["nodes"].as_object().unwrap().is_empty());
    }

    #[test]
    fn rendered_document_uses_four_space_indent() {
        let rendered = sample().render().unwrap();
        assert!(rendered.starts_with("{\n    \"BIGGER\": {\n        \"nodes\""));
        assert!(rendered.contains("0.30000000000000004"));
    }

    #[test]
    fn saved_document_reads_back_bit_for_bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("data.json");
        let dataset = sample();

        dataset.save(&path, &mut NullObserver).unwrap();
        let loaded = Dataset::load(&path).unwrap();

        assert_eq!(loaded.source_names(), vec!["BIGGER", "SMALLER"]);
        let original = dataset.get("BIGGER").unwrap();
        let reread = loaded.get("BIGGER").unwrap();

        let labels: Vec<Label> = reread.nodes().iter().map(|n| n.label).collect();
        assert_eq!(labels, vec![12, 3]);

        for (a, b) in original.nodes().iter().zip(reread.nodes()) {
            assert_eq!(bits(a.coords.coords.as_slice()), bits(b.coords.coords.as_slice()));
            assert_eq!(a.temperature.map(f64::to_bits), b.temperature.map(f64::to_bits));
        }

        let a = original.element(40).unwrap();
        let b = reread.element(40).unwrap();
        assert_eq!(a.connectivity, b.connectivity);
        assert_eq!(a.peeq.map(f64::to_bits), b.peeq.map(f64::to_bits));
        assert_eq!(bits(&a.stress.unwrap()), bits(&b.stress.unwrap()));
        assert_eq!(bits(&a.plastic_strain.unwrap()), bits(&b.plastic_strain.unwrap()));
        assert_eq!(reread.element(41).unwrap().stress, None);

        assert_eq!(&loaded, &dataset);
    }

    #[test]
    fn non_integer_labels_are_rejected() {
        let result = Dataset::parse(
            r#"{"BIGGER": {"nodes": {"n1": {"coords": [0, 0, 0]}}, "elements": {}}}"#,
        );
        assert!(matches!(result, Err(ZoiError::Config(_))));
    }

    #[test]
    fn short_tensors_are_rejected() {
        let result = Dataset::parse(
            r#"{"BIGGER": {"nodes": {}, "elements": {"1": {"connectivity": [1, 2, 3, 4], "S": [1, 2, 3]}}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_sections_are_rejected() {
        assert!(Dataset::parse(r#"{"BIGGER": {"nodes": {}}}"#).is_err());
        assert!(Dataset::parse(
            r#"{"BIGGER": {"nodes": {}, "elements": {"1": {"S": [1, 2, 3, 4, 5, 6]}}}}"#
        )
        .is_err());
    }

    proptest! {
        #[test]
        fn stress_survives_render_and_parse(
            stress in prop::array::uniform6(
                prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO
            ),
            peeq in -500.0..500.0f64,
        ) {
            let mut result = ResultSet::new();
            result.insert_element(Element {
                label: 1,
                connectivity: vec![1, 2, 3, 4],
                peeq: Some(peeq),
                plastic_strain: None,
                stress: Some(stress),
            });
            let mut dataset = Dataset::new();
            dataset.insert("BIGGER", result);

            let reread = Dataset::parse(&dataset.render().unwrap()).unwrap();
            let element = reread.get("BIGGER").unwrap().element(1).unwrap();

            prop_assert_eq!(bits(&element.stress.unwrap()), bits(&stress));
            prop_assert_eq!(element.peeq.map(f64::to_bits), Some(peeq.to_bits()));
        }
    }
}
