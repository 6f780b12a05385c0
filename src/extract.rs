use std::collections::HashSet;

use crate::{
    assembler::Dataset,
    config::{ExtractionConfig, SourceConfig},
    connectivity,
    database::{DatabaseOpener, OpenDatabase, ResultDatabase},
    datatypes::{Element, Label, ResultSet},
    error::ZoiError,
    fields, filter,
    observer::ExtractionObserver,
};

/// Filters one source's mesh and attaches its fields
///
/// # Arguments
/// * `source` - The source settings
/// * `db` - The open result database of the source
/// * `observer` - Receives progress events
///
/// # Returns
/// The filtered nodes and elements with their field values
pub fn extract_source(
    source: &SourceConfig,
    db: &dyn ResultDatabase,
    observer: &mut dyn ExtractionObserver,
) -> Result<ResultSet, ZoiError> {
    let instance = db.instance(&source.instance_name)?;
    let mut result = ResultSet::new();

    let nodes = filter::filter_nodes(&instance.nodes, &source.zoi, source.tolerance);
    let kept_nodes: HashSet<Label> = nodes.iter().map(|n| n.label).collect();
    observer.nodes_filtered(&source.name, nodes.len(), instance.nodes.len());
    for node in nodes {
        result.insert_node(node);
    }

    let elements = filter::filter_elements(&instance.elements, &kept_nodes, source.min_element_nodes);
    observer.elements_filtered(&source.name, elements.len(), instance.elements.len());
    for element in elements {
        let lookup = |label: Label| result.node(label).map(|n| n.coords);
        let ordered = connectivity::reorder(&element.connectivity, lookup)?;
        if let Some(kind) = connectivity::degeneracy(&ordered, lookup)? {
            observer.degenerate_element(&source.name, element.label, kind);
        }
        result.insert_element(Element::new(element.label, ordered));
    }

    let frame = db.frame(&source.step, source.frame_target)?;
    fields::aggregate_fields(source, frame, instance, &mut result, observer)?;

    Ok(result)
}

/// Runs the extraction for every configured source, one after another.
///
/// Each database is closed before the next source starts, including when
/// extraction of the source fails. The first failure aborts the run.
pub fn run<O: DatabaseOpener>(
    config: &ExtractionConfig,
    opener: &O,
    observer: &mut dyn ExtractionObserver,
) -> Result<Dataset, ZoiError> {
    let mut dataset = Dataset::new();

    for source in &config.sources {
        observer.source_started(&source.name, &source.odb_path);

        let db = OpenDatabase::new(opener.open(&source.odb_path)?);
        observer.database_opened(&source.odb_path);

        let result = extract_source(source, &*db, observer);
        drop(db);
        observer.database_closed(&source.odb_path);

        dataset.insert(&source.name, result?);
        observer.source_finished(&source.name);
    }

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;
    use crate::{
        config::parse_config,
        database::{InstanceData, JsonResultDatabase, StepData},
        observer::tests::RecordingObserver,
    };

    const RUN_DUMP: &str = r#"{
        "instances": {
            "PART-1-1": {
                "nodes": [
                    {"label": 1, "coordinates": [0.0, 0.0, 0.0]},
                    {"label": 2, "coordinates": [1.0, 0.0, 0.0]},
                    {"label": 3, "coordinates": [1.0, 0.0, 1.0]},
                    {"label": 4, "coordinates": [0.0, 0.0, 1.0]},
                    {"label": 5, "coordinates": [2.0, 0.0, 0.0]},
                    {"label": 6, "coordinates": [2.0, 0.0, 1.0]},
                    {"label": 7, "coordinates": [9.0, 0.0, 0.0]},
                    {"label": 8, "coordinates": [9.0, 0.0, 1.0]}
                ],
                "elements": [
                    {"label": 1, "connectivity": [1, 3, 2, 4]},
                    {"label": 2, "connectivity": [2, 5, 6, 3]},
                    {"label": 3, "connectivity": [5, 7, 8, 6]}
                ],
                "sets": {"SET-ALL": {"elements": [1, 2, 3]}}
            }
        },
        "steps": [
            {"name": "Step-1", "frames": [
                {"fields": {
                    "PEEQ": [
                        {"label": 1, "instance": "PART-1-1", "data": 0.1},
                        {"label": 3, "instance": "PART-1-1", "data": 0.3}
                    ],
                    "PE": [
                        {"label": 1, "data": [0.01, 0.02, 0.03, 0.04, 0.05, 0.06]},
                        {"label": 2, "data": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]}
                    ],
                    "S": [
                        {"label": 1, "data": [1, 2, 3, 4, 5, 6]},
                        {"label": 2, "data": [7, 8, 9, 10, 11, 12]},
                        {"label": 99, "data": [0, 0, 0, 0, 0, 0]}
                    ],
                    "NT11": [
                        {"label": 1, "instance": "PART-1-1", "data": 400.0},
                        {"label": 2, "instance": "TOOL-1", "data": 25.0},
                        {"label": 2, "instance": "PART-1-1", "data": 410.0},
                        {"label": 7, "instance": "PART-1-1", "data": 300.0}
                    ]
                }}
            ]}
        ]
    }"#;

    fn source_config(odb_path: &str) -> SourceConfig {
        let config_json = json::parse(&format!(
            r#"{{
                "BIGGER": {{
                    "odb_path": "{odb_path}",
                    "step_name": "Step-1",
                    "frame_target": -1,
                    "instance_name": "PART-1-1",
                    "node_set_name": "SET-ALL",
                    "zoi_coordinates": {{"x1": 0, "x2": 2, "y1": -1, "y2": 1, "z1": 0, "z2": 1, "tolerance": 0.001}}
                }}
            }}"#
        ))
        .unwrap();
        parse_config(&config_json).unwrap().sources.remove(0)
    }

    /// Serves dumps from memory and records which ones are still open
    struct MemoryOpener {
        dumps: HashMap<String, String>,
        open: Rc<RefCell<HashSet<String>>>,
    }

    struct TrackedDatabase {
        inner: JsonResultDatabase,
        open: Rc<RefCell<HashSet<String>>>,
    }

    impl ResultDatabase for TrackedDatabase {
        fn path(&self) -> &str {
            self.inner.path()
        }

        fn instance(&self, name: &str) -> Result<&InstanceData, ZoiError> {
            self.inner.instance(name)
        }

        fn steps(&self) -> Result<&[StepData], ZoiError> {
            self.inner.steps()
        }

        fn close(&mut self) {
            self.inner.close();
            self.open.borrow_mut().remove(self.inner.path());
        }
    }

    impl DatabaseOpener for MemoryOpener {
        type Database = TrackedDatabase;

        fn open(&self, path: &str) -> Result<TrackedDatabase, ZoiError> {
            let dump = match self.dumps.get(path) {
                Some(d) => d,
                None => return Err(ZoiError::Config(format!("Unable to open {path}"))),
            };
            self.open.borrow_mut().insert(path.to_owned());
            Ok(TrackedDatabase {
                inner: JsonResultDatabase::parse(path, dump)?,
                open: Rc::clone(&self.open),
            })
        }
    }

    fn opener(dumps: &[(&str, &str)]) -> MemoryOpener {
        MemoryOpener {
            dumps: dumps
                .iter()
                .map(|(p, d)| (p.to_string(), d.to_string()))
                .collect(),
            open: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    #[test]
    fn extracts_filtered_mesh_with_fields() {
        let db = JsonResultDatabase::parse("run.json", RUN_DUMP).unwrap();
        let mut observer = RecordingObserver::default();

        let result = extract_source(&source_config("run.json"), &db, &mut observer).unwrap();

        let node_labels: Vec<Label> = result.nodes().iter().map(|n| n.label).collect();
        assert_eq!(node_labels, vec![1, 2, 3, 4, 5, 6]);
        let element_labels: Vec<Label> = result.elements().iter().map(|e| e.label).collect();
        assert_eq!(element_labels, vec![1, 2]);

        // source order 1, 3, 2, 4 is rewound counter-clockwise
        assert_eq!(result.element(1).unwrap().connectivity, vec![1, 2, 3, 4]);
        assert_eq!(result.element(2).unwrap().connectivity, vec![2, 5, 6, 3]);

        let first = result.element(1).unwrap();
        assert_eq!(first.peeq, Some(0.1));
        assert_eq!(first.stress, Some([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        assert_eq!(result.element(2).unwrap().peeq, None);
        assert!(result.element(99).is_none());

        assert_eq!(result.node(1).unwrap().temperature, Some(400.0));
        assert_eq!(result.node(2).unwrap().temperature, Some(410.0));
        assert!(result.node(7).is_none());

        assert!(observer.events.contains(&"field S 2/1".to_owned()));
        assert!(observer.events.contains(&"field NT11 2/2".to_owned()));
    }

    #[test]
    fn missing_field_aborts_the_source() {
        let dump = RUN_DUMP.replace("\"PE\":", "\"LE\":");
        let db = JsonResultDatabase::parse("run.json", &dump).unwrap();

        let result = extract_source(&source_config("run.json"), &db, &mut RecordingObserver::default());
        match result {
            Err(ZoiError::Extraction(msg)) => assert!(msg.contains("PE")),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn degenerate_elements_are_reported_and_kept() {
        // node 4 collapses onto node 1 once the y axis is dropped
        let dump = RUN_DUMP.replace(
            r#"{"label": 4, "coordinates": [0.0, 0.0, 1.0]}"#,
            r#"{"label": 4, "coordinates": [0.0, 0.5, 0.0]}"#,
        );
        let db = JsonResultDatabase::parse("run.json", &dump).unwrap();
        let mut observer = RecordingObserver::default();

        let result = extract_source(&source_config("run.json"), &db, &mut observer).unwrap();

        assert!(result.element(1).is_some());
        assert!(observer
            .events
            .contains(&"degenerate 1 duplicate projected position".to_owned()));
    }

    #[test]
    fn run_processes_sources_in_order_and_closes_databases() {
        let mut config = ExtractionConfig {
            sources: vec![source_config("a.json"), source_config("b.json")],
        };
        config.sources[1].name = "SMALLER".to_owned();
        let opener = opener(&[("a.json", RUN_DUMP), ("b.json", RUN_DUMP)]);
        let mut observer = RecordingObserver::default();

        let dataset = run(&config, &opener, &mut observer).unwrap();

        assert_eq!(dataset.source_names(), vec!["BIGGER", "SMALLER"]);
        assert!(opener.open.borrow().is_empty());
        assert_eq!(observer.events.first().unwrap(), "start BIGGER");
        assert_eq!(observer.events.last().unwrap(), "finish SMALLER");
    }

    #[test]
    fn failing_source_still_closes_its_database() {
        let broken = RUN_DUMP.replace("\"S\":", "\"X\":");
        let config = ExtractionConfig {
            sources: vec![source_config("a.json"), source_config("b.json")],
        };
        let opener = opener(&[("a.json", broken.as_str()), ("b.json", RUN_DUMP)]);
        let mut observer = RecordingObserver::default();

        let result = run(&config, &opener, &mut observer);

        assert!(result.is_err());
        assert!(opener.open.borrow().is_empty());
        assert!(observer.events.contains(&"close a.json".to_owned()));
        assert!(!observer.events.contains(&"open b.json".to_owned()));
    }

    #[test]
    fn extraction_from_disk_round_trips_through_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("run.json");
        std::fs::write(&dump_path, RUN_DUMP).unwrap();
        let config = ExtractionConfig {
            sources: vec![source_config(&dump_path.to_string_lossy())],
        };

        let dataset = run(&config, &crate::database::JsonDatabaseOpener, &mut RecordingObserver::default()).unwrap();
        let output = dir.path().join("config").join("data.json");
        dataset.save(&output, &mut RecordingObserver::default()).unwrap();

        let loaded = Dataset::load(&output).unwrap();
        let result = loaded.get("BIGGER").unwrap();
        assert_eq!(result.elements().len(), 2);
        assert_eq!(result.element(1).unwrap().connectivity, vec![1, 2, 3, 4]);
        assert_eq!(result.node(2).unwrap().temperature, Some(410.0));
        assert_eq!(loaded, dataset);
    }
}
