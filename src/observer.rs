use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::connectivity::Degeneracy;
use crate::datatypes::{Label, Quantity};

/// Receives progress events from the extraction components.
///
/// Every method has an empty default so an observer only implements the
/// events it cares about.
pub trait ExtractionObserver {
    fn source_started(&mut self, _source: &str, _odb_path: &str) {}

    fn database_opened(&mut self, _path: &str) {}

    fn database_closed(&mut self, _path: &str) {}

    fn nodes_filtered(&mut self, _source: &str, _kept: usize, _total: usize) {}

    fn elements_filtered(&mut self, _source: &str, _kept: usize, _total: usize) {}

    fn degenerate_element(&mut self, _source: &str, _label: Label, _kind: Degeneracy) {}

    fn field_started(&mut self, _quantity: Quantity, _records: usize) {}

    fn record_walked(&mut self) {}

    fn field_attached(&mut self, _source: &str, _quantity: Quantity, _attached: usize, _dropped: usize) {}

    fn source_finished(&mut self, _source: &str) {}

    fn document_saved(&mut self, _path: &Path, _sources: usize) {}
}

/// Emits every event through `tracing`, optionally with a progress bar
/// while field records are walked.
pub struct LogObserver {
    progress: bool,
    bar: Option<ProgressBar>,
}

impl LogObserver {
    pub fn new(progress: bool) -> LogObserver {
        LogObserver {
            progress,
            bar: None,
        }
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl ExtractionObserver for LogObserver {
    fn source_started(&mut self, source: &str, odb_path: &str) {
        info!(source, odb_path, "extracting source");
    }

    fn database_opened(&mut self, path: &str) {
        info!(path, "opened result database");
    }

    fn database_closed(&mut self, path: &str) {
        self.finish_bar();
        info!(path, "closed result database");
    }

    fn nodes_filtered(&mut self, source: &str, kept: usize, total: usize) {
        info!(source, kept, total, "nodes filtered");
    }

    fn elements_filtered(&mut self, source: &str, kept: usize, total: usize) {
        info!(source, kept, total, "elements filtered");
    }

    fn degenerate_element(&mut self, source: &str, label: Label, kind: Degeneracy) {
        warn!(source, label, %kind, "element projects to a degenerate quad");
    }

    fn field_started(&mut self, quantity: Quantity, records: usize) {
        self.finish_bar();
        if self.progress {
            let bar = ProgressBar::new(records as u64);
            if let Ok(style) = ProgressStyle::with_template("{msg:>5} [{bar:40}] {pos}/{len}") {
                bar.set_style(style);
            }
            bar.set_message(quantity.key());
            self.bar = Some(bar);
        }
    }

    fn record_walked(&mut self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn field_attached(&mut self, source: &str, quantity: Quantity, attached: usize, dropped: usize) {
        self.finish_bar();
        info!(source, field = quantity.key(), attached, dropped, "field extracted");
    }

    fn source_finished(&mut self, source: &str) {
        info!(source, "source extraction completed");
    }

    fn document_saved(&mut self, path: &Path, sources: usize) {
        info!(path = %path.display(), sources, "saved extracted data");
    }
}
