//! Run orchestration: state -> catalog -> selection -> pooled processing -> state.
//!
//! State is an explicit value. Workers only return results; the merge into
//! [`StateRecord`] happens on the calling thread after every task has settled,
//! and the state file is written once per run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{fetch_catalog, DatasetDescriptor};
use crate::config::IngestConfig;
use crate::error::{DatasetError, IngestError};
use crate::parallel::WorkerPool;
use crate::processor::{DatasetProcessor, ProcessingResult};
use crate::select::{select, ThemeFilter};
use crate::state::{load_state, save_state, StateRecord};
use crate::transport::Transport;

/// What happened to one selected dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasetOutcome {
    Written {
        path: PathBuf,
        modified: String,
        rows: usize,
    },
    Skipped,
    Failed {
        kind: &'static str,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetReport {
    pub identifier: String,
    pub title: String,
    #[serde(flatten)]
    pub outcome: DatasetOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub catalog_size: usize,
    pub selected: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub finished_at: DateTime<Utc>,
    pub datasets: Vec<DatasetReport>,
}

impl RunSummary {
    fn from_reports(catalog_size: usize, datasets: Vec<DatasetReport>) -> Self {
        let count = |pred: fn(&DatasetOutcome) -> bool| {
            datasets.iter().filter(|report| pred(&report.outcome)).count()
        };
        Self {
            catalog_size,
            selected: datasets.len(),
            processed: count(|o| matches!(o, DatasetOutcome::Written { .. })),
            skipped: count(|o| matches!(o, DatasetOutcome::Skipped)),
            failed: count(|o| matches!(o, DatasetOutcome::Failed { .. })),
            finished_at: Utc::now(),
            datasets,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Selection computed against the recorded state, before any download.
#[derive(Debug, Clone)]
pub struct Plan {
    pub state: StateRecord,
    pub catalog_size: usize,
    pub selected: Vec<DatasetDescriptor>,
}

#[derive(Debug)]
pub struct Pipeline<'a, T: ?Sized> {
    config: &'a IngestConfig,
    transport: &'a T,
}

impl<'a, T> Pipeline<'a, T>
where
    T: Transport + ?Sized,
{
    pub fn new(config: &'a IngestConfig, transport: &'a T) -> Self {
        Self { config, transport }
    }

    /// Load state, fetch the catalog and compute the work set.
    pub fn plan(&self) -> Result<Plan, IngestError> {
        let state_path = &self.config.state_file;
        let state = load_state(state_path).map_err(|source| IngestError::StateLoad {
            path: state_path.clone(),
            source,
        })?;
        tracing::debug!(recorded = state.len(), path = %state_path.display(), "state loaded");

        let catalog = fetch_catalog(self.transport, &self.config.catalog_url)?;
        let theme = ThemeFilter::new(self.config.theme.as_str());
        let selected: Vec<DatasetDescriptor> = select(&catalog, &theme, &state)
            .into_iter()
            .cloned()
            .collect();
        tracing::info!(
            theme = theme.keyword(),
            catalog = catalog.len(),
            selected = selected.len(),
            "selection computed"
        );

        Ok(Plan {
            state,
            catalog_size: catalog.len(),
            selected,
        })
    }

    /// Process `selected` on the worker pool and fold every successful write
    /// into `state`. Failed and skipped datasets leave `state` untouched.
    pub fn execute(
        &self,
        selected: &[DatasetDescriptor],
        mut state: StateRecord,
    ) -> Result<(Vec<DatasetReport>, StateRecord), IngestError> {
        let processor = DatasetProcessor::new(self.transport, &self.config.output_dir);
        let pool = WorkerPool::with_workers(self.config.workers);
        let results = pool.run_all(selected, |descriptor| processor.process(descriptor))?;

        let mut reports = Vec::with_capacity(selected.len());
        for (descriptor, result) in selected.iter().zip(results) {
            let outcome = settle(descriptor, result, &mut state);
            reports.push(DatasetReport {
                identifier: descriptor.identifier.clone(),
                title: descriptor.display_title().to_string(),
                outcome,
            });
        }
        Ok((reports, state))
    }

    /// Full incremental run. An empty selection leaves the state file untouched.
    pub fn run(&self) -> Result<RunSummary, IngestError> {
        let Plan {
            state,
            catalog_size,
            selected,
        } = self.plan()?;

        if selected.is_empty() {
            tracing::info!("no new or updated datasets found");
            return Ok(RunSummary::from_reports(catalog_size, Vec::new()));
        }

        let (reports, state) = self.execute(&selected, state)?;
        let summary = RunSummary::from_reports(catalog_size, reports);

        let state_path = &self.config.state_file;
        save_state(state_path, &state).map_err(|source| {
            tracing::error!(
                processed = summary.processed,
                "outputs were written but their timestamps were not recorded"
            );
            IngestError::StatePersistence {
                path: state_path.clone(),
                source,
            }
        })?;

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "ingestion complete"
        );
        Ok(summary)
    }
}

fn settle(
    descriptor: &DatasetDescriptor,
    result: Result<ProcessingResult, DatasetError>,
    state: &mut StateRecord,
) -> DatasetOutcome {
    let id = descriptor.identifier.as_str();
    match result {
        Ok(ProcessingResult::Written {
            path,
            modified,
            rows,
        }) => {
            tracing::info!(dataset = id, path = %path.display(), rows, "saved cleaned file");
            state.record(id, modified.as_str());
            DatasetOutcome::Written {
                path,
                modified,
                rows,
            }
        }
        Ok(ProcessingResult::Skipped) => {
            tracing::info!(dataset = id, "skipped: no download URL");
            DatasetOutcome::Skipped
        }
        Err(err) => {
            tracing::error!(dataset = id, kind = err.kind(), error = %err, "dataset failed");
            DatasetOutcome::Failed {
                kind: err.kind(),
                error: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use super::*;
    use crate::transport::TransportError;
    use tempfile::{tempdir, TempDir};

    const CATALOG_URL: &str = "http://catalog.test/items";

    #[derive(Default)]
    struct StubTransport {
        bodies: HashMap<String, Vec<u8>>,
    }

    impl StubTransport {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }
    }

    impl Transport for StubTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.bodies.get(url).cloned().ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 500,
            })
        }
    }

    /// Serves like `inner`, but turns the state file path into a non-empty
    /// directory as soon as a dataset is downloaded.
    struct StateBlockingTransport {
        inner: StubTransport,
        state_file: PathBuf,
    }

    impl Transport for StateBlockingTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            if url != CATALOG_URL {
                fs::create_dir_all(self.state_file.join("occupied")).unwrap();
            }
            self.inner.get(url)
        }
    }

    fn config_in(dir: &TempDir) -> IngestConfig {
        IngestConfig {
            catalog_url: CATALOG_URL.to_string(),
            output_dir: dir.path().join("output"),
            state_file: dir.path().join("metadata.json"),
            workers: 2,
            ..IngestConfig::default()
        }
    }

    #[test]
    fn empty_selection_writes_nothing() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let transport = StubTransport::default().with(
            CATALOG_URL,
            r#"[{"identifier":"n1","theme":"Nursing Home","modified":"2024-01-01"}]"#,
        );

        let summary = Pipeline::new(&config, &transport).run().unwrap();
        assert_eq!((summary.selected, summary.processed), (0, 0));
        assert!(!config.state_file.exists());
        assert!(!config.output_dir.exists());
    }

    #[test]
    fn missing_distribution_is_skipped_and_not_recorded() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let transport = StubTransport::default().with(
            CATALOG_URL,
            r#"{"items":[{"identifier":"h1","theme":"Hospitals","modified":"2024-01-01","distribution":[]}]}"#,
        );

        let summary = Pipeline::new(&config, &transport).run().unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.datasets[0].outcome, DatasetOutcome::Skipped);
        assert!(!config.output_dir.join("h1.csv").exists());
        let state = load_state(&config.state_file).unwrap();
        assert_eq!(state.last_modified("h1"), None);
    }

    #[test]
    fn execute_merges_only_successes() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let transport = StubTransport::default().with("http://files.test/ok.csv", "A B\n1\n");
        let catalog = crate::catalog::parse_catalog(
            br#"[
                {"identifier":"ok","theme":"Hospitals","modified":"2024-02-02","distribution":[{"downloadURL":"http://files.test/ok.csv"}]},
                {"identifier":"bad","theme":"Hospitals","modified":"2024-02-02","distribution":[{"downloadURL":"http://files.test/bad.csv"}]}
            ]"#,
        )
        .unwrap();

        let mut prior = StateRecord::default();
        prior.record("bad", "2024-01-01");
        let (reports, state) = Pipeline::new(&config, &transport)
            .execute(&catalog, prior)
            .unwrap();

        assert_eq!(state.last_modified("ok"), Some("2024-02-02"));
        assert_eq!(state.last_modified("bad"), Some("2024-01-01"));
        assert!(matches!(reports[1].outcome, DatasetOutcome::Failed { kind: "download", .. }));
        assert_eq!(
            fs::read_to_string(config.output_dir.join("ok.csv")).unwrap(),
            "a_b\n1\n"
        );
    }

    #[test]
    fn corrupt_state_aborts_before_processing() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        fs::write(&config.state_file, "not json").unwrap();
        let transport = StubTransport::default().with(CATALOG_URL, "[]");

        let err = Pipeline::new(&config, &transport).run().unwrap_err();
        assert!(matches!(err, IngestError::StateLoad { .. }));
        assert_eq!(fs::read_to_string(&config.state_file).unwrap(), "not json");
    }

    #[test]
    fn unreachable_catalog_is_fatal() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let err = Pipeline::new(&config, &StubTransport::default()).run().unwrap_err();
        assert!(matches!(err, IngestError::CatalogUnavailable { .. }));
    }

    #[test]
    fn summary_serializes_with_status_tags() {
        let summary = RunSummary::from_reports(
            3,
            vec![
                DatasetReport {
                    identifier: "a".into(),
                    title: "A".into(),
                    outcome: DatasetOutcome::Skipped,
                },
                DatasetReport {
                    identifier: "b".into(),
                    title: "B".into(),
                    outcome: DatasetOutcome::Failed {
                        kind: "parse",
                        error: "bad".into(),
                    },
                },
            ],
        );
        assert_eq!((summary.skipped, summary.failed, summary.processed), (1, 1, 0));
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["datasets"][0]["status"], "skipped");
        assert_eq!(value["datasets"][1]["status"], "failed");
        assert_eq!(value["datasets"][1]["kind"], "parse");
        assert_eq!(value["catalog_size"], 3);
    }

    #[test]
    fn write_failure_fails_only_that_dataset() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        // A non-empty directory at the output path makes the final rename fail.
        fs::create_dir_all(config.output_dir.join("w.csv").join("occupied")).unwrap();
        let transport = StubTransport::default()
            .with(
                CATALOG_URL,
                r#"[
                    {"identifier":"w","theme":"Hospitals","modified":"2024-02-02","distribution":[{"downloadURL":"http://files.test/w.csv"}]},
                    {"identifier":"ok","theme":"Hospitals","modified":"2024-02-03","distribution":[{"downloadURL":"http://files.test/ok.csv"}]}
                ]"#,
            )
            .with("http://files.test/w.csv", "A\n1\n")
            .with("http://files.test/ok.csv", "B\n2\n");

        let summary = Pipeline::new(&config, &transport).run().unwrap();
        assert_eq!((summary.processed, summary.failed), (1, 1));
        assert!(matches!(
            summary.datasets[0].outcome,
            DatasetOutcome::Failed { kind: "write", .. }
        ));
        assert_eq!(
            fs::read_to_string(config.output_dir.join("ok.csv")).unwrap(),
            "b\n2\n"
        );
        let state = load_state(&config.state_file).unwrap();
        assert_eq!(state.last_modified("w"), None);
        assert_eq!(state.last_modified("ok"), Some("2024-02-03"));
    }

    #[test]
    fn output_dir_that_is_a_file_fails_writes() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        fs::write(&config.output_dir, "not a directory").unwrap();
        let transport = StubTransport::default()
            .with(
                CATALOG_URL,
                r#"[{"identifier":"a","theme":"Hospitals","modified":"2024-02-02","distribution":[{"downloadURL":"http://files.test/a.csv"}]}]"#,
            )
            .with("http://files.test/a.csv", "A\n1\n");

        let summary = Pipeline::new(&config, &transport).run().unwrap();
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            summary.datasets[0].outcome,
            DatasetOutcome::Failed { kind: "write", .. }
        ));
        assert_eq!(load_state(&config.state_file).unwrap().last_modified("a"), None);
    }

    #[test]
    fn state_persistence_failure_keeps_written_outputs() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let transport = StateBlockingTransport {
            inner: StubTransport::default()
                .with(
                    CATALOG_URL,
                    r#"[{"identifier":"a","theme":"Hospitals","modified":"2024-02-02","distribution":[{"downloadURL":"http://files.test/a.csv"}]}]"#,
                )
                .with("http://files.test/a.csv", "A\n1\n"),
            state_file: config.state_file.clone(),
        };

        let err = Pipeline::new(&config, &transport).run().unwrap_err();
        assert!(matches!(err, IngestError::StatePersistence { .. }));
        assert_eq!(
            fs::read_to_string(config.output_dir.join("a.csv")).unwrap(),
            "a\n1\n"
        );
    }

    #[test]
    fn duplicate_identifier_records_newest_and_settles() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let transport = StubTransport::default()
            .with(
                CATALOG_URL,
                r#"[
                    {"identifier":"a","theme":"Hospitals","modified":"2024-05-01","distribution":[{"downloadURL":"http://files.test/new.csv"}]},
                    {"identifier":"a","theme":"Hospitals","modified":"2024-01-01","distribution":[{"downloadURL":"http://files.test/old.csv"}]}
                ]"#,
            )
            .with("http://files.test/new.csv", "X\nnew\n")
            .with("http://files.test/old.csv", "X\nold\n");

        let first = Pipeline::new(&config, &transport).run().unwrap();
        assert_eq!((first.selected, first.processed), (1, 1));
        assert_eq!(
            fs::read_to_string(config.output_dir.join("a.csv")).unwrap(),
            "x\nnew\n"
        );
        let state = load_state(&config.state_file).unwrap();
        assert_eq!(state.last_modified("a"), Some("2024-05-01"));

        let second = Pipeline::new(&config, &transport).run().unwrap();
        assert_eq!(second.selected, 0);
    }

    #[test]
    fn null_distribution_is_reported_as_skipped() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir);
        let transport = StubTransport::default().with(
            CATALOG_URL,
            r#"[{"identifier":"n","title":null,"theme":"Hospitals","modified":"2024-01-01","distribution":null}]"#,
        );

        let summary = Pipeline::new(&config, &transport).run().unwrap();
        assert_eq!((summary.selected, summary.skipped), (1, 1));
        assert_eq!(summary.datasets[0].identifier, "n");
        assert_eq!(summary.datasets[0].outcome, DatasetOutcome::Skipped);
    }
}
