//! Per-dataset work: download, normalize headers, write `<output_dir>/<identifier>.csv`.
//!
//! The processor never touches run state. It reports the `modified` value to
//! record and leaves the merge to the orchestrator.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder};
use tempfile::NamedTempFile;

use crate::catalog::DatasetDescriptor;
use crate::error::DatasetError;
use crate::normalize::normalize_headers;
use crate::transport::Transport;

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const OUTPUT_EXTENSION: &str = "csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    /// Output file is in place; `modified` may now be recorded for the dataset.
    Written {
        path: PathBuf,
        modified: String,
        rows: usize,
    },
    /// First distribution has no download locator. Not an error.
    Skipped,
}

/// Fully materialized table with normalized headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTable {
    pub headers: Vec<String>,
    pub duplicate_headers: Vec<String>,
    pub records: Vec<ByteRecord>,
}

#[derive(Debug)]
pub struct DatasetProcessor<'a, T: ?Sized> {
    transport: &'a T,
    output_dir: &'a Path,
}

impl<'a, T> DatasetProcessor<'a, T>
where
    T: Transport + ?Sized,
{
    pub fn new(transport: &'a T, output_dir: &'a Path) -> Self {
        Self {
            transport,
            output_dir,
        }
    }

    pub fn process(&self, descriptor: &DatasetDescriptor) -> Result<ProcessingResult, DatasetError> {
        let Some(url) = descriptor.download_url() else {
            return Ok(ProcessingResult::Skipped);
        };
        let path = output_path(self.output_dir, &descriptor.identifier)?;

        tracing::info!(
            dataset = %descriptor.identifier,
            title = descriptor.display_title(),
            theme = %descriptor.theme,
            "processing dataset"
        );

        let body = self.transport.get(url)?;
        let table = read_normalized(&body)?;
        if !table.duplicate_headers.is_empty() {
            tracing::warn!(
                dataset = %descriptor.identifier,
                columns = ?table.duplicate_headers,
                "normalized headers collide; writing them unchanged"
            );
        }

        write_table(self.output_dir, &path, &table).map_err(|source| DatasetError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(ProcessingResult::Written {
            path,
            modified: descriptor.modified.clone(),
            rows: table.records.len(),
        })
    }
}

/// `<output_dir>/<identifier>.csv`, refusing identifiers that would escape the directory.
pub fn output_path(output_dir: &Path, identifier: &str) -> Result<PathBuf, DatasetError> {
    let unsafe_name = identifier.trim().is_empty()
        || identifier == "."
        || identifier == ".."
        || identifier.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(DatasetError::UnsafeIdentifier(identifier.to_string()));
    }
    Ok(output_dir.join(format!("{identifier}.{OUTPUT_EXTENSION}")))
}

/// Parse a CSV payload with a header row and normalize the headers.
/// Rows must all have the header's width.
pub fn read_normalized(body: &[u8]) -> Result<NormalizedTable, DatasetError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(body);
    let raw_headers = reader.byte_headers()?.clone();
    if raw_headers.is_empty() {
        return Err(DatasetError::MissingHeader);
    }

    let raw_headers: Vec<_> = raw_headers
        .iter()
        .map(String::from_utf8_lossy)
        .collect();
    let (headers, duplicate_headers) = normalize_headers(raw_headers.iter().map(|h| &**h));

    let records = reader.byte_records().collect::<Result<Vec<_>, _>>()?;

    Ok(NormalizedTable {
        headers,
        duplicate_headers,
        records,
    })
}

/// Write through a temp file in `dir` and rename onto `path`, so an
/// interrupted write never leaves a truncated file at the final location.
fn write_table(dir: &Path, path: &Path, table: &NormalizedTable) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(&mut tmp);
        writer.write_record(&table.headers)?;
        for record in &table.records {
            writer.write_byte_record(record)?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
