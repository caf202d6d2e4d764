//! Input loading: read the pre-filtered record collection into memory.
//!
//! The collection is produced by the corpus filter as a single JSON array of
//! objects. Newline-delimited JSON (`.jsonl` / `.ndjson`) is accepted too so
//! a filter can stream its output. Every record must carry a non-empty
//! string identifier; a record without one is a configuration error and the
//! run aborts before any network traffic.

use crate::error::BatchError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One paper's metadata, read-only to the pipeline.
///
/// Serialises transparently as the original object so the METADATA section
/// of an output document is the record verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PaperRecord {
    fields: Map<String, Value>,
    #[serde(skip)]
    id: String,
}

impl PaperRecord {
    /// Wrap a metadata object, taking the identifier from `id_field`.
    ///
    /// Returns `None` when the field is missing, not a string, or blank.
    pub fn from_fields(fields: Map<String, Value>, id_field: &str) -> Option<Self> {
        let id = fields.get(id_field)?.as_str()?.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(Self { fields, id })
    }

    /// The record's unique identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The original metadata object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// True when the path should be read as newline-delimited JSON.
pub fn is_json_lines(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsonl") | Some("ndjson")
    )
}

/// Load every record from the input collection.
pub fn load_records(path: &Path, id_field: &str) -> Result<Vec<PaperRecord>, BatchError> {
    let file = open_input(path)?;
    let objects = if is_json_lines(path) {
        read_json_lines(path, BufReader::new(file))?
    } else {
        serde_json::from_reader::<_, Vec<Map<String, Value>>>(BufReader::new(file)).map_err(
            |e| BatchError::InputMalformed {
                path: path.to_path_buf(),
                line: e.line(),
                detail: e.to_string(),
            },
        )?
    };

    let records = objects
        .into_iter()
        .enumerate()
        .map(|(index, fields)| {
            PaperRecord::from_fields(fields, id_field).ok_or_else(|| {
                BatchError::MissingIdentifier {
                    index,
                    field: id_field.to_string(),
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

fn open_input(path: &Path) -> Result<std::fs::File, BatchError> {
    match std::fs::File::open(path) {
        Ok(f) => {
            debug!("Opened input collection: {}", path.display());
            Ok(f)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BatchError::InputNotFound {
            path: PathBuf::from(path),
        }),
        Err(e) => Err(BatchError::InputUnreadable {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn read_json_lines(
    path: &Path,
    reader: impl BufRead,
) -> Result<Vec<Map<String, Value>>, BatchError> {
    let mut objects = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BatchError::InputUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let object = serde_json::from_str(&line).map_err(|e| BatchError::InputMalformed {
            path: path.to_path_buf(),
            line: n + 1,
            detail: e.to_string(),
        })?;
        objects.push(object);
    }
    Ok(objects)
}
