//! Filesystem-backed document store.
//!
//! Documents live at `<root>/<scope>/<stage>/<id>.json`.
//!
//! # Security
//!
//! - **Path traversal**: scope, stage, and id are validated before any path is built
//! - **File size limits**: oversized files are refused on read

use super::traits::{Document, DocumentStore, StoredDocument, duplicate_error, validate_key};
use crate::{Error, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Maximum size of a document file (1MB).
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Document store writing one JSON file per document.
#[derive(Debug, Clone)]
pub struct FilesystemDocumentStore {
    base_path: PathBuf,
}

fn io_error(operation: &str, e: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

impl FilesystemDocumentStore {
    /// Creates a store rooted at `base_path`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|e| io_error("create_storage_dir", &e))?;
        Ok(Self { base_path })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn stage_dir(&self, scope: &str, stage: &str) -> Result<PathBuf> {
        validate_key("scope", scope)?;
        validate_key("stage", stage)?;
        Ok(self.base_path.join(scope).join(stage))
    }

    fn document_path(&self, scope: &str, stage: &str, id: &str) -> Result<PathBuf> {
        validate_key("document id", id)?;
        Ok(self.stage_dir(scope, stage)?.join(format!("{id}.json")))
    }

    fn read_document(path: &Path) -> Result<Document> {
        let metadata = fs::metadata(path).map_err(|e| io_error("read_file_metadata", &e))?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "document file exceeds maximum size of {MAX_FILE_SIZE} bytes: {}",
                path.display()
            )));
        }
        let raw = fs::read_to_string(path).map_err(|e| io_error("read_document_file", &e))?;
        serde_json::from_str(&raw).map_err(|e| Error::OperationFailed {
            operation: "deserialize_document".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }

    fn serialize(document: &Document) -> Result<String> {
        serde_json::to_string_pretty(document).map_err(|e| Error::OperationFailed {
            operation: "serialize_document".to_string(),
            cause: e.to_string(),
        })
    }
}

impl DocumentStore for FilesystemDocumentStore {
    fn get(&self, scope: &str, stage: &str, id: &str) -> Result<Option<Document>> {
        let path = self.document_path(scope, stage, id)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_document(&path).map(Some)
    }

    fn set(&self, scope: &str, stage: &str, id: &str, document: &Document) -> Result<()> {
        let path = self.document_path(scope, stage, id)?;
        let json = Self::serialize(document)?;
        fs::create_dir_all(self.stage_dir(scope, stage)?)
            .map_err(|e| io_error("create_stage_dir", &e))?;
        fs::write(&path, json).map_err(|e| io_error("write_document_file", &e))
    }

    fn delete(&self, scope: &str, stage: &str, id: &str) -> Result<bool> {
        let path = self.document_path(scope, stage, id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("delete_document_file", &e)),
        }
    }

    fn append(&self, scope: &str, stage: &str, id: &str, document: &Document) -> Result<()> {
        let path = self.document_path(scope, stage, id)?;
        let json = Self::serialize(document)?;
        fs::create_dir_all(self.stage_dir(scope, stage)?)
            .map_err(|e| io_error("create_stage_dir", &e))?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(duplicate_error(scope, stage, id));
            },
            Err(e) => return Err(io_error("create_document_file", &e)),
        };
        file.write_all(json.as_bytes())
            .map_err(|e| io_error("write_document_file", &e))
    }

    fn list(&self, scope: &str, stage: &str, limit: usize) -> Result<Vec<StoredDocument>> {
        let dir = self.stage_dir(scope, stage)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read_stage_dir", &e)),
        };

        let mut ids: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem()
                        .and_then(|stem| stem.to_str())
                        .map(ToString::to_string)
                } else {
                    None
                }
            })
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut documents = Vec::new();
        for id in ids.into_iter().take(limit) {
            match Self::read_document(&dir.join(format!("{id}.json"))) {
                Ok(fields) => documents.push(StoredDocument { id, fields }),
                Err(e) => tracing::warn!(scope, stage, id = %id, error = %e, "Skipping unreadable document"),
            }
        }
        Ok(documents)
    }
}
