//! Whole-document JSON persistence.
//!
//! Every durable file is rewritten in full through a temporary sibling and
//! renamed into place on commit, so a reader (or a restarted process) sees
//! either the previous document or the new one, never a torn write.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use atomic_write_file::AtomicWriteFile;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = AtomicWriteFile::open(path)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.commit()?;
    Ok(())
}

/// Atomically replace `path` with raw bytes.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = AtomicWriteFile::open(path)?;
    file.write_all(bytes)?;
    file.commit()?;
    Ok(())
}

/// Read a JSON document, returning `None` if the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_replaces_whole_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("doc.json");

        write_json_atomic(&path, &serde_json::json!({"a": 1, "b": [1, 2, 3]})).unwrap();
        write_json_atomic(&path, &serde_json::json!({"a": 2})).unwrap();

        let doc: serde_json::Value = read_json(&path).unwrap().unwrap();
        assert_eq!(doc, serde_json::json!({"a": 2}));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let doc: Option<serde_json::Value> = read_json(&tmp.path().join("nope.json")).unwrap();
        assert!(doc.is_none());
    }
}
