//! Versioned JSON document encoding with atomic replace

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

use crate::StoreError;

/// A document type with an explicit schema version field
pub trait Versioned: Serialize + DeserializeOwned {
    /// Top-level JSON key holding the schema version
    const VERSION_FIELD: &'static str = "version";

    /// Schema versions this build can read
    const SUPPORTED_VERSIONS: &'static [&'static str];
}

/// Read a document, returning `None` when the file does not exist
///
/// The version field is checked before the body is deserialized, so a newer
/// schema is reported as `UnsupportedSchema` rather than as a parse failure.
pub fn read_document<T: Versioned>(path: &Path) -> Result<Option<T>, StoreError> {
    debug!(?path, "read_document: called");
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("read_document: document does not exist");
            return Ok(None);
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(StoreError::corrupt(path, format!("not valid UTF-8: {}", e)));
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let raw: serde_json::Value = serde_json::from_str(&content).map_err(|e| StoreError::corrupt(path, e.to_string()))?;

    let version = match raw.get(T::VERSION_FIELD) {
        Some(serde_json::Value::String(v)) => v.clone(),
        Some(other) => {
            return Err(StoreError::corrupt(
                path,
                format!("field \"{}\" must be a string, found {}", T::VERSION_FIELD, other),
            ));
        }
        None => {
            return Err(StoreError::corrupt(
                path,
                format!("missing field \"{}\"", T::VERSION_FIELD),
            ));
        }
    };

    if !T::SUPPORTED_VERSIONS.contains(&version.as_str()) {
        debug!(%version, "read_document: unsupported schema version");
        return Err(StoreError::UnsupportedSchema {
            path: path.to_path_buf(),
            found: version,
            supported: T::SUPPORTED_VERSIONS.join(", "),
        });
    }

    let doc = serde_json::from_value(raw).map_err(|e| StoreError::corrupt(path, e.to_string()))?;
    debug!(%version, "read_document: loaded");
    Ok(Some(doc))
}

/// Serialize a document to its canonical on-disk form
fn encode_document<T: Versioned>(path: &Path, doc: &T) -> Result<String, StoreError> {
    let mut content = serde_json::to_string_pretty(doc).map_err(|e| StoreError::Serialize {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    content.push('\n');
    Ok(content)
}

/// Write a document atomically: temp file in the same directory, fsync, rename
pub fn write_document<T: Versioned>(path: &Path, doc: &T) -> Result<(), StoreError> {
    debug!(?path, "write_document: called");
    let content = encode_document(path, doc)?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    temp.write_all(content.as_bytes())
        .map_err(|e| StoreError::io(temp.path(), e))?;
    temp.as_file().sync_all().map_err(|e| StoreError::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| StoreError::io(path, e.error))?;

    // The rename itself is only durable once the directory entry is flushed.
    #[cfg(unix)]
    {
        if let Ok(dir) = fs::File::open(parent)
            && let Err(e) = dir.sync_all()
        {
            tracing::warn!(?parent, error = %e, "write_document: failed to sync parent directory");
        }
    }

    debug!(bytes = content.len(), "write_document: replaced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        version: String,
        items: Vec<String>,
        note: Option<String>,
    }

    impl Versioned for Doc {
        const SUPPORTED_VERSIONS: &'static [&'static str] = &["1.0"];
    }

    fn doc() -> Doc {
        Doc {
            version: "1.0".to_string(),
            items: vec!["a".to_string(), "b".to_string()],
            note: None,
        }
    }

    #[test]
    fn test_missing_document_is_none() {
        let temp = TempDir::new().unwrap();
        let result: Option<Doc> = read_document(&temp.path().join("absent.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("doc.json");

        write_document(&path, &doc()).unwrap();
        let loaded: Doc = read_document(&path).unwrap().unwrap();
        assert_eq!(loaded, doc());
    }

    #[test]
    fn test_resave_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");

        write_document(&path, &doc()).unwrap();
        let before = fs::read(&path).unwrap();

        let loaded: Doc = read_document(&path).unwrap().unwrap();
        write_document(&path, &loaded).unwrap();
        let after = fs::read(&path).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");

        write_document(&path, &doc()).unwrap();
        write_document(&path, &doc()).unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);
    }

    #[test]
    fn test_malformed_json_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        fs::write(&path, "{ \"version\": \"1.0\", ").unwrap();

        let err = read_document::<Doc>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
    }

    #[test]
    fn test_wrong_shape_is_corrupt_and_file_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        let body = "{\"version\": \"1.0\", \"items\": 7}";
        fs::write(&path, body).unwrap();

        let err = read_document::<Doc>(&path).unwrap_err();
        match err {
            StoreError::Corrupt { message, .. } => assert!(message.contains("invalid type"), "{message}"),
            other => panic!("expected Corrupt, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), body);
    }

    #[test]
    fn test_missing_version_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        fs::write(&path, "{\"items\": []}").unwrap();

        let err = read_document::<Doc>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_unknown_version_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        fs::write(&path, "{\"version\": \"2.0\", \"something\": \"else\"}").unwrap();

        let err = read_document::<Doc>(&path).unwrap_err();
        match err {
            StoreError::UnsupportedSchema { found, supported, .. } => {
                assert_eq!(found, "2.0");
                assert_eq!(supported, "1.0");
            }
            other => panic!("expected UnsupportedSchema, got {other:?}"),
        }
    }
}
