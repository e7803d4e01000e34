//! Payload resolution
//!
//! Normalizes a host response into the concrete value the script engine is
//! resumed with. File payloads are rewritten into path strings: the engine
//! only understands path references, not live file handles.

use std::sync::Arc;

use quay_protocol::{Payload, Response};
use quay_script_host::{EngineFs, FsError};
use thiserror::Error;

/// Errors raised while resolving a payload
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to bind file {name:?} at {mount_point}: {source}")]
    Bind {
        name: String,
        mount_point: String,
        source: FsError,
    },
}

/// Resolves response payloads, binding file payloads into the engine
/// filesystem.
///
/// Owns the mount counter: mount-point names are unique for the lifetime of
/// the worker, so rebinding the same file yields a fresh mount point.
pub struct PayloadResolver {
    fs: Arc<dyn EngineFs>,
    next_mount: u64,
}

impl PayloadResolver {
    #[must_use]
    pub fn new(fs: Arc<dyn EngineFs>) -> Self {
        Self { fs, next_mount: 0 }
    }

    /// Produce the value to feed into the next resumption.
    ///
    /// Non-file payloads resolve immediately to their literal value without
    /// touching the filesystem.
    pub fn resolve(&mut self, response: Response) -> Result<serde_json::Value, ResolveError> {
        match response.payload {
            Payload::Text { value } => Ok(serde_json::Value::String(value)),
            Payload::Json { value } => Ok(value),
            Payload::File { file } => {
                let mount_point = format!("/file-input-{}", self.next_mount);
                self.next_mount += 1;

                let name = file.name.clone();
                self.fs
                    .mkdir(&mount_point)
                    .and_then(|()| self.fs.mount(vec![file], &mount_point))
                    .map_err(|source| ResolveError::Bind {
                        name: name.clone(),
                        mount_point: mount_point.clone(),
                        source,
                    })?;

                let path = format!("{mount_point}/{name}");
                tracing::debug!(%path, "bound file payload");
                Ok(serde_json::Value::String(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_protocol::FileBlob;
    use quay_script_host::MemoryFs;
    use serde_json::json;

    fn response(payload: Payload) -> Response {
        Response { payload }
    }

    #[test]
    fn text_payload_passes_through_unchanged() {
        let mut resolver = PayloadResolver::new(Arc::new(MemoryFs::new()));
        let resolved = resolver
            .resolve(response(Payload::Text { value: "x".into() }))
            .unwrap();
        assert_eq!(resolved, json!("x"));
    }

    #[test]
    fn json_payload_passes_through_unchanged() {
        let mut resolver = PayloadResolver::new(Arc::new(MemoryFs::new()));
        let value = json!({"answer": 42, "ok": true});
        let resolved = resolver
            .resolve(response(Payload::Json {
                value: value.clone(),
            }))
            .unwrap();
        assert_eq!(resolved, value);
    }

    #[test]
    fn file_payloads_get_distinct_mount_points() {
        let fs = Arc::new(MemoryFs::new());
        let mut resolver = PayloadResolver::new(fs.clone());

        let first = resolver
            .resolve(response(Payload::File {
                file: FileBlob::new("takeout.zip", b"one".to_vec()),
            }))
            .unwrap();
        let second = resolver
            .resolve(response(Payload::File {
                file: FileBlob::new("takeout.zip", b"two".to_vec()),
            }))
            .unwrap();

        assert_eq!(first, json!("/file-input-0/takeout.zip"));
        assert_eq!(second, json!("/file-input-1/takeout.zip"));
        assert_eq!(fs.read("/file-input-0/takeout.zip").unwrap(), b"one");
        assert_eq!(fs.read("/file-input-1/takeout.zip").unwrap(), b"two");
    }

    #[test]
    fn bind_failure_reports_mount_point() {
        let fs = Arc::new(MemoryFs::new());
        // Occupy the first mount point so the bind collides.
        fs.mkdir("/file-input-0").unwrap();

        let mut resolver = PayloadResolver::new(fs);
        let err = resolver
            .resolve(response(Payload::File {
                file: FileBlob::new("takeout.zip", b"x".to_vec()),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("/file-input-0"));

        // The counter still advances: the next bind lands on a fresh point.
        let resolved = resolver
            .resolve(response(Payload::File {
                file: FileBlob::new("takeout.zip", b"x".to_vec()),
            }))
            .unwrap();
        assert_eq!(resolved, json!("/file-input-1/takeout.zip"));
    }
}
