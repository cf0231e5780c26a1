//! Storage and job-state collaborator interfaces
//!
//! The pipeline reports into these but does not implement their persistence
//! guarantees. Storage failures are surfaced unchanged, never retried here.
//! An in-memory job store and a filesystem object store are shipped for
//! local runs and tests.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reference to a stored artifact: either a durable URL-like reference or the
/// raw bytes passed back to the caller when no durable backend is configured.
#[derive(Debug, Clone)]
pub enum StoredObject {
    Url { url: String },
    Bytes { data: Vec<u8> },
}

/// Contract for the external object storage collaborator.
pub trait ObjectStore {
    fn put(
        &self,
        path: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<StoredObject>> + Send;
}

/// Pass-through store: hands the bytes straight back.
#[derive(Debug, Default)]
pub struct PassthroughStore;

impl ObjectStore for PassthroughStore {
    fn put(
        &self,
        _path: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<StoredObject>> + Send {
        async move { Ok(StoredObject::Bytes { data }) }
    }
}

/// Filesystem-backed store for local runs; the written path doubles as the
/// durable reference.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for FsStore {
    fn put(
        &self,
        path: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<StoredObject>> + Send {
        let target = self.root.join(path);
        async move {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Storage(format!("mkdir {}: {}", parent.display(), e)))?;
            }
            tokio::fs::write(&target, &data)
                .await
                .map_err(|e| Error::Storage(format!("write {}: {}", target.display(), e)))?;
            Ok(StoredObject::Url {
                url: target.display().to_string(),
            })
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

/// Artifact references recorded once a job completes
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    pub pdf: StoredObject,
    pub desktop: StoredObject,
    pub mobile: StoredObject,
    pub mobile_menu: Option<StoredObject>,
}

/// One job-state record
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    pub artifacts: Option<JobArtifacts>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn running(url: &str) -> Self {
        Self {
            status: JobStatus::Running,
            url: Some(url.to_string()),
            error: None,
            artifacts: None,
            updated_at: Utc::now(),
        }
    }

    pub fn done(url: &str, artifacts: JobArtifacts) -> Self {
        Self {
            status: JobStatus::Done,
            url: Some(url.to_string()),
            error: None,
            artifacts: Some(artifacts),
            updated_at: Utc::now(),
        }
    }

    pub fn error(url: &str, message: &str) -> Self {
        Self {
            status: JobStatus::Error,
            url: Some(url.to_string()),
            error: Some(message.to_string()),
            artifacts: None,
            updated_at: Utc::now(),
        }
    }
}

/// Contract for the external job-state collaborator. The pipeline records
/// running → done | error transitions; persistence is the collaborator's
/// concern.
pub trait JobStore {
    fn set(&self, job_id: &str, record: JobRecord);
    fn get(&self, job_id: &str) -> Option<JobRecord>;
}

/// In-memory job store
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn set(&self, job_id: &str, mut record: JobRecord) {
        record.updated_at = Utc::now();
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(job_id.to_string(), record);
        }
    }

    fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.lock().ok()?.get(job_id).cloned()
    }
}

static JOB_SEQ: AtomicU64 = AtomicU64::new(0);

/// Derive a fresh job identifier from the clock and a process-local counter.
pub fn new_job_id() -> String {
    let seq = JOB_SEQ.fetch_add(1, Ordering::Relaxed);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(now.as_nanos().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique_and_fixed_width() {
        let a = new_job_id();
        let b = new_job_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn memory_store_records_status_transitions() {
        let store = MemoryJobStore::new();
        let id = new_job_id();
        assert!(store.get(&id).is_none());

        store.set(&id, JobRecord::running("https://example.com"));
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Running);

        store.set(&id, JobRecord::error("https://example.com", "navigation failed"));
        let rec = store.get(&id).unwrap();
        assert_eq!(rec.status, JobStatus::Error);
        assert_eq!(rec.error.as_deref(), Some("navigation failed"));
    }

    #[tokio::test]
    async fn passthrough_store_returns_the_bytes() {
        let out = PassthroughStore
            .put("a/b.pdf", "application/pdf", vec![9, 9, 9])
            .await
            .unwrap();
        match out {
            StoredObject::Bytes { data } => assert_eq!(data, vec![9, 9, 9]),
            other => panic!("expected bytes, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fs_store_writes_under_its_root() {
        let root = std::env::temp_dir().join(format!("pagetear-test-{}", new_job_id()));
        let store = FsStore::new(&root);
        let out = store
            .put("job/desktop.png", "image/png", vec![1, 2, 3, 4])
            .await
            .unwrap();
        let path = match out {
            StoredObject::Url { url } => url,
            other => panic!("expected a path reference, got {:?}", other),
        };
        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, vec![1, 2, 3, 4]);
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
