use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub remote_dir: String,
    pub file_name: String,
    pub bytes: u64,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUpload {
    pub local_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirUploadReport {
    pub local_root: String,
    pub remote_dir: String,
    pub uploaded: Vec<UploadReceipt>,
    pub failed: Vec<FailedUpload>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DirUploadReport {
    pub fn total_bytes(&self) -> u64 {
        self.uploaded.iter().map(|r| r.bytes).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReceipt {
    pub remote_path: String,
    pub destination: String,
    pub bytes: u64,
    pub md5: String,
}
