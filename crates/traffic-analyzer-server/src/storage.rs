//! Object-storage bridge (C7): stages capture artifacts from an
//! S3-compatible bucket onto local disk, deletes a capture's objects, and
//! sweeps orphaned partial captures.

use std::path::{Path, PathBuf};

use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;

const BUCKET_PREFIX: &str = "PacketCaptures/";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object storage request failed: {0}")]
    Sdk(String),
    #[error("local staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pcap,
    AddressList,
    Metadata,
}

#[derive(Debug, Clone)]
pub struct StagedArtifact {
    pub kind: ArtifactKind,
    pub local_path: PathBuf,
}

pub struct ObjectStorage {
    client: Client,
    bucket: String,
}

impl ObjectStorage {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Builds a client against the configured endpoint. Path-style addressing
    /// is required for most self-hosted S3-compatible servers (MinIO included).
    ///
    /// TODO: wire the caller-supplied base64 CA certificate into the client's
    /// TLS connector instead of relying solely on the system trust store.
    pub async fn connect(endpoint: &str, access_key: Option<&str>, secret_key: Option<&str>, bucket: String) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).endpoint_url(endpoint);
        if let (Some(ak), Some(sk)) = (access_key, secret_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(ak, sk, None, None, "traffic-analyzer"));
        }
        let shared_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(true)
            .build();
        Self::new(Client::from_conf(s3_config), bucket)
    }

    fn capture_prefix(capture_id: &str) -> String {
        format!("{BUCKET_PREFIX}{capture_id}")
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let output = request.send().await.map_err(|e| StorageError::Sdk(e.to_string()))?;
            keys.extend(output.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            continuation = output.next_continuation_token().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }
        Ok(keys)
    }

    fn classify_suffix(key: &str) -> Option<ArtifactKind> {
        let stripped = key.strip_suffix(".gz").unwrap_or(key);
        if stripped.ends_with(".pcap") {
            Some(ArtifactKind::Pcap)
        } else if stripped.ends_with("_address_list.txt") {
            Some(ArtifactKind::AddressList)
        } else if stripped.ends_with("_metadata.json") {
            Some(ArtifactKind::Metadata)
        } else {
            None
        }
    }

    /// Streams every object under a capture's prefix into `work_dir`,
    /// classified by artifact kind. Per-object failures are logged and
    /// skipped rather than aborting the whole stage.
    pub async fn stage_capture(&self, capture_id: &str, work_dir: &Path) -> Result<Vec<StagedArtifact>, StorageError> {
        let prefix = Self::capture_prefix(capture_id);
        let keys = self.list_keys(&prefix).await?;
        let mut staged = Vec::new();
        for key in keys {
            let Some(kind) = Self::classify_suffix(&key) else { continue };
            match self.download_one(&key, work_dir).await {
                Ok(local_path) => staged.push(StagedArtifact { kind, local_path }),
                Err(e) => tracing::warn!(key, error = %e, "failed to stage object, skipping"),
            }
        }
        Ok(staged)
    }

    async fn download_one(&self, key: &str, work_dir: &Path) -> Result<PathBuf, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Sdk(e.to_string()))?;
        let file_name = key.rsplit('/').next().unwrap_or(key);
        let local_path = work_dir.join(file_name);
        let mut body = output.body.into_async_read();
        let mut file = tokio::fs::File::create(&local_path).await?;
        tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        Ok(local_path)
    }

    /// Deletes every object under a capture's prefix. Returns the count
    /// actually deleted.
    pub async fn delete_capture(&self, capture_id: &str) -> Result<usize, StorageError> {
        let prefix = Self::capture_prefix(capture_id);
        self.delete_keys(&self.list_keys(&prefix).await?).await
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for key in keys {
            match self.client.delete_object().bucket(&self.bucket).key(key).send().await {
                Ok(_) => deleted += 1,
                Err(e) => tracing::warn!(key, error = %e, "failed to delete object, skipping"),
            }
        }
        Ok(deleted)
    }

    /// Lists the entire `PacketCaptures/` prefix, groups objects by the
    /// capture id (the leading token before the first `_` in the object's
    /// basename), and deletes any group that fails the completeness
    /// predicate: at least 3 files present, with metadata, packets, and
    /// address-list all represented.
    pub async fn sweep(&self) -> Result<SweepReport, StorageError> {
        let keys = self.list_keys(BUCKET_PREFIX).await?;
        let mut groups: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for key in keys {
            let basename = key.rsplit('/').next().unwrap_or(&key);
            let capture_id = basename.split('_').next().unwrap_or(basename).to_string();
            groups.entry(capture_id).or_default().push(key);
        }

        let mut deleted_groups = Vec::new();
        let mut kept_groups = Vec::new();
        for (capture_id, group_keys) in groups {
            if Self::is_complete(&group_keys) {
                kept_groups.push(capture_id);
            } else {
                self.delete_keys(&group_keys).await?;
                deleted_groups.push(capture_id);
            }
        }
        Ok(SweepReport { deleted_groups, kept_groups })
    }

    fn is_complete(keys: &[String]) -> bool {
        if keys.len() < 3 {
            return false;
        }
        let has_pcap = keys.iter().any(|k| Self::classify_suffix(k) == Some(ArtifactKind::Pcap));
        let has_metadata = keys.iter().any(|k| Self::classify_suffix(k) == Some(ArtifactKind::Metadata));
        let has_addresses = keys.iter().any(|k| Self::classify_suffix(k) == Some(ArtifactKind::AddressList));
        has_pcap && has_metadata && has_addresses
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted_groups: Vec<String>,
    pub kept_groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_gzipped_and_plain_suffixes() {
        assert_eq!(ObjectStorage::classify_suffix("cap1.pcap"), Some(ArtifactKind::Pcap));
        assert_eq!(ObjectStorage::classify_suffix("cap1.pcap.gz"), Some(ArtifactKind::Pcap));
        assert_eq!(ObjectStorage::classify_suffix("cap1_address_list.txt.gz"), Some(ArtifactKind::AddressList));
        assert_eq!(ObjectStorage::classify_suffix("cap1_metadata.json"), Some(ArtifactKind::Metadata));
        assert_eq!(ObjectStorage::classify_suffix("cap1_notes.txt"), None);
    }

    #[test]
    fn completeness_requires_all_three_kinds_and_min_file_count() {
        let complete = vec!["cap1.pcap".to_string(), "cap1_metadata.json".to_string(), "cap1_address_list.txt".to_string()];
        assert!(ObjectStorage::is_complete(&complete));

        let missing_addresses = vec!["cap1.pcap".to_string(), "cap1_metadata.json".to_string()];
        assert!(!ObjectStorage::is_complete(&missing_addresses));
    }
}
