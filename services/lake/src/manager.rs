//! Partition manager: idempotent writes, manifests, and planning.

use chrono::{NaiveDate, TimeZone, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::encode::{payload_hash, JsonlEncoder, RecordEncoder};
use crate::error::{LakeError, Result};
use crate::partition::{PartitionKey, PartitionPolicy};
use crate::retention::{CompactionPlan, RetentionAction, RetentionPolicy};

/// Result of a partition write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub path: String,
    /// Zero when the write was a content-hash no-op.
    pub bytes_written: usize,
    pub file_hash: String,
    pub idempotent_key: String,
    pub partition: PartitionKey,
}

/// Computes partition keys and paths, writes content-hashed data files, and
/// plans compaction and retention.
pub struct PartitionManager<B: StorageBackend> {
    backend: B,
    policy: PartitionPolicy,
    retention: RetentionPolicy,
    encoder: Box<dyn RecordEncoder>,
    catalog: String,
}

impl<B: StorageBackend> PartitionManager<B> {
    pub fn new(backend: B, policy: PartitionPolicy) -> Self {
        Self {
            backend,
            policy,
            retention: RetentionPolicy::default(),
            encoder: Box::new(JsonlEncoder),
            catalog: "hive".to_string(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn RecordEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn policy(&self) -> &PartitionPolicy {
        &self.policy
    }

    /// Derive the partition key for one event timestamp.
    pub fn derive_key(
        &self,
        symbol: &str,
        tf: &str,
        ts_event_ms: i64,
        region: Option<&str>,
    ) -> Result<PartitionKey> {
        PartitionKey::derive(&self.policy, symbol, tf, ts_event_ms, region)
    }

    /// Partition directory key under the backend root.
    pub fn partition_path(&self, key: &PartitionKey) -> String {
        format!("{}/{}", self.policy.dataset, key.hive_path())
    }

    fn manifest_path(&self, key: &PartitionKey) -> String {
        format!("{}/_manifest.json", self.partition_path(key))
    }

    /// Write a batch of records into the partition.
    ///
    /// The data file name embeds the content hash; writing a batch whose
    /// hash already exists in the partition is a no-op, which is what makes
    /// replays and at-least-once upstream delivery safe.
    pub fn write_partition(&self, key: &PartitionKey, records: &[Value]) -> Result<WriteResult> {
        if records.is_empty() {
            return Err(LakeError::EmptyBatch);
        }
        let file_hash = payload_hash(records);
        let hash16 = &file_hash[..16];
        let idempotent_key = format!(
            "{}|{}|{}|{}|{}",
            key.symbol,
            key.tf,
            key.date,
            key.hour.map(|h| h.to_string()).unwrap_or_default(),
            file_hash
        );

        let partition_dir = self.partition_path(key);
        if let Some(existing) = self.find_by_hash(&partition_dir, hash16) {
            debug!(path = %existing, "partition write is a content no-op");
            return Ok(WriteResult {
                path: existing,
                bytes_written: 0,
                file_hash,
                idempotent_key,
                partition: key.clone(),
            });
        }

        let data = self.encoder.encode(records)?;
        let ext = self.encoder.ext();
        let rand8: String = {
            let mut rng = rand::thread_rng();
            (0..8)
                .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).expect("digit < 16"))
                .collect()
        };
        let final_path = format!("{partition_dir}/part-{hash16}-{rand8}.{ext}");

        // temp then rename on local FS; object stores write final directly
        let tmp_path = format!(".tmp/{hash16}-{rand8}");
        self.backend.write_bytes(&tmp_path, &data)?;
        self.backend.atomic_replace(&tmp_path, &final_path)?;

        self.update_manifest(key, &final_path, data.len(), ext)?;
        info!(path = %final_path, bytes = data.len(), "partition file written");
        Ok(WriteResult {
            path: final_path,
            bytes_written: data.len(),
            file_hash,
            idempotent_key,
            partition: key.clone(),
        })
    }

    fn find_by_hash(&self, partition_dir: &str, hash16: &str) -> Option<String> {
        let needle = format!("part-{hash16}-");
        self.backend
            .listdir(partition_dir)
            .into_iter()
            .find(|path| {
                path.rsplit('/')
                    .next()
                    .map(|name| name.starts_with(&needle))
                    .unwrap_or(false)
            })
    }

    /// Append a file entry to the partition manifest, creating it when
    /// missing.
    fn update_manifest(&self, key: &PartitionKey, path: &str, size: usize, ext: &str) -> Result<()> {
        let manifest_path = self.manifest_path(key);
        let mut manifest = match self.backend.read_bytes(&manifest_path) {
            Ok(raw) => serde_json::from_slice::<Value>(&raw).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };
        if !manifest.is_object() {
            manifest = json!({
                "format": ext,
                "dataset": self.policy.dataset,
                "partition": serde_json::to_value(key)?,
                "files": [],
                "catalog": self.catalog,
                "version": 1,
            });
        }
        manifest["files"]
            .as_array_mut()
            .map(|files| files.push(json!({"path": path, "size": size, "ext": ext})))
            .ok_or_else(|| LakeError::InvalidPath(manifest_path.clone()))?;
        manifest["updated_at"] = json!(Utc::now().to_rfc3339());
        self.backend
            .write_bytes(&manifest_path, manifest.to_string().as_bytes())
    }

    /// Parsed manifest for a partition, if present.
    pub fn read_manifest(&self, key: &PartitionKey) -> Option<Value> {
        let raw = self.backend.read_bytes(&self.manifest_path(key)).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Data files recorded in a partition directory (ignores manifests).
    pub fn data_files(&self, key: &PartitionKey) -> Vec<String> {
        self.backend
            .listdir(&self.partition_path(key))
            .into_iter()
            .filter(|p| p.ends_with(".jsonl") || p.ends_with(".parquet"))
            .collect()
    }

    /// Summarize a partition for compaction: total size plus files smaller
    /// than a quarter of the target file size.
    pub fn plan_compaction(&self, key: &PartitionKey, target_file_size_mb: u64) -> CompactionPlan {
        let files = self.data_files(key);
        let threshold = target_file_size_mb * 1024 * 1024 / 4;
        let mut total_bytes = 0u64;
        let mut small_files = Vec::new();
        for path in &files {
            let size = self.backend.size(path).unwrap_or(0);
            total_bytes += size;
            if size < threshold {
                small_files.push(path.clone());
            }
        }
        CompactionPlan {
            partition: key.clone(),
            total_files: files.len(),
            total_bytes,
            small_files,
        }
    }

    /// Plan tier actions for every partition date observed in the dataset.
    pub fn plan_retention(&self, now_ms: i64) -> Vec<RetentionAction> {
        let now_date = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .map(|dt| dt.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive());

        let mut seen = std::collections::HashSet::new();
        let mut plans = Vec::new();
        for file in self.backend.listdir(&self.policy.dataset) {
            let Some((dir, date)) = date_component(&file) else {
                continue;
            };
            if !seen.insert(dir.clone()) {
                continue;
            }
            let Ok(parsed) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
                continue;
            };
            let age_days = (now_date - parsed).num_days();
            let tier = self.retention.tier_for_age_days(age_days).clone();
            plans.push(RetentionAction {
                path: dir,
                date,
                age_days,
                tier,
            });
        }
        plans.sort_by(|a, b| a.path.cmp(&b.path));
        plans
    }
}

/// Extract the `date=YYYY-MM-DD` component of a file key; returns the
/// directory prefix ending at the date segment plus the date itself.
fn date_component(path: &str) -> Option<(String, String)> {
    let mut prefix = Vec::new();
    for part in path.split('/') {
        prefix.push(part);
        if let Some(date) = part.strip_prefix("date=") {
            return Some((prefix.join("/"), date.to_string()));
        }
    }
    None
}
