use serde::{Deserialize, Serialize};

use futures_util::Stream;
use std::fmt;
use std::pin::Pin;

/// One model currently resident on an inference server.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelEntry {
    pub model: String,
}

/// Body of `GET /api/ps`. Elements carry more fields than `model`; they are ignored.
#[derive(Deserialize, Debug, Default)]
pub struct RunningModels {
    pub models: Option<Vec<ModelEntry>>,
}

impl RunningModels {
    pub fn into_entries(self) -> Vec<ModelEntry> {
        self.models.unwrap_or_default()
    }
}

/// Body of `POST /api/generate` asking the server to evict `model` now.
#[derive(Serialize, Debug)]
pub struct UnloadRequest<'a> {
    pub model: &'a str,
    pub keep_alive: u32,
}

impl<'a> UnloadRequest<'a> {
    pub fn immediate(model: &'a str) -> Self {
        Self {
            model,
            keep_alive: 0,
        }
    }
}

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl MemorySnapshot {
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_GB
    }

    pub fn free_gb(&self) -> f64 {
        self.free_bytes as f64 / BYTES_PER_GB
    }
}

impl fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={:.2} GB, free={:.2} GB",
            self.total_gb(),
            self.free_gb()
        )
    }
}

pub type GenericBoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_models_keeps_response_order() {
        let parsed: RunningModels = serde_json::from_str(
            r#"{"models":[{"model":"llama3:70b","size":1},{"model":"mistral:7b"}]}"#,
        )
        .unwrap();
        let names: Vec<_> = parsed
            .into_entries()
            .into_iter()
            .map(|entry| entry.model)
            .collect();
        assert_eq!(names, vec!["llama3:70b", "mistral:7b"]);
    }

    #[test]
    fn missing_or_null_models_is_empty() {
        let missing: RunningModels = serde_json::from_str("{}").unwrap();
        assert!(missing.into_entries().is_empty());
        let null: RunningModels = serde_json::from_str(r#"{"models":null}"#).unwrap();
        assert!(null.into_entries().is_empty());
    }

    #[test]
    fn entry_without_model_is_rejected() {
        let parsed = serde_json::from_str::<RunningModels>(r#"{"models":[{"name":"x"}]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn unload_request_sets_keep_alive_zero() {
        let body = serde_json::to_string(&UnloadRequest::immediate("mistral:7b")).unwrap();
        assert_eq!(body, r#"{"model":"mistral:7b","keep_alive":0}"#);
    }

    #[test]
    fn memory_snapshot_renders_gigabytes() {
        let snapshot = MemorySnapshot {
            total_bytes: 16_777_216 * 1024,
            free_bytes: 8_388_608 * 1024,
        };
        assert_eq!(snapshot.to_string(), "total=16.00 GB, free=8.00 GB");
    }
}
