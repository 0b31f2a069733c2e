//! Content store boundary
//!
//! A content-addressed blob store (IPFS pinning). Stored node content that
//! begins with [`REFERENCE_PREFIX`] is a reference into this store.
//!
//! Prefix sniffing cannot tell a reference from literal text that happens to
//! start with the same characters; such text is treated as a reference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

pub const REFERENCE_PREFIX: &str = "ipfs:";

/// True when stored content is a content-store reference.
pub fn is_reference(content: &str) -> bool {
    content
        .strip_prefix(REFERENCE_PREFIX)
        .map(|hash| !hash.is_empty())
        .unwrap_or(false)
}

/// Descriptive metadata pinned alongside the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinMetadata {
    pub name: String,
    #[serde(default)]
    pub keyvalues: HashMap<String, String>,
}

impl PinMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keyvalues: HashMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keyvalues.insert(key.into(), value.into());
        self
    }
}

/// Result of pinning content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinReceipt {
    pub reference: String,
    pub size_bytes: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Errors from content store operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("content store unavailable: {0}")]
    Unavailable(String),
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

/// Client trait for the content store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Pin `text`, returning its reference.
    async fn pin(&self, text: &str, metadata: &PinMetadata) -> Result<PinReceipt, StoreError>;

    /// Fetch the text behind a reference.
    async fn fetch(&self, reference: &str) -> Result<String, StoreError>;

    fn is_reference(&self, content: &str) -> bool {
        is_reference(content)
    }
}

/// Content store held in memory, addressed by a hash of the content.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<String, String>>,
    unavailable: Mutex<bool>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent pin and fetch fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(|e| e.into_inner()) = unavailable;
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.unavailable.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn pin(&self, text: &str, _metadata: &PinMetadata) -> Result<PinReceipt, StoreError> {
        self.check_available()?;
        let hash = Uuid::new_v5(&Uuid::NAMESPACE_URL, text.as_bytes()).simple().to_string();
        let reference = format!("{}{}", REFERENCE_PREFIX, hash);
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(reference.clone(), text.to_string());
        Ok(PinReceipt {
            reference,
            size_bytes: text.len(),
            timestamp: chrono::Utc::now(),
        })
    }

    async fn fetch(&self, reference: &str) -> Result<String, StoreError> {
        self.check_available()?;
        if !is_reference(reference) {
            return Err(StoreError::InvalidReference(reference.to_string()));
        }
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_pinned_text() {
        let store = MemoryContentStore::new();
        let text = "The lighthouse keeper counted the waves.";
        let pinned = store.pin(text, &PinMetadata::named("node")).await.unwrap();

        assert!(store.is_reference(&pinned.reference));
        assert_eq!(pinned.size_bytes, text.len());
        assert_eq!(store.fetch(&pinned.reference).await.unwrap(), text);
    }

    #[tokio::test]
    async fn same_text_pins_to_same_reference() {
        let store = MemoryContentStore::new();
        let a = store.pin("x", &PinMetadata::default()).await.unwrap();
        let b = store.pin("x", &PinMetadata::default()).await.unwrap();
        assert_eq!(a.reference, b.reference);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_and_invalid_references_fail() {
        let store = MemoryContentStore::new();
        assert!(matches!(
            store.fetch("ipfs:missing").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.fetch("plain").await,
            Err(StoreError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn unavailable_store_rejects_pins() {
        let store = MemoryContentStore::new();
        store.set_unavailable(true);
        assert!(store.pin("x", &PinMetadata::default()).await.is_err());
    }

    #[test]
    fn reference_detection_requires_hash() {
        assert!(is_reference("ipfs:Qm123"));
        assert!(!is_reference("ipfs:"));
        assert!(!is_reference("IPFS is a protocol"));
        assert!(!is_reference("plain text"));
    }
}
