// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! On-disk cache of the last known endpoint lists.
//!
//! Every successful refresh upserts the object's lists and rewrites the JSON
//! file; a manager whose first registry lookup fails starts from the cached
//! lists instead of an empty set.

use crate::endpoint::Endpoint;
use crate::registry::EndpointLists;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Cache file errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cached lists of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    #[serde(default)]
    pub set_id: String,
    #[serde(default)]
    pub locator: String,
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub inactive_endpoints: Vec<Endpoint>,
}

impl ObjectEntry {
    fn matches(&self, name: &str, set_id: &str, locator: &str) -> bool {
        self.name == name && self.set_id == set_id && self.locator == locator
    }
}

/// Serialized file layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheContents {
    /// Unix seconds of the last write.
    pub modify_time: u64,
    pub objects: Vec<ObjectEntry>,
}

/// JSON-backed endpoint cache.
#[derive(Debug)]
pub struct EndpointCache {
    path: PathBuf,
    contents: Mutex<CacheContents>,
}

impl EndpointCache {
    /// Open `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let contents = match Self::load(&path) {
            Ok(contents) => contents,
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                CacheContents::default()
            }
            Err(e) => {
                log::warn!("[cache] ignoring unreadable {}: {}", path.display(), e);
                CacheContents::default()
            }
        };
        Self {
            path,
            contents: Mutex::new(contents),
        }
    }

    fn load(path: &Path) -> Result<CacheContents, CacheError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached lists for one object.
    pub fn lookup(&self, name: &str, set_id: &str, locator: &str) -> Option<EndpointLists> {
        self.contents
            .lock()
            .objects
            .iter()
            .find(|entry| entry.matches(name, set_id, locator))
            .map(|entry| EndpointLists::new(entry.endpoints.clone(), entry.inactive_endpoints.clone()))
    }

    /// Upsert one object's lists and rewrite the file.
    pub fn store(
        &self,
        name: &str,
        set_id: &str,
        locator: &str,
        lists: &EndpointLists,
    ) -> Result<(), CacheError> {
        let mut contents = self.contents.lock();
        let entry = ObjectEntry {
            name: name.to_string(),
            set_id: set_id.to_string(),
            locator: locator.to_string(),
            endpoints: lists.active.clone(),
            inactive_endpoints: lists.inactive.clone(),
        };
        match contents
            .objects
            .iter_mut()
            .find(|e| e.matches(name, set_id, locator))
        {
            Some(existing) => *existing = entry,
            None => contents.objects.push(entry),
        }
        contents.modify_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let data = serde_json::to_string_pretty(&*contents)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
