//! The committed host → backend route table.
//!
//! Readers take a lock-free snapshot of the mapping; writers serialize
//! through a mutex, persist the new set to disk, then publish it in a
//! single atomic swap. A reload never exposes a half-applied table.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use arc_swap::ArcSwap;
use chrono::Utc;
use thiserror::Error;
use url::Url;

use crate::routing::route::{normalize_host, Route, RouteError, RouteRecord};

/// Errors raised by route table operations.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("route table io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("route table file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Route(#[from] RouteError),
}

#[derive(Debug, Clone)]
struct StoredRoute {
    route: Route,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

/// Host-keyed route storage backing the request path.
pub struct RouteTable {
    path: PathBuf,
    routes: ArcSwap<HashMap<String, StoredRoute>>,
    // Serializes mutate-persist-publish sequences.
    write_lock: Mutex<()>,
}

impl RouteTable {
    /// Open the table at `path`, loading any persisted routes.
    /// A missing file yields an empty table.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TableError> {
        let path = path.into();
        let routes = load_file(&path)?;
        Ok(Self {
            path,
            routes: ArcSwap::from_pointee(routes),
            write_lock: Mutex::new(()),
        })
    }

    /// Point lookup of the current committed backend for `host`.
    pub fn lookup(&self, host: &str) -> Option<Route> {
        self.routes.load().get(host).map(|s| s.route.clone())
    }

    /// Insert or replace the binding for a host (last-writer-wins).
    pub fn insert(&self, raw_host: &str, raw_backend: &str) -> Result<Route, TableError> {
        let route = Route::new(raw_host, raw_backend)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let mut next: HashMap<String, StoredRoute> = self.routes.load().as_ref().clone();
        let created_at = next
            .get(&route.host)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        next.insert(
            route.host.clone(),
            StoredRoute {
                route: route.clone(),
                created_at,
                updated_at: now,
            },
        );
        self.persist(&next)?;
        self.routes.store(Arc::new(next));

        tracing::info!(host = %route.host, backend = %route.backend, "Route committed");
        Ok(route)
    }

    /// Remove the binding for a host. Returns whether one existed.
    pub fn remove(&self, raw_host: &str) -> Result<bool, TableError> {
        let host = normalize_host(raw_host);

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut next: HashMap<String, StoredRoute> = self.routes.load().as_ref().clone();
        let existed = next.remove(&host).is_some();
        if existed {
            self.persist(&next)?;
            self.routes.store(Arc::new(next));
            tracing::info!(host = %host, "Route removed");
        }
        Ok(existed)
    }

    /// Re-read the persisted file, atomically replacing the mapping.
    /// Returns the number of committed routes.
    pub fn reload(&self) -> Result<usize, TableError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let next = load_file(&self.path)?;
        let count = next.len();
        self.routes.store(Arc::new(next));
        tracing::info!(routes = count, "Route table reloaded");
        Ok(count)
    }

    /// All committed routes.
    pub fn routes(&self) -> Vec<Route> {
        self.routes
            .load()
            .values()
            .map(|s| s.route.clone())
            .collect()
    }

    /// Distinct backend URLs across all routes.
    pub fn backends(&self) -> Vec<Url> {
        let mut backends: Vec<Url> = self
            .routes
            .load()
            .values()
            .map(|s| s.route.backend.clone())
            .collect();
        backends.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        backends.dedup();
        backends
    }

    /// Number of committed routes.
    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    /// Whether the table holds no routes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, routes: &HashMap<String, StoredRoute>) -> Result<(), TableError> {
        let mut records: Vec<RouteRecord> = routes
            .values()
            .map(|s| RouteRecord {
                host: s.route.host.clone(),
                backend: s.route.backend.to_string(),
                created_at: s.created_at,
                updated_at: s.updated_at,
            })
            .collect();
        records.sort_by(|a, b| a.host.cmp(&b.host));

        let json = serde_json::to_vec_pretty(&records).map_err(|source| TableError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| TableError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Write-then-rename keeps readers of the file from seeing a torn write.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(|source| TableError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| TableError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

fn load_file(path: &Path) -> Result<HashMap<String, StoredRoute>, TableError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs::read(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<RouteRecord> =
        serde_json::from_slice(&content).map_err(|source| TableError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let mut routes = HashMap::with_capacity(records.len());
    for record in records {
        let route = Route::new(&record.host, &record.backend)?;
        routes.insert(
            route.host.clone(),
            StoredRoute {
                route,
                created_at: record.created_at,
                updated_at: record.updated_at,
            },
        );
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (tempfile::TempDir, RouteTable) {
        let dir = tempfile::tempdir().unwrap();
        let table = RouteTable::open(dir.path().join("routes.json")).unwrap();
        (dir, table)
    }

    #[test]
    fn missing_file_is_empty_table() {
        let (_dir, table) = table();
        assert!(table.is_empty());
        assert!(table.lookup("a.test").is_none());
    }

    #[test]
    fn insert_then_lookup() {
        let (_dir, table) = table();
        table.insert("A.Test", "127.0.0.1:9001").unwrap();

        let route = table.lookup("a.test").expect("route should exist");
        assert_eq!(route.backend.as_str(), "http://127.0.0.1:9001/");
    }

    #[test]
    fn last_writer_wins() {
        let (_dir, table) = table();
        table.insert("a.test", "127.0.0.1:9001").unwrap();
        table.insert("a.test", "127.0.0.1:9002").unwrap();

        let route = table.lookup("a.test").unwrap();
        assert_eq!(route.backend.as_str(), "http://127.0.0.1:9002/");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        {
            let table = RouteTable::open(&path).unwrap();
            table.insert("a.test", "127.0.0.1:9001").unwrap();
        }

        let reopened = RouteTable::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.lookup("a.test").is_some());
    }

    #[test]
    fn reload_picks_up_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        let table = RouteTable::open(&path).unwrap();
        assert!(table.lookup("b.test").is_none());

        // A second handle plays the part of the external management surface.
        let writer = RouteTable::open(&path).unwrap();
        writer.insert("b.test", "127.0.0.1:9002").unwrap();

        table.reload().unwrap();
        assert!(table.lookup("b.test").is_some());
    }

    #[test]
    fn backends_are_distinct() {
        let (_dir, table) = table();
        table.insert("a.test", "127.0.0.1:9001").unwrap();
        table.insert("b.test", "127.0.0.1:9001").unwrap();
        table.insert("c.test", "127.0.0.1:9002").unwrap();

        assert_eq!(table.backends().len(), 2);
    }

    #[test]
    fn remove_deletes_binding() {
        let (_dir, table) = table();
        table.insert("a.test", "127.0.0.1:9001").unwrap();
        assert!(table.remove("a.test").unwrap());
        assert!(!table.remove("a.test").unwrap());
        assert!(table.lookup("a.test").is_none());
    }
}
