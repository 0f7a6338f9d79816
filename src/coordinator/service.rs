//! Coordinator service: the metadata table, the placement registry and the
//! sweeper behind one lock
//!
//! Every mutation (commit, delete, size adjustment, sweep, snapshot load)
//! takes the write lock, so a commit's size delta and a sweep's reversal
//! can never interleave on the same key. Lookups share the read lock and
//! only upgrade when a sweep is due.

use crate::common::types::NodeLoad;
use crate::common::{
    timestamp_now_millis, validate_key, Error, MetricsRegistry, ObjectValue, Result, ROOT_KEY,
};
use crate::coordinator::metadata::{MetadataRecord, MetadataStore};
use crate::coordinator::placement::PlacementRegistry;
use crate::coordinator::sweeper::{ExpirationSweeper, SweepReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use uuid::Uuid;

/// A live record as handed back to callers
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub value: ObjectValue,
    pub ttl_secs: u64,
}

/// On-disk snapshot of the coordinator tables
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    taken_at: DateTime<Utc>,
    /// Registered nodes, in registration order
    nodes: Vec<String>,
    records: Vec<MetadataRecord>,
}

struct Tables {
    metadata: MetadataStore,
    placement: PlacementRegistry,
    sweeper: ExpirationSweeper,
}

impl Tables {
    fn ensure_root(&mut self, now_ms: u64) {
        if self.metadata.get(ROOT_KEY, now_ms).is_none() {
            let root = ObjectValue::directory(vec![ROOT_KEY.to_string()])
                .with_attr("st_nlink", 2);
            self.metadata
                .insert(MetadataRecord::new(ROOT_KEY, root, u64::MAX, now_ms));
        }
    }

    /// Store `record`, moving its declared size onto its node and taking the
    /// previous record's size (live or not yet swept) off the old one.
    fn commit(&mut self, record: MetadataRecord) -> usize {
        let previous = self.metadata.insert(record.clone());
        let old = previous.as_ref().and_then(|r| r.placement());
        let new = record.placement();

        let mut anomalies = 0;
        let mut apply = |node: &str, delta: i128| {
            if self.placement.adjust(node, delta).clamped {
                anomalies += 1;
            }
        };
        match (old, new) {
            (Some((old_node, old_size)), Some((new_node, new_size))) if old_node == new_node => {
                apply(new_node, new_size as i128 - old_size as i128);
            }
            (old, new) => {
                if let Some((node, size)) = old {
                    apply(node, -(size as i128));
                }
                if let Some((node, size)) = new {
                    apply(node, size as i128);
                }
            }
        }
        anomalies
    }

    fn remove(&mut self, key: &str, now_ms: u64) -> (bool, usize) {
        let Some(record) = self.metadata.remove(key) else {
            return (false, 0);
        };
        let mut anomalies = 0;
        if let Some((node, size)) = record.placement() {
            if self.placement.adjust(node, -(size as i128)).clamped {
                anomalies += 1;
            }
        }
        (record.is_live(now_ms), anomalies)
    }
}

/// Coordinator state, shared by every request handler
pub struct CoordinatorService {
    tables: RwLock<Tables>,
    metrics: Arc<MetricsRegistry>,
}

impl CoordinatorService {
    /// Empty tables holding only the root record
    pub fn new(sweep_interval: Duration) -> Self {
        Self::with_metrics(sweep_interval, Arc::new(MetricsRegistry::new()))
    }

    pub fn with_metrics(sweep_interval: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        let now = timestamp_now_millis();
        let mut tables = Tables {
            metadata: MetadataStore::new(),
            placement: PlacementRegistry::new(),
            sweeper: ExpirationSweeper::new(sweep_interval, now),
        };
        tables.ensure_root(now);
        Self {
            tables: RwLock::new(tables),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Internal("coordinator tables lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::Internal("coordinator tables lock poisoned".into()))
    }

    fn record_sweep(&self, report: SweepReport) {
        self.metrics.sweeps.inc();
        self.metrics.expired_records.add(report.removed as u64);
        self.metrics.accounting_anomalies.add(report.anomalies as u64);
    }

    fn record_anomalies(&self, anomalies: usize) {
        self.metrics.accounting_anomalies.add(anomalies as u64);
    }

    /// Run the sweeper under an already held write lock, if it is due
    fn sweep_locked(&self, tables: &mut Tables, now_ms: u64) {
        let Tables {
            metadata,
            placement,
            sweeper,
        } = tables;
        if let Some(report) = sweeper.sweep_if_due(metadata, placement, now_ms) {
            self.record_sweep(report);
        }
    }

    fn sweep_if_due(&self, now_ms: u64) -> Result<()> {
        if !self.read()?.sweeper.is_due(now_ms) {
            return Ok(());
        }
        let mut tables = self.write()?;
        self.sweep_locked(&mut tables, now_ms);
        Ok(())
    }

    /// Live record for `key`, or `None` when absent or expired
    pub fn get(&self, key: &str) -> Result<Option<Lookup>> {
        validate_key(key)?;
        let now = timestamp_now_millis();
        self.sweep_if_due(now)?;
        self.metrics.metadata_gets.inc();

        let tables = self.read()?;
        Ok(tables.metadata.get(key, now).map(|record| Lookup {
            value: record.value.clone(),
            ttl_secs: record.ttl_remaining_secs(now),
        }))
    }

    /// Commit metadata for `key`, applying the declared-size delta to the
    /// placement registry in the same critical section.
    pub fn put(&self, key: &str, value: ObjectValue, ttl_secs: u64) -> Result<()> {
        validate_key(key)?;
        let now = timestamp_now_millis();
        let mut tables = self.write()?;
        self.sweep_locked(&mut tables, now);

        // the root is always present
        let ttl_secs = if key == ROOT_KEY { u64::MAX } else { ttl_secs };
        let record = MetadataRecord::new(key, value, ttl_secs, now);
        tracing::debug!(
            key = %key,
            size = record.declared_size,
            node = record.placement().map(|(n, _)| n).unwrap_or("-"),
            ttl_secs,
            "Committing metadata"
        );
        let anomalies = tables.commit(record);
        self.record_anomalies(anomalies);
        self.metrics.metadata_puts.inc();
        Ok(())
    }

    /// Remove `key` immediately and take its size back off its node.
    /// Returns whether a live record was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        if key == ROOT_KEY {
            return Err(Error::InvalidArgument("the root key cannot be deleted".into()));
        }
        let now = timestamp_now_millis();
        let mut tables = self.write()?;
        self.sweep_locked(&mut tables, now);

        let (removed, anomalies) = tables.remove(key, now);
        self.record_anomalies(anomalies);
        self.metrics.metadata_deletes.inc();
        Ok(removed)
    }

    /// Number of live records; always sweeps first
    pub fn count(&self) -> Result<usize> {
        let now = timestamp_now_millis();
        let mut tables = self.write()?;
        let Tables {
            metadata,
            placement,
            sweeper,
        } = &mut *tables;
        let report = sweeper.sweep(metadata, placement, now);
        self.record_sweep(report);
        Ok(metadata.live_count(now))
    }

    pub fn register_node(&self, endpoint: &str) -> Result<bool> {
        if endpoint.trim().is_empty() {
            return Err(Error::InvalidArgument("endpoint cannot be empty".into()));
        }
        let added = self.write()?.placement.register(endpoint);
        if added {
            tracing::info!(node = %endpoint, "Registered storage node");
        }
        Ok(added)
    }

    pub fn select_least_loaded(&self) -> Result<String> {
        Ok(self.read()?.placement.select_least_loaded()?.to_string())
    }

    /// Move `key`'s accounted size on `endpoint` to `new_size`.
    ///
    /// Only applies to a live record placed on `endpoint`; otherwise nothing
    /// changes and `false` is returned.
    pub fn adjust_node_size(&self, key: &str, endpoint: &str, new_size: u64) -> Result<bool> {
        validate_key(key)?;
        let now = timestamp_now_millis();
        let mut tables = self.write()?;
        self.sweep_locked(&mut tables, now);

        let Tables {
            metadata,
            placement,
            ..
        } = &mut *tables;
        let Some(record) = metadata.get_mut(key, now) else {
            return Ok(false);
        };
        if record.value.placement() != Some(endpoint) {
            return Ok(false);
        }

        let delta = new_size as i128 - record.declared_size as i128;
        if placement.adjust(endpoint, delta).clamped {
            self.record_anomalies(1);
        }
        record.declared_size = new_size;
        record.value.size = new_size;
        Ok(true)
    }

    pub fn node_loads(&self) -> Result<Vec<NodeLoad>> {
        Ok(self.read()?.placement.loads())
    }

    /// Write every live record and the node list to `path`. Returns the record count.
    pub fn persist_snapshot(&self, path: &Path) -> Result<usize> {
        let now = timestamp_now_millis();
        let snapshot = {
            let tables = self.read()?;
            Snapshot {
                taken_at: Utc::now(),
                nodes: tables.placement.endpoints(),
                records: tables.metadata.live_records(now),
            }
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        // each writer gets its own temp file next to the target
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::InvalidArgument(format!("no file name in {:?}", path)))?;
        let tmp_path = path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));
        let written = std::fs::write(&tmp_path, serde_json::to_vec_pretty(&snapshot)?)
            .and_then(|()| std::fs::rename(&tmp_path, path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        tracing::info!(
            path = %path.display(),
            records = snapshot.records.len(),
            nodes = snapshot.nodes.len(),
            "Persisted metadata snapshot"
        );
        Ok(snapshot.records.len())
    }

    /// Replace the metadata table with the snapshot at `path` and rebuild
    /// every node's aggregate from the loaded records. Returns the number of
    /// live records loaded.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let snapshot: Snapshot = serde_json::from_slice(&std::fs::read(path)?)?;
        let now = timestamp_now_millis();

        let mut tables = self.write()?;
        tables.metadata.clear();
        for node in &snapshot.nodes {
            tables.placement.register(node);
        }
        tables.placement.reset_aggregates();

        let mut loaded = 0;
        for record in snapshot.records {
            if !record.is_live(now) {
                continue;
            }
            let anomalies = tables.commit(record);
            self.record_anomalies(anomalies);
            loaded += 1;
        }
        tables.ensure_root(now);

        tracing::info!(
            path = %path.display(),
            taken_at = %snapshot.taken_at,
            records = loaded,
            "Loaded metadata snapshot"
        );
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Contents;

    fn placed(node: &str, size: u64) -> ObjectValue {
        ObjectValue {
            size,
            contents: Contents::Placement(node.to_string()),
            ..Default::default()
        }
    }

    fn service() -> CoordinatorService {
        CoordinatorService::new(Duration::from_secs(300))
    }

    fn aggregate(service: &CoordinatorService, node: &str) -> u64 {
        service
            .node_loads()
            .unwrap()
            .into_iter()
            .find(|l| l.endpoint == node)
            .map(|l| l.aggregate_bytes)
            .unwrap()
    }

    #[test]
    fn test_root_exists_from_start() {
        let service = service();
        let root = service.get(ROOT_KEY).unwrap().unwrap();
        assert_eq!(root.value.contents, Contents::Listing(vec!["/".into()]));
        assert_eq!(service.count().unwrap(), 1);
    }

    #[test]
    fn test_root_outlives_its_ttl_and_cannot_be_deleted() {
        let service = service();
        let listing = ObjectValue::directory(vec!["/".into(), "/a".into()]);
        service.put(ROOT_KEY, listing.clone(), 0).unwrap();

        let root = service.get(ROOT_KEY).unwrap().unwrap();
        assert_eq!(root.value, listing);
        assert!(matches!(
            service.delete(ROOT_KEY),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(service.count().unwrap(), 1);
    }

    #[test]
    fn test_put_get_round_trip() {
        let service = service();
        service.register_node("http://n1").unwrap();
        service.put("/a", placed("http://n1", 5), 60).unwrap();

        let lookup = service.get("/a").unwrap().unwrap();
        assert_eq!(lookup.value.placement(), Some("http://n1"));
        assert_eq!(lookup.value.size, 5);
        assert!(lookup.ttl_secs <= 60 && lookup.ttl_secs >= 59);
        assert_eq!(aggregate(&service, "http://n1"), 5);
    }

    #[test]
    fn test_overwrite_applies_delta() {
        let service = service();
        service.register_node("http://n1").unwrap();
        service.put("/a", placed("http://n1", 100), 60).unwrap();
        service.put("/a", placed("http://n1", 40), 60).unwrap();
        assert_eq!(aggregate(&service, "http://n1"), 40);

        service.put("/b", placed("http://n1", 10), 60).unwrap();
        assert_eq!(aggregate(&service, "http://n1"), 50);
    }

    #[test]
    fn test_overwrite_on_other_node_moves_accounting() {
        let service = service();
        service.register_node("http://n1").unwrap();
        service.register_node("http://n2").unwrap();
        service.put("/a", placed("http://n1", 30), 60).unwrap();
        service.put("/a", placed("http://n2", 20), 60).unwrap();
        assert_eq!(aggregate(&service, "http://n1"), 0);
        assert_eq!(aggregate(&service, "http://n2"), 20);
    }

    #[test]
    fn test_delete_reverses_accounting() {
        let service = service();
        service.register_node("http://n1").unwrap();
        service.put("/a", placed("http://n1", 30), 60).unwrap();

        assert!(service.delete("/a").unwrap());
        assert!(service.get("/a").unwrap().is_none());
        assert_eq!(aggregate(&service, "http://n1"), 0);
        assert!(!service.delete("/a").unwrap());
        assert_eq!(service.metrics().accounting_anomalies.get(), 0);
    }

    #[test]
    fn test_zero_ttl_is_immediately_absent() {
        let service = service();
        service.register_node("http://n1").unwrap();
        service.put("/a", placed("http://n1", 8), 0).unwrap();
        assert!(service.get("/a").unwrap().is_none());
        // count forces a sweep, which hands the bytes back
        assert_eq!(service.count().unwrap(), 1);
        assert_eq!(aggregate(&service, "http://n1"), 0);
    }

    #[test]
    fn test_root_never_touches_placement() {
        let service = service();
        service.register_node("http://n1").unwrap();
        let root = ObjectValue::directory(vec!["/".into(), "/a".into()]);
        service.put(ROOT_KEY, root.clone(), 60).unwrap();
        assert_eq!(service.get(ROOT_KEY).unwrap().unwrap().value, root);
        assert_eq!(aggregate(&service, "http://n1"), 0);
    }

    #[test]
    fn test_select_requires_nodes() {
        let service = service();
        assert!(matches!(
            service.select_least_loaded(),
            Err(Error::NoNodesAvailable)
        ));
    }

    #[test]
    fn test_adjust_node_size() {
        let service = service();
        service.register_node("http://n1").unwrap();
        service.put("/a", placed("http://n1", 10), 60).unwrap();

        assert!(service.adjust_node_size("/a", "http://n1", 25).unwrap());
        assert_eq!(aggregate(&service, "http://n1"), 25);
        assert_eq!(service.get("/a").unwrap().unwrap().value.size, 25);

        // wrong node or unknown key leave everything alone
        assert!(!service.adjust_node_size("/a", "http://n2", 99).unwrap());
        assert!(!service.adjust_node_size("/nope", "http://n1", 99).unwrap());
        assert_eq!(aggregate(&service, "http://n1"), 25);

        service.delete("/a").unwrap();
        assert_eq!(aggregate(&service, "http://n1"), 0);
    }

    #[test]
    fn test_snapshot_round_trip_rebuilds_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");

        let original = service();
        original.register_node("http://n1").unwrap();
        original.register_node("http://n2").unwrap();
        original.put("/a", placed("http://n1", 5), 600).unwrap();
        original.put("/b", placed("http://n2", 7), 600).unwrap();
        original.put("/c", placed("http://n2", 9), 0).unwrap();
        assert_eq!(original.persist_snapshot(&path).unwrap(), 3);

        let restored = service();
        restored.register_node("http://n3").unwrap();
        assert_eq!(restored.load_snapshot(&path).unwrap(), 3);

        assert_eq!(restored.count().unwrap(), 3);
        assert_eq!(aggregate(&restored, "http://n1"), 5);
        assert_eq!(aggregate(&restored, "http://n2"), 7);
        assert_eq!(aggregate(&restored, "http://n3"), 0);
        assert_eq!(
            restored.get("/a").unwrap().unwrap().value.placement(),
            Some("http://n1")
        );
        assert!(restored.get("/c").unwrap().is_none());
    }

    #[test]
    fn test_sizes_beyond_i64_keep_accounting_exact() {
        let service = service();
        service.register_node("http://n1").unwrap();
        let huge = u64::MAX - 1;

        service.put("/a", placed("http://n1", huge), 60).unwrap();
        assert_eq!(aggregate(&service, "http://n1"), huge);

        assert!(service.adjust_node_size("/a", "http://n1", 5).unwrap());
        assert_eq!(aggregate(&service, "http://n1"), 5);

        service.put("/a", placed("http://n1", huge), 60).unwrap();
        assert_eq!(aggregate(&service, "http://n1"), huge);
        assert!(service.delete("/a").unwrap());
        assert_eq!(aggregate(&service, "http://n1"), 0);
        assert_eq!(service.metrics().accounting_anomalies.get(), 0);
    }

    #[test]
    fn test_concurrent_snapshots_to_one_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let service = Arc::new(service());
        service.register_node("http://n1").unwrap();
        service.put("/a", placed("http://n1", 5), 600).unwrap();

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let path = path.clone();
                std::thread::spawn(move || service.persist_snapshot(&path))
            })
            .collect();
        for writer in writers {
            assert_eq!(writer.join().unwrap().unwrap(), 2);
        }

        assert_eq!(service.load_snapshot(&path).unwrap(), 2);
        // no temp files are left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_snapshot_path_with_tmp_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.tmp");
        let service = service();
        assert_eq!(service.persist_snapshot(&path).unwrap(), 1);
        assert_eq!(service.persist_snapshot(&path).unwrap(), 1);
        assert_eq!(service.load_snapshot(&path).unwrap(), 1);
    }

    #[test]
    fn test_load_missing_snapshot_fails() {
        let service = service();
        assert!(matches!(
            service.load_snapshot(Path::new("/definitely/not/here.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_expiry_with_real_clock() {
        let service = CoordinatorService::new(Duration::ZERO);
        service.register_node("http://n1").unwrap();
        service.put("/short", placed("http://n1", 4), 1).unwrap();
        assert!(service.get("/short").unwrap().is_some());

        std::thread::sleep(Duration::from_millis(1_100));
        assert!(service.get("/short").unwrap().is_none());
        assert_eq!(aggregate(&service, "http://n1"), 0);
        assert_eq!(service.metrics().expired_records.get(), 1);
    }
}
