//! Integration tests for the full backup pipeline.
//!
//! Tests: DataStore → Snapshot → BlobStore → Ledger → Prune
//!
//! Verifies:
//! - Exported snapshots are complete and the summary matches the blob
//! - Retention keeps exactly the newest snapshots and deletes blob + row together
//! - Each failure point leaves the documented state behind

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    use chambers_core::{
        BlobRef, CriticalTable, Document, GovernanceTierRow, ProfileRow, RecordId, TableRow,
        UserRow,
    };

    use crate::backup::{
        BackupConfig, BackupError, BackupJob, Clock, LEDGER_TABLE, LedgerError, SnapshotKind,
        ledger_index, list_snapshots, load_snapshot,
    };
    use crate::blob::{BlobStore, BlobStoreError, InMemoryBlobStore};
    use crate::store::{DataStore, IndexPredicate, InMemoryDataStore, StoreError, StoredRow};

    /// Clock that advances one week per reading.
    struct WeeklyClock(Mutex<DateTime<Utc>>);

    impl WeeklyClock {
        fn starting(at: &str) -> Self {
            Self(Mutex::new(at.parse().unwrap()))
        }
    }

    impl Clock for WeeklyClock {
        fn now(&self) -> DateTime<Utc> {
            let mut now = self.0.lock().unwrap();
            let current = *now;
            *now = current + Duration::weeks(1);
            current
        }
    }

    /// Data store wrapper with switchable failure points.
    #[derive(Default)]
    struct FlakyDataStore {
        inner: InMemoryDataStore,
        fail_read: AtomicBool,
        fail_insert: AtomicBool,
    }

    #[async_trait::async_trait]
    impl DataStore for FlakyDataStore {
        async fn read_table(&self, table: &str) -> Result<Vec<StoredRow>, StoreError> {
            self.inner.read_table(table).await
        }

        async fn read_all_rows(&self, table: CriticalTable) -> Result<Vec<StoredRow>, StoreError> {
            if self.fail_read.load(Ordering::SeqCst) && table == CriticalTable::Subscriptions {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.read_all_rows(table).await
        }

        async fn insert_row(&self, table: &str, document: Document) -> Result<RecordId, StoreError> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(StoreError::Storage("write rejected".to_string()));
            }
            self.inner.insert_row(table, document).await
        }

        async fn query_by_index(
            &self,
            table: &str,
            index: &str,
            predicate: &IndexPredicate,
        ) -> Result<Vec<StoredRow>, StoreError> {
            self.inner.query_by_index(table, index, predicate).await
        }

        async fn delete_row(&self, id: RecordId) -> Result<(), StoreError> {
            self.inner.delete_row(id).await
        }
    }

    /// Blob store wrapper with switchable failure points.
    #[derive(Default)]
    struct FlakyBlobStore {
        inner: InMemoryBlobStore,
        fail_store: AtomicBool,
        fail_delete: AtomicBool,
    }

    #[async_trait::async_trait]
    impl BlobStore for FlakyBlobStore {
        async fn store(&self, bytes: Vec<u8>) -> Result<BlobRef, BlobStoreError> {
            if self.fail_store.load(Ordering::SeqCst) {
                return Err(BlobStoreError::Storage("bucket unavailable".to_string()));
            }
            self.inner.store(bytes).await
        }

        async fn get(&self, blob: BlobRef) -> Result<Option<Vec<u8>>, BlobStoreError> {
            self.inner.get(blob).await
        }

        async fn delete(&self, blob: BlobRef) -> Result<bool, BlobStoreError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(BlobStoreError::Storage("delete denied".to_string()));
            }
            self.inner.delete(blob).await
        }

        async fn list(&self) -> Result<Vec<BlobRef>, BlobStoreError> {
            self.inner.list().await
        }
    }

    type TestJob = BackupJob<Arc<FlakyDataStore>, Arc<FlakyBlobStore>, WeeklyClock>;

    fn setup(config: BackupConfig) -> (TestJob, Arc<FlakyDataStore>, Arc<FlakyBlobStore>) {
        let data = Arc::new(FlakyDataStore::default());
        data.inner.define_index(ledger_index());
        let blobs = Arc::new(FlakyBlobStore::default());
        let job = BackupJob::with_clock(
            data.clone(),
            blobs.clone(),
            config,
            WeeklyClock::starting("2026-01-04T03:00:00Z"),
        );
        (job, data, blobs)
    }

    async fn seed<R: TableRow>(data: &FlakyDataStore, rows: &[R]) {
        for row in rows {
            data.inner
                .insert_row(R::TABLE.as_str(), row.to_document().unwrap())
                .await
                .unwrap();
        }
    }

    fn user(email: &str) -> UserRow {
        UserRow {
            email: email.to_string(),
            name: None,
            image: None,
        }
    }

    fn profile(user_id: &str, display_name: &str) -> ProfileRow {
        ProfileRow {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            university: Some("King's College London".to_string()),
            year_of_study: Some(2),
            bio: None,
        }
    }

    async fn seed_scenario(data: &FlakyDataStore) {
        seed(data, &[profile("u1", "Ada"), profile("u2", "Grace")]).await;
        seed(
            data,
            &[
                user("ada@chambers.test"),
                user("grace@chambers.test"),
                user("alan@chambers.test"),
            ],
        )
        .await;
    }

    #[tokio::test]
    async fn run_exports_seeded_tables_and_records_one_snapshot() {
        let (job, data, blobs) = setup(BackupConfig::default());
        seed_scenario(&data).await;

        let summary = job.run().await.unwrap();

        let ledger = list_snapshots(&*data).await.unwrap();
        assert_eq!(ledger.len(), 1);
        let record = &ledger[0].record;
        let blob = blobs.get(record.blob_ref).await.unwrap().unwrap();

        assert_eq!(summary.total_records, 5);
        assert_eq!(summary.tables_exported, 5);
        assert_eq!(summary.size_bytes, blob.len() as u64);

        assert_eq!(record.kind, SnapshotKind::WeeklySnapshot);
        assert_eq!(record.record_count, 5);
        assert_eq!(record.size_bytes, blob.len() as u64);
        assert_eq!(record.tables, CriticalTable::ALL.to_vec());
        assert_eq!(record.created_at, "2026-01-04T03:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn snapshot_holds_every_table_with_store_row_counts() {
        let (job, data, blobs) = setup(BackupConfig::default());
        seed_scenario(&data).await;
        seed(
            &data,
            &[GovernanceTierRow {
                user_id: "u1".to_string(),
                tier: 3,
                points: 420,
            }],
        )
        .await;

        job.run().await.unwrap();

        let ledger = list_snapshots(&*data).await.unwrap();
        let snapshot = load_snapshot(&*blobs, &ledger[0].record).await.unwrap();

        assert_eq!(snapshot.table_names(), CriticalTable::ALL.to_vec());
        for table in CriticalTable::ALL {
            let stored = data.inner.read_all_rows(table).await.unwrap();
            let exported = snapshot.rows(table).unwrap();
            assert_eq!(exported.len(), stored.len(), "row count of {table}");
            for (row, doc) in stored.iter().zip(exported) {
                assert_eq!(doc.get(StoredRow::ID_FIELD), Some(&json!(row.id.to_string())));
            }
        }
    }

    #[tokio::test]
    async fn export_keeps_fields_outside_the_row_schema() {
        let (job, data, blobs) = setup(BackupConfig::default());
        let mut row = user("ada@chambers.test").to_document().unwrap();
        row.insert("tokenIdentifier".to_string(), json!("issuer|ada"));
        data.inner.insert_row("users", row).await.unwrap();

        job.run().await.unwrap();

        let ledger = list_snapshots(&*data).await.unwrap();
        let snapshot = load_snapshot(&*blobs, &ledger[0].record).await.unwrap();
        let exported = &snapshot.rows(CriticalTable::Users).unwrap()[0];
        assert_eq!(exported.get("tokenIdentifier"), Some(&json!("issuer|ada")));
        assert!(exported.contains_key(StoredRow::CREATION_TIME_FIELD));
    }

    #[tokio::test]
    async fn five_weekly_runs_keep_the_four_newest() {
        let (job, data, blobs) = setup(BackupConfig::default());
        seed_scenario(&data).await;

        job.run().await.unwrap();
        let first = list_snapshots(&*data).await.unwrap().remove(0);

        for _ in 0..4 {
            job.run().await.unwrap();
        }

        let ledger = list_snapshots(&*data).await.unwrap();
        assert_eq!(ledger.len(), 4);
        assert!(ledger.iter().all(|e| e.id != first.id));
        assert_eq!(blobs.get(first.record.blob_ref).await.unwrap(), None);
        assert_eq!(data.inner.row_count(LEDGER_TABLE), 4);

        let created: Vec<_> = ledger.iter().map(|e| e.record.created_at.to_rfc3339()).collect();
        assert_eq!(
            created,
            vec![
                "2026-02-01T03:00:00+00:00",
                "2026-01-25T03:00:00+00:00",
                "2026-01-18T03:00:00+00:00",
                "2026-01-11T03:00:00+00:00",
            ]
        );
        for entry in &ledger {
            assert!(blobs.get(entry.record.blob_ref).await.unwrap().is_some());
        }
        assert_eq!(blobs.inner.len(), 4);
    }

    #[tokio::test]
    async fn runs_below_the_retention_window_delete_nothing() {
        let (job, data, blobs) = setup(BackupConfig::default());

        for expected in 1..=4 {
            job.run().await.unwrap();
            assert_eq!(list_snapshots(&*data).await.unwrap().len(), expected);
            assert_eq!(blobs.inner.len(), expected);
        }
    }

    #[tokio::test]
    async fn retention_ignores_other_ledger_record_types() {
        let (job, data, _blobs) = setup(BackupConfig::with_max_backups(1).unwrap());
        let manual = data
            .inner
            .insert_row(LEDGER_TABLE, doc(json!({ "type": "manual_export" })))
            .await
            .unwrap();

        job.run().await.unwrap();
        job.run().await.unwrap();

        assert_eq!(list_snapshots(&*data).await.unwrap().len(), 1);
        let manual_rows = data
            .inner
            .query_by_index(LEDGER_TABLE, "by_type", &IndexPredicate::eq("manual_export"))
            .await
            .unwrap();
        assert_eq!(manual_rows[0].id, manual);
    }

    #[tokio::test]
    async fn configured_table_subset_is_all_that_is_exported() {
        let config =
            BackupConfig::new(vec![CriticalTable::Profiles, CriticalTable::Users], 2).unwrap();
        let (job, data, blobs) = setup(config);
        seed_scenario(&data).await;

        let summary = job.run().await.unwrap();
        assert_eq!(summary.tables_exported, 2);
        assert_eq!(summary.total_records, 5);

        let ledger = list_snapshots(&*data).await.unwrap();
        let snapshot = load_snapshot(&*blobs, &ledger[0].record).await.unwrap();
        assert_eq!(
            snapshot.table_names(),
            vec![CriticalTable::Profiles, CriticalTable::Users]
        );

        for _ in 0..3 {
            job.run().await.unwrap();
        }
        assert_eq!(list_snapshots(&*data).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn read_failure_writes_nothing() {
        let (job, data, blobs) = setup(BackupConfig::default());
        seed_scenario(&data).await;
        data.fail_read.store(true, Ordering::SeqCst);

        let err = job.run().await.unwrap_err();
        assert!(matches!(
            err,
            BackupError::Read {
                table: CriticalTable::Subscriptions,
                ..
            }
        ));
        assert!(blobs.inner.is_empty());
        assert_eq!(data.inner.row_count(LEDGER_TABLE), 0);
    }

    #[tokio::test]
    async fn rows_outside_their_schema_are_exported_as_stored() {
        let (job, data, blobs) = setup(BackupConfig::default());
        let tier = doc(json!({ "userId": "u1", "tier": "gold", "points": 12.5 }));
        let tier_id = data
            .inner
            .insert_row("governance_tiers", tier.clone())
            .await
            .unwrap();
        seed_scenario(&data).await;

        let summary = job.run().await.unwrap();
        assert_eq!(summary.total_records, 6);

        let ledger = list_snapshots(&*data).await.unwrap();
        let snapshot = load_snapshot(&*blobs, &ledger[0].record).await.unwrap();
        let exported = &snapshot.rows(CriticalTable::GovernanceTiers).unwrap()[0];
        assert_eq!(exported.get(StoredRow::ID_FIELD), Some(&json!(tier_id.to_string())));
        for (key, value) in &tier {
            assert_eq!(exported.get(key), Some(value), "field {key}");
        }
    }

    #[tokio::test]
    async fn unknown_subscription_status_does_not_block_the_backup() {
        let (job, data, blobs) = setup(BackupConfig::default());
        data.inner
            .insert_row(
                "subscriptions",
                doc(json!({ "userId": "u1", "plan": "pro", "status": "paused" })),
            )
            .await
            .unwrap();

        let summary = job.run().await.unwrap();
        assert_eq!(summary.total_records, 1);

        let ledger = list_snapshots(&*data).await.unwrap();
        assert_eq!(ledger.len(), 1);
        let snapshot = load_snapshot(&*blobs, &ledger[0].record).await.unwrap();
        let exported = &snapshot.rows(CriticalTable::Subscriptions).unwrap()[0];
        assert_eq!(exported.get("status"), Some(&json!("paused")));
    }

    #[tokio::test]
    async fn blob_write_failure_records_and_prunes_nothing() {
        let (job, data, blobs) = setup(BackupConfig::with_max_backups(1).unwrap());
        job.run().await.unwrap();
        let before = list_snapshots(&*data).await.unwrap();

        blobs.fail_store.store(true, Ordering::SeqCst);
        let err = job.run().await.unwrap_err();

        assert!(matches!(err, BackupError::BlobWrite(_)));
        assert_eq!(list_snapshots(&*data).await.unwrap(), before);
        assert_eq!(blobs.inner.len(), 1);
    }

    #[tokio::test]
    async fn ledger_write_failure_leaks_a_blob_the_sweep_removes() {
        let (job, data, blobs) = setup(BackupConfig::default());
        job.run().await.unwrap();

        data.fail_insert.store(true, Ordering::SeqCst);
        let err = job.run().await.unwrap_err();
        let leaked = match err {
            BackupError::LedgerWrite { blob_ref, .. } => blob_ref,
            other => panic!("unexpected error: {other:?}"),
        };
        assert!(blobs.inner.contains(leaked));
        assert_eq!(list_snapshots(&*data).await.unwrap().len(), 1);

        data.fail_insert.store(false, Ordering::SeqCst);
        let report = job.sweep_orphans().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.referenced, 1);
        assert_eq!(report.deleted, 1);
        assert!(!blobs.inner.contains(leaked));

        let kept = list_snapshots(&*data).await.unwrap();
        assert!(blobs.inner.contains(kept[0].record.blob_ref));
    }

    #[tokio::test]
    async fn sweep_keeps_blobs_owned_by_other_ledger_record_types() {
        let (job, data, blobs) = setup(BackupConfig::default());
        let manual_blob = blobs.store(b"{\"users\":[]}".to_vec()).await.unwrap();
        data.inner
            .insert_row(
                LEDGER_TABLE,
                doc(json!({ "type": "manual_export", "blobRef": manual_blob.to_string() })),
            )
            .await
            .unwrap();
        job.run().await.unwrap();

        let report = job.sweep_orphans().await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.referenced, 2);
        assert_eq!(report.deleted, 0);
        assert!(blobs.inner.contains(manual_blob));
    }

    #[tokio::test]
    async fn prune_failure_keeps_new_snapshot_and_heals_next_run() {
        let (job, data, blobs) = setup(BackupConfig::with_max_backups(2).unwrap());
        job.run().await.unwrap();
        job.run().await.unwrap();

        blobs.fail_delete.store(true, Ordering::SeqCst);
        let err = job.run().await.unwrap_err();
        let created = match err {
            BackupError::Prune {
                created,
                source: LedgerError::BlobDelete { .. },
            } => created,
            other => panic!("unexpected error: {other:?}"),
        };

        let ledger = list_snapshots(&*data).await.unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger[0].id, created);

        blobs.fail_delete.store(false, Ordering::SeqCst);
        job.run().await.unwrap();

        let ledger = list_snapshots(&*data).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(blobs.inner.len(), 2);
    }

    #[tokio::test]
    async fn prune_tolerates_a_blob_that_is_already_gone() {
        let (job, data, blobs) = setup(BackupConfig::with_max_backups(1).unwrap());
        job.run().await.unwrap();
        let first = list_snapshots(&*data).await.unwrap().remove(0);
        blobs.inner.delete(first.record.blob_ref).await.unwrap();

        job.run().await.unwrap();

        let ledger = list_snapshots(&*data).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_ne!(ledger[0].id, first.id);
    }

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after any number of runs the ledger holds the newest
        /// min(runs, max_backups) snapshots, each with a live blob.
        #[test]
        fn ledger_never_exceeds_retention_window(runs in 1usize..10, max_backups in 1usize..6) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();

            rt.block_on(async {
                let (job, data, blobs) = setup(BackupConfig::with_max_backups(max_backups).unwrap());
                let mut created = Vec::new();
                for _ in 0..runs {
                    job.run().await.unwrap();
                    created.push(list_snapshots(&*data).await.unwrap()[0].id);
                }

                let ledger = list_snapshots(&*data).await.unwrap();
                let expected: Vec<_> = created.iter().rev().take(max_backups).copied().collect();
                assert_eq!(ledger.iter().map(|e| e.id).collect::<Vec<_>>(), expected);
                assert_eq!(blobs.inner.len(), ledger.len());
                for entry in &ledger {
                    assert!(blobs.inner.contains(entry.record.blob_ref));
                }
            });
        }
    }
}
