//! Tests for engine module.

#[cfg(test)]
mod tests {
    use super::super::engine::*;
    use crate::attendance::{AttendanceStatus, LectureDetail, NewAttendance, Student};
    use crate::error::CoreError;
    use crate::storage::kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
    use crate::sync::connectivity::ManualConnectivity;
    use crate::sync::coordinator::SyncSettings;
    use crate::testing::{FakeApi, FlakyStore};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        engine: AttendanceEngine,
        api: Arc<FakeApi>,
        network: Arc<ManualConnectivity>,
    }

    async fn harness_with(
        kv: Arc<dyn KeyValueStore>,
        online: bool,
        settings: SyncSettings,
    ) -> Harness {
        let api = Arc::new(FakeApi::new());
        let network = Arc::new(ManualConnectivity::new(online));
        let engine = AttendanceEngine::open(kv, api.clone(), network.clone(), settings).await;
        Harness {
            engine,
            api,
            network,
        }
    }

    async fn harness_on(kv: Arc<dyn KeyValueStore>, online: bool) -> Harness {
        harness_with(kv, online, SyncSettings::default()).await
    }

    async fn harness(online: bool) -> Harness {
        harness_on(Arc::new(MemoryKeyValueStore::new()), online).await
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn mark(lecture: &str, student: &str, status: AttendanceStatus) -> NewAttendance {
        NewAttendance::new(lecture, "C1", student, status)
    }

    fn lecture(id: &str) -> LectureDetail {
        LectureDetail {
            id: id.to_string(),
            course_id: "C1".to_string(),
            course_name: "Operating Systems".to_string(),
            date: "2026-10-12".to_string(),
            start_time: "14:00".to_string(),
            end_time: "15:30".to_string(),
            room: None,
            students: vec![],
        }
    }

    #[tokio::test]
    async fn offline_correction_then_reconnect_delivers_once() {
        let h = harness(false).await;
        let monitor = h.engine.start_network_monitoring();

        h.engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Absent))
            .await
            .unwrap();
        h.engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Present))
            .await
            .unwrap();

        assert_eq!(h.engine.pending_records_count(), 1);
        let pending = h.engine.pending_records().await;
        assert_eq!(pending[0].status, AttendanceStatus::Present);
        assert!(h.api.calls().is_empty());

        h.network.set_online(true);
        wait_until(|| h.engine.pending_records_count() == 0).await;
        h.engine.shutdown().await;

        let calls = h.api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].lecture_id, "L1");
        assert_eq!(calls[0].records.len(), 1);
        assert_eq!(calls[0].records[0].student_id, "S1");
        assert_eq!(calls[0].records[0].status, AttendanceStatus::Present);
        monitor.stop();
    }

    #[tokio::test]
    async fn offline_writes_never_touch_network() {
        let h = harness(false).await;
        let monitor = h.engine.start_network_monitoring();

        for student in ["S1", "S2", "S3", "S2"] {
            h.engine
                .add_attendance_record(mark("L1", student, AttendanceStatus::Present))
                .await
                .unwrap();
        }
        h.engine
            .add_attendance_record(mark("L2", "S1", AttendanceStatus::Late))
            .await
            .unwrap();

        assert_eq!(h.engine.pending_records_count(), 4);
        let report = h.engine.sync_pending_records().await;
        assert!(report.is_empty());
        assert!(h.api.calls().is_empty());
        monitor.stop();
    }

    #[tokio::test]
    async fn queued_records_are_delivered_after_restart() {
        let temp_dir = TempDir::new().unwrap();
        {
            let kv = Arc::new(FileKeyValueStore::open(temp_dir.path()).unwrap());
            let h = harness_on(kv, false).await;
            h.engine
                .add_attendance_record(mark("L1", "S1", AttendanceStatus::Excused))
                .await
                .unwrap();
        }

        let kv = Arc::new(FileKeyValueStore::open(temp_dir.path()).unwrap());
        let h = harness_on(kv, true).await;
        assert_eq!(h.engine.pending_records_count(), 1);

        let monitor = h.engine.start_network_monitoring();
        wait_until(|| h.engine.pending_records_count() == 0).await;
        h.engine.shutdown().await;

        assert_eq!(h.api.calls().len(), 1);
        assert!(h.engine.status().await.last_sync_at.is_some());
        monitor.stop();
    }

    #[tokio::test]
    async fn online_write_triggers_background_sync() {
        let h = harness(true).await;
        let monitor = h.engine.start_network_monitoring();
        wait_until(|| h.engine.is_online()).await;

        h.engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Late))
            .await
            .unwrap();
        wait_until(|| h.engine.pending_records_count() == 0).await;
        h.engine.shutdown().await;

        assert_eq!(h.api.calls().len(), 1);
        let records = h.engine.records().await;
        assert!(records[0].synced);
        monitor.stop();
    }

    #[tokio::test]
    async fn manual_sync_during_background_run_is_a_noop() {
        let h = harness(false).await;
        let monitor = h.engine.start_network_monitoring();
        h.engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Present))
            .await
            .unwrap();

        h.api.hold();
        h.network.set_online(true);
        h.api.wait_entered().await;

        let status = h.engine.status().await;
        assert!(status.in_progress);
        let report = h.engine.sync_pending_records().await;
        assert!(report.is_empty());

        h.api.release_all();
        h.engine.shutdown().await;
        assert_eq!(h.api.calls().len(), 1);
        assert_eq!(h.engine.pending_records_count(), 0);
        monitor.stop();
    }

    #[tokio::test]
    async fn failed_lecture_does_not_block_others() {
        let h = harness(false).await;
        let monitor = h.engine.start_network_monitoring();
        h.api.fail_lecture("L2", "lecture is closed");
        for lecture in ["L1", "L2", "L3"] {
            h.engine
                .add_attendance_record(mark(lecture, "S1", AttendanceStatus::Present))
                .await
                .unwrap();
        }
        h.network.set_online(true);
        wait_until(|| h.engine.pending_records_count() == 1).await;
        h.engine.shutdown().await;

        let pending = h.engine.pending_records().await;
        assert_eq!(pending[0].lecture_id, "L2");
        assert_eq!(pending[0].sync_error.as_deref(), Some("Server rejected batch (422): lecture is closed"));

        let status = h.engine.status().await;
        assert!(status.is_online);
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.errors.len(), 1);
        assert_eq!(status.errors[0].lecture_id, "L2");
        monitor.stop();
    }

    #[tokio::test]
    async fn storage_failure_is_returned_and_nothing_recorded() {
        let kv = Arc::new(FlakyStore::new());
        let h = harness_on(kv.clone(), false).await;
        kv.fail_writes(true);

        let err = h
            .engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Present))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(h.engine.pending_records_count(), 0);
        assert!(h.engine.records().await.is_empty());
        assert!(h.engine.persist().await.is_err());
    }

    #[tokio::test]
    async fn blank_ids_are_rejected() {
        let h = harness(false).await;
        let err = h
            .engine
            .add_attendance_record(mark("L1", " ", AttendanceStatus::Present))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(h.engine.cache_lecture(lecture("")).await.is_err());
        assert!(h.engine.cache_students("", vec![]).await.is_err());
        assert_eq!(h.engine.pending_records_count(), 0);
    }

    #[tokio::test]
    async fn restore_discards_unpersisted_cache_entries() {
        let kv = Arc::new(FlakyStore::new());
        let h = harness_on(kv.clone(), false).await;
        h.engine.cache_lecture(lecture("L1")).await.unwrap();

        kv.fail_writes(true);
        assert!(h.engine.cache_lecture(lecture("L2")).await.is_err());
        assert!(h.engine.cached_lecture("L2").await.is_some());

        h.engine.restore().await;
        assert!(h.engine.cached_lecture("L1").await.is_some());
        assert!(h.engine.cached_lecture("L2").await.is_none());
    }

    #[tokio::test]
    async fn cache_reads_work_offline() {
        let h = harness(false).await;
        h.engine.cache_lecture(lecture("L1")).await.unwrap();
        h.engine
            .cache_students(
                "C1",
                vec![Student {
                    id: "u1".to_string(),
                    student_id: "S1".to_string(),
                    full_name: "Ada Lovelace".to_string(),
                    email: Some("ada@uni.example".to_string()),
                    qr_code: None,
                }],
            )
            .await
            .unwrap();

        let snapshot = h.engine.cached_lecture("L1").await.unwrap();
        assert_eq!(snapshot.lecture.course_name, "Operating Systems");
        assert_eq!(h.engine.cached_lectures().await.len(), 1);
        assert_eq!(h.engine.cached_students("C1").await.unwrap()[0].full_name, "Ada Lovelace");
        assert!(h.engine.cached_students("C2").await.is_none());
    }

    #[tokio::test]
    async fn clear_all_data_wipes_state_and_errors() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let h = harness_on(kv.clone(), false).await;
        let monitor = h.engine.start_network_monitoring();
        h.api.fail_lecture("L1", "down");
        h.engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Absent))
            .await
            .unwrap();
        h.engine.cache_lecture(lecture("L1")).await.unwrap();
        h.network.set_online(true);
        wait_until(|| h.api.calls().len() == 1).await;
        h.engine.shutdown().await;
        assert_eq!(h.engine.status().await.errors.len(), 1);

        h.engine.clear_all_data().await.unwrap();
        let status = h.engine.status().await;
        assert_eq!(status.pending_count, 0);
        assert!(status.errors.is_empty());
        assert!(status.last_sync_at.is_none());
        assert!(h.engine.cached_lectures().await.is_empty());
        assert!(kv.is_empty());
        monitor.stop();
    }

    #[tokio::test]
    async fn probe_then_manual_sync_reports_counts() {
        let h = harness(true).await;
        h.api.fail_lecture("L2", "closed");
        for lecture in ["L1", "L1", "L2"] {
            h.engine
                .add_attendance_record(mark(lecture, "S1", AttendanceStatus::Present))
                .await
                .unwrap();
        }
        assert!(!h.engine.is_online());

        assert!(h.engine.probe_connectivity().await);
        let report = h.engine.sync_pending_records().await;
        h.engine.shutdown().await;

        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(h.api.calls().len(), 2);
    }

    #[tokio::test]
    async fn monitor_outlives_engine_safely() {
        let h = harness(false).await;
        let monitor = h.engine.start_network_monitoring();
        let network = h.network.clone();
        drop(h);

        network.set_online(true);
        tokio::task::yield_now().await;
        monitor.stop();
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn automatic_sync_backs_off_after_failure() {
        let h = harness(false).await;
        let monitor = h.engine.start_network_monitoring();
        h.api.fail_lecture("L1", "unavailable");
        h.engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Present))
            .await
            .unwrap();

        h.network.set_online(true);
        wait_until(|| h.api.calls().len() == 1).await;
        h.engine.shutdown().await;

        // The next automatic run waits for the 2 s base delay.
        h.engine
            .add_attendance_record(mark("L1", "S2", AttendanceStatus::Present))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.api.calls().len(), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.api.calls().len(), 2);
        h.engine.shutdown().await;

        // Manual sync ignores the backoff.
        h.api.heal_lecture("L1");
        let report = h.engine.sync_pending_records().await;
        assert_eq!(report.success_count, 2);
        assert_eq!(h.api.calls().len(), 3);
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_sync_waiting_on_backoff() {
        let settings = SyncSettings {
            backoff_base: Duration::from_secs(3),
            ..SyncSettings::default()
        };
        let h = harness_with(Arc::new(MemoryKeyValueStore::new()), false, settings).await;
        let monitor = h.engine.start_network_monitoring();
        h.api.fail_lecture("L1", "unavailable");
        h.engine
            .add_attendance_record(mark("L1", "S1", AttendanceStatus::Present))
            .await
            .unwrap();
        h.network.set_online(true);
        wait_until(|| h.api.calls().len() == 1).await;
        h.engine.shutdown().await;

        // This write schedules a run 3 s out; shutdown must not wait for it.
        h.engine
            .add_attendance_record(mark("L1", "S2", AttendanceStatus::Present))
            .await
            .unwrap();
        let started = tokio::time::Instant::now();
        h.engine.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.api.calls().len(), 1);

        // Later writes schedule automatic runs again.
        h.engine
            .add_attendance_record(mark("L1", "S3", AttendanceStatus::Present))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.api.calls().len(), 2);
        assert_eq!(h.api.calls()[1].records.len(), 3);
        h.engine.shutdown().await;
        monitor.stop();
    }

    #[derive(Debug, Clone)]
    struct Write {
        lecture: u8,
        student: u8,
        status: AttendanceStatus,
    }

    fn write_strategy() -> impl Strategy<Value = Write> {
        (
            0u8..3,
            0u8..4,
            prop_oneof![
                Just(AttendanceStatus::Present),
                Just(AttendanceStatus::Absent),
                Just(AttendanceStatus::Late),
                Just(AttendanceStatus::Excused),
            ],
        )
            .prop_map(|(lecture, student, status)| Write {
                lecture,
                student,
                status,
            })
    }

    proptest! {
        #[test]
        fn at_most_one_unsynced_record_per_pair(writes in prop::collection::vec(write_strategy(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (records, pending) = rt.block_on(async {
                let h = harness(false).await;
                for w in &writes {
                    h.engine
                        .add_attendance_record(mark(
                            &format!("L{}", w.lecture),
                            &format!("S{}", w.student),
                            w.status,
                        ))
                        .await
                        .unwrap();
                }
                (h.engine.pending_records().await, h.engine.pending_records_count())
            });

            let mut last: HashMap<(String, String), AttendanceStatus> = HashMap::new();
            for w in &writes {
                last.insert((format!("L{}", w.lecture), format!("S{}", w.student)), w.status);
            }

            prop_assert_eq!(records.len(), last.len());
            prop_assert_eq!(pending, last.len());
            for record in &records {
                let key = (record.lecture_id.clone(), record.student_id.clone());
                prop_assert_eq!(last.get(&key), Some(&record.status));
            }
        }
    }
}
