//! Whole-job tests over in-memory (and file-backed) collaborators.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use geobatch_core::{CellRange, RegionCode};
    use geobatch_geocode::{
        InMemoryGeocoder, LookupError, LookupMatch, LookupRequest, LookupResponse, Position,
    };
    use geobatch_grid::{CsvGrid, Grid, GridError, InMemoryGrid};

    use crate::checkpoint::{
        CheckpointStore, DatasetRef, FileKeyValueStore, InMemoryKeyValueStore, JobMode, JobState,
        KeyValueStore, StoreError,
    };
    use crate::config::EngineConfig;
    use crate::controller::{JobController, ResumeOutcome};
    use crate::error::EngineError;
    use crate::pacing::{RecordingPacer, RowPacing};
    use crate::runner::{SliceCounts, SliceNext, SliceReport};
    use crate::scheduler::{InMemoryScheduler, PersistentScheduler, SchedulerEvent};

    const SHEET: &str = "Addresses";

    /// Grid wrapper that fails reads of one sheet row while armed.
    struct FlakyGrid {
        inner: Arc<InMemoryGrid>,
        fail_row: AtomicU32,
    }

    impl FlakyGrid {
        fn new(inner: Arc<InMemoryGrid>) -> Self {
            Self {
                inner,
                fail_row: AtomicU32::new(0),
            }
        }

        fn fail_reads_of(&self, sheet_row: u32) {
            self.fail_row.store(sheet_row, Ordering::SeqCst);
        }

        fn heal(&self) {
            self.fail_row.store(0, Ordering::SeqCst);
        }
    }

    impl Grid for FlakyGrid {
        fn resolve(&self, sheet: &str, range: &CellRange) -> Result<(), GridError> {
            self.inner.resolve(sheet, range)
        }

        fn read(&self, sheet: &str, row: u32, column: u32) -> Result<String, GridError> {
            if row == self.fail_row.load(Ordering::SeqCst) {
                return Err(GridError::Storage("host reclaimed the invocation".to_string()));
            }
            self.inner.read(sheet, row, column)
        }

        fn write(&self, sheet: &str, row: u32, column: u32, value: &str) -> Result<(), GridError> {
            self.inner.write(sheet, row, column, value)
        }

        fn flush(&self, sheet: &str) -> Result<(), GridError> {
            self.inner.flush(sheet)
        }
    }

    const JOB_STATE: &str = "geobatch.job_state";

    /// Key-value store that fails the next read or delete of the job state.
    struct FlakyKv {
        inner: Arc<InMemoryKeyValueStore>,
        failing_reads: AtomicU32,
        failing_deletes: AtomicU32,
    }

    impl FlakyKv {
        fn new() -> Self {
            Self {
                inner: InMemoryKeyValueStore::arc(),
                failing_reads: AtomicU32::new(0),
                failing_deletes: AtomicU32::new(0),
            }
        }

        fn fail_next_read(&self) {
            self.failing_reads.store(1, Ordering::SeqCst);
        }

        fn fail_next_delete(&self) {
            self.failing_deletes.store(1, Ordering::SeqCst);
        }
    }

    fn trip(pending: &AtomicU32) -> bool {
        pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    impl KeyValueStore for FlakyKv {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if key == JOB_STATE && trip(&self.failing_reads) {
                return Err(StoreError::Storage("disk hiccup".to_string()));
            }
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.put(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), StoreError> {
            if key == JOB_STATE && trip(&self.failing_deletes) {
                return Err(StoreError::Storage("disk hiccup".to_string()));
            }
            self.inner.delete(key)
        }
    }

    struct Harness {
        grid: Arc<InMemoryGrid>,
        flaky: Arc<FlakyGrid>,
        geocoder: Arc<InMemoryGeocoder>,
        kv: Arc<InMemoryKeyValueStore>,
        scheduler: Arc<InMemoryScheduler>,
        pacer: Arc<RecordingPacer>,
        controller: JobController,
    }

    fn config(batch_size: u32) -> EngineConfig {
        EngineConfig {
            batch_size,
            row_pacing: RowPacing::fixed(Duration::from_millis(500)),
            ..EngineConfig::default()
        }
    }

    /// `rows` addresses `addr 1..=rows` in column B starting at sheet row 2.
    fn address_grid(rows: u32) -> InMemoryGrid {
        let grid = InMemoryGrid::new().with_sheet(SHEET);
        for r in 1..=rows {
            grid.set(SHEET, r + 1, 2, &format!("addr {r}"));
        }
        grid
    }

    fn harness(grid: InMemoryGrid, geocoder: InMemoryGeocoder, batch_size: u32) -> Harness {
        let grid = Arc::new(grid);
        let flaky = Arc::new(FlakyGrid::new(grid.clone()));
        let geocoder = Arc::new(geocoder);
        let kv = InMemoryKeyValueStore::arc();
        let scheduler = InMemoryScheduler::arc();
        let pacer = Arc::new(RecordingPacer::new());

        let controller = JobController::new(
            config(batch_size),
            kv.clone(),
            scheduler.clone(),
            flaky.clone(),
            geocoder.clone(),
        )
        .with_pacer(pacer.clone());

        Harness {
            grid,
            flaky,
            geocoder,
            kv,
            scheduler,
            pacer,
            controller,
        }
    }

    fn always_found() -> InMemoryGeocoder {
        InMemoryGeocoder::new().with_default(Ok(LookupResponse::Found(LookupMatch::Position(
            Position::new(10.5, 20.25),
        ))))
    }

    fn dataset(rows: u32) -> DatasetRef {
        DatasetRef::new(SHEET, CellRange::new(2, 2, rows, 3).unwrap())
    }

    fn queries(h: &Harness) -> Vec<String> {
        h.geocoder
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                LookupRequest::Geocode { query, .. } => Some(query),
                LookupRequest::Reverse { .. } => None,
            })
            .collect()
    }

    /// Fire continuations until the job completes; returns every slice report.
    fn run_to_completion(h: &Harness, first: SliceReport) -> Vec<SliceReport> {
        let mut reports = vec![first];
        while !reports.last().is_some_and(SliceReport::is_completed) {
            assert!(h.scheduler.fire().is_some(), "unfinished job must have a continuation");
            match h.controller.resume().unwrap() {
                ResumeOutcome::Ran(report) => reports.push(report),
                other => panic!("unexpected resume outcome {other:?}"),
            }
        }
        reports
    }

    #[test]
    fn hundred_twenty_rows_in_batches_of_fifty_take_three_slices() {
        let h = harness(address_grid(120), always_found(), 50);

        let first = h
            .controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        let reports = run_to_completion(&h, first);

        let ranges: Vec<_> = reports.iter().map(|r| r.rows).collect();
        assert_eq!(ranges, vec![Some((1, 50)), Some((51, 100)), Some((101, 120))]);

        match reports[2].next {
            SliceNext::Completed(summary) => {
                assert_eq!(summary.processed, 120);
                assert_eq!(summary.errors, 0);
            }
            other => panic!("expected completion, got {other:?}"),
        }

        assert_eq!(h.geocoder.calls(), 120);
        assert_eq!(h.controller.status().unwrap(), JobState::idle());
        assert!(!h.scheduler.is_armed());
        // Every row got both coordinates: sheet rows 2..=121, columns C and D.
        for sheet_row in 2..=121 {
            assert_eq!(h.grid.get(SHEET, sheet_row, 3).as_deref(), Some("10.5"));
            assert_eq!(h.grid.get(SHEET, sheet_row, 4).as_deref(), Some("20.25"));
        }
        // Status cell: first column B (2) + 3 + 4 = column I.
        let status = h.grid.get(SHEET, 1, 9).unwrap_or_default();
        assert!(status.starts_with("Geocoding complete: 120 rows processed in "), "{status}");
        assert!(status.ends_with(", 0 errors"), "{status}");
    }

    #[test]
    fn progress_is_reported_between_slices() {
        let h = harness(address_grid(120), always_found(), 50);
        let report = h
            .controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();

        assert_eq!(
            report.next,
            SliceNext::Continue {
                next_row: 51,
                after: Duration::from_secs(60)
            }
        );
        assert_eq!(
            h.grid.get(SHEET, 1, 9).as_deref(),
            Some("Geocoding in progress: 50/120 rows processed, 0 errors")
        );
        let saved = h.controller.status().unwrap();
        assert_eq!(saved.current_row, 51);
        assert_eq!(saved.processed_count, 50);
        assert_eq!(h.scheduler.pending().len(), 1);
    }

    #[test]
    fn interrupted_slice_resumes_from_last_checkpoint() {
        let h = harness(address_grid(120), always_found(), 50);
        h.controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        h.scheduler.fire();

        // Region row 70 lives on sheet row 71.
        h.flaky.fail_reads_of(71);
        let err = h.controller.resume().unwrap_err();
        assert!(matches!(err, EngineError::Grid(_)));

        // Checkpoint untouched, continuation re-armed.
        let saved = h.controller.status().unwrap();
        assert_eq!(saved.current_row, 51);
        assert_eq!(saved.processed_count, 50);
        assert!(h.scheduler.is_armed());

        let calls_before = h.geocoder.calls();
        h.flaky.heal();
        h.scheduler.fire();
        let report = match h.controller.resume().unwrap() {
            ResumeOutcome::Ran(report) => report,
            other => panic!("unexpected resume outcome {other:?}"),
        };
        assert_eq!(report.rows, Some((51, 100)));

        // The redo starts at row 51 and never touches rows 1..=50 again.
        let redo = &queries(&h)[calls_before..];
        assert_eq!(redo.first().map(String::as_str), Some("addr 51"));
        assert!(redo.iter().all(|q| q != "addr 50"));
        assert_eq!(h.controller.status().unwrap().processed_count, 100);
    }

    #[test]
    fn permanently_rate_limited_row_does_not_stall_the_slice() {
        let geocoder =
            always_found().with_script("addr 2", vec![Ok(LookupResponse::RateLimited)]);
        let h = harness(address_grid(3), geocoder, 50);

        let report = h
            .controller
            .start(JobMode::AddressToPosition, dataset(3))
            .unwrap();

        assert!(report.is_completed());
        assert_eq!(report.counts.service_errors, 1);
        assert_eq!(report.counts.succeeded, 2);
        assert_eq!(
            h.grid.get(SHEET, 3, 3).as_deref(),
            Some("Error: service rejected (OVER_QUERY_LIMIT)")
        );
        // 1 + 3 cooldown calls for the limited row.
        assert_eq!(h.geocoder.calls(), 2 + 4);
        let cooldowns = h
            .pacer
            .pauses()
            .into_iter()
            .filter(|p| *p == Duration::from_secs(5))
            .count();
        assert_eq!(cooldowns, 3);
    }

    #[test]
    fn example_address_gets_coordinates_and_empty_rows_are_skipped() {
        let grid = InMemoryGrid::new().with_rows(
            SHEET,
            2,
            2,
            &[
                &["1600 Amphitheatre Parkway, Mountain View, CA", "", ""],
                &["", "", ""],
            ],
        );
        let geocoder = InMemoryGeocoder::new().with_position(
            "1600 Amphitheatre Parkway, Mountain View, CA",
            37.4224764,
            -122.0842499,
        );
        let h = harness(grid, geocoder, 50);

        let report = h
            .controller
            .start(JobMode::AddressToPosition, dataset(2))
            .unwrap();

        assert_eq!(h.grid.get(SHEET, 2, 3).as_deref(), Some("37.4224764"));
        assert_eq!(h.grid.get(SHEET, 2, 4).as_deref(), Some("-122.0842499"));
        assert_eq!(h.grid.get(SHEET, 3, 3).as_deref(), Some(""));
        assert_eq!(h.grid.get(SHEET, 3, 4).as_deref(), Some(""));
        assert_eq!(report.counts.skipped, 1);
        match report.next {
            SliceNext::Completed(summary) => {
                assert_eq!(summary.processed, 2);
                assert_eq!(summary.errors, 0);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(h.geocoder.calls(), 1);
    }

    #[test]
    fn reverse_job_writes_addresses() {
        let grid = InMemoryGrid::new().with_rows(
            SHEET,
            2,
            2,
            &[&["", "48.8584", "2.2945"], &["", "0", "0"]],
        );
        let geocoder = InMemoryGeocoder::new().with_address(
            Position::new(48.8584, 2.2945),
            "Champ de Mars, 5 Av. Anatole France, 75007 Paris, France",
        );
        let h = harness(grid, geocoder, 50);

        let report = h
            .controller
            .start(JobMode::PositionToAddress, dataset(2))
            .unwrap();

        assert!(report.is_completed());
        assert_eq!(
            h.grid.get(SHEET, 2, 2).as_deref(),
            Some("Champ de Mars, 5 Av. Anatole France, 75007 Paris, France")
        );
        assert_eq!(
            h.grid.get(SHEET, 3, 2).as_deref(),
            Some("Error: service rejected (ZERO_RESULTS)")
        );
        let status = h.grid.get(SHEET, 1, 9).unwrap_or_default();
        assert!(status.starts_with("Reverse geocoding complete: 2 rows"), "{status}");
        assert!(status.ends_with(", 1 error"), "{status}");
    }

    #[test]
    fn reset_on_idle_is_a_no_op() {
        let h = harness(address_grid(3), always_found(), 50);
        h.controller.reset().unwrap();
        h.controller.reset().unwrap();

        assert_eq!(h.controller.status().unwrap(), JobState::idle());
        assert!(!h.scheduler.is_armed());
        assert!(
            h.scheduler
                .events()
                .iter()
                .all(|e| *e == SchedulerEvent::Disarmed)
        );
        assert_eq!(h.kv.writes(), 0);
    }

    #[test]
    fn reset_then_start_carries_no_residual_counters() {
        let h = harness(address_grid(120), always_found(), 50);
        h.controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        let old_job = h.controller.status().unwrap().job_id;
        h.controller.reset().unwrap();

        let report = h
            .controller
            .start(JobMode::AddressToPosition, dataset(80))
            .unwrap();

        assert_ne!(report.job_id, old_job);
        assert_eq!(report.state.total_rows, 80);
        assert_eq!(report.state.processed_count, 50);
        assert_eq!(report.state.error_count, 0);
        assert_eq!(h.scheduler.pending().len(), 1);
    }

    #[test]
    fn starting_over_an_active_job_replaces_it() {
        let h = harness(address_grid(120), always_found(), 50);
        h.controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        let report = h
            .controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();

        assert_eq!(report.state.processed_count, 50);
        assert_eq!(report.rows, Some((1, 50)));
        assert_eq!(h.scheduler.pending().len(), 1);
    }

    #[test]
    fn stray_resume_after_reset_does_nothing() {
        let h = harness(address_grid(120), always_found(), 50);
        h.controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        let calls = h.geocoder.calls();

        h.controller.reset().unwrap();
        assert!(!h.scheduler.is_armed());

        assert_eq!(h.controller.resume().unwrap(), ResumeOutcome::Idle);
        assert_eq!(h.geocoder.calls(), calls);
        assert_eq!(h.controller.status().unwrap(), JobState::idle());
    }

    #[test]
    fn orphaned_job_is_abandoned_and_cleared() {
        let h = harness(address_grid(120), always_found(), 50);
        let first = h
            .controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();

        h.grid.remove_sheet(SHEET);
        h.scheduler.fire();

        match h.controller.resume().unwrap() {
            ResumeOutcome::Abandoned { job_id, .. } => assert_eq!(job_id, first.job_id),
            other => panic!("expected abandonment, got {other:?}"),
        }
        assert_eq!(h.controller.status().unwrap(), JobState::idle());
        assert!(!h.scheduler.is_armed());
    }

    #[test]
    fn unreadable_state_is_abandoned() {
        let h = harness(address_grid(3), always_found(), 50);
        h.kv.put("geobatch.job_state", "{\"mode\": 7}").unwrap();

        assert!(matches!(
            h.controller.resume().unwrap(),
            ResumeOutcome::Abandoned { job_id: None, .. }
        ));
        assert_eq!(h.controller.status().unwrap(), JobState::idle());
    }

    #[test]
    fn bad_selections_never_create_state() {
        let h = harness(address_grid(3), always_found(), 50);

        let two_columns = DatasetRef::new(SHEET, "B2:C4".parse().unwrap());
        let missing_sheet = DatasetRef::new("Nope", "B2:D4".parse().unwrap());

        for (mode, selection) in [
            (JobMode::AddressToPosition, two_columns),
            (JobMode::AddressToPosition, missing_sheet),
            (JobMode::Idle, dataset(3)),
        ] {
            let err = h.controller.start(mode, selection).unwrap_err();
            assert!(matches!(err, EngineError::Configuration(_)), "{err}");
        }

        assert_eq!(h.kv.writes(), 0);
        assert!(h.scheduler.events().is_empty());
        assert_eq!(h.geocoder.calls(), 0);
    }

    #[test]
    fn stored_region_biases_every_lookup() {
        let h = harness(address_grid(2), always_found(), 50);
        assert_eq!(h.controller.region().unwrap(), RegionCode::default());

        assert_eq!(h.controller.set_region(" GB ").unwrap().as_str(), "gb");
        assert!(matches!(
            h.controller.set_region("gbr"),
            Err(EngineError::Configuration(_))
        ));

        h.controller
            .start(JobMode::AddressToPosition, dataset(2))
            .unwrap();
        assert!(h.geocoder.requests().iter().all(|r| matches!(
            r,
            LookupRequest::Geocode { region, .. } if region.as_str() == "gb"
        )));
    }

    #[test]
    fn unbounded_pass_makes_one_attempt_and_keeps_no_state() {
        let geocoder = always_found().with_script(
            "addr 2",
            vec![
                Err(LookupError::Timeout),
                Ok(LookupResponse::Found(LookupMatch::Position(Position::new(1.0, 1.0)))),
            ],
        );
        let h = harness(address_grid(3), geocoder, 50);

        let report = h
            .controller
            .run_unbounded(JobMode::AddressToPosition, &dataset(3))
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.errors, 1);
        assert_eq!(h.geocoder.calls(), 3);
        assert_eq!(
            h.grid.get(SHEET, 3, 3).as_deref(),
            Some("Error: unexpected fault (lookup timed out)")
        );
        assert_eq!(h.kv.writes(), 0);
        assert!(h.scheduler.events().is_empty());
        let status = h.grid.get(SHEET, 1, 9).unwrap_or_default();
        assert!(status.starts_with("Geocoding complete: 3 rows"), "{status}");
    }

    #[test]
    fn checkpoint_is_written_once_per_slice() {
        let h = harness(address_grid(120), always_found(), 50);
        let first = h
            .controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        run_to_completion(&h, first);

        // Initial record + one save per slice.
        assert_eq!(h.kv.writes(), 1 + 3);
    }

    #[test]
    fn file_store_csv_grid_and_persistent_scheduler_run_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("address,lat,lng\n");
        for r in 1..=5 {
            csv.push_str(&format!("addr {r},,\n"));
        }
        std::fs::write(dir.path().join("places.csv"), csv).unwrap();

        let kv: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::new(dir.path().join("state.json")));
        let scheduler = Arc::new(PersistentScheduler::new(kv.clone()));
        let build = || {
            JobController::new(
                config(2),
                kv.clone(),
                scheduler.clone(),
                Arc::new(CsvGrid::new(dir.path())),
                Arc::new(always_found()),
            )
            .with_pacer(Arc::new(RecordingPacer::new()))
        };

        let selection = DatasetRef::new("places.csv", "A2:C6".parse().unwrap());
        let report = build().start(JobMode::AddressToPosition, selection).unwrap();
        assert_eq!(report.rows, Some((1, 2)));

        // Each resume is a fresh process: new controller, same files.
        let mut slices = 1;
        let far_future = chrono::Utc::now() + chrono::Duration::days(1);
        while scheduler.take_due(far_future).unwrap().is_some() {
            match build().resume().unwrap() {
                ResumeOutcome::Ran(_) => slices += 1,
                other => panic!("unexpected resume outcome {other:?}"),
            }
        }
        assert_eq!(slices, 3);
        assert_eq!(CheckpointStore::new(kv.clone()).load().unwrap(), JobState::idle());
        assert_eq!(scheduler.pending().unwrap(), None);

        let written = std::fs::read_to_string(dir.path().join("places.csv")).unwrap();
        assert!(written.contains("addr 5,10.5,20.25"), "{written}");
    }

    #[test]
    fn mixed_outcomes_across_slices_add_up_to_total_rows() {
        let grid = address_grid(7);
        // Region row 4 has no address.
        grid.set(SHEET, 5, 2, "");
        let found = LookupResponse::Found(LookupMatch::Position(Position::new(1.5, 2.5)));
        let geocoder = always_found()
            .with_script("addr 2", vec![Ok(LookupResponse::rejected("ZERO_RESULTS"))])
            .with_script("addr 3", vec![Err(LookupError::Timeout)])
            .with_script("addr 5", vec![Ok(LookupResponse::RateLimited)])
            .with_script("addr 6", vec![Ok(LookupResponse::RateLimited), Ok(found)]);
        let h = harness(grid, geocoder, 3);

        let first = h
            .controller
            .start(JobMode::AddressToPosition, dataset(7))
            .unwrap();
        let reports = run_to_completion(&h, first);
        assert_eq!(reports.len(), 3);

        let mut totals = SliceCounts::default();
        for report in &reports {
            totals.succeeded += report.counts.succeeded;
            totals.service_errors += report.counts.service_errors;
            totals.transient_failures += report.counts.transient_failures;
            totals.skipped += report.counts.skipped;
        }
        assert_eq!(
            totals,
            SliceCounts {
                succeeded: 3,
                service_errors: 2,
                transient_failures: 1,
                skipped: 1,
            }
        );
        assert_eq!(totals.rows(), 7);

        // Counters carried in the checkpoint match the per-slice outcomes.
        assert_eq!(reports[0].state.error_count, 2);
        assert_eq!(reports[1].state.processed_count, 6);
        assert_eq!(reports[1].state.error_count, 3);

        match reports[2].next {
            SliceNext::Completed(summary) => {
                assert_eq!(summary.processed, totals.rows());
                assert_eq!(summary.errors, totals.errors());
            }
            other => panic!("expected completion, got {other:?}"),
        }

        assert_eq!(
            h.grid.get(SHEET, 4, 3).as_deref(),
            Some("Error: unexpected fault (lookup timed out)")
        );
        assert_eq!(h.grid.get(SHEET, 5, 3), None);
        assert_eq!(
            h.grid.get(SHEET, 6, 3).as_deref(),
            Some("Error: service rejected (OVER_QUERY_LIMIT)")
        );
        assert_eq!(h.grid.get(SHEET, 7, 3).as_deref(), Some("1.5"));
        let status = h.grid.get(SHEET, 1, 9).unwrap_or_default();
        assert!(status.ends_with(", 3 errors"), "{status}");
    }

    fn persistent_controller(
        kv: &Arc<FlakyKv>,
        grid: &Arc<InMemoryGrid>,
    ) -> (JobController, Arc<PersistentScheduler>) {
        let scheduler = Arc::new(PersistentScheduler::new(kv.clone()));
        let controller = JobController::new(
            config(50),
            kv.clone(),
            scheduler.clone(),
            grid.clone(),
            Arc::new(always_found()),
        )
        .with_pacer(Arc::new(RecordingPacer::new()));
        (controller, scheduler)
    }

    #[test]
    fn failed_state_read_on_resume_rearms_the_job() {
        let kv = Arc::new(FlakyKv::new());
        let grid = Arc::new(address_grid(120));
        let (controller, scheduler) = persistent_controller(&kv, &grid);
        let far_future = chrono::Utc::now() + chrono::Duration::days(1);

        controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        assert!(scheduler.take_due(far_future).unwrap().is_some());

        kv.fail_next_read();
        let err = controller.resume().unwrap_err();
        assert!(matches!(err, EngineError::Store(_)), "{err}");
        assert!(scheduler.pending().unwrap().is_some());

        assert!(scheduler.take_due(far_future).unwrap().is_some());
        match controller.resume().unwrap() {
            ResumeOutcome::Ran(report) => assert_eq!(report.rows, Some((51, 100))),
            other => panic!("unexpected resume outcome {other:?}"),
        }
    }

    #[test]
    fn failed_clear_while_abandoning_is_retried() {
        let kv = Arc::new(FlakyKv::new());
        let grid = Arc::new(address_grid(120));
        let (controller, scheduler) = persistent_controller(&kv, &grid);
        let far_future = chrono::Utc::now() + chrono::Duration::days(1);

        controller
            .start(JobMode::AddressToPosition, dataset(120))
            .unwrap();
        assert!(scheduler.take_due(far_future).unwrap().is_some());
        grid.remove_sheet(SHEET);

        kv.fail_next_delete();
        let err = controller.resume().unwrap_err();
        assert!(matches!(err, EngineError::Store(_)), "{err}");
        assert!(controller.status().unwrap().is_active());
        assert!(scheduler.pending().unwrap().is_some());

        assert!(scheduler.take_due(far_future).unwrap().is_some());
        assert!(matches!(
            controller.resume().unwrap(),
            ResumeOutcome::Abandoned { .. }
        ));
        assert_eq!(controller.status().unwrap(), JobState::idle());
        assert_eq!(scheduler.pending().unwrap(), None);
    }

    #[test]
    fn selection_without_room_for_the_status_cell_is_rejected() {
        let h = harness(address_grid(1), always_found(), 50);
        let edge = DatasetRef::new(SHEET, CellRange::new(1, u32::MAX - 2, 1, 3).unwrap());

        let err = h
            .controller
            .start(JobMode::AddressToPosition, edge)
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)), "{err}");
        assert_eq!(h.kv.writes(), 0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// Property: every job takes ceil(rows / batch) slices, covers each
            /// row exactly once, and never moves the cursor backwards.
            #[test]
            fn slices_partition_the_region(rows in 1u32..150, batch in 1u32..60) {
                let h = harness(address_grid(rows), always_found(), batch);
                let first = h.controller.start(JobMode::AddressToPosition, dataset(rows)).unwrap();
                let reports = run_to_completion(&h, first);

                prop_assert_eq!(reports.len() as u32, rows.div_ceil(batch));

                let mut expected_start = 1;
                for report in &reports {
                    let (start, end) = report.rows.unwrap();
                    prop_assert_eq!(start, expected_start);
                    prop_assert!(end >= start);
                    prop_assert!(end - start < batch);
                    expected_start = end + 1;
                }
                prop_assert_eq!(expected_start, rows + 1);

                match reports.last().map(|r| r.next) {
                    Some(SliceNext::Completed(summary)) => prop_assert_eq!(summary.processed, rows),
                    other => prop_assert!(false, "expected completion, got {:?}", other),
                }
                prop_assert_eq!(h.geocoder.calls() as u32, rows);
            }
        }
    }
}
