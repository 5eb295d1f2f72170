//! Integration tests for the similarity search.
//!
//! Uses forty sessions of synthetic 5-minute bars; the last session repeats an earlier
//! one, so that earlier session must come back first with a zero score.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use common::*;
use simsearch::prelude::*;

fn spec() -> SearchSpecBuilder {
    SearchSpec::builder().target_end(noon_of_last_session())
}

fn sequential() -> StrategyRunner {
    EngineBuilder::new().parallel(false).build().unwrap()
}

// ============================================================
// RANKING
// ============================================================

#[test]
fn test_repeated_session_ranks_first() {
    let series = repeating_series();
    let spec = spec().top_k(3).build().unwrap();
    let out = sequential().search(&series, &spec, None).unwrap();

    let days = trading_days(40);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].start, local(days[REPEATED_SESSION], 9, 30));
    assert_eq!(out[0].end, local(days[REPEATED_SESSION], 12, 0));
    assert_eq!(out[0].score, 0.0);
    assert!(out[1].score > 0.0);
    assert!(out.windows(2).all(|w| w[0].score <= w[1].score));
}

#[test]
fn test_candidates_share_target_time_of_day() {
    let series = repeating_series();
    let spec = spec().top_k(10).build().unwrap();
    let out = sequential().search(&series, &spec, None).unwrap();

    assert_eq!(out.len(), 10);
    for m in &out {
        let start = m.start.with_timezone(&DEFAULT_TZ);
        let end = m.end.with_timezone(&DEFAULT_TZ);
        assert_eq!(start.format("%H:%M").to_string(), "09:30");
        assert_eq!(end.format("%H:%M").to_string(), "12:00");
        assert_eq!(start.date_naive(), end.date_naive());
    }
}

#[test]
fn test_session_close_candidates() {
    let series = repeating_series();
    let spec = spec()
        .top_k(5)
        .candidate_end(CandidateEnd::SessionClose)
        .build()
        .unwrap();
    let out = sequential().search(&series, &spec, None).unwrap();

    assert_eq!(out.len(), 5);
    for m in &out {
        let end = m.end.with_timezone(&DEFAULT_TZ);
        assert_eq!(end.format("%H:%M").to_string(), "15:55");
    }
}

#[test]
fn test_multi_session_lookback_never_overlaps_target() {
    let series = repeating_series();
    let spec = spec().lookback_sessions(3).top_k(10).build().unwrap();
    let out = sequential().search(&series, &spec, None).unwrap();

    let days = trading_days(40);
    let target_start = local(days[37], 9, 30);
    assert_eq!(out.len(), 10);
    for m in &out {
        assert!(m.end < target_start);
        assert!(m.end - m.start > Duration::days(2));
    }
}

#[test]
fn test_search_range_bounds_candidates() {
    let series = repeating_series();
    let days = trading_days(40);
    let (lo, hi) = (local(days[20], 0, 0), local(days[30], 0, 0));
    let spec = spec().search_range(lo, hi).top_k(10).build().unwrap();
    let out = sequential().search(&series, &spec, None).unwrap();

    assert_eq!(out.len(), 10);
    assert!(out.iter().all(|m| m.start >= lo && m.end < hi));
}

#[test]
fn test_fewer_candidates_than_k() {
    let series = repeating_series();
    let days = trading_days(40);
    let spec = spec()
        .search_range(local(days[0], 0, 0), local(days[2], 0, 0))
        .top_k(10)
        .build()
        .unwrap();
    let out = sequential().search(&series, &spec, None).unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn test_empty_range_is_empty_result() {
    let series = repeating_series();
    let at = local(trading_days(40)[5], 0, 0);
    let spec = spec().search_range(at, at).build().unwrap();
    assert!(sequential().search(&series, &spec, None).unwrap().is_empty());
}

#[test]
fn test_deterministic_and_parallel_agrees() {
    let series = repeating_series();
    let spec = spec().lookback_sessions(2).top_k(7).build().unwrap();

    let seq = sequential();
    let par = EngineBuilder::new().parallel(true).build().unwrap();

    let first = seq.search(&series, &spec, None).unwrap();
    let second = seq.search(&series, &spec, None).unwrap();
    let parallel = par.search(&series, &spec, None).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, parallel);
}

#[test]
fn test_narrower_metric_changes_scores() {
    let series = repeating_series();
    let spec = spec().top_k(3).build().unwrap();
    let close_only = EngineBuilder::new()
        .metric(DtwMetric::with_channels([Channel::Close]).unwrap())
        .build()
        .unwrap();

    let out = close_only.search(&series, &spec, None).unwrap();
    assert_eq!(out[0].score, 0.0);
    assert_eq!(out.len(), 3);
}

// ============================================================
// ERRORS
// ============================================================

#[test]
fn test_insufficient_history_is_invalid_window() {
    let series = repeating_series();
    let first_day = trading_days(1)[0];
    let spec = SearchSpec::builder()
        .target_end(local(first_day, 11, 0))
        .lookback_sessions(2)
        .build()
        .unwrap();
    assert!(matches!(
        sequential().search(&series, &spec, None),
        Err(SearchError::InvalidWindow { .. })
    ));
}

#[test]
fn test_target_outside_data_is_data_gap() {
    let series = repeating_series();
    let last_day = *trading_days(40).last().unwrap();

    let evening = SearchSpec::builder()
        .target_end(local(last_day, 20, 0))
        .build()
        .unwrap();
    assert!(matches!(
        sequential().search(&series, &evening, None),
        Err(SearchError::DataGap { .. })
    ));

    let before = SearchSpec::builder()
        .target_end(local(trading_days(1)[0], 8, 0))
        .build()
        .unwrap();
    assert!(matches!(
        sequential().search(&series, &before, None),
        Err(SearchError::DataGap { .. })
    ));
}

#[test]
fn test_wider_tolerance_resolves_evening_target() {
    let series = repeating_series();
    let last_day = *trading_days(40).last().unwrap();
    let spec = SearchSpec::builder()
        .target_end(local(last_day, 20, 0))
        .top_k(2)
        .build()
        .unwrap();
    let runner = EngineBuilder::new()
        .resolve_tolerance(Duration::hours(6))
        .build()
        .unwrap();

    let out = runner.search(&series, &spec, None).unwrap();
    assert_eq!(out.len(), 2);
    let end = out[0].end.with_timezone(&DEFAULT_TZ);
    assert_eq!(end.format("%H:%M").to_string(), "15:55");
}

// ============================================================
// PROGRESS & CANCELLATION
// ============================================================

#[test]
fn test_progress_is_monotone_and_ends_at_one() {
    let series = repeating_series();
    let spec = spec().build().unwrap();
    let seen = Mutex::new(Vec::new());
    let reporter = |f: f64| seen.lock().unwrap().push(f);

    for runner in [sequential(), EngineBuilder::new().build().unwrap()] {
        seen.lock().unwrap().clear();
        runner.search(&series, &spec, Some(&reporter)).unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.len() <= 39);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|f| (0.0..=1.0).contains(f)));
        assert_eq!(*seen.last().unwrap(), 1.0);
    }
}

#[test]
fn test_empty_scan_reports_no_progress() {
    let series = repeating_series();
    let at = local(trading_days(40)[5], 0, 0);
    let spec = spec().search_range(at, at).build().unwrap();
    let calls = Mutex::new(0usize);
    let reporter = |_: f64| *calls.lock().unwrap() += 1;

    sequential().search(&series, &spec, Some(&reporter)).unwrap();
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn test_cancel_from_reporter_discards_results() {
    let series = repeating_series();
    let spec = spec().build().unwrap();
    let token = CancellationToken::new();
    let reporter = {
        let token = token.clone();
        move |_: f64| token.cancel()
    };

    let result = sequential().search_with_token(&series, &spec, Some(&reporter), &token);
    assert!(matches!(result, Err(SearchError::Cancelled)));
}

#[test]
fn test_spawned_scan_completes() {
    let series = Arc::new(repeating_series());
    let spec = spec().top_k(4).build().unwrap();
    let runner = sequential();

    let direct = runner.search(&series, &spec, None).unwrap();
    let task = runner.spawn(Arc::clone(&series), spec, None).unwrap();
    assert_eq!(task.join().unwrap(), direct);
}

#[test]
fn test_spawned_scan_cancels() {
    let series = Arc::new(repeating_series());
    let spec = spec().build().unwrap();

    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (resume_tx, resume_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let resume_rx = Mutex::new(resume_rx);
    let first = AtomicBool::new(true);

    let reporter: Arc<dyn ProgressReporter> = Arc::new(move |_: f64| {
        if first.swap(false, Ordering::SeqCst) {
            started_tx.lock().unwrap().send(()).unwrap();
            resume_rx.lock().unwrap().recv().unwrap();
        }
    });

    let task = sequential().spawn(series, spec, Some(reporter)).unwrap();
    started_rx.recv().unwrap();
    task.cancel();
    assert!(task.cancellation_token().is_cancelled());
    resume_tx.send(()).unwrap();

    assert!(matches!(task.join(), Err(SearchError::Cancelled)));
}

// ============================================================
// MULTI-INSTRUMENT
// ============================================================

#[test]
fn test_search_many_splits_outcomes() {
    let a = repeating_series();
    let b = series_with_shift(40, 25.0);
    let short = series_with_shift(5, 0.0);
    let spec = spec().top_k(2).build().unwrap();
    let runner = EngineBuilder::new().build().unwrap();

    let instruments = vec![("AAA", &a), ("BBB", &b), ("SHORT", &short)];
    let (ok, failed) = search_many(&runner, &spec, instruments);

    assert_eq!(ok.len(), 2);
    assert_eq!(ok[0].symbol, "AAA");
    assert_eq!(ok[1].symbol, "BBB");
    assert!(ok.iter().all(|o| o.matches.len() == 2));

    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].symbol, "SHORT");
    assert!(matches!(failed[0].error, SearchError::DataGap { .. }));
}

// ============================================================
// ASSEMBLY & CACHE
// ============================================================

#[test]
fn test_assembled_matches_carry_rest_of_session() {
    let series = repeating_series();
    let spec = spec().top_k(3).build().unwrap();
    let out = sequential().search(&series, &spec, None).unwrap();

    let windows = MatchAssembler::new(&series).assemble_all(&out);
    assert_eq!(windows.len(), 3);
    for (w, m) in windows.iter().zip(&out) {
        assert_eq!(w.match_end, m.end);
        assert_eq!(w.projection_start, m.end + Duration::minutes(5));
        assert_eq!(w.match_window().len(), 31);
        // 12:05 through 15:55
        assert_eq!(w.projection().len(), 47);
        assert_eq!(w.window.len(), 78);

        let back = WindowMatch::from_json(&w.to_json().unwrap()).unwrap();
        assert_eq!(&back, w);
        assert_eq!(back.window, w.window);
    }
}

#[test]
fn test_cache_reuses_and_invalidates() {
    let series = repeating_series();
    let spec = spec().top_k(3).build().unwrap();
    let runner = EngineBuilder::new().build().unwrap();
    let mut cache = SearchCache::new(4);

    let first = cache.get_or_search(&runner, &series, &spec, None).unwrap();
    let key = SearchCache::key(&series, &spec, &runner).unwrap();
    assert_eq!(cache.get(&key), Some(first.as_slice()));

    let other = series_with_shift(40, 1.0);
    assert!(cache
        .get(&SearchCache::key(&other, &spec, &runner).unwrap())
        .is_none());

    assert_eq!(cache.invalidate_series(series.fingerprint()), 1);
    assert!(cache.get(&key).is_none());
}
