// SPDX-License-Identifier: MIT OR Apache-2.0
//! Auto-dismiss timing and executor registration of `ErrorSurface`.

use std::time::Duration;
use tb_client::ReporterSlot;
use tb_error::ApiError;
use tb_surface::{DEFAULT_AUTO_DISMISS, ErrorSurface};

/// Let spawned timers observe the advanced clock.
async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn dismiss_before_timer_removes_entry() {
    let surface = ErrorSurface::new();
    let err = ApiError::new(503, "quotes unavailable");
    surface.report_error(err.clone());
    assert_eq!(surface.len(), 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(surface.dismiss_error(&err));
    assert!(surface.is_empty());

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert!(surface.is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_report_keeps_one_entry() {
    let surface = ErrorSurface::new();
    let err = ApiError::new(500, "boom");
    surface.report_error(err.clone());
    surface.report_error(err.clone());
    assert_eq!(surface.len(), 1);
    assert!(surface.errors()[0].same_instance(&err));
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_thirty_seconds() {
    let surface = ErrorSurface::new();
    assert_eq!(surface.auto_dismiss(), DEFAULT_AUTO_DISMISS);
    surface.report_error(ApiError::new(500, "first"));

    tokio::time::advance(Duration::from_secs(29)).await;
    settle().await;
    assert_eq!(surface.len(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert!(surface.is_empty());
}

#[tokio::test(start_paused = true)]
async fn each_entry_has_its_own_timer() {
    let surface = ErrorSurface::with_auto_dismiss(Duration::from_secs(10));
    surface.report_error(ApiError::new(500, "early"));
    tokio::time::advance(Duration::from_secs(6)).await;
    surface.report_error(ApiError::new(500, "late"));

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    let left = surface.errors();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].message(), "late");
}

#[tokio::test(start_paused = true)]
async fn errors_are_listed_in_insertion_order() {
    let surface = ErrorSurface::new();
    for msg in ["a", "b", "c"] {
        surface.report_error(ApiError::new(400, msg));
    }
    let messages: Vec<String> = surface
        .errors()
        .iter()
        .map(|e| e.message().to_string())
        .collect();
    assert_eq!(messages, ["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn clear_all_cancels_timers() {
    let surface = ErrorSurface::new();
    surface.report_error(ApiError::new(500, "x"));
    surface.report_error(ApiError::new(500, "y"));
    surface.clear_all();
    assert!(surface.is_empty());

    let late = ApiError::new(500, "z");
    tokio::time::advance(Duration::from_secs(20)).await;
    surface.report_error(late.clone());
    tokio::time::advance(Duration::from_secs(15)).await;
    settle().await;
    // Stale timers from the cleared entries must not remove the new one.
    assert_eq!(surface.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn activation_routes_slot_reports() {
    let slot = ReporterSlot::new();
    let surface = ErrorSurface::new();
    let registration = surface.activate(&slot);
    assert!(slot.is_installed());

    let err = ApiError::new(502, "bad gateway");
    slot.report(&err);
    slot.report(&err);
    assert_eq!(registration.surface().len(), 1);

    registration.teardown();
    assert!(!slot.is_installed());
    assert!(surface.is_empty());

    slot.report(&ApiError::new(500, "after teardown"));
    assert!(surface.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_registration_deregisters() {
    let slot = ReporterSlot::new();
    let surface = ErrorSurface::new();
    {
        let _registration = surface.activate(&slot);
        slot.report(&ApiError::new(500, "inside"));
        assert_eq!(surface.len(), 1);
    }
    assert!(!slot.is_installed());
    assert!(surface.is_empty());
}

#[tokio::test(start_paused = true)]
async fn teardown_leaves_a_newer_surface_installed() {
    let slot = ReporterSlot::new();
    let old = ErrorSurface::new();
    let new = ErrorSurface::new();
    let old_reg = old.activate(&slot);
    let _new_reg = new.activate(&slot);

    old_reg.teardown();
    assert!(slot.is_installed());
    slot.report(&ApiError::new(500, "routed to new"));
    assert_eq!(new.len(), 1);
    assert!(old.is_empty());
}
