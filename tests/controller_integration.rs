use chrono::Utc;
use httpmock::{Method::GET, MockServer};
use meter_sync::{Config, MemoryView, MeterController, MeterKind, Mode, ModeSource};
use std::sync::Arc;
use std::time::Duration;

fn cfg_for(server: &MockServer) -> Config {
    let mut cfg = Config::default();
    cfg.set_base_url(&server.base_url()).unwrap();
    cfg
}

fn reset_in(secs: f64) -> String {
    (Utc::now() + chrono::Duration::milliseconds((secs * 1000.0) as i64)).to_rfc3339()
}

fn controller(cfg: &Config) -> (Arc<MemoryView>, MeterController) {
    let view = Arc::new(MemoryView::new());
    let ctl = MeterController::new(cfg, view.clone()).unwrap();
    (view, ctl)
}

#[tokio::test]
async fn free_mode_end_to_end() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"ok": true, "mode": "free"}));
        })
        .await;
    let _usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(
                serde_json::json!({"count": 3, "limit": 5, "reset_at": reset_in(3661.5)}),
            );
        })
        .await;
    let credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200)
                .json_body(serde_json::json!({"balance": 1, "max_balance": 10}));
        })
        .await;

    let (view, mut ctl) = controller(&cfg_for(&server));
    assert_eq!(ctl.sync_once().await, Mode::Free);

    let s = view.snapshot();
    assert!(s.usage.visible);
    assert!(!s.credits.visible);
    assert!(s.usage.badge.as_deref().unwrap().contains("3/5"));
    assert!(!s.usage.warning);
    let first = s.usage.countdown.clone().unwrap();
    assert_eq!(first, "Resets in 01:01:01");
    assert_eq!(credits.hits_async().await, 0);
    // Ticking itself is covered on the paused clock in countdown.rs.
    assert!(ctl.countdowns().is_active(MeterKind::Usage));
    assert!(!ctl.countdowns().is_active(MeterKind::Credits));
}

#[tokio::test]
async fn paid_credits_mode_shows_credits_only() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200)
                .json_body(serde_json::json!({"ok": true, "mode": "paid_credits", "max_balance": 100}));
        })
        .await;
    let usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(serde_json::json!({"count": 0, "limit": 10}));
        })
        .await;
    let _credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200).json_body(serde_json::json!({
                "balance": 40, "max_balance": 100, "grant_per_day": 5, "reset_at": reset_in(600.0)
            }));
        })
        .await;

    let (view, mut ctl) = controller(&cfg_for(&server));
    assert_eq!(ctl.sync_once().await, Mode::Paid);

    let s = view.snapshot();
    assert!(s.credits.visible);
    assert!(!s.usage.visible);
    assert_eq!(s.credits.badge.as_deref(), Some("Credits: 40/100"));
    assert!(!s.credits.warning);
    assert!(s.credits.countdown.unwrap().starts_with("Resets in 00:"));
    assert_eq!(usage.hits_async().await, 0);
}

#[tokio::test]
async fn bare_paid_marker_and_low_balance_warning() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"mode": "paid"}));
        })
        .await;
    let _credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200)
                .json_body(serde_json::json!({"balance": 10, "max_balance": 100}));
        })
        .await;

    let mut cfg = cfg_for(&server);
    cfg.paid_mode = true;
    let (view, mut ctl) = controller(&cfg);
    assert_eq!(ctl.sync_once().await, Mode::Paid);

    let s = view.snapshot();
    assert_eq!(s.credits.badge.as_deref(), Some("Credits: 10/100 (for paid)"));
    assert!(s.credits.warning);
    // No reset time, no countdown.
    assert_eq!(s.credits.countdown, None);
    assert!(!ctl.countdowns().is_active(MeterKind::Credits));
}

#[tokio::test]
async fn health_failure_falls_back_to_credits_probe() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(500).body("boom");
        })
        .await;
    let credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200)
                .json_body(serde_json::json!({"balance": 7, "max_balance": 20}));
        })
        .await;

    let (view, mut ctl) = controller(&cfg_for(&server));
    let decision = ctl.determine_mode().await;
    assert_eq!(decision.mode, Mode::Paid);
    assert_eq!(decision.source, ModeSource::CreditsFallback);

    assert_eq!(ctl.sync_once().await, Mode::Paid);
    // One fallback probe per cycle; its result is reused, not fetched again.
    assert_eq!(credits.hits_async().await, 2);
    let s = view.snapshot();
    assert!(s.credits.visible);
    assert_eq!(s.credits.badge.as_deref(), Some("Credits: 7/20"));
}

#[tokio::test]
async fn both_probes_failing_defaults_to_free() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body("not json");
        })
        .await;
    let _credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            // A balance that is not a number does not count.
            then.status(200)
                .json_body(serde_json::json!({"balance": "n/a", "max_balance": 20}));
        })
        .await;
    let _usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(serde_json::json!({"count": 1, "limit": 10}));
        })
        .await;

    let (view, mut ctl) = controller(&cfg_for(&server));
    let decision = ctl.determine_mode().await;
    assert_eq!(decision.mode, Mode::Free);
    assert_eq!(decision.source, ModeSource::Default);

    assert_eq!(ctl.sync_once().await, Mode::Free);
    let s = view.snapshot();
    assert!(s.usage.visible);
    assert!(!s.credits.visible);
}

#[tokio::test]
async fn unknown_mode_is_free_without_fallback() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200)
                .json_body(serde_json::json!({"mode": "free_daily_cap", "limit": 10}));
        })
        .await;
    let credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200)
                .json_body(serde_json::json!({"balance": 7, "max_balance": 20}));
        })
        .await;

    let (_view, mut ctl) = controller(&cfg_for(&server));
    let decision = ctl.determine_mode().await;
    assert_eq!(decision.mode, Mode::Free);
    assert_eq!(decision.source, ModeSource::Health);
    assert_eq!(credits.hits_async().await, 0);
}

#[tokio::test]
async fn unreachable_backend_leaves_panels_hidden() {
    let mut cfg = Config::default();
    cfg.set_base_url("http://127.0.0.1:9").unwrap();
    let (view, mut ctl) = controller(&cfg);

    assert_eq!(ctl.sync_once().await, Mode::Free);
    let s = view.snapshot();
    assert!(!s.usage.visible);
    assert!(!s.credits.visible);
    assert_eq!(s.usage.badge, None);
}

#[tokio::test]
async fn failed_refresh_keeps_last_values() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"mode": "free"}));
        })
        .await;
    let mut usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(serde_json::json!({"count": 2, "limit": 10}));
        })
        .await;

    let (view, mut ctl) = controller(&cfg_for(&server));
    ctl.sync_once().await;
    let before = view.snapshot();
    assert_eq!(before.usage.badge.as_deref(), Some("Free uses: 2/10 (8 left)"));

    let broken: [(u16, &str); 3] = [
        (503, "unavailable"),
        (200, "{\"count\": 2"),
        (200, "{\"count\": 9}"),
    ];
    for (status, body) in broken {
        usage.delete_async().await;
        usage = server
            .mock_async(|when, then| {
                when.method(GET).path("/usage_today");
                then.status(status).body(body);
            })
            .await;
        assert!(!ctl.refresh_usage().await);
        assert_eq!(view.snapshot(), before);
    }
}

#[tokio::test]
async fn explicit_remaining_and_upgrade_hint() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"mode": "free"}));
        })
        .await;
    let mut usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200)
                .json_body(serde_json::json!({"count": 3, "limit": 5, "remaining": 7}));
        })
        .await;

    let cfg = cfg_for(&server);
    let (view, mut ctl) = controller(&cfg);
    ctl.sync_once().await;
    let s = view.snapshot();
    assert_eq!(s.usage.badge.as_deref(), Some("Free uses: 3/5 (7 left)"));
    assert_eq!(s.upgrade_hint, None);

    usage.delete_async().await;
    usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(serde_json::json!({"count": 5, "limit": 5}));
        })
        .await;
    assert!(ctl.refresh_usage().await);
    let s = view.snapshot();
    assert!(s.usage.warning);
    assert_eq!(s.upgrade_hint.as_deref(), Some(cfg.upgrade_url.as_str()));
    assert_eq!(usage.hits_async().await, 1);
}

#[tokio::test]
async fn mode_switch_swaps_panels() {
    let server = MockServer::start_async().await;
    let mut health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"mode": "free"}));
        })
        .await;
    let _usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(
                serde_json::json!({"count": 1, "limit": 5, "reset_at": reset_in(900.0)}),
            );
        })
        .await;
    let _credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200).json_body(
                serde_json::json!({"balance": 50, "max_balance": 100, "reset_at": reset_in(900.0)}),
            );
        })
        .await;

    let (view, mut ctl) = controller(&cfg_for(&server));
    ctl.sync_once().await;
    assert!(view.snapshot().usage.visible);

    health.delete_async().await;
    health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"mode": "paid_credits"}));
        })
        .await;
    assert_eq!(ctl.sync_once().await, Mode::Paid);
    let s = view.snapshot();
    assert!(!s.usage.visible);
    assert!(s.credits.visible);
    assert_eq!(ctl.mode(), Some(Mode::Paid));
    assert!(!ctl.countdowns().is_active(MeterKind::Usage));
    assert!(ctl.countdowns().is_active(MeterKind::Credits));
    assert_eq!(health.hits_async().await, 1);
}

#[tokio::test]
async fn shared_reset_after_expiry_refreshes_once() {
    let server = MockServer::start_async().await;
    let _health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"mode": "free"}));
        })
        .await;
    let mut usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(
                serde_json::json!({"count": 1, "limit": 5, "reset_at": reset_in(1.5)}),
            );
        })
        .await;

    let (view, mut ctl) = controller(&cfg_for(&server));
    ctl.sync_once().await;
    assert!(ctl.countdowns().is_active(MeterKind::Usage));

    // Backend rolls over: both meters now report the same next reset.
    let shared = reset_in(3.0);
    usage.delete_async().await;
    usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200)
                .json_body(serde_json::json!({"count": 0, "limit": 5, "reset_at": shared}));
        })
        .await;
    let credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200).json_body(
                serde_json::json!({"balance": 3, "max_balance": 10, "reset_at": shared}),
            );
        })
        .await;

    let first = tokio::time::timeout(Duration::from_secs(5), ctl.next_expiry())
        .await
        .expect("first countdown should expire");
    assert_eq!(first, Some(MeterKind::Usage));
    assert_eq!(usage.hits_async().await, 1);
    assert_eq!(credits.hits_async().await, 1);
    // The hidden credits panel does not count down.
    assert!(ctl.countdowns().is_active(MeterKind::Usage));
    assert!(!ctl.countdowns().is_active(MeterKind::Credits));
    assert!(!view.snapshot().credits.visible);

    let second = tokio::time::timeout(Duration::from_secs(5), ctl.next_expiry())
        .await
        .expect("shared reset should expire");
    assert_eq!(second, Some(MeterKind::Usage));
    // One reset, one refresh round; the refreshed reset is past so nothing re-arms.
    assert_eq!(ctl.drain_expired().await, 0);
    assert_eq!(usage.hits_async().await, 2);
    assert_eq!(credits.hits_async().await, 2);
    assert_eq!(ctl.countdowns().active_count(), 0);
    assert_eq!(
        view.snapshot().usage.countdown.as_deref(),
        Some("Resets in 00:00:00")
    );
}

#[tokio::test]
async fn run_polls_on_interval_and_refreshes_on_expiry() {
    let server = MockServer::start_async().await;
    let health = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(serde_json::json!({"mode": "free"}));
        })
        .await;
    let _usage = server
        .mock_async(|when, then| {
            when.method(GET).path("/usage_today");
            then.status(200).json_body(
                serde_json::json!({"count": 2, "limit": 5, "reset_at": reset_in(1.5)}),
            );
        })
        .await;
    let credits = server
        .mock_async(|when, then| {
            when.method(GET).path("/credits_status");
            then.status(200)
                .json_body(serde_json::json!({"balance": 3, "max_balance": 10}));
        })
        .await;

    let mut cfg = cfg_for(&server);
    cfg.poll_interval = Duration::from_secs(2);
    let (view, ctl) = controller(&cfg);
    let task = tokio::spawn(ctl.run());

    tokio::time::sleep(Duration::from_millis(2600)).await;
    task.abort();

    // First sync is immediate, the second one follows the interval.
    assert!(health.hits_async().await >= 2);
    // Free mode only fetches credits when the usage countdown runs out.
    assert!(credits.hits_async().await >= 1);
    assert!(view.snapshot().usage.visible);
    assert!(!view.snapshot().credits.visible);
}
