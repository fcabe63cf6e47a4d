use crate::config::Config;
use crate::countdown::Countdowns;
use crate::http::StatusClient;
use crate::meters;
use crate::types::{CreditsStatus, MeterKind, Mode, ModeDecision, ModeSource, UsageStatus};
use crate::view::MeterView;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

/// Keeps the usage and credits meters in sync with the backend.
///
/// Exactly one panel is shown at a time: usage in free mode, credits in paid
/// mode. A panel becomes visible after its first successful fetch. Fetch
/// failures never reach the view; it keeps the last values until the next poll.
pub struct MeterController {
    client: StatusClient,
    view: Arc<dyn MeterView>,
    countdowns: Countdowns,
    expired: mpsc::UnboundedReceiver<MeterKind>,
    mode: Option<Mode>,
    fetched: HashSet<MeterKind>,
    paid_tag: bool,
    upgrade_url: String,
    poll_interval: Duration,
}

impl MeterController {
    pub fn new(cfg: &Config, view: Arc<dyn MeterView>) -> reqwest::Result<Self> {
        let client = StatusClient::new(cfg)?;
        let (countdowns, expired) = Countdowns::new(Arc::clone(&view));
        Ok(Self {
            client,
            view,
            countdowns,
            expired,
            mode: None,
            fetched: HashSet::new(),
            paid_tag: cfg.paid_mode,
            upgrade_url: cfg.upgrade_url.clone(),
            poll_interval: cfg.poll_interval,
        })
    }

    /// Last decided mode, if any probe has run.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn countdowns(&self) -> &Countdowns {
        &self.countdowns
    }

    fn active_meter(&self) -> MeterKind {
        self.mode.unwrap_or(Mode::Free).active_meter()
    }

    fn set_mode(&mut self, mode: Mode) {
        let active = mode.active_meter();
        if self.mode != Some(mode) {
            info!("meter mode: {:?}", mode);
            for kind in MeterKind::ALL.into_iter().filter(|k| *k != active) {
                self.countdowns.cancel(kind);
            }
        }
        self.mode = Some(mode);
        for kind in MeterKind::ALL {
            let visible = kind == active && self.fetched.contains(&kind);
            self.view.set_panel_visible(kind, visible);
        }
        if active != MeterKind::Usage {
            self.view.set_upgrade_hint(None);
        }
    }

    /// Probe `/health`; if that fails, fall back to `/credits_status`, and
    /// to free mode when both fail.
    pub async fn probe_mode(&self) -> ModeDecision {
        match self.client.health().await {
            Ok(h) => ModeDecision {
                mode: Mode::from_probe(h.mode.as_deref()),
                source: ModeSource::Health,
                credits: None,
            },
            Err(e) => {
                debug!("health probe failed ({}): {}", e.code(), e);
                match self.client.credits_status().await {
                    Ok(c) => ModeDecision {
                        mode: Mode::Paid,
                        source: ModeSource::CreditsFallback,
                        credits: Some(c),
                    },
                    Err(e) => {
                        debug!("credits fallback probe failed ({}): {}", e.code(), e);
                        ModeDecision {
                            mode: Mode::Free,
                            source: ModeSource::Default,
                            credits: None,
                        }
                    }
                }
            }
        }
    }

    /// Decide the mode and hide the inactive panel. Status obtained by the
    /// fallback probe is applied right away.
    pub async fn determine_mode(&mut self) -> ModeDecision {
        let decision = self.probe_mode().await;
        debug!("mode decided by {:?}", decision.source);
        self.set_mode(decision.mode);
        if let Some(c) = &decision.credits {
            self.apply_credits(c);
        }
        decision
    }

    pub async fn refresh_usage(&mut self) -> bool {
        match self.client.usage_today().await {
            Ok(u) => {
                self.apply_usage(&u);
                true
            }
            Err(e) => {
                debug!("usage refresh skipped ({}): {}", e.code(), e);
                false
            }
        }
    }

    pub async fn refresh_credits(&mut self) -> bool {
        match self.client.credits_status().await {
            Ok(c) => {
                self.apply_credits(&c);
                true
            }
            Err(e) => {
                debug!("credits refresh skipped ({}): {}", e.code(), e);
                false
            }
        }
    }

    pub async fn refresh(&mut self, kind: MeterKind) -> bool {
        match kind {
            MeterKind::Usage => self.refresh_usage().await,
            MeterKind::Credits => self.refresh_credits().await,
        }
    }

    /// Refresh both meters; the two fetches are independent.
    pub async fn refresh_all(&mut self) {
        self.refresh_usage().await;
        self.refresh_credits().await;
    }

    pub fn apply_usage(&mut self, u: &UsageStatus) {
        let warning = meters::usage_warning(u);
        self.view
            .set_badge(MeterKind::Usage, &meters::usage_badge(u), warning);
        self.mark_fetched(MeterKind::Usage);
        if self.active_meter() == MeterKind::Usage {
            let exhausted = u.limit > 0 && meters::effective_remaining(u) == 0;
            self.view
                .set_upgrade_hint(exhausted.then_some(self.upgrade_url.as_str()));
        }
        if warning {
            warn!("usage at {}/{}", u.count, u.limit);
        }
        self.arm_countdown(MeterKind::Usage, u.reset_at.as_deref());
    }

    pub fn apply_credits(&mut self, c: &CreditsStatus) {
        let warning = meters::credits_warning(c);
        self.view.set_badge(
            MeterKind::Credits,
            &meters::credits_badge(c, self.paid_tag),
            warning,
        );
        self.mark_fetched(MeterKind::Credits);
        if warning {
            warn!("credits at {}/{}", c.balance, c.max_balance);
        }
        self.arm_countdown(MeterKind::Credits, c.reset_at.as_deref());
    }

    fn mark_fetched(&mut self, kind: MeterKind) {
        self.fetched.insert(kind);
        if kind == self.active_meter() {
            self.view.set_panel_visible(kind, true);
        }
    }

    // Only the shown meter counts down; a hidden one would send its own
    // expiry for the same reset and double the refresh.
    fn arm_countdown(&mut self, kind: MeterKind, reset_at: Option<&str>) {
        match reset_at {
            Some(reset_at) if kind == self.active_meter() => {
                self.start_countdown(kind, reset_at);
            }
            _ => {
                self.countdowns.cancel(kind);
            }
        }
    }

    /// (Re)start the countdown for `kind`, replacing any running one.
    pub fn start_countdown(&mut self, kind: MeterKind, reset_at: &str) -> bool {
        self.countdowns.start_at(kind, reset_at)
    }

    /// One poll cycle: decide the mode, then refresh the active meter.
    pub async fn sync_once(&mut self) -> Mode {
        let decision = self.determine_mode().await;
        let active = decision.mode.active_meter();
        // The fallback probe already delivered fresh credits.
        if decision.credits.is_none() {
            self.refresh(active).await;
        }
        decision.mode
    }

    /// Poll forever. Countdown expiries trigger one refresh of both meters.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            "polling {} every {:?}",
            self.client.base_url(),
            self.poll_interval
        );
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_once().await;
                }
                Some(kind) = self.expired.recv() => {
                    debug!("{} countdown reached zero; refreshing meters", kind);
                    self.refresh_all().await;
                }
            }
        }
    }

    /// Handle expiries already queued, without waiting. Returns how many
    /// refresh rounds ran.
    pub async fn drain_expired(&mut self) -> usize {
        let mut rounds = 0;
        while let Ok(kind) = self.expired.try_recv() {
            debug!("{} countdown reached zero; refreshing meters", kind);
            self.refresh_all().await;
            rounds += 1;
        }
        rounds
    }

    /// Wait for the next countdown expiry and refresh both meters once.
    pub async fn next_expiry(&mut self) -> Option<MeterKind> {
        let kind = self.expired.recv().await?;
        self.refresh_all().await;
        Some(kind)
    }
}
