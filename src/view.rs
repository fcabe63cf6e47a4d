//! Display side of the meters.
//!
//! A [`MeterView`] receives badge text, countdown text, warning state and
//! panel visibility. Every method defaults to a no-op: a view that lacks a
//! slot simply ignores writes to it.

use crate::types::MeterKind;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

pub trait MeterView: Send + Sync {
    fn set_panel_visible(&self, _kind: MeterKind, _visible: bool) {}
    fn set_badge(&self, _kind: MeterKind, _text: &str, _warning: bool) {}
    fn set_countdown(&self, _kind: MeterKind, _text: &str) {}
    fn set_upgrade_hint(&self, _url: Option<&str>) {}
}

/// Which optional slots a view has registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slots {
    pub badges: bool,
    pub countdowns: bool,
}

impl Default for Slots {
    fn default() -> Self {
        Self {
            badges: true,
            countdowns: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelState {
    pub visible: bool,
    pub badge: Option<String>,
    pub countdown: Option<String>,
    pub warning: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub usage: PanelState,
    pub credits: PanelState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_hint: Option<String>,
}

impl ViewState {
    pub fn panel(&self, kind: MeterKind) -> &PanelState {
        match kind {
            MeterKind::Usage => &self.usage,
            MeterKind::Credits => &self.credits,
        }
    }

    fn panel_mut(&mut self, kind: MeterKind) -> &mut PanelState {
        match kind {
            MeterKind::Usage => &mut self.usage,
            MeterKind::Credits => &mut self.credits,
        }
    }

    /// One-line rendering of whichever panels are visible.
    pub fn status_line(&self) -> String {
        let mut parts = Vec::new();
        for kind in MeterKind::ALL {
            let p = self.panel(kind);
            if !p.visible {
                continue;
            }
            let mut seg = p.badge.clone().unwrap_or_default();
            if p.warning {
                seg.push_str(" [!]");
            }
            if let Some(cd) = &p.countdown {
                if !seg.is_empty() {
                    seg.push_str(" · ");
                }
                seg.push_str(cd);
            }
            parts.push(seg);
        }
        if let Some(url) = &self.upgrade_hint {
            parts.push(format!("Upgrade: {}", url));
        }
        parts.join(" | ")
    }
}

// Shared state plus slot filter; each write reports whether anything changed.
#[derive(Debug, Default)]
struct Board {
    state: Mutex<ViewState>,
    slots: Slots,
}

impl Board {
    fn new(slots: Slots) -> Self {
        Self {
            state: Mutex::new(ViewState::default()),
            slots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn visible(&self, kind: MeterKind, visible: bool) -> bool {
        let mut st = self.lock();
        let p = st.panel_mut(kind);
        let changed = p.visible != visible;
        p.visible = visible;
        changed
    }

    fn badge(&self, kind: MeterKind, text: &str, warning: bool) -> bool {
        if !self.slots.badges {
            return false;
        }
        let mut st = self.lock();
        let p = st.panel_mut(kind);
        let changed = p.badge.as_deref() != Some(text) || p.warning != warning;
        p.badge = Some(text.to_string());
        p.warning = warning;
        changed
    }

    fn countdown(&self, kind: MeterKind, text: &str) -> bool {
        if !self.slots.countdowns {
            return false;
        }
        let mut st = self.lock();
        let p = st.panel_mut(kind);
        let changed = p.countdown.as_deref() != Some(text);
        p.countdown = Some(text.to_string());
        changed
    }

    fn upgrade_hint(&self, url: Option<&str>) -> bool {
        let mut st = self.lock();
        let changed = st.upgrade_hint.as_deref() != url;
        st.upgrade_hint = url.map(str::to_string);
        changed
    }
}

/// In-process view; callers read it back with [`MemoryView::snapshot`].
#[derive(Debug, Default)]
pub struct MemoryView {
    board: Board,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::with_slots(Slots::default())
    }

    pub fn with_slots(slots: Slots) -> Self {
        Self {
            board: Board::new(slots),
        }
    }

    pub fn snapshot(&self) -> ViewState {
        self.board.lock().clone()
    }
}

impl MeterView for MemoryView {
    fn set_panel_visible(&self, kind: MeterKind, visible: bool) {
        self.board.visible(kind, visible);
    }

    fn set_badge(&self, kind: MeterKind, text: &str, warning: bool) {
        self.board.badge(kind, text, warning);
    }

    fn set_countdown(&self, kind: MeterKind, text: &str) {
        self.board.countdown(kind, text);
    }

    fn set_upgrade_hint(&self, url: Option<&str>) {
        self.board.upgrade_hint(url);
    }
}

/// Redraws a single status line on stdout whenever the state changes.
#[derive(Debug, Default)]
pub struct TerminalView {
    board: Board,
}

impl TerminalView {
    pub fn with_slots(slots: Slots) -> Self {
        Self {
            board: Board::new(slots),
        }
    }

    fn redraw(&self, changed: bool) {
        if !changed {
            return;
        }
        let line = self.board.lock().status_line();
        let mut out = io::stdout().lock();
        // Best effort; a closed stdout must not stop the poller.
        let _ = write!(out, "\r{}\x1b[K", line);
        let _ = out.flush();
    }
}

impl MeterView for TerminalView {
    fn set_panel_visible(&self, kind: MeterKind, visible: bool) {
        self.redraw(self.board.visible(kind, visible));
    }

    fn set_badge(&self, kind: MeterKind, text: &str, warning: bool) {
        self.redraw(self.board.badge(kind, text, warning));
    }

    fn set_countdown(&self, kind: MeterKind, text: &str) {
        self.redraw(self.board.countdown(kind, text));
    }

    fn set_upgrade_hint(&self, url: Option<&str>) {
        self.redraw(self.board.upgrade_hint(url));
    }
}
