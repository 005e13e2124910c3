// candor/src/workers/heartbeat.rs
//
// Heartbeat analyzer — turns one client heartbeat into counter increments.
//
// Signals:
//   visibility_change / blur / tab_switch
//                        — at most one increment per type per heartbeat, no
//                          matter how often the event is repeated
//   devtools_suspected   — viewport narrower or shorter than the configured
//                          minimum (800x600 by default)
//   gap                  — more than max_interval_ms since the previous
//                          heartbeat (tracked, not scored)
//
// Known limitation: the devtools heuristic is a window-size proxy. Small
// laptop screens, split-screen layouts and mobile browsers trip it too.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::config::HeartbeatConfig;
use crate::error::{AntifraudError, Result};
use crate::events::{BrowserEvent, Heartbeat};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatDelta {
    pub observed_at: DateTime<Utc>,
    pub visibility_change: bool,
    pub blur: bool,
    pub tab_switch: bool,
    pub gap: bool,
    pub devtools_suspected: bool,
}

impl HeartbeatDelta {
    pub fn is_quiet(&self) -> bool {
        !(self.visibility_change || self.blur || self.tab_switch || self.gap || self.devtools_suspected)
    }
}

/// Distinct tracked events in a heartbeat, from the typed list and the legacy
/// free-text field. Legacy text is split on anything outside [A-Za-z0-9_] and
/// each token must match an event name exactly.
pub fn event_set(heartbeat: &Heartbeat) -> BTreeSet<BrowserEvent> {
    let mut set: BTreeSet<BrowserEvent> = heartbeat
        .events
        .iter()
        .copied()
        .filter(|e| *e != BrowserEvent::Unknown)
        .collect();

    if let Some(ref raw) = heartbeat.browser_events {
        set.extend(
            raw.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .filter_map(BrowserEvent::from_token),
        );
    }
    set
}

pub fn devtools_suspected(heartbeat: &Heartbeat, cfg: &HeartbeatConfig) -> bool {
    match (heartbeat.window_width, heartbeat.window_height) {
        (Some(w), Some(h)) => w < cfg.devtools_min_width || h < cfg.devtools_min_height,
        _ => false,
    }
}

/// `last_seen` is the record's latest heartbeat timestamp, if any.
pub fn analyze(
    heartbeat: &Heartbeat,
    last_seen: Option<DateTime<Utc>>,
    cfg: &HeartbeatConfig,
) -> Result<HeartbeatDelta> {
    if heartbeat.window_width == Some(0) || heartbeat.window_height == Some(0) {
        return Err(AntifraudError::Validation(format!(
            "heartbeat window dimensions must be non-zero, got {:?}x{:?}",
            heartbeat.window_width, heartbeat.window_height
        )));
    }

    let events = event_set(heartbeat);
    let gap = last_seen
        .map(|last| (heartbeat.timestamp - last).num_milliseconds() > cfg.max_interval_ms)
        .unwrap_or(false);

    Ok(HeartbeatDelta {
        observed_at: heartbeat.timestamp,
        visibility_change: events.contains(&BrowserEvent::VisibilityChange),
        blur: events.contains(&BrowserEvent::Blur),
        tab_switch: events.contains(&BrowserEvent::TabSwitch),
        gap,
        devtools_suspected: devtools_suspected(heartbeat, cfg),
    })
}
