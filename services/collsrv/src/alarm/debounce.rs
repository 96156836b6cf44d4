//! Alarm debouncer
//!
//! Per (device, point) state machine:
//!
//! ```text
//! Quiescent --out--> PendingActive --out, held >= activation delay--> Active (activate)
//!     ^                   |in                                            |in
//!     |<------------------+                                              v
//!     +--in, held >= resolution delay (resolve)-- PendingResolve <-------+
//!                                                      |out
//!                                                      +--> Active
//! ```
//!
//! The dwell clock restarts whenever a pending phase is entered. Missing
//! observations never change state.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use super::ranges::RangeTable;
use crate::config::AlarmConfig;
use crate::model::{AlarmEvent, AlarmEventKind, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmPhase {
    Quiescent,
    PendingActive,
    Active,
    PendingResolve,
}

/// Debounce state of one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmState {
    pub phase: AlarmPhase,
    /// Value that started the current candidate (or the alarm)
    pub candidate_value: f64,
    /// When the current pending phase began
    pub candidate_since: Option<DateTime<Utc>>,
    pub threshold: f64,
    pub direction: Direction,
    pub last_observed: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct DebounceConfig {
    pub activation_delay: Duration,
    pub resolution_delay: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            activation_delay: Duration::seconds(60),
            resolution_delay: Duration::seconds(180),
        }
    }
}

impl From<&AlarmConfig> for DebounceConfig {
    fn from(config: &AlarmConfig) -> Self {
        Self {
            activation_delay: Duration::seconds(config.activation_delay_secs as i64),
            resolution_delay: Duration::seconds(config.resolution_delay_secs as i64),
        }
    }
}

type Key = (String, String);

pub struct AlarmDebouncer {
    ranges: RangeTable,
    config: DebounceConfig,
    states: Mutex<HashMap<Key, AlarmState>>,
}

impl AlarmDebouncer {
    pub fn new(ranges: RangeTable, config: DebounceConfig) -> Self {
        Self {
            ranges,
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn ranges(&self) -> &RangeTable {
        &self.ranges
    }

    /// Feed one calibrated observation; returns the event it triggers, if any
    ///
    /// Observations for keys without a range, non-finite values, and
    /// observations older than the last one seen for the key are ignored.
    pub fn observe(
        &self,
        device_id: &str,
        point: &str,
        value: f64,
        at: DateTime<Utc>,
    ) -> Option<AlarmEvent> {
        let range = self.ranges.get(device_id, point)?;
        if !value.is_finite() {
            return None;
        }
        let violation = range.violation(value);

        let mut states = self.states.lock();
        let key = (device_id.to_string(), point.to_string());

        let state = match states.entry(key) {
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                if at < state.last_observed {
                    debug!(
                        "Ignoring out-of-order observation for {}/{} at {}",
                        device_id, point, at
                    );
                    return None;
                }
                state.last_observed = at;
                state
            },
            Entry::Vacant(entry) => {
                // Created lazily on the first violation
                let (direction, threshold) = violation?;
                entry.insert(AlarmState {
                    phase: AlarmPhase::Quiescent,
                    candidate_value: value,
                    candidate_since: None,
                    threshold,
                    direction,
                    last_observed: at,
                })
            },
        };

        let event = step(state, &self.config, violation, value, at)?;
        let event = AlarmEvent {
            device_id: device_id.to_string(),
            point: point.to_string(),
            ..event
        };
        match event.kind {
            AlarmEventKind::Activate => info!(
                "Alarm ACTIVE {}/{}: {} {} threshold {} (value {})",
                device_id,
                point,
                event.direction.as_str(),
                if event.direction == Direction::High {
                    "above"
                } else {
                    "below"
                },
                event.threshold,
                event.value
            ),
            AlarmEventKind::Resolve => info!(
                "Alarm resolved {}/{} (value {})",
                device_id, point, event.value
            ),
        }
        Some(event)
    }

    /// Non-quiescent keys with no observation since `now - max_age`
    ///
    /// Reporting only: stale keys keep their state.
    pub fn stale_keys(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<(String, String)> {
        let cutoff = now - max_age;
        let mut stale: Vec<_> = self
            .states
            .lock()
            .iter()
            .filter(|(_, s)| s.phase != AlarmPhase::Quiescent && s.last_observed < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        stale.sort();
        stale
    }

    pub fn state(&self, device_id: &str, point: &str) -> Option<AlarmState> {
        self.states
            .lock()
            .get(&(device_id.to_string(), point.to_string()))
            .cloned()
    }

    /// Copy of every tracked key's state
    pub fn snapshot(&self) -> HashMap<(String, String), AlarmState> {
        self.states.lock().clone()
    }

    /// Keys currently in Active or PendingResolve
    pub fn active_count(&self) -> usize {
        self.states
            .lock()
            .values()
            .filter(|s| matches!(s.phase, AlarmPhase::Active | AlarmPhase::PendingResolve))
            .count()
    }
}

/// Transition function; the returned event has empty device/point fields
fn step(
    state: &mut AlarmState,
    config: &DebounceConfig,
    violation: Option<(Direction, f64)>,
    value: f64,
    at: DateTime<Utc>,
) -> Option<AlarmEvent> {
    match (state.phase, violation) {
        (AlarmPhase::Quiescent, None) => None,
        (AlarmPhase::Quiescent, Some((direction, threshold))) => {
            state.candidate_value = value;
            state.direction = direction;
            state.threshold = threshold;
            state.candidate_since = Some(at);
            state.phase = AlarmPhase::PendingActive;
            activate_if_due(state, config, value, at)
        },

        (AlarmPhase::PendingActive, None) => {
            state.phase = AlarmPhase::Quiescent;
            state.candidate_since = None;
            None
        },
        (AlarmPhase::PendingActive, Some((direction, threshold))) => {
            state.direction = direction;
            state.threshold = threshold;
            activate_if_due(state, config, value, at)
        },

        (AlarmPhase::Active, Some(_)) => None,
        (AlarmPhase::Active, None) => {
            state.candidate_since = Some(at);
            state.phase = AlarmPhase::PendingResolve;
            resolve_if_due(state, config, value, at)
        },

        (AlarmPhase::PendingResolve, Some(_)) => {
            state.phase = AlarmPhase::Active;
            state.candidate_since = None;
            None
        },
        (AlarmPhase::PendingResolve, None) => resolve_if_due(state, config, value, at),
    }
}

fn activate_if_due(
    state: &mut AlarmState,
    config: &DebounceConfig,
    value: f64,
    at: DateTime<Utc>,
) -> Option<AlarmEvent> {
    let since = state.candidate_since?;
    if at - since < config.activation_delay {
        return None;
    }
    state.phase = AlarmPhase::Active;
    state.candidate_since = None;
    Some(event(state, AlarmEventKind::Activate, value, at))
}

fn resolve_if_due(
    state: &mut AlarmState,
    config: &DebounceConfig,
    value: f64,
    at: DateTime<Utc>,
) -> Option<AlarmEvent> {
    let since = state.candidate_since?;
    if at - since < config.resolution_delay {
        return None;
    }
    state.phase = AlarmPhase::Quiescent;
    state.candidate_since = None;
    Some(event(state, AlarmEventKind::Resolve, value, at))
}

fn event(state: &AlarmState, kind: AlarmEventKind, value: f64, at: DateTime<Utc>) -> AlarmEvent {
    AlarmEvent {
        device_id: String::new(),
        point: String::new(),
        kind,
        direction: state.direction,
        value,
        threshold: state.threshold,
        timestamp: at,
    }
}
