//! Alarm lifecycle: debounce, latch, acknowledgement.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::emergency::EmergencyActions;
use crate::error::{AlarmError, AlarmResult};
use crate::table::ThresholdTable;
use crate::types::{AlarmEvent, Observation, ObservationBatch, Severity, sort_by_priority};

/// Alarm settings from the plant configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Consecutive inactive cycles before a non-latched alarm clears.
    #[serde(default = "default_clear_debounce")]
    pub clear_debounce_cycles: u32,
    /// Consecutive stale cycles after which a substituted sensor escalates
    /// from Warning to High.
    #[serde(default = "default_escalate_after")]
    pub sensor_stale_high_after: u32,
    /// Consecutive rejected cycles after which a held actuator escalates
    /// from Warning to High.
    #[serde(default = "default_escalate_after")]
    pub rejection_high_after: u32,
    /// Cleared alarms retained for inspection.
    #[serde(default = "default_history")]
    pub history_capacity: usize,
    #[serde(default)]
    pub thresholds: ThresholdTable,
    #[serde(default)]
    pub emergency_actions: EmergencyActions,
}

fn default_clear_debounce() -> u32 {
    3
}

fn default_escalate_after() -> u32 {
    5
}

fn default_history() -> usize {
    256
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            clear_debounce_cycles: default_clear_debounce(),
            sensor_stale_high_after: default_escalate_after(),
            rejection_high_after: default_escalate_after(),
            history_capacity: default_history(),
            thresholds: ThresholdTable::default(),
            emergency_actions: EmergencyActions::default(),
        }
    }
}

/// A change in the open alarm set produced by one evaluation step.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmTransition {
    Raised(AlarmEvent),
    SeverityChanged { from: Severity, event: AlarmEvent },
    Cleared(AlarmEvent),
}

/// Result of an operator acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Latched alarm whose predicate had cleared: closed now.
    Cleared,
    /// Latched alarm whose predicate still holds: stays open and latched.
    StillActive,
    /// Non-latched alarm: marked acknowledged, clears on its own.
    Acknowledged,
}

/// Owns every open alarm. All writes go through [`AlarmEngine::evaluate`],
/// [`AlarmEngine::acknowledge`] and [`AlarmEngine::restore`].
#[derive(Debug, Clone)]
pub struct AlarmEngine {
    clear_debounce_cycles: u32,
    history_capacity: usize,
    open: BTreeMap<String, AlarmEvent>,
    inactive_streak: HashMap<String, u32>,
    history: VecDeque<AlarmEvent>,
    next_id: u64,
}

impl AlarmEngine {
    pub fn new(config: &AlarmConfig) -> Self {
        Self {
            clear_debounce_cycles: config.clear_debounce_cycles,
            history_capacity: config.history_capacity,
            open: BTreeMap::new(),
            inactive_streak: HashMap::new(),
            history: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Pick up new settings between cycles without losing open alarms.
    pub fn reconfigure(&mut self, config: &AlarmConfig) {
        self.clear_debounce_cycles = config.clear_debounce_cycles;
        self.history_capacity = config.history_capacity;
    }

    /// Apply one cycle's observations.
    pub fn evaluate(&mut self, cycle: u64, batch: &ObservationBatch) -> Vec<AlarmTransition> {
        let mut transitions = Vec::new();

        // One verdict per predicate: any active report wins, most severe first.
        let mut verdicts: BTreeMap<String, &Observation> = BTreeMap::new();
        for obs in &batch.observations {
            let key = obs.key();
            let replace = match verdicts.get(&key) {
                None => true,
                Some(prev) => {
                    (obs.active && !prev.active)
                        || (obs.active == prev.active && obs.severity > prev.severity)
                }
            };
            if replace {
                verdicts.insert(key, obs);
            }
        }

        for (key, obs) in &verdicts {
            if obs.active {
                self.inactive_streak.remove(key);
                if let Some(t) = self.assert_active(cycle, key, obs) {
                    transitions.push(t);
                }
            }
        }

        let keys: Vec<String> = self.open.keys().cloned().collect();
        for key in keys {
            let Some(event) = self.open.get(&key) else {
                continue;
            };
            let reported_inactive = match verdicts.get(&key) {
                Some(obs) => !obs.active,
                None => batch.reporting.contains(&event.source),
            };
            if !reported_inactive {
                continue;
            }
            if let Some(t) = self.assert_inactive(cycle, &key) {
                transitions.push(t);
            }
        }

        transitions
    }

    fn assert_active(&mut self, cycle: u64, key: &str, obs: &Observation) -> Option<AlarmTransition> {
        if let Some(event) = self.open.get_mut(key) {
            event.predicate_active = true;
            event.message.clone_from(&obs.message);
            // A latched Critical never de-escalates.
            let target = if event.latched {
                Severity::Critical
            } else {
                obs.severity
            };
            if target == event.severity {
                return None;
            }
            let from = event.severity;
            event.severity = target;
            if target == Severity::Critical {
                event.latched = true;
            }
            if target > from {
                warn!(alarm = event.id, %from, to = %target, "{}", event.message);
            } else {
                info!(alarm = event.id, %from, to = %target, "{}", event.message);
            }
            return Some(AlarmTransition::SeverityChanged {
                from,
                event: event.clone(),
            });
        }

        let event = AlarmEvent {
            id: self.next_id,
            source: obs.source,
            category: obs.category,
            subject: obs.subject.clone(),
            severity: obs.severity,
            message: obs.message.clone(),
            raised_at: cycle,
            cleared_at: None,
            latched: obs.severity == Severity::Critical,
            acknowledged: false,
            predicate_active: true,
        };
        self.next_id += 1;
        match event.severity {
            Severity::Critical | Severity::High => {
                warn!(alarm = event.id, severity = %event.severity, source = %event.source, "raised: {}", event.message)
            }
            _ => info!(alarm = event.id, severity = %event.severity, source = %event.source, "raised: {}", event.message),
        }
        self.open.insert(key.to_string(), event.clone());
        Some(AlarmTransition::Raised(event))
    }

    fn assert_inactive(&mut self, cycle: u64, key: &str) -> Option<AlarmTransition> {
        let event = self.open.get_mut(key)?;
        event.predicate_active = false;
        if event.latched {
            return None;
        }
        let streak = self.inactive_streak.entry(key.to_string()).or_insert(0);
        *streak += 1;
        if *streak < self.clear_debounce_cycles {
            return None;
        }
        self.inactive_streak.remove(key);
        let cleared = self.close(key, cycle)?;
        Some(AlarmTransition::Cleared(cleared))
    }

    fn close(&mut self, key: &str, cycle: u64) -> Option<AlarmEvent> {
        let mut event = self.open.remove(key)?;
        event.cleared_at = Some(cycle);
        event.predicate_active = false;
        info!(alarm = event.id, "cleared: {}", event.message);
        self.history.push_back(event.clone());
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
        Some(event)
    }

    /// Operator acknowledgement of an open alarm.
    pub fn acknowledge(&mut self, id: u64, cycle: u64) -> AlarmResult<AckOutcome> {
        let key = self
            .open
            .iter()
            .find(|(_, e)| e.id == id)
            .map(|(k, _)| k.clone())
            .ok_or(AlarmError::UnknownAlarm { id })?;
        let Some(event) = self.open.get_mut(&key) else {
            return Err(AlarmError::UnknownAlarm { id });
        };
        event.acknowledged = true;
        info!(alarm = id, "acknowledged");
        if !event.latched {
            return Ok(AckOutcome::Acknowledged);
        }
        if event.predicate_active {
            return Ok(AckOutcome::StillActive);
        }
        self.inactive_streak.remove(&key);
        self.close(&key, cycle);
        Ok(AckOutcome::Cleared)
    }

    /// Open alarms ordered by priority.
    pub fn open_by_priority(&self) -> Vec<AlarmEvent> {
        let mut events: Vec<AlarmEvent> = self.open.values().cloned().collect();
        sort_by_priority(&mut events);
        events
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn get(&self, id: u64) -> Option<&AlarmEvent> {
        self.open.values().find(|e| e.id == id)
    }

    /// Open alarm for a predicate, if any.
    pub fn find(&self, key: &str) -> Option<&AlarmEvent> {
        self.open.get(key)
    }

    pub fn history(&self) -> impl Iterator<Item = &AlarmEvent> {
        self.history.iter()
    }

    pub fn has_open_critical(&self) -> bool {
        self.open.values().any(|e| e.severity == Severity::Critical)
    }

    /// Re-ingest open alarms from a published record (e.g. after a restart).
    ///
    /// A live alarm always wins: an event whose key is already open, or whose
    /// id is already in use, is dropped. Returns how many were restored.
    pub fn restore(&mut self, events: impl IntoIterator<Item = AlarmEvent>) -> usize {
        let mut restored = 0;
        for event in events.into_iter().filter(AlarmEvent::is_open) {
            let key = event.key();
            let id_taken = self
                .open
                .values()
                .chain(self.history.iter())
                .any(|e| e.id == event.id);
            if self.open.contains_key(&key) || id_taken {
                warn!(alarm = event.id, %key, "restored alarm collides with a live one; dropped");
                continue;
            }
            self.next_id = self.next_id.max(event.id + 1);
            self.open.insert(key, event);
            restored += 1;
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlarmCategory, AlarmSource};
    use hl_core::ControllerId;

    const MON: AlarmSource = AlarmSource::Controller(ControllerId::Monitoring);

    fn engine(debounce: u32) -> AlarmEngine {
        AlarmEngine::new(&AlarmConfig {
            clear_debounce_cycles: debounce,
            ..AlarmConfig::default()
        })
    }

    fn batch(obs: Vec<Observation>) -> ObservationBatch {
        let mut b = ObservationBatch::new();
        b.report(MON, obs);
        b
    }

    fn level(severity: Severity) -> Observation {
        Observation::active(MON, AlarmCategory::HighLevel, "primary.level", severity, "level")
    }

    fn level_ok() -> Observation {
        Observation::inactive(MON, AlarmCategory::HighLevel, "primary.level")
    }

    #[test]
    fn raise_on_edge_and_clear_after_debounce() {
        let mut eng = engine(2);
        let t = eng.evaluate(1, &batch(vec![level(Severity::Warning)]));
        assert!(matches!(t.as_slice(), [AlarmTransition::Raised(_)]));
        // Still active: no new transition.
        assert!(eng.evaluate(2, &batch(vec![level(Severity::Warning)])).is_empty());

        assert!(eng.evaluate(3, &batch(vec![level_ok()])).is_empty());
        assert_eq!(eng.open_count(), 1);
        let t = eng.evaluate(4, &batch(vec![level_ok()]));
        match t.as_slice() {
            [AlarmTransition::Cleared(e)] => {
                assert_eq!(e.raised_at, 1);
                assert_eq!(e.cleared_at, Some(4));
            }
            other => panic!("unexpected transitions {other:?}"),
        }
        assert_eq!(eng.open_count(), 0);
    }

    #[test]
    fn chatter_inside_debounce_window_keeps_alarm_open() {
        let mut eng = engine(3);
        eng.evaluate(1, &batch(vec![level(Severity::Warning)]));
        eng.evaluate(2, &batch(vec![level_ok()]));
        eng.evaluate(3, &batch(vec![level_ok()]));
        eng.evaluate(4, &batch(vec![level(Severity::Warning)]));
        eng.evaluate(5, &batch(vec![level_ok()]));
        eng.evaluate(6, &batch(vec![level_ok()]));
        assert_eq!(eng.open_count(), 1);
        let open = eng.open_by_priority();
        assert_eq!(open[0].raised_at, 1);
    }

    #[test]
    fn critical_latches_until_acknowledged_after_clear() {
        let mut eng = engine(1);
        eng.evaluate(1, &batch(vec![level(Severity::Critical)]));
        let id = eng.open_by_priority()[0].id;

        assert_eq!(eng.acknowledge(id, 1).unwrap(), AckOutcome::StillActive);

        for cycle in 2..10 {
            eng.evaluate(cycle, &batch(vec![level_ok()]));
        }
        assert_eq!(eng.open_count(), 1, "latched critical must not auto-clear");

        assert_eq!(eng.acknowledge(id, 10).unwrap(), AckOutcome::Cleared);
        assert_eq!(eng.open_count(), 0);
        assert_eq!(eng.history().last().unwrap().cleared_at, Some(10));
    }

    #[test]
    fn escalation_to_critical_latches() {
        let mut eng = engine(1);
        eng.evaluate(1, &batch(vec![level(Severity::Warning)]));
        let t = eng.evaluate(2, &batch(vec![level(Severity::Critical)]));
        assert!(matches!(
            t.as_slice(),
            [AlarmTransition::SeverityChanged { from: Severity::Warning, .. }]
        ));
        // Drops back to warning: latched stays critical.
        eng.evaluate(3, &batch(vec![level(Severity::Warning)]));
        let open = eng.open_by_priority();
        assert_eq!(open[0].severity, Severity::Critical);
        assert!(open[0].latched);
    }

    #[test]
    fn silent_source_keeps_its_alarms() {
        let mut eng = engine(1);
        eng.evaluate(1, &batch(vec![level(Severity::High)]));
        // Nobody reported this cycle.
        eng.evaluate(2, &ObservationBatch::new());
        assert_eq!(eng.open_count(), 1);
        // The source reported, but not this predicate: treated as inactive.
        eng.evaluate(3, &batch(vec![]));
        assert_eq!(eng.open_count(), 0);
    }

    #[test]
    fn acknowledge_unknown_alarm_is_an_error() {
        let mut eng = engine(1);
        assert_eq!(
            eng.acknowledge(42, 1).unwrap_err(),
            AlarmError::UnknownAlarm { id: 42 }
        );
    }

    #[test]
    fn restore_keeps_ids_unique() {
        let mut eng = engine(1);
        eng.evaluate(1, &batch(vec![level(Severity::High)]));
        let snapshot = eng.open_by_priority();

        let mut fresh = engine(1);
        assert_eq!(fresh.restore(snapshot.clone()), 1);
        assert_eq!(fresh.open_by_priority(), snapshot);
        fresh.evaluate(
            2,
            &batch(vec![
                level(Severity::High),
                Observation::active(MON, AlarmCategory::HighTurbidity, "tertiary.turbidity", Severity::Warning, "turbid"),
            ]),
        );
        let ids: Vec<u64> = fresh.open_by_priority().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn restore_never_overwrites_a_live_alarm() {
        let turbid = || Observation::active(MON, AlarmCategory::HighTurbidity, "tertiary.turbidity", Severity::Warning, "turbid");
        let mut eng = engine(1);
        eng.evaluate(1, &batch(vec![level(Severity::Critical)]));
        let live = eng.open_by_priority();

        // Same key as the live alarm.
        let mut same_key = engine(1);
        same_key.evaluate(1, &batch(vec![level(Severity::Warning)]));
        assert_eq!(eng.restore(same_key.open_by_priority()), 0);
        assert_eq!(eng.open_by_priority(), live);

        // Different key, but id 1 is already taken.
        let mut same_id = engine(1);
        same_id.evaluate(1, &batch(vec![turbid()]));
        assert_eq!(eng.restore(same_id.open_by_priority()), 0);
        assert_eq!(eng.open_count(), 1);

        // Different key and a free id.
        let mut other = engine(1);
        other.evaluate(1, &batch(vec![level(Severity::Warning), turbid()]));
        assert_eq!(eng.restore(other.open_by_priority()), 1);
        assert_eq!(eng.open_count(), 2);
        let level_alarm = eng
            .open_by_priority()
            .into_iter()
            .find(|e| e.category == AlarmCategory::HighLevel)
            .unwrap();
        assert_eq!(level_alarm.severity, Severity::Critical);
    }
}
