//! Normal / Degraded / Shutdown operating modes.
//!
//! ```text
//!   Normal ──warning──▶ Degraded ──critical──▶ Shutdown
//!     ▲                    │                      │
//!     └──clear (debounced)─┘        explicit reset only
//! ```
//!
//! A controller is concerned by an alarm when the alarm was raised by the
//! controller itself or its subject lies in one of the controller's
//! sections. Only alarms whose predicate is currently true count.

use hl_alarms::{AlarmEvent, AlarmSource, Severity};
use hl_core::ControllerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Normal,
    Degraded,
    Shutdown,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Degraded => "degraded",
            Mode::Shutdown => "shutdown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Mode::Normal),
            "degraded" => Some(Mode::Degraded),
            "shutdown" => Some(Mode::Shutdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModePolicy {
    /// Consecutive quiet cycles before Degraded returns to Normal.
    #[serde(default = "default_recover_after")]
    pub recover_after_cycles: u32,
}

fn default_recover_after() -> u32 {
    3
}

impl Default for ModePolicy {
    fn default() -> Self {
        Self {
            recover_after_cycles: default_recover_after(),
        }
    }
}

/// What the open alarms demand of one controller this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmPressure {
    pub warning: bool,
    pub critical: bool,
}

impl AlarmPressure {
    pub fn from_alarms(alarms: &[AlarmEvent], controller: ControllerId, sections: &[String]) -> Self {
        let mut pressure = Self::default();
        for event in alarms.iter().filter(|e| e.is_open() && e.predicate_active) {
            let own_source = event.source == AlarmSource::Controller(controller);
            let subject_section = event.subject.split('.').next().unwrap_or_default();
            let own_section = sections.iter().any(|s| s == subject_section);
            if !(own_source || own_section) {
                continue;
            }
            match event.severity {
                Severity::Critical => pressure.critical = true,
                Severity::High | Severity::Warning => pressure.warning = true,
                Severity::Info => {}
            }
        }
        pressure
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeState {
    pub mode: Mode,
    /// Quiet cycles counted while Degraded.
    pub quiet_cycles: u32,
}

impl ModeState {
    pub fn next(&self, pressure: AlarmPressure, policy: &ModePolicy) -> ModeState {
        match self.mode {
            Mode::Shutdown => self.clone(),
            _ if pressure.critical => ModeState {
                mode: Mode::Shutdown,
                quiet_cycles: 0,
            },
            _ if pressure.warning => ModeState {
                mode: Mode::Degraded,
                quiet_cycles: 0,
            },
            Mode::Normal => self.clone(),
            Mode::Degraded => {
                let quiet = self.quiet_cycles + 1;
                if quiet >= policy.recover_after_cycles {
                    ModeState::default()
                } else {
                    ModeState {
                        mode: Mode::Degraded,
                        quiet_cycles: quiet,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl_alarms::AlarmCategory;

    fn event(source: AlarmSource, subject: &str, severity: Severity) -> AlarmEvent {
        AlarmEvent {
            id: 1,
            source,
            category: AlarmCategory::HighLevel,
            subject: subject.to_string(),
            severity,
            message: String::new(),
            raised_at: 0,
            cleared_at: None,
            latched: severity == Severity::Critical,
            acknowledged: false,
            predicate_active: true,
        }
    }

    fn sections() -> Vec<String> {
        vec!["primary".to_string()]
    }

    #[test]
    fn section_scoping() {
        let alarms = vec![event(AlarmSource::Controller(ControllerId::Monitoring), "primary.level", Severity::Warning)];
        let p = AlarmPressure::from_alarms(&alarms, ControllerId::Treatment, &sections());
        assert!(p.warning && !p.critical);

        let p = AlarmPressure::from_alarms(&alarms, ControllerId::Intake, &["intake".to_string()]);
        assert_eq!(p, AlarmPressure::default());
    }

    #[test]
    fn cleared_predicate_does_not_press() {
        let mut e = event(AlarmSource::Controller(ControllerId::Treatment), "x", Severity::Critical);
        e.predicate_active = false;
        let p = AlarmPressure::from_alarms(&[e], ControllerId::Treatment, &sections());
        assert!(!p.critical);
    }

    #[test]
    fn degraded_recovers_after_quiet_cycles() {
        let policy = ModePolicy { recover_after_cycles: 2 };
        let warn = AlarmPressure { warning: true, critical: false };
        let s = ModeState::default().next(warn, &policy);
        assert_eq!(s.mode, Mode::Degraded);
        let s = s.next(AlarmPressure::default(), &policy);
        assert_eq!(s.mode, Mode::Degraded);
        let s = s.next(AlarmPressure::default(), &policy);
        assert_eq!(s.mode, Mode::Normal);
    }

    #[test]
    fn shutdown_is_terminal() {
        let policy = ModePolicy::default();
        let crit = AlarmPressure { warning: false, critical: true };
        let s = ModeState::default().next(crit, &policy);
        assert_eq!(s.mode, Mode::Shutdown);
        for _ in 0..10 {
            assert_eq!(s.next(AlarmPressure::default(), &policy).mode, Mode::Shutdown);
        }
    }

    #[test]
    fn critical_escalates_from_degraded() {
        let policy = ModePolicy::default();
        let s = ModeState {
            mode: Mode::Degraded,
            quiet_cycles: 1,
        };
        let s = s.next(AlarmPressure { warning: true, critical: true }, &policy);
        assert_eq!(s.mode, Mode::Shutdown);
    }
}
