//! Table-driven severity classification.
//!
//! A rule maps one sensor's deviation past up to three limits onto a severity.
//! The most severe band that matches wins.

use hl_core::{SensorId, SensorSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::{AlarmError, AlarmResult};
use crate::types::{AlarmCategory, AlarmSource, Observation, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Alarm when the value rises past a limit.
    Above,
    /// Alarm when the value falls past a limit.
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub sensor: SensorId,
    pub category: AlarmCategory,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
    /// Display name used in messages; defaults to the sensor id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ThresholdRule {
    fn bands(&self) -> [(Severity, Option<f64>); 3] {
        [
            (Severity::Critical, self.critical),
            (Severity::High, self.high),
            (Severity::Warning, self.warning),
        ]
    }

    fn past(&self, value: f64, limit: f64) -> bool {
        match self.direction {
            Direction::Above => value >= limit,
            Direction::Below => value <= limit,
        }
    }

    /// Severity band `value` falls in, with the limit it crossed.
    pub fn classify(&self, value: f64) -> Option<(Severity, f64)> {
        self.bands().into_iter().find_map(|(severity, limit)| {
            limit
                .filter(|l| self.past(value, *l))
                .map(|l| (severity, l))
        })
    }

    /// Limits must be present and escalate in the rule's direction.
    pub fn validate(&self) -> AlarmResult<()> {
        let limits: Vec<f64> = [self.warning, self.high, self.critical]
            .into_iter()
            .flatten()
            .collect();
        if limits.is_empty() {
            return Err(AlarmError::InvalidRule {
                sensor: self.sensor.to_string(),
                what: "at least one limit is required",
            });
        }
        let escalates = limits.windows(2).all(|w| match self.direction {
            Direction::Above => w[0] < w[1],
            Direction::Below => w[0] > w[1],
        });
        if !escalates {
            return Err(AlarmError::InvalidRule {
                sensor: self.sensor.to_string(),
                what: "limits must escalate warning -> high -> critical",
            });
        }
        Ok(())
    }

    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(self.sensor.as_str())
    }

    fn describe(&self, severity: Severity, value: f64, limit: f64, unit: &str) -> String {
        let band = match (severity, self.direction) {
            (Severity::Critical, Direction::Above) => "high-high",
            (Severity::Critical, Direction::Below) => "low-low",
            (_, Direction::Above) => "high",
            (_, Direction::Below) => "low",
        };
        format!(
            "{} {band}: {value:.2} {unit} (limit {limit:.2} {unit})",
            self.label()
        )
    }
}

/// The full set of monitored parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    pub rules: Vec<ThresholdRule>,
}

impl ThresholdTable {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self { rules }
    }

    pub fn validate(&self) -> AlarmResult<()> {
        self.rules.iter().try_for_each(ThresholdRule::validate)
    }

    /// Evaluate every rule against the snapshot.
    ///
    /// Sensors absent from the snapshot produce no observation, which leaves
    /// any open alarm on them untouched; sensor loss is alarmed separately.
    pub fn evaluate(&self, snapshot: &SensorSnapshot, source: AlarmSource) -> Vec<Observation> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let reading = snapshot.get(&rule.sensor)?;
                let value = reading.value();
                let subject = rule.sensor.to_string();
                Some(match rule.classify(value) {
                    Some((severity, limit)) => Observation::active(
                        source,
                        rule.category,
                        subject,
                        severity,
                        rule.describe(severity, value, limit, reading.unit()),
                    ),
                    None => Observation::inactive(source, rule.category, subject),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hl_core::{ControllerId, Reading};

    fn do_rule() -> ThresholdRule {
        ThresholdRule {
            sensor: "aeration.do".into(),
            category: AlarmCategory::LowDissolvedOxygen,
            direction: Direction::Below,
            warning: Some(1.5),
            high: Some(1.0),
            critical: Some(0.5),
            label: Some("Aeration DO".to_string()),
        }
    }

    #[test]
    fn classify_picks_most_severe_band() {
        let rule = do_rule();
        assert_eq!(rule.classify(2.0), None);
        assert_eq!(rule.classify(1.4).map(|b| b.0), Some(Severity::Warning));
        assert_eq!(rule.classify(0.9).map(|b| b.0), Some(Severity::High));
        assert_eq!(rule.classify(0.2).map(|b| b.0), Some(Severity::Critical));
    }

    #[test]
    fn validate_rejects_non_escalating_limits() {
        let mut rule = do_rule();
        assert!(rule.validate().is_ok());
        rule.high = Some(3.0);
        assert!(rule.validate().is_err());
        rule.warning = None;
        rule.high = None;
        rule.critical = None;
        assert!(rule.validate().is_err());
    }

    #[test]
    fn evaluate_reports_active_and_inactive_predicates() {
        let table = ThresholdTable::new(vec![
            do_rule(),
            ThresholdRule {
                sensor: "primary.level".into(),
                category: AlarmCategory::HighLevel,
                direction: Direction::Above,
                warning: Some(80.0),
                high: Some(90.0),
                critical: Some(95.0),
                label: None,
            },
            ThresholdRule {
                sensor: "missing.sensor".into(),
                category: AlarmCategory::HighPressure,
                direction: Direction::Above,
                warning: Some(1.0),
                high: None,
                critical: None,
                label: None,
            },
        ]);
        let snap = hl_core::SensorSnapshot::new(1, Utc::now())
            .with("aeration.do", Reading::DissolvedOxygen(0.8))
            .with("primary.level", Reading::Level(97.0));
        let source = AlarmSource::Controller(ControllerId::Monitoring);
        let obs = table.evaluate(&snap, source);
        assert_eq!(obs.len(), 2);
        assert!(obs[0].active);
        assert_eq!(obs[0].severity, Severity::High);
        assert!(obs[0].message.starts_with("Aeration DO low"));
        assert_eq!(obs[1].severity, Severity::Critical);
        assert!(obs[1].message.contains("high-high"));
    }
}
