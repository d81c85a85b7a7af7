//! Plant-wide observation: groups readings by section and applies the
//! threshold table.

use hl_alarms::{AlarmSource, ThresholdTable};
use hl_core::ControllerId;
use serde::{Deserialize, Serialize};

use crate::context::{ControllerMemory, ControllerOutput, CycleContext, SectionRecord};
use crate::error::{ControlError, ControlResult};
use crate::mode::Mode;

const ID: ControllerId = ControllerId::Monitoring;

/// Readings outside every configured section land here.
pub const OTHER_SECTION: &str = "other";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Sections always present in the record, reporting or not.
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringController {
    pub config: MonitoringConfig,
    pub thresholds: ThresholdTable,
}

impl MonitoringController {
    pub fn new(config: MonitoringConfig, thresholds: ThresholdTable) -> ControlResult<Self> {
        thresholds
            .validate()
            .map_err(|e| ControlError::InvalidConfig {
                controller: ID,
                what: e.to_string(),
            })?;
        Ok(Self { config, thresholds })
    }

    /// Readings grouped by section, keyed by the sensor name within the section.
    pub fn section_record(&self, ctx: &CycleContext<'_>) -> SectionRecord {
        let mut record: SectionRecord = self
            .config
            .sections
            .iter()
            .map(|s| (s.clone(), Default::default()))
            .collect();
        for (sensor, reading) in &ctx.snapshot.readings {
            let section = sensor.section();
            let (bucket, name) = if record.contains_key(section) {
                let name = sensor.as_str().strip_prefix(section).unwrap_or_default();
                (section.to_string(), name.trim_start_matches('.').to_string())
            } else {
                (OTHER_SECTION.to_string(), sensor.to_string())
            };
            record.entry(bucket).or_default().insert(name, reading.value());
        }
        record
    }

    pub fn evaluate(&self, ctx: &CycleContext<'_>) -> ControlResult<ControllerOutput> {
        let mut out = ControllerOutput::new(ID, Mode::Normal, ControllerMemory::Monitoring);
        out.sections = self.section_record(ctx);
        out.observations = self.thresholds.evaluate(ctx.snapshot, AlarmSource::Controller(ID));

        let reporting = ctx.snapshot.readings.len();
        out.metric("monitoring.sensors_reporting", Some(reporting as f64), "count");
        out.metric("monitoring.sensors_stale", Some(ctx.snapshot.stale.len() as f64), "count");
        out.metric(
            "monitoring.sections_lost",
            Some(ctx.snapshot.lost_sections.len() as f64),
            "count",
        );
        Ok(out)
    }
}
