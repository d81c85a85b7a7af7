//! Derived plant KPIs and their trend buffers.

use std::collections::{BTreeMap, VecDeque};

use hl_controls::Metric;
use hl_core::SensorSnapshot;
use hl_project::KpiConfig;
use serde::{Deserialize, Serialize};

/// One KPI sample. `value` is `None` when undefined this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub name: String,
    pub value: Option<f64>,
    pub unit: String,
    pub cycle: u64,
}

/// Fixed-capacity ring of `(cycle, value)`; the oldest sample is evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendBuffer {
    capacity: usize,
    samples: VecDeque<(u64, f64)>,
}

impl TrendBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, cycle: u64, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((cycle, value));
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<(u64, f64)> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, f64)> {
        self.samples.iter()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().map(|(_, v)| v).sum::<f64>() / self.samples.len() as f64)
    }
}

/// Percent removal, undefined for zero (or negative) influent.
pub fn removal_pct(influent: f64, effluent: f64) -> Option<f64> {
    (influent > 0.0).then(|| (influent - effluent) / influent * 100.0)
}

/// What the engine needs from a cycle besides the snapshot.
pub struct KpiInputs<'a> {
    pub cycle: u64,
    pub dt_h: f64,
    pub snapshot: &'a SensorSnapshot,
    pub metrics: &'a [Metric],
    /// (available units, total units) this cycle.
    pub availability: (usize, usize),
}

#[derive(Debug, Clone)]
pub struct KpiEngine {
    config: KpiConfig,
    trends: BTreeMap<String, TrendBuffer>,
    energy_kwh: f64,
    volume_m3: f64,
    unit_cycles: VecDeque<(usize, usize)>,
}

impl KpiEngine {
    pub fn new(config: KpiConfig) -> Self {
        Self {
            config,
            trends: BTreeMap::new(),
            energy_kwh: 0.0,
            volume_m3: 0.0,
            unit_cycles: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &KpiConfig {
        &self.config
    }

    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    pub fn volume_m3(&self) -> f64 {
        self.volume_m3
    }

    pub fn trend(&self, name: &str) -> Option<&TrendBuffer> {
        self.trends.get(name)
    }

    pub fn trend_names(&self) -> impl Iterator<Item = &str> {
        self.trends.keys().map(String::as_str)
    }

    /// Restart every trend buffer and the availability window.
    pub fn clear_trends(&mut self) {
        for buffer in self.trends.values_mut() {
            buffer.clear();
        }
        self.unit_cycles.clear();
    }

    pub fn update(&mut self, inputs: &KpiInputs<'_>) -> Vec<KpiRecord> {
        let cycle = inputs.cycle;
        let mut records = Vec::new();
        let mut record = |name: String, value: Option<f64>, unit: &str| {
            records.push(KpiRecord {
                name,
                value: value.filter(|v| v.is_finite()),
                unit: unit.to_string(),
                cycle,
            });
        };

        for removal in &self.config.removals {
            let value = match (
                inputs.snapshot.value_opt(&removal.influent),
                inputs.snapshot.value_opt(&removal.effluent),
            ) {
                (Some(i), Some(e)) => removal_pct(i, e),
                _ => None,
            };
            record(format!("kpi.{}", removal.name), value, "%");
        }

        let power_kw: f64 = self
            .config
            .power_sensors
            .iter()
            .filter_map(|s| inputs.snapshot.value_opt(s))
            .sum();
        self.energy_kwh += power_kw * inputs.dt_h;
        if let Some(flow) = self
            .config
            .treated_flow_sensor
            .as_ref()
            .and_then(|s| inputs.snapshot.value_opt(s))
        {
            self.volume_m3 += flow.max(0.0) * inputs.dt_h;
        }
        let intensity = (self.volume_m3 > 0.0).then(|| self.energy_kwh / self.volume_m3);
        record("kpi.energy_kwh".to_string(), Some(self.energy_kwh), "kWh");
        record("kpi.treated_volume_m3".to_string(), Some(self.volume_m3), "m3");
        record("kpi.energy_intensity".to_string(), intensity, "kWh/m3");

        if self.unit_cycles.len() == self.config.trend_capacity.max(1) {
            self.unit_cycles.pop_front();
        }
        self.unit_cycles.push_back(inputs.availability);
        let (available, total) = self
            .unit_cycles
            .iter()
            .fold((0usize, 0usize), |(a, t), (ua, ut)| (a + ua, t + ut));
        let availability = (total > 0).then(|| available as f64 / total as f64 * 100.0);
        record("kpi.equipment_availability".to_string(), availability, "%");

        for metric in inputs.metrics {
            record(metric.name.clone(), metric.value, &metric.unit);
        }

        let capacity = self.config.trend_capacity;
        for r in &records {
            if let Some(v) = r.value {
                self.trends
                    .entry(r.name.clone())
                    .or_insert_with(|| TrendBuffer::new(capacity))
                    .push(cycle, v);
            }
        }
        records
    }
}
