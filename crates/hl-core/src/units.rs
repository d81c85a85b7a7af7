// hl-core/src/units.rs

use uom::si::f64::{Area as UomArea, Velocity as UomVelocity, VolumeRate as UomVolumeRate};

pub type Area = UomArea;
pub type Velocity = UomVelocity;
pub type VolumeRate = UomVolumeRate;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Volume rate from cubic metres per hour, the unit plant flow meters report in.
#[inline]
pub fn m3ph(v: f64) -> VolumeRate {
    use uom::si::volume_rate::cubic_meter_per_second;
    VolumeRate::new::<cubic_meter_per_second>(v / SECONDS_PER_HOUR)
}

#[inline]
pub fn m2(v: f64) -> Area {
    use uom::si::area::square_meter;
    Area::new::<square_meter>(v)
}

/// Surface overflow rate (m/h, i.e. m³/m²/h) of a clarifier.
pub fn overflow_rate_m_per_h(flow: VolumeRate, surface: Area) -> f64 {
    use uom::si::velocity::meter_per_second;
    let rate: Velocity = flow / surface;
    rate.get::<meter_per_second>() * SECONDS_PER_HOUR
}
