//! Allocation properties over arbitrary groups and demands.

use hl_equipment::{
    CapacityBroker, EquipmentConfig, EquipmentCoordinator, GroupConfig, Health, SharedCoordinator,
    UnitConfig,
};
use proptest::prelude::*;

fn group(capacities: &[f64], turndown: f64) -> EquipmentConfig {
    EquipmentConfig {
        groups: vec![GroupConfig {
            id: "g".into(),
            section: "test".to_string(),
            min_turndown_pct: turndown,
            units: capacities
                .iter()
                .enumerate()
                .map(|(i, &capacity)| UnitConfig {
                    id: format!("U-{i}").into(),
                    capacity,
                    initial_health: Health::Healthy,
                })
                .collect(),
        }],
        ..EquipmentConfig::default()
    }
}

proptest! {
    #[test]
    fn allocation_covers_demand_or_reports_shortfall(
        capacities in proptest::collection::vec(50.0f64..1000.0, 1..6),
        demand in 0.0f64..5000.0,
        turndown in 0.0f64..60.0,
    ) {
        let mut coord = EquipmentCoordinator::new(&group(&capacities, turndown)).unwrap();
        let alloc = coord.request(&"g".into(), demand).unwrap();
        let total: f64 = capacities.iter().sum();

        let delivered: f64 = alloc
            .commands
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(id, c)| coord.unit(id).unwrap().capacity * c.setpoint / 100.0)
            .sum();
        prop_assert!((delivered - alloc.allocated).abs() < 1e-6);

        let critical = alloc.observations.iter().any(|o| o.active);
        if total + 1e-6 >= demand {
            prop_assert!(alloc.allocated + 1e-6 >= demand);
            prop_assert!(!critical);
        } else {
            prop_assert!(critical);
            prop_assert_eq!(alloc.running(), capacities.len());
        }

        // Every running unit shares the same percentage.
        let speeds: Vec<f64> = alloc
            .commands
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(_, c)| c.setpoint)
            .collect();
        prop_assert!(speeds.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-9));
    }

    #[test]
    fn repeated_request_is_stable(
        capacities in proptest::collection::vec(50.0f64..1000.0, 1..6),
        demand in 0.0f64..3000.0,
    ) {
        let mut coord = EquipmentCoordinator::new(&group(&capacities, 20.0)).unwrap();
        let first = coord.request(&"g".into(), demand).unwrap();
        let second = coord.request(&"g".into(), demand).unwrap();
        prop_assert_eq!(first.commands, second.commands);
    }
}

#[test]
fn shared_coordinator_serializes_parallel_requests() {
    let coord = EquipmentCoordinator::new(&group(&[800.0, 800.0, 800.0], 30.0)).unwrap();
    let shared = SharedCoordinator::new(coord);
    let (a, b) = std::thread::scope(|s| {
        let h1 = s.spawn(|| shared.request(&"g".into(), 1200.0));
        let h2 = s.spawn(|| shared.installed_capacity(&"g".into()));
        (h1.join().unwrap(), h2.join().unwrap())
    });
    assert_eq!(a.unwrap().running(), 2);
    assert_eq!(b.unwrap(), 2400.0);
}
