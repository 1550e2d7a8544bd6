//! Simulated site: chargers plus a noisy household load

use std::sync::Arc;

use evse_core::{Amps, ChargerConfig, LoadMeter, PerPhase, SimulatedCharger, SiteConfig};
use rand::Rng;

/// Meter at the site connection: base load, jitter and every charger's draw
pub struct SiteMeter {
    base_load: PerPhase<Amps>,
    chargers: Vec<Arc<SimulatedCharger>>,
    jitter: Amps,
}

impl SiteMeter {
    pub fn new(base_load: PerPhase<Amps>, chargers: Vec<Arc<SimulatedCharger>>, jitter: Amps) -> Self {
        Self {
            base_load,
            chargers,
            jitter: jitter.max(0),
        }
    }

    fn noise(&self) -> Amps {
        if self.jitter == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(-self.jitter..=self.jitter)
    }
}

impl LoadMeter for SiteMeter {
    fn measured_load(&self) -> Option<PerPhase<Amps>> {
        let mut load = self.base_load.map(|base| (base + self.noise()).max(0));
        for charger in &self.chargers {
            load = load.zip_with(charger.draw(), |a, b| a + b);
        }
        Some(load)
    }
}

/// Build simulated chargers from the site description
pub fn build_chargers(site: &SiteConfig) -> Vec<Arc<SimulatedCharger>> {
    site.chargers
        .iter()
        .map(|c| {
            let charger = SimulatedCharger::new(&c.id, c.initial_current, c.max_current)
                .with_synced_phase_limits(c.synced_phase_limits);
            charger.set_can_charge(c.charging);
            Arc::new(charger)
        })
        .collect()
}

/// Built-in site used when no config file is given
pub fn demo_site() -> SiteConfig {
    SiteConfig {
        fuse_limit: PerPhase::uniform(25),
        base_load: PerPhase::new(6, 3, 2),
        margin: 1,
        chargers: vec![
            ChargerConfig {
                id: "garage".to_string(),
                max_current: 16,
                initial_current: 16,
                synced_phase_limits: false,
                charging: true,
            },
            ChargerConfig {
                id: "driveway".to_string(),
                max_current: 16,
                initial_current: 16,
                synced_phase_limits: true,
                charging: true,
            },
        ],
    }
}
