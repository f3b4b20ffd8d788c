//! Strip simulator - generates detector-like strip data for the encoder
//!
//! Produces one FED's worth of physical-order strip values per event: Gaussian
//! noise around zero, occasional signal hits, and a per-APV common-mode level
//! reported as the APV median. Seeded, so a run is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::fed::packet::ADC_MAX;
use crate::fed::records::EVENT_NUMBER_MAX;
use crate::fed::{EventId, APVS_PER_FED, STRIPS_PER_APV, STRIPS_PER_FED};

/// Bunch crossings per LHC orbit
pub const BUNCH_CROSSINGS_PER_ORBIT: u16 = 3564;

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// RNG seed
    pub seed: u64,
    /// Noise sigma in ADC counts
    pub noise_sigma: f64,
    /// Probability that a strip carries a signal hit
    pub occupancy: f64,
    pub signal_mean: f64,
    pub signal_sigma: f64,
    /// Mean APV common-mode level
    pub common_mode_level: f64,
    pub common_mode_sigma: f64,
    /// Add the common mode to strip values, as raw modes read it out
    pub include_common_mode: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            noise_sigma: 2.0,
            occupancy: 0.01,
            signal_mean: 80.0,
            signal_sigma: 20.0,
            common_mode_level: 128.0,
            common_mode_sigma: 5.0,
            include_common_mode: false,
        }
    }
}

/// Simulator errors
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("invalid {name} distribution: {source}")]
    Distribution {
        name: &'static str,
        #[source]
        source: NormalError,
    },

    #[error("occupancy {0} is outside [0, 1]")]
    Occupancy(f64),
}

/// One simulated event
#[derive(Debug, Clone)]
pub struct SimulatedEvent {
    pub id: EventId,
    /// 24,576 strip values in physical order
    pub strips: Vec<u16>,
    /// 192 APV common-mode medians
    pub medians: Vec<u16>,
}

impl SimulatedEvent {
    /// Strips above `threshold`
    pub fn hit_count(&self, threshold: u16) -> usize {
        self.strips.iter().filter(|&&v| v > threshold).count()
    }
}

fn normal(name: &'static str, mean: f64, sigma: f64) -> Result<Normal<f64>, SimulatorError> {
    Normal::new(mean, sigma).map_err(|source| SimulatorError::Distribution { name, source })
}

fn to_adc(value: f64) -> u16 {
    value.round().clamp(0.0, ADC_MAX as f64) as u16
}

/// Seeded strip data generator
pub struct StripSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    noise: Normal<f64>,
    signal: Normal<f64>,
    common_mode: Normal<f64>,
    event_number: u32,
}

impl StripSimulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        if !(0.0..=1.0).contains(&config.occupancy) {
            return Err(SimulatorError::Occupancy(config.occupancy));
        }
        let noise = normal("noise", 0.0, config.noise_sigma)?;
        let signal = normal("signal", config.signal_mean, config.signal_sigma)?;
        let common_mode = normal(
            "common mode",
            config.common_mode_level,
            config.common_mode_sigma,
        )?;

        info!(
            seed = config.seed,
            occupancy = config.occupancy,
            noise_sigma = config.noise_sigma,
            "Strip simulator initialised"
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            noise,
            signal,
            common_mode,
            event_number: 0,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Generate the next event; event numbers count up from 1
    pub fn next_event(&mut self) -> SimulatedEvent {
        self.event_number = self.event_number.wrapping_add(1) & EVENT_NUMBER_MAX;
        let bunch_crossing = self.rng.gen_range(0..BUNCH_CROSSINGS_PER_ORBIT);

        let medians: Vec<u16> = (0..APVS_PER_FED)
            .map(|_| to_adc(self.common_mode.sample(&mut self.rng)))
            .collect();

        let mut strips = Vec::with_capacity(STRIPS_PER_FED);
        for &median in &medians {
            let offset = if self.config.include_common_mode {
                median as f64
            } else {
                0.0
            };
            for _ in 0..STRIPS_PER_APV {
                let mut value = self.noise.sample(&mut self.rng) + offset;
                if self.rng.gen_bool(self.config.occupancy) {
                    value += self.signal.sample(&mut self.rng);
                }
                strips.push(to_adc(value));
            }
        }

        let event = SimulatedEvent {
            id: EventId {
                event_number: self.event_number,
                bunch_crossing,
            },
            strips,
            medians,
        };
        debug!(
            event_number = event.id.event_number,
            bunch_crossing,
            "Simulated event"
        );
        event
    }
}

impl Iterator for StripSimulator {
    type Item = SimulatedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_event())
    }
}
