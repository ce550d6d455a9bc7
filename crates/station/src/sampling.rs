//! Per-sensor sampling cadence and the scheduler tick.
//!
//! Each sensor keeps its own interval; one sensor being slow or failing
//! never delays another. A failed attempt still consumes the interval, so a
//! dead sensor is retried once per cadence instead of every loop pass.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::SamplingConfig;
use crate::sensors::{
    ClimateSensor, LightSensor, RainSensor, Readings, SensorReading, LUX_UNKNOWN,
};

// ---------------------------------------------------------------------------
// Cadence bookkeeping
// ---------------------------------------------------------------------------

/// Sampling cadence for one sensor.
#[derive(Debug)]
pub struct SamplingState {
    last_attempt_at: Instant,
    interval: Duration,
}

impl SamplingState {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            last_attempt_at: now,
            interval,
        }
    }

    /// Due iff the full interval has elapsed since the last attempt,
    /// successful or not.
    pub fn due(&self, now: Instant) -> bool {
        now.duration_since(self.last_attempt_at) >= self.interval
    }

    pub fn mark_attempt(&mut self, now: Instant) {
        self.last_attempt_at = now;
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The three sensor adapters plus their cadences and the latest-readings
/// cache. Owned by the main loop.
pub struct SensorBank<L, C, R> {
    light: L,
    climate: C,
    rain: R,
    light_cadence: SamplingState,
    climate_cadence: SamplingState,
    rain_cadence: SamplingState,
    readings: Readings,
}

impl<L: LightSensor, C: ClimateSensor, R: RainSensor> SensorBank<L, C, R> {
    pub fn new(light: L, climate: C, rain: R, cfg: &SamplingConfig, now: Instant) -> Self {
        Self {
            light,
            climate,
            rain,
            light_cadence: SamplingState::new(Duration::from_millis(cfg.light_interval_ms), now),
            climate_cadence: SamplingState::new(
                Duration::from_millis(cfg.climate_interval_ms),
                now,
            ),
            rain_cadence: SamplingState::new(Duration::from_millis(cfg.rain_interval_ms), now),
            readings: Readings::default(),
        }
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    /// Sample every sensor whose interval has elapsed and fold the results
    /// into the readings cache. Returns what was sampled this tick.
    ///
    /// Failure policy is asymmetric on purpose: light is not
    /// safety-relevant, so a failed read surfaces as the unknown sentinel;
    /// the alarm logic depends on temperature/humidity continuity, so a
    /// failed climate read keeps the last good pair.
    pub fn tick(&mut self, now: Instant) -> Vec<SensorReading> {
        let mut sampled = Vec::new();

        if self.light_cadence.due(now) {
            match self.light.sample() {
                Ok(lux) => {
                    self.readings.luminosity = lux;
                    debug!(lux, "light sample");
                }
                Err(e) => {
                    self.readings.luminosity = LUX_UNKNOWN;
                    warn!("light read failed: {e:#}");
                }
            }
            self.light_cadence.mark_attempt(now);
            sampled.push(SensorReading::Luminosity(self.readings.luminosity));
        }

        if self.climate_cadence.due(now) {
            match self.climate.sample() {
                Ok(s) => {
                    self.readings.temperature = s.temperature;
                    self.readings.humidity = s.humidity;
                    debug!(
                        temperature = s.temperature,
                        humidity = s.humidity,
                        "climate sample"
                    );
                }
                Err(e) => {
                    warn!("climate read failed, keeping last good values: {e:#}");
                }
            }
            self.climate_cadence.mark_attempt(now);
            sampled.push(SensorReading::Climate {
                temperature: self.readings.temperature,
                humidity: self.readings.humidity,
            });
        }

        if self.rain_cadence.due(now) {
            match self.rain.sample() {
                Ok(raining) => {
                    self.readings.raining = raining;
                    debug!(raining, "rain sample");
                }
                Err(e) => {
                    warn!("rain read failed, keeping last state: {e:#}");
                }
            }
            self.rain_cadence.mark_attempt(now);
            sampled.push(SensorReading::Rain(self.readings.raining));
        }

        sampled
    }
}

// ===========================================================================
// Tests
// ===========================================================================
