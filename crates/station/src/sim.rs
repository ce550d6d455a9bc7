//! Simulated environment sensors for broker-and-laptop development.
//!
//! Models just enough realism to exercise the alarm and telemetry paths:
//! - temperature/humidity random walk with mean reversion toward a
//!   scenario operating point
//! - diurnal light cycle with electronic noise
//! - episodic rain with scenario onset/stop probabilities
//! - injected read failures (sensor flakiness)

use std::fmt;

use anyhow::{bail, Result};

use crate::sensors::{ClimateSample, ClimateSensor, LightSensor, RainSensor};

/// Day/night cycle length for the simulated light level. Ten minutes makes
/// the full swing visible in a dev session.
const DIURNAL_PERIOD_S: f64 = 600.0;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Mid-range temperature and humidity, rare rain. The node should sit
    /// on the green indicator almost the whole time.
    Calm,
    /// Hot and dry; drifts across the upper temperature threshold and
    /// exercises the critical alarm.
    Heatwave,
    /// Humid with frequent rain episodes; exercises the rain alarm and the
    /// humidity threshold.
    Monsoon,
    /// Calm operating point but noisy, with ~10% failed reads. Tests the
    /// sentinel/stale policies.
    Flaky,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "heatwave" => Self::Heatwave,
            "monsoon" => Self::Monsoon,
            "flaky" => Self::Flaky,
            _ => Self::Calm, // default
        }
    }

    fn params(self) -> ScenarioParams {
        match self {
            Self::Calm => ScenarioParams {
                temp_center: 22.0,
                hum_center: 50.0,
                walk_sigma: 0.15,
                mean_reversion: 0.05,
                fail_prob: 0.01,
                rain_start_prob: 0.01,
                rain_stop_prob: 0.10,
                lux_peak: 12_000.0,
                lux_noise_sigma: 150.0,
            },
            Self::Heatwave => ScenarioParams {
                temp_center: 37.0,
                hum_center: 26.0,
                walk_sigma: 0.30,
                mean_reversion: 0.04,
                fail_prob: 0.01,
                rain_start_prob: 0.001,
                rain_stop_prob: 0.50,
                lux_peak: 20_000.0,
                lux_noise_sigma: 250.0,
            },
            Self::Monsoon => ScenarioParams {
                temp_center: 24.0,
                hum_center: 82.0,
                walk_sigma: 0.25,
                mean_reversion: 0.04,
                fail_prob: 0.01,
                rain_start_prob: 0.15,
                rain_stop_prob: 0.05,
                lux_peak: 4_000.0,
                lux_noise_sigma: 200.0,
            },
            Self::Flaky => ScenarioParams {
                temp_center: 22.0,
                hum_center: 50.0,
                walk_sigma: 1.20,
                mean_reversion: 0.03,
                fail_prob: 0.10,
                rain_start_prob: 0.02,
                rain_stop_prob: 0.10,
                lux_peak: 12_000.0,
                lux_noise_sigma: 800.0,
            },
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calm => write!(f, "calm"),
            Self::Heatwave => write!(f, "heatwave"),
            Self::Monsoon => write!(f, "monsoon"),
            Self::Flaky => write!(f, "flaky"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScenarioParams {
    temp_center: f64,
    hum_center: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    fail_prob: f32,
    rain_start_prob: f32,
    rain_stop_prob: f32,
    lux_peak: f64,
    lux_noise_sigma: f64,
}

// ---------------------------------------------------------------------------
// Light
// ---------------------------------------------------------------------------

pub struct SimLight {
    params: ScenarioParams,
}

impl SimLight {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            params: scenario.params(),
        }
    }
}

impl LightSensor for SimLight {
    fn sample(&mut self) -> Result<f32> {
        if fastrand::f32() < self.params.fail_prob {
            bail!("simulated light sensor fault");
        }
        // Sinusoidal day/night cycle on wall-clock time, like a window-
        // mounted sensor.
        let now_s = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let phase = 2.0 * std::f64::consts::PI * now_s / DIURNAL_PERIOD_S;
        let daylight = self.params.lux_peak * (phase.sin() + 1.0) / 2.0;
        let lux = gaussian(daylight, self.params.lux_noise_sigma).max(0.0);
        Ok(lux as f32)
    }
}

// ---------------------------------------------------------------------------
// Climate
// ---------------------------------------------------------------------------

pub struct SimClimate {
    params: ScenarioParams,
    temperature: f64,
    humidity: f64,
}

impl SimClimate {
    pub fn new(scenario: Scenario) -> Self {
        let params = scenario.params();
        Self {
            params,
            temperature: gaussian(params.temp_center, 1.0),
            humidity: gaussian(params.hum_center, 3.0).clamp(0.0, 100.0),
        }
    }
}

impl ClimateSensor for SimClimate {
    fn sample(&mut self) -> Result<ClimateSample> {
        if fastrand::f32() < self.params.fail_prob {
            bail!("simulated climate sensor fault");
        }
        let p = &self.params;
        self.temperature += p.mean_reversion * (p.temp_center - self.temperature)
            + gaussian(0.0, p.walk_sigma);
        self.humidity += p.mean_reversion * (p.hum_center - self.humidity)
            + gaussian(0.0, p.walk_sigma * 4.0);
        self.temperature = self.temperature.clamp(-20.0, 60.0);
        self.humidity = self.humidity.clamp(0.0, 100.0);
        Ok(ClimateSample {
            temperature: self.temperature as f32,
            humidity: self.humidity as f32,
        })
    }
}

// ---------------------------------------------------------------------------
// Rain
// ---------------------------------------------------------------------------

pub struct SimRain {
    params: ScenarioParams,
    raining: bool,
}

impl SimRain {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            params: scenario.params(),
            raining: false,
        }
    }
}

impl RainSensor for SimRain {
    fn sample(&mut self) -> Result<bool> {
        // Episodic: each sample may start or stop an episode.
        if self.raining {
            if fastrand::f32() < self.params.rain_stop_prob {
                self.raining = false;
            }
        } else if fastrand::f32() < self.params.rain_start_prob {
            self.raining = true;
        }
        Ok(self.raining)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
