//! Sensor adapter contracts and the latest-readings cache.
//!
//! The raw bus protocols (I2C register dance, single-wire timing decode,
//! comparator output) live behind these traits; the `sim` or `gpio` feature
//! picks the implementation. The sampling scheduler only ever sees
//! `sample() -> Result<...>`.

use anyhow::Result;

/// Value published and displayed when the light sensor could not be read.
/// A stale light value is never reused; the failure must stay visible.
pub const LUX_UNKNOWN: f32 = -1.0;

/// Ambient light, lux.
pub trait LightSensor {
    fn sample(&mut self) -> Result<f32>;
}

/// One combined temperature/humidity measurement. The two values come off
/// the same sensor in a single bus transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateSample {
    pub temperature: f32,
    pub humidity: f32,
}

/// Temperature (°C) and relative humidity (%RH).
pub trait ClimateSensor {
    fn sample(&mut self) -> Result<ClimateSample>;
}

/// Rain board digital output: true while the grid is wet.
pub trait RainSensor {
    fn sample(&mut self) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Latest readings
// ---------------------------------------------------------------------------

/// Latest value per sensor, updated by the sampling scheduler and read by
/// the evaluator, renderer and publisher. Copied by value between stages;
/// nothing shares ownership of a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub temperature: f32,
    pub humidity: f32,
    pub luminosity: f32,
    pub raining: bool,
}

impl Default for Readings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            luminosity: LUX_UNKNOWN,
            raining: false,
        }
    }
}

/// Outcome of one sampled sensor in a scheduler tick. Values are
/// post-policy: a failed light read is already the sentinel, a failed
/// climate read the retained last-good pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    Luminosity(f32),
    Climate { temperature: f32, humidity: f32 },
    Rain(bool),
}
