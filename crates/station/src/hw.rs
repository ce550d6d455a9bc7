//! Raspberry Pi sensor adapters (`gpio` feature): BH1750 light sensor over
//! I2C, DHT22 temperature/humidity on a single GPIO line, and the rain
//! board's digital comparator output.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rppal::gpio::{Gpio, InputPin, IoPin, Level, Mode};
use rppal::i2c::I2c;
use tracing::info;

use crate::sensors::{ClimateSample, ClimateSensor, LightSensor, RainSensor};

// ── BH1750 ──────────────────────────────────────────────────────────────────

const BH1750_POWER_ON: u8 = 0x01;
const BH1750_ONE_TIME_HIGH_RES: u8 = 0x20;
/// One-time high-res measurement completes within 180 ms (datasheet max).
const BH1750_SETTLE: Duration = Duration::from_millis(180);
/// Counts-to-lux divisor at the default measurement accuracy.
const BH1750_LUX_SCALE: f32 = 1.2;

pub struct Bh1750 {
    i2c: I2c,
}

impl Bh1750 {
    pub fn new(addr: u16) -> Result<Self> {
        let mut i2c = I2c::new().context("opening I2C bus")?;
        i2c.set_slave_address(addr)?;
        i2c.write(&[BH1750_POWER_ON])?;
        info!(addr = format_args!("0x{addr:02x}"), "bh1750 initialised");
        Ok(Self { i2c })
    }
}

impl LightSensor for Bh1750 {
    /// Triggers a one-time measurement, waits out the settle time, then
    /// reads the result. The wait is bounded and the reading is available
    /// to the caller within the same loop iteration.
    fn sample(&mut self) -> Result<f32> {
        self.i2c.write(&[BH1750_ONE_TIME_HIGH_RES])?;
        thread::sleep(BH1750_SETTLE);
        let mut buf = [0u8; 2];
        self.i2c.read(&mut buf)?;
        Ok(u16::from_be_bytes(buf) as f32 / BH1750_LUX_SCALE)
    }
}

// ── DHT22 ───────────────────────────────────────────────────────────────────

/// Host start signal: pull the line low for at least 1 ms.
const DHT_START_LOW: Duration = Duration::from_millis(2);
/// A high pulse longer than this is a 1 bit (0 ≈ 26-28 µs, 1 ≈ 70 µs).
const DHT_BIT_THRESHOLD: Duration = Duration::from_micros(50);
/// Upper bound on any single edge wait; exceeding it loses the read.
const DHT_EDGE_TIMEOUT: Duration = Duration::from_micros(300);

pub struct Dht22 {
    pin: IoPin,
}

impl Dht22 {
    pub fn new(pin: u8) -> Result<Self> {
        let io = Gpio::new()
            .context("opening GPIO")?
            .get(pin)?
            .into_io(Mode::Input);
        info!(pin, "dht22 initialised");
        Ok(Self { pin: io })
    }

    /// Busy-wait until the line reads `level`, returning the time spent at
    /// the previous level.
    fn wait_for(&self, level: Level) -> Result<Duration> {
        let start = Instant::now();
        while self.pin.read() != level {
            if start.elapsed() > DHT_EDGE_TIMEOUT {
                bail!("timeout waiting for {level:?} edge");
            }
        }
        Ok(start.elapsed())
    }
}

impl ClimateSensor for Dht22 {
    fn sample(&mut self) -> Result<ClimateSample> {
        // Start signal, then hand the line back to the sensor.
        self.pin.set_mode(Mode::Output);
        self.pin.set_low();
        thread::sleep(DHT_START_LOW);
        self.pin.set_mode(Mode::Input);

        // Sensor response preamble: ~80 µs low, ~80 µs high, then data.
        self.wait_for(Level::Low)?;
        self.wait_for(Level::High)?;
        self.wait_for(Level::Low)?;

        // 40 data bits, each a ~50 µs low separator followed by a high
        // pulse whose width encodes the bit.
        let mut bytes = [0u8; 5];
        for i in 0..40 {
            self.wait_for(Level::High)?;
            let high = self.wait_for(Level::Low)?;
            if high >= DHT_BIT_THRESHOLD {
                bytes[i / 8] |= 1 << (7 - i % 8);
            }
        }

        let sum = bytes[0]
            .wrapping_add(bytes[1])
            .wrapping_add(bytes[2])
            .wrapping_add(bytes[3]);
        if sum != bytes[4] {
            bail!("checksum mismatch");
        }

        let humidity = u16::from_be_bytes([bytes[0], bytes[1]]) as f32 / 10.0;
        // Temperature sign lives in the top bit of the word.
        let raw_temp = u16::from_be_bytes([bytes[2], bytes[3]]);
        let temperature = if raw_temp & 0x8000 != 0 {
            -f32::from(raw_temp & 0x7fff) / 10.0
        } else {
            f32::from(raw_temp) / 10.0
        };

        Ok(ClimateSample {
            temperature,
            humidity,
        })
    }
}

// ── Rain sensor ─────────────────────────────────────────────────────────────

/// Comparator boards pull the digital output low while the grid is wet.
pub struct RainSense {
    pin: InputPin,
}

impl RainSense {
    pub fn new(pin: u8) -> Result<Self> {
        let input = Gpio::new()
            .context("opening GPIO")?
            .get(pin)?
            .into_input_pullup();
        info!(pin, "rain sensor initialised");
        Ok(Self { pin: input })
    }
}

impl RainSensor for RainSense {
    fn sample(&mut self) -> Result<bool> {
        Ok(self.pin.is_low())
    }
}
