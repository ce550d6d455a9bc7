//! Alarm indicators: red/blue/green LEDs plus the two buzzers. The `gpio`
//! feature gates the real rppal outputs; without it, a mock implementation
//! tracks state and logs transitions.

#[cfg(not(feature = "gpio"))]
use anyhow::Result;

#[cfg(not(feature = "gpio"))]
use crate::config::PinConfig;

// ---------------------------------------------------------------------------
// Real panel (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
mod real {
    use std::thread;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use rppal::gpio::{Gpio, OutputPin};
    use rppal::pwm::{Channel, Polarity, Pwm};
    use tracing::warn;

    use crate::config::PinConfig;

    /// Pattern A, the critical-condition tone.
    const CRITICAL_TONE_HZ: f64 = 2000.0;
    /// Pattern B, the rain tone.
    const RAIN_TONE_HZ: f64 = 1200.0;
    /// Bounded beep length; the loop resumes as soon as it ends.
    const BEEP_LEN: Duration = Duration::from_millis(60);

    pub struct IndicatorPanel {
        red: OutputPin,
        green: OutputPin,
        blue: OutputPin,
        buzzer_a: Pwm,
        buzzer_b: Pwm,
    }

    impl IndicatorPanel {
        pub fn new(pins: &PinConfig) -> Result<Self> {
            let gpio = Gpio::new().context("opening GPIO")?;
            let mut red = gpio.get(pins.red_led)?.into_output();
            let mut green = gpio.get(pins.green_led)?.into_output();
            let mut blue = gpio.get(pins.blue_led)?.into_output();
            red.set_low();
            green.set_low();
            blue.set_low();

            // Hardware PWM channels 0/1 (BCM 18/19).
            let buzzer_a =
                Pwm::with_frequency(Channel::Pwm0, CRITICAL_TONE_HZ, 0.5, Polarity::Normal, false)
                    .context("opening buzzer A pwm")?;
            let buzzer_b =
                Pwm::with_frequency(Channel::Pwm1, RAIN_TONE_HZ, 0.5, Polarity::Normal, false)
                    .context("opening buzzer B pwm")?;

            Ok(Self {
                red,
                green,
                blue,
                buzzer_a,
                buzzer_b,
            })
        }

        pub fn set_red(&mut self, on: bool) {
            set(&mut self.red, on);
        }

        pub fn set_green(&mut self, on: bool) {
            set(&mut self.green, on);
        }

        pub fn set_blue(&mut self, on: bool) {
            set(&mut self.blue, on);
        }

        pub fn buzz_critical(&mut self) {
            beep(&self.buzzer_a);
        }

        pub fn buzz_rain(&mut self) {
            beep(&self.buzzer_b);
        }
    }

    fn set(pin: &mut OutputPin, on: bool) {
        if on {
            pin.set_high();
        } else {
            pin.set_low();
        }
    }

    fn beep(pwm: &Pwm) {
        if let Err(e) = pwm.enable() {
            warn!("buzzer enable failed: {e}");
            return;
        }
        thread::sleep(BEEP_LEN);
        if let Err(e) = pwm.disable() {
            warn!("buzzer disable failed: {e}");
        }
    }
}

#[cfg(feature = "gpio")]
pub use real::IndicatorPanel;

// ---------------------------------------------------------------------------
// Mock panel (development — no hardware, logs transitions)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct IndicatorPanel {
    pub(crate) red: bool,
    pub(crate) green: bool,
    pub(crate) blue: bool,
    pub(crate) critical_beeps: u32,
    pub(crate) rain_beeps: u32,
}

#[cfg(not(feature = "gpio"))]
impl IndicatorPanel {
    pub fn new(_pins: &PinConfig) -> Result<Self> {
        tracing::debug!("[mock-panel] indicator panel initialised (no hardware)");
        Ok(Self {
            red: false,
            green: false,
            blue: false,
            critical_beeps: 0,
            rain_beeps: 0,
        })
    }

    pub fn set_red(&mut self, on: bool) {
        if self.red != on {
            tracing::debug!("[mock-panel] red led {}", if on { "on" } else { "off" });
        }
        self.red = on;
    }

    pub fn set_green(&mut self, on: bool) {
        if self.green != on {
            tracing::debug!("[mock-panel] green led {}", if on { "on" } else { "off" });
        }
        self.green = on;
    }

    pub fn set_blue(&mut self, on: bool) {
        if self.blue != on {
            tracing::debug!("[mock-panel] blue led {}", if on { "on" } else { "off" });
        }
        self.blue = on;
    }

    pub fn buzz_critical(&mut self) {
        self.critical_beeps += 1;
        tracing::info!("[mock-panel] critical alarm beep");
    }

    pub fn buzz_rain(&mut self) {
        self.rain_beeps += 1;
        tracing::info!("[mock-panel] rain alarm beep");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
