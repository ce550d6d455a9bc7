//! Environmental monitoring node: samples light, climate and rain sensors
//! on independent cadences, drives local alarm indicators, renders a status
//! frame, and relays telemetry to an MQTT broker while accepting remote
//! `print`/`ping`/`exit` commands.
//!
//! Single-threaded and cooperative: one loop interleaves the sampling
//! scheduler, the alarm timers and the broker session; the session's event
//! pump is the only suspension point.

mod alarm;
mod conditions;
mod config;
mod display;
#[cfg(feature = "gpio")]
mod hw;
mod indicators;
mod sampling;
mod sensors;
mod session;
#[cfg(feature = "sim")]
mod sim;
mod topics;

#[cfg(not(any(feature = "sim", feature = "gpio")))]
compile_error!("enable either the `sim` or the `gpio` feature");

use std::{
    env, thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alarm::AlarmTimer;
use display::StatusDisplay;
use indicators::IndicatorPanel;
use sampling::SensorBank;
use session::Session;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "station.toml".to_string());
    let cfg = config::load(&config_path)?;

    let started_at = Instant::now();
    let (light, climate, rain) = build_sensors(&cfg)?;
    let mut panel = IndicatorPanel::new(&cfg.pins)?;
    let mut screen = StatusDisplay::new();
    let mut bank = SensorBank::new(light, climate, rain, &cfg.sampling, started_at);
    let mut critical_alarm = AlarmTimer::new(Duration::from_millis(cfg.alarms.critical_interval_ms));
    let mut rain_alarm = AlarmTimer::new(Duration::from_millis(cfg.alarms.rain_interval_ms));

    let mut session = Session::connect(&cfg.broker, started_at)?;

    let publish_interval = Duration::from_millis(cfg.sampling.publish_interval_ms);
    let tick_quantum = Duration::from_millis(cfg.sampling.tick_ms);
    let mut last_publish = started_at;

    info!("node started");

    loop {
        let now = Instant::now();

        bank.tick(now);
        let conditions = conditions::evaluate(&cfg.thresholds, bank.readings());

        if critical_alarm.update(conditions.critical, now) {
            panel.buzz_critical();
            panel.set_red(true);
        }
        if !conditions.critical {
            panel.set_red(false);
        }

        if rain_alarm.update(conditions.wet, now) {
            panel.buzz_rain();
            panel.set_blue(true);
        }
        if !conditions.wet {
            panel.set_blue(false);
        }

        // All-clear indicator, computed after both alarm evaluations.
        panel.set_green(!conditions.critical && !conditions.wet);

        screen.show(display::render(bank.readings()));

        if session.is_connected() && now.duration_since(last_publish) >= publish_interval {
            session.publish_telemetry(bank.readings());
            last_publish = now;
        }

        session.pump(bank.readings())?;
        if session.is_disconnected() {
            break;
        }

        thread::sleep(tick_quantum);
    }

    info!("session closed, node stopping");
    Ok(())
}

#[cfg(all(feature = "sim", not(feature = "gpio")))]
fn build_sensors(_cfg: &config::Config) -> Result<(sim::SimLight, sim::SimClimate, sim::SimRain)> {
    let scenario = sim::Scenario::from_str_lossy(&env::var("SIM_SCENARIO").unwrap_or_default());
    info!(%scenario, "using simulated sensors");
    Ok((
        sim::SimLight::new(scenario),
        sim::SimClimate::new(scenario),
        sim::SimRain::new(scenario),
    ))
}

#[cfg(feature = "gpio")]
fn build_sensors(cfg: &config::Config) -> Result<(hw::Bh1750, hw::Dht22, hw::RainSense)> {
    Ok((
        hw::Bh1750::new(cfg.pins.light_sensor_addr)?,
        hw::Dht22::new(cfg.pins.climate_sensor)?,
        hw::RainSense::new(cfg.pins.rain_sensor)?,
    ))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;
    use crate::config::Config;

    // Exercises the indicator protocol of one loop pass, as `main` runs it.

    #[test]
    fn rain_held_for_1200ms_beeps_twice_and_blocks_green() {
        let cfg = Config::default();
        let mut panel = IndicatorPanel::new(&cfg.pins).unwrap();
        let mut rain_alarm = AlarmTimer::new(Duration::from_millis(600));
        let t0 = Instant::now();

        let mut t = 0u64;
        while t < 1200 {
            let now = t0 + Duration::from_millis(t);
            let wet = true;
            if rain_alarm.update(wet, now) {
                panel.buzz_rain();
                panel.set_blue(true);
            }
            if !wet {
                panel.set_blue(false);
            }
            panel.set_green(!wet);
            assert!(!panel.green, "green must stay off while raining");
            t += 100;
        }

        assert_eq!(panel.rain_beeps, 2);
        assert!(panel.blue);
    }

    #[test]
    fn all_clear_restores_green_and_drops_red() {
        let cfg = Config::default();
        let mut panel = IndicatorPanel::new(&cfg.pins).unwrap();
        let mut critical_alarm = AlarmTimer::new(Duration::from_millis(250));
        let t0 = Instant::now();

        let critical = true;
        if critical_alarm.update(critical, t0) {
            panel.buzz_critical();
            panel.set_red(true);
        }
        panel.set_green(!critical);
        assert!(panel.red);
        assert!(!panel.green);

        // Condition clears on the next pass.
        let critical = false;
        if critical_alarm.update(critical, t0 + Duration::from_millis(100)) {
            panel.buzz_critical();
            panel.set_red(true);
        }
        if !critical {
            panel.set_red(false);
        }
        panel.set_green(!critical);
        assert!(!panel.red);
        assert!(panel.green);
        assert_eq!(panel.critical_beeps, 1);
    }
}
