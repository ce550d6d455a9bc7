//! Fixed-layout status frame for the front panel.

use tracing::debug;

use crate::sensors::Readings;

pub const FRAME_LINES: usize = 4;

/// Render the four latest readings into the fixed panel layout. Stateless;
/// a failed light reading shows the sentinel value as-is.
pub fn render(r: &Readings) -> [String; FRAME_LINES] {
    [
        format!("Light: {:.2} lux", r.luminosity),
        format!("Temp: {:.1}C", r.temperature),
        format!("Humidity: {:.1}%", r.humidity),
        format!("Rain: {}", if r.raining { "yes" } else { "no" }),
    ]
}

/// Stand-in for the panel driver: logs frames as their content changes.
/// The pixel pipeline behind the real panel is a separate concern.
pub struct StatusDisplay {
    last_frame: Option<[String; FRAME_LINES]>,
}

impl StatusDisplay {
    pub fn new() -> Self {
        Self { last_frame: None }
    }

    pub fn show(&mut self, frame: [String; FRAME_LINES]) {
        if self.last_frame.as_ref() == Some(&frame) {
            return;
        }
        debug!(target: "display", "{}", frame.join(" | "));
        self.last_frame = Some(frame);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::LUX_UNKNOWN;

    #[test]
    fn frame_layout() {
        let r = Readings {
            temperature: 24.53,
            humidity: 48.27,
            luminosity: 132.456,
            raining: false,
        };
        assert_eq!(
            render(&r),
            [
                "Light: 132.46 lux".to_string(),
                "Temp: 24.5C".to_string(),
                "Humidity: 48.3%".to_string(),
                "Rain: no".to_string(),
            ]
        );
    }

    #[test]
    fn rain_line_yes() {
        let r = Readings {
            raining: true,
            ..Readings::default()
        };
        assert_eq!(render(&r)[3], "Rain: yes");
    }

    #[test]
    fn unknown_light_shows_sentinel() {
        let r = Readings {
            luminosity: LUX_UNKNOWN,
            ..Readings::default()
        };
        assert_eq!(render(&r)[0], "Light: -1.00 lux");
    }

    #[test]
    fn show_caches_last_frame() {
        let mut display = StatusDisplay::new();
        let frame = render(&Readings::default());
        display.show(frame.clone());
        display.show(frame.clone());
        assert_eq!(display.last_frame, Some(frame));
    }
}
