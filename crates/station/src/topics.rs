//! MQTT topic scheme, wire payload formatting, and inbound command parsing.

// ---------------------------------------------------------------------------
// Topic suffixes
// ---------------------------------------------------------------------------

pub const ONLINE_SUFFIX: &str = "/online";
pub const UPTIME_SUFFIX: &str = "/uptime";
pub const TEMPERATURE_SUFFIX: &str = "/sensor/temperature";
pub const HUMIDITY_SUFFIX: &str = "/sensor/humidity";
pub const LUMINOSITY_SUFFIX: &str = "/sensor/luminosity";
pub const RAIN_SUFFIX: &str = "/sensor/rain";

/// Command topics subscribed after connect. The subscribe and unsubscribe
/// rounds both walk this list in order.
pub const COMMAND_SUFFIXES: [&str; 3] = ["/print", "/ping", "/exit"];

// ---------------------------------------------------------------------------
// Topic scheme
// ---------------------------------------------------------------------------

/// Maps between full wire topics and the local suffix namespace. With
/// `unique_topic` enabled the base is `/<client_id>`, giving each device
/// its own namespace on a shared broker; otherwise the base is empty.
#[derive(Debug, Clone)]
pub struct TopicScheme {
    base: String,
}

impl TopicScheme {
    pub fn new(unique_topic: bool, client_id: &str) -> Self {
        let base = if unique_topic {
            format!("/{client_id}")
        } else {
            String::new()
        };
        Self { base }
    }

    /// Full wire topic for a local suffix.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}{}", self.base, suffix)
    }

    /// Strip the base from an incoming topic. `None` when the topic lies
    /// outside this device's namespace.
    pub fn suffix<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let rest = topic.strip_prefix(self.base.as_str())?;
        if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

/// Remote command carried on a subscribed topic. Consumed immediately by
/// the session dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    Print(String),
    Ping,
    Exit,
}

impl InboundCommand {
    /// Parse a command from a topic suffix and payload. An unrecognised
    /// suffix is not an error; the caller drops it.
    pub fn parse(suffix: &str, payload: &[u8]) -> Option<Self> {
        match suffix {
            "/print" => Some(Self::Print(String::from_utf8_lossy(payload).into_owned())),
            "/ping" => Some(Self::Ping),
            "/exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload formatting
// ---------------------------------------------------------------------------

/// One decimal, °C.
pub fn format_celsius(v: f32) -> String {
    format!("{v:.1}")
}

/// One decimal, %RH.
pub fn format_humidity(v: f32) -> String {
    format!("{v:.1}")
}

/// Two decimals, lux. The unknown sentinel is forwarded as-is.
pub fn format_lux(v: f32) -> String {
    format!("{v:.2}")
}

pub fn format_rain(raining: bool) -> &'static str {
    if raining {
        "1"
    } else {
        "0"
    }
}

/// Seconds since boot, decimal text.
pub fn format_uptime_secs(secs: u64) -> String {
    secs.to_string()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::LUX_UNKNOWN;

    // -- TopicScheme -------------------------------------------------------

    #[test]
    fn shared_namespace_has_empty_base() {
        let scheme = TopicScheme::new(false, "station0001");
        assert_eq!(scheme.topic("/sensor/temperature"), "/sensor/temperature");
    }

    #[test]
    fn unique_namespace_prefixes_client_id() {
        let scheme = TopicScheme::new(true, "station0001");
        assert_eq!(
            scheme.topic("/sensor/temperature"),
            "/station0001/sensor/temperature"
        );
    }

    #[test]
    fn suffix_round_trips_shared() {
        let scheme = TopicScheme::new(false, "station0001");
        assert_eq!(scheme.suffix("/print"), Some("/print"));
    }

    #[test]
    fn suffix_round_trips_unique() {
        let scheme = TopicScheme::new(true, "station0001");
        assert_eq!(scheme.suffix("/station0001/print"), Some("/print"));
    }

    #[test]
    fn suffix_rejects_foreign_namespace() {
        let scheme = TopicScheme::new(true, "station0001");
        assert_eq!(scheme.suffix("/station0002/print"), None);
    }

    #[test]
    fn suffix_rejects_base_without_separator() {
        let scheme = TopicScheme::new(true, "station0001");
        assert_eq!(scheme.suffix("/station0001print"), None);
    }

    // -- InboundCommand ----------------------------------------------------

    #[test]
    fn parse_print_carries_payload_text() {
        assert_eq!(
            InboundCommand::parse("/print", b"hello"),
            Some(InboundCommand::Print("hello".to_string()))
        );
    }

    #[test]
    fn parse_ping_ignores_payload() {
        assert_eq!(
            InboundCommand::parse("/ping", b"anything"),
            Some(InboundCommand::Ping)
        );
    }

    #[test]
    fn parse_exit() {
        assert_eq!(InboundCommand::parse("/exit", b""), Some(InboundCommand::Exit));
    }

    #[test]
    fn parse_unknown_suffix_is_none() {
        assert_eq!(InboundCommand::parse("/led", b"on"), None);
        assert_eq!(InboundCommand::parse("/sensor/temperature", b"21.0"), None);
    }

    #[test]
    fn parse_print_lossy_on_invalid_utf8() {
        let cmd = InboundCommand::parse("/print", &[0xff, 0xfe]).unwrap();
        assert!(matches!(cmd, InboundCommand::Print(_)));
    }

    // -- Payload formatting ------------------------------------------------

    #[test]
    fn celsius_one_decimal() {
        assert_eq!(format_celsius(36.04), "36.0");
        assert_eq!(format_celsius(-3.25), "-3.2");
    }

    #[test]
    fn humidity_one_decimal() {
        assert_eq!(format_humidity(48.27), "48.3");
    }

    #[test]
    fn lux_two_decimals() {
        assert_eq!(format_lux(123.456), "123.46");
    }

    #[test]
    fn lux_sentinel_forwarded() {
        assert_eq!(format_lux(LUX_UNKNOWN), "-1.00");
    }

    #[test]
    fn rain_flag_binary() {
        assert_eq!(format_rain(true), "1");
        assert_eq!(format_rain(false), "0");
    }

    #[test]
    fn uptime_decimal_text() {
        assert_eq!(format_uptime_secs(0), "0");
        assert_eq!(format_uptime_secs(4242), "4242");
    }
}
