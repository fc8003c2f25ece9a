//! Typed values out of sanitized console text.
//!
//! Every extractor is total: a missing label, a garbled number or an
//! unparsable value yields the documented default instead of an error, so a
//! cycle always produces a well-formed [`Reading`][rpsu_types::Reading].
//!
//! | Extractor | Pattern (case-insensitive) | Default |
//! |---|---|---|
//! | [`extract_value`] | `<label> [:=] <signed decimal>` | `"0"` |
//! | [`extract_rpsu_status`] | `RPSU Status[:=] ON\|OFF` | `Off` |
//! | [`extract_uptime`] | `RPSU Uptime[:=] <digits>` | `0` |
//! | [`extract_temperature`] | `Temperature [:=] <decimal> C` | `"0.0"` |

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::Regex;
use rpsu_types::RpsuStatus;

static RPSU_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)RPSU Status[:=]\s*(ON|OFF)").expect("status pattern is valid")
});

static RPSU_UPTIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)RPSU Uptime[:=]\s*(\d+)").expect("uptime pattern is valid"));

static TEMPERATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Temperature\s*[:=]\s*([0-9.]+)\s*C").expect("temperature pattern is valid")
});

/// Compiled `<label> [:=] <number>` patterns, keyed by label.
static LABEL_PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn label_pattern(label: &str) -> Option<Regex> {
    let mut cache = LABEL_PATTERNS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = cache.get(label) {
        return Some(re.clone());
    }
    let pattern = format!(r"(?i){}\s*[:=]\s*([-\d.]+)", regex::escape(label));
    let re = Regex::new(&pattern).ok()?;
    cache.insert(label.to_string(), re.clone());
    Some(re)
}

/// First number following `label` and `:` or `=`, as text; `"0"` if absent.
///
/// The label is matched literally and case-insensitively, so `"Current"`
/// also finds `"CURRENT = -3.5"`. A run of signs, digits and dots that is not
/// a decimal number (`"-"`, `"1.2.3"`, `"--5"`) also yields `"0"`.
pub fn extract_value(text: &str, label: &str) -> String {
    label_pattern(label)
        .and_then(|re| re.captures(text).map(|caps| caps[1].to_string()))
        .filter(|value| value.parse::<f64>().is_ok())
        .unwrap_or_else(|| "0".to_string())
}

/// Board power state; `Off` when the label is missing.
pub fn extract_rpsu_status(text: &str) -> RpsuStatus {
    RPSU_STATUS
        .captures(text)
        .map(|caps| RpsuStatus::parse(&caps[1]))
        .unwrap_or(RpsuStatus::Off)
}

/// Board uptime in hours; `0` when missing or out of range.
pub fn extract_uptime(text: &str) -> u64 {
    RPSU_UPTIME
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Chassis temperature rendered with exactly one fractional digit.
///
/// `"Temperature : 31.250 C"` gives `"31.2"`. Returns `"0.0"` when the
/// label is missing or the number does not parse (e.g. `"1.2.3"`).
pub fn extract_temperature(text: &str) -> String {
    TEMPERATURE
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|value| format!("{value:.1}"))
        .unwrap_or_else(|| "0.0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_is_rounded_to_one_digit() {
        assert_eq!(extract_temperature("Temperature : 31.250 C"), "31.2");
        assert_eq!(extract_temperature("temperature=41 c"), "41.0");
        assert_eq!(extract_temperature("Board\r\nTemperature: 27.96 C\r\nFan: OK"), "28.0");
    }

    #[test]
    fn temperature_defaults_when_absent_or_garbled() {
        assert_eq!(extract_temperature("no data"), "0.0");
        assert_eq!(extract_temperature("Temperature : 1.2.3 C"), "0.0");
        assert_eq!(extract_temperature("Temperature : 31.2 F"), "0.0");
    }

    #[test]
    fn status_matches_on_and_off() {
        assert_eq!(extract_rpsu_status("RPSU Status=ON"), RpsuStatus::On);
        assert_eq!(extract_rpsu_status("rpsu status: off"), RpsuStatus::Off);
        assert_eq!(extract_rpsu_status("RPSU Status:   On"), RpsuStatus::On);
    }

    #[test]
    fn status_defaults_to_off() {
        assert_eq!(extract_rpsu_status("Voltage: 48.0"), RpsuStatus::Off);
        assert_eq!(extract_rpsu_status(""), RpsuStatus::Off);
    }

    #[test]
    fn uptime_reads_leading_integer() {
        assert_eq!(extract_uptime("RPSU Uptime=120"), 120);
        assert_eq!(extract_uptime("RPSU Uptime: 87 Hours"), 87);
        assert_eq!(extract_uptime("RPSU Uptime=unknown"), 0);
        assert_eq!(extract_uptime("RPSU Uptime=99999999999999999999999"), 0);
    }

    #[test]
    fn value_accepts_colon_equals_and_sign() {
        let text = "Voltage: 48.0\r\nCurrent = -3.5\r\nLeak Current:2";
        assert_eq!(extract_value(text, "Voltage"), "48.0");
        assert_eq!(extract_value(text, "current"), "-3.5");
        assert_eq!(extract_value(text, "Leak Current"), "2");
    }

    #[test]
    fn value_defaults_to_zero() {
        assert_eq!(extract_value("Voltage: n/a", "Voltage"), "0");
        assert_eq!(extract_value("", "Current"), "0");
        for garbled in ["-", ".", "1.2.3", "--5", "4-2"] {
            let text = format!("Voltage: {garbled}");
            assert_eq!(extract_value(&text, "Voltage"), "0", "accepted {garbled:?}");
        }
    }

    #[test]
    fn label_patterns_are_compiled_once() {
        let first = label_pattern("Fan Speed").expect("valid pattern");
        let second = label_pattern("Fan Speed").expect("valid pattern");
        assert_eq!(first.as_str(), second.as_str());
        let cache = LABEL_PATTERNS.lock().unwrap();
        assert!(cache.contains_key("Fan Speed"));
    }

    #[test]
    fn value_label_is_matched_literally() {
        assert_eq!(extract_value("I(max)=7", "I(max)"), "7");
        assert_eq!(extract_value("IXmax)=7", "I(max)"), "0");
    }
}
