//! `HH:MM` wall-clock times, as stored and exchanged over the API.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serializer};

const FORMAT: &str = "%H:%M";

/// Parse `H:MM` or `HH:MM` (00:00 through 23:59).
pub fn parse_hhmm(text: &str) -> Option<NaiveTime> {
    let (hour, minute) = text.split_once(':')?;
    let valid_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 || !valid_digits(hour) || !valid_digits(minute) {
        return None;
    }
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

pub fn format_hhmm(time: &NaiveTime) -> String {
    time.format(FORMAT).to_string()
}

pub mod hhmm {
    use super::*;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hhmm(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_hhmm(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time {text:?}, expected HH:MM")))
    }
}

pub mod hhmm_option {
    use super::*;

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.serialize_str(&format_hhmm(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(text) => parse_hhmm(&text).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid time {text:?}, expected HH:MM"))
            }),
        }
    }
}
