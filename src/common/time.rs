//! Time helpers: sampling frequencies, timestamp parsing and formatting.
//!
//! Timestamps are naive (no zone) because the raw series and the forecasting
//! service both treat them as wall-clock labels.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};

use crate::common::error::{PipelineError, PipelineResult};

/// Canonical timestamp layout used on the wire and in record files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layout for timestamps with a sub-second part.
const FRACTIONAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp in any of the layouts seen in raw exports.
///
/// A bare date is read as midnight.
pub fn parse_timestamp(raw: &str) -> PipelineResult<NaiveDateTime> {
    let raw = raw.trim();
    for layout in ACCEPTED_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| PipelineError::data_format(format!("unparseable timestamp '{raw}'")))
}

/// Format a timestamp with [`TIMESTAMP_FORMAT`], appending the fraction
/// only when there is one.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format(TIMESTAMP_FORMAT).to_string()
    } else {
        ts.format(FRACTIONAL_FORMAT).to_string()
    }
}

/// Suffix appended to job names, unique to the millisecond.
pub fn job_suffix(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d-%H-%M-%S-%3f").to_string()
}

/// Serde adapter for [`NaiveDateTime`] fields using [`format_timestamp`].
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Unit of a sampling frequency.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FreqUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl FreqUnit {
    fn seconds(self) -> i64 {
        match self {
            FreqUnit::Second => 1,
            FreqUnit::Minute => 60,
            FreqUnit::Hour => 3_600,
            FreqUnit::Day => 86_400,
            FreqUnit::Week => 604_800,
        }
    }

    fn alias(self) -> &'static str {
        match self {
            FreqUnit::Second => "S",
            FreqUnit::Minute => "min",
            FreqUnit::Hour => "H",
            FreqUnit::Day => "D",
            FreqUnit::Week => "W",
        }
    }
}

/// Uniform sampling interval of a series, written like `2H` or `15min`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency {
    count: u32,
    unit: FreqUnit,
}

/// Two-hour cadence used by the electricity forecasts.
pub const TWO_HOURS: Frequency = Frequency {
    count: 2,
    unit: FreqUnit::Hour,
};

impl Frequency {
    pub fn new(count: u32, unit: FreqUnit) -> PipelineResult<Self> {
        if count == 0 {
            return Err(PipelineError::config("frequency multiplier must be positive"));
        }
        Ok(Self { count, unit })
    }

    /// Length of one step in seconds.
    pub fn step_seconds(&self) -> i64 {
        i64::from(self.count) * self.unit.seconds()
    }

    pub fn step(&self) -> TimeDelta {
        TimeDelta::seconds(self.step_seconds())
    }

    /// Timestamp `steps` intervals after `ts`.
    pub fn advance(&self, ts: NaiveDateTime, steps: i64) -> NaiveDateTime {
        ts + TimeDelta::seconds(self.step_seconds() * steps)
    }

    /// Start of the bucket containing `ts`, buckets aligned on the Unix epoch.
    pub fn floor(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let secs = ts.and_utc().timestamp();
        let offset = secs.rem_euclid(self.step_seconds());
        let floored = ts - TimeDelta::seconds(offset);
        floored.with_nanosecond(0).unwrap_or(floored)
    }

    /// Number of whole steps from `from` to `to`, rounded up.
    ///
    /// Negative when `to` precedes `from`.
    pub fn steps_between_ceil(&self, from: NaiveDateTime, to: NaiveDateTime) -> i64 {
        let delta = (to - from).num_seconds();
        let step = self.step_seconds();
        delta.div_euclid(step) + i64::from(delta.rem_euclid(step) != 0)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.alias())
    }
}

impl FromStr for Frequency {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| PipelineError::config(format!("frequency '{raw}' has no unit")))?;
        let (digits, unit) = raw.split_at(split);
        let count = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| PipelineError::config(format!("bad frequency multiplier in '{raw}'")))?
        };
        let unit = match unit {
            "S" | "s" => FreqUnit::Second,
            "min" | "T" => FreqUnit::Minute,
            "H" | "h" => FreqUnit::Hour,
            "D" | "d" => FreqUnit::Day,
            "W" | "w" => FreqUnit::Week,
            other => {
                return Err(PipelineError::config(format!(
                    "unsupported frequency unit '{other}'"
                )))
            }
        };
        Frequency::new(count, unit)
    }
}

impl TryFrom<String> for Frequency {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    #[test]
    fn parses_pandas_style_frequencies() {
        assert_eq!("2H".parse::<Frequency>().unwrap().step_seconds(), 7_200);
        assert_eq!("15min".parse::<Frequency>().unwrap().step_seconds(), 900);
        assert_eq!("15T".parse::<Frequency>().unwrap().to_string(), "15min");
        assert_eq!("D".parse::<Frequency>().unwrap().to_string(), "1D");
        assert!("0H".parse::<Frequency>().is_err());
        assert!("3fortnights".parse::<Frequency>().is_err());
        assert!("12".parse::<Frequency>().is_err());
    }

    #[test]
    fn floor_aligns_to_bucket_start() {
        let freq: Frequency = "2H".parse().unwrap();
        assert_eq!(freq.floor(ts("2014-01-01 03:45:00")), ts("2014-01-01 02:00:00"));
        assert_eq!(freq.floor(ts("2014-01-01 02:00:00")), ts("2014-01-01 02:00:00"));
    }

    #[test]
    fn steps_between_rounds_up() {
        let freq: Frequency = "2H".parse().unwrap();
        let base = ts("2014-01-01 00:00:00");
        assert_eq!(freq.steps_between_ceil(base, ts("2014-01-01 04:00:00")), 2);
        assert_eq!(freq.steps_between_ceil(base, ts("2014-01-01 04:30:00")), 3);
        assert_eq!(freq.steps_between_ceil(base, ts("2013-12-31 22:00:00")), -1);
    }

    #[test]
    fn accepts_common_timestamp_layouts() {
        let expected = ts("2014-09-01 00:00:00");
        assert_eq!(ts("2014-09-01"), expected);
        assert_eq!(ts("2014-09-01T00:00:00"), expected);
        assert_eq!(ts("2014-09-01 00:00"), expected);
        assert!(parse_timestamp("01/09/2014").is_err());
        assert_eq!(format_timestamp(&expected), "2014-09-01 00:00:00");
    }

    #[test]
    fn sub_second_part_survives_formatting() {
        let half = ts("2014-01-01 00:00:00.500");
        assert_eq!(format_timestamp(&half), "2014-01-01 00:00:00.500");
        assert_eq!(ts(&format_timestamp(&half)), half);
    }
}
