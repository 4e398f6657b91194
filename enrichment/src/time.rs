use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::functions::expr_fn::{character_length, named_struct, substring};
use datafusion::prelude::{Expr, cast, lit, try_cast};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const UTC: &str = "+00:00";

/// Field names of the struct built by [`subtract_time`]
pub mod duration_fields {
    pub const START_EPOCH_MS: &str = "startEpochMs";
    pub const START_TIMESTAMP: &str = "startTimestamp";
    pub const END_EPOCH_MS: &str = "endEpochMs";
    pub const END_TIMESTAMP: &str = "endTimestamp";
    pub const DURATION_MS: &str = "durationMs";
    pub const DURATION_SEC: &str = "durationSec";
    pub const DURATION_MIN: &str = "durationMin";
    pub const DURATION_HOUR: &str = "durationHour";
}

/// Unit of the raw integer epoch values found in source columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeResolution {
    #[default]
    Milli,
    Second,
}

impl TimeResolution {
    pub fn time_unit(self) -> TimeUnit {
        match self {
            TimeResolution::Milli => TimeUnit::Millisecond,
            TimeResolution::Second => TimeUnit::Second,
        }
    }
}

impl FromStr for TimeResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("milli") {
            Ok(TimeResolution::Milli)
        } else if s.eq_ignore_ascii_case("second") {
            Ok(TimeResolution::Second)
        } else {
            Err(Error::invalid_argument(format!(
                "time resolution must be either 'milli' or 'second', got '{s}'"
            )))
        }
    }
}

/// Type used for the timestamps of duration records
pub fn utc_timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, Some(UTC.into()))
}

pub fn is_time_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    )
}

/// Converts an integer epoch column to a timestamp or date column.
///
/// Milli values are reinterpreted as milliseconds instead of being divided as floats, which keeps
/// the sub-second part exact. The intermediate instant is tagged UTC so naive targets get the UTC
/// wall clock and zoned targets keep the same instant.
pub fn to_ts(value: Expr, resolution: TimeResolution, target: &DataType) -> Result<Expr> {
    if !is_time_type(target) {
        return Err(Error::invalid_argument(format!(
            "epoch values can only be converted to timestamp or date types, got {target}"
        )));
    }
    let instant = cast(
        cast(value, DataType::Int64),
        DataType::Timestamp(resolution.time_unit(), Some(UTC.into())),
    );
    Ok(cast(instant, target.clone()))
}

/// Builds a duration record struct from two epoch columns.
///
/// `durationMs` is `end - start` in the caller's raw units; the coarser fields use truncating
/// integer division. Negative durations are passed through.
pub fn subtract_time(start: Expr, end: Expr, resolution: TimeResolution) -> Result<Expr> {
    use duration_fields::*;
    let start = cast(start, DataType::Int64);
    let end = cast(end, DataType::Int64);
    let duration_ms = end.clone() - start.clone();
    let duration_sec = duration_ms.clone() / lit(1000_i64);
    let duration_min = duration_sec.clone() / lit(60_i64);
    let duration_hour = duration_min.clone() / lit(60_i64);
    let start_ts = to_ts(start.clone(), resolution, &utc_timestamp_type())?;
    let end_ts = to_ts(end.clone(), resolution, &utc_timestamp_type())?;
    Ok(named_struct(vec![
        lit(START_EPOCH_MS),
        start,
        lit(START_TIMESTAMP),
        start_ts,
        lit(END_EPOCH_MS),
        end,
        lit(END_TIMESTAMP),
        end_ts,
        lit(DURATION_MS),
        duration_ms,
        lit(DURATION_SEC),
        duration_sec,
        lit(DURATION_MIN),
        duration_min,
        lit(DURATION_HOUR),
        duration_hour,
    ]))
}

/// Parses `yyyy-MM-ddTHH:mm:ss.SSSz` text into epoch milliseconds.
///
/// The whole seconds come from a timestamp cast and the milliseconds are read positionally from
/// the three characters preceding the zone designator. Text in any other shape yields a wrong
/// value or null, never an error.
pub fn string_ts_to_unix_millis(text: Expr) -> Expr {
    let whole_seconds = cast(
        try_cast(text.clone(), DataType::Timestamp(TimeUnit::Second, None)),
        DataType::Int64,
    );
    let fraction = substring(text.clone(), character_length(text) - lit(3), lit(3));
    whole_seconds * lit(1000_i64) + try_cast(fraction, DataType::Int64)
}

pub fn epoch_to_datetime(value: i64, resolution: TimeResolution) -> Option<DateTime<Utc>> {
    match resolution {
        TimeResolution::Milli => DateTime::from_timestamp_millis(value),
        TimeResolution::Second => DateTime::from_timestamp(value, 0),
    }
}

/// Row-level counterpart of the struct built by [`subtract_time`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationRecord {
    pub start_epoch_ms: i64,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_epoch_ms: i64,
    pub end_ts: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub duration_sec: i64,
    pub duration_min: i64,
    pub duration_hour: i64,
}

impl DurationRecord {
    pub fn between(start: i64, end: i64, resolution: TimeResolution) -> Self {
        let duration_ms = end - start;
        let duration_sec = duration_ms / 1000;
        let duration_min = duration_sec / 60;
        Self {
            start_epoch_ms: start,
            start_ts: epoch_to_datetime(start, resolution),
            end_epoch_ms: end,
            end_ts: epoch_to_datetime(end, resolution),
            duration_ms,
            duration_sec,
            duration_min,
            duration_hour: duration_min / 60,
        }
    }
}
