//! Timesheet time decomposition.
//!
//! Turns a clock-in/clock-out interval into worked minutes and splits
//! them into normal, overtime, night, Sunday and holiday buckets using
//! the country rules.  An end time at or before the start time means
//! the shift rolls over to the next day.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::country::CountryConfig;
use crate::models::{GeoPoint, HourBuckets, Timesheet};
use crate::wage::price_buckets;

/// Mean Earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// How overlapping special buckets are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketPolicy {
    /// Overtime, night, Sunday and holiday are each counted against the
    /// full worked time and subtracted from normal, which may go
    /// negative when they overlap.
    #[default]
    Additive,
    /// Every minute lands in exactly one bucket, by priority holiday,
    /// Sunday, overtime, night, normal.  No bucket is negative.
    Exclusive,
}

impl FromStr for BucketPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "additive" => Ok(BucketPolicy::Additive),
            "exclusive" => Ok(BucketPolicy::Exclusive),
            other => Err(format!("unknown bucket policy {other:?}")),
        }
    }
}

impl fmt::Display for BucketPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BucketPolicy::Additive => "additive",
            BucketPolicy::Exclusive => "exclusive",
        })
    }
}

/// The break taken during a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakSpec {
    None,
    Window { start: NaiveTime, end: NaiveTime },
    Minutes(i64),
}

impl BreakSpec {
    /// A full break window wins over a bare duration.
    pub fn from_parts(start: Option<NaiveTime>, end: Option<NaiveTime>, minutes: Option<i64>) -> Self {
        match (start, end, minutes) {
            (Some(start), Some(end), _) => BreakSpec::Window { start, end },
            (_, _, Some(minutes)) => BreakSpec::Minutes(minutes),
            _ => BreakSpec::None,
        }
    }

    pub fn minutes(&self) -> i64 {
        match *self {
            BreakSpec::None => 0,
            BreakSpec::Minutes(m) => m.max(0),
            BreakSpec::Window { start, end } => {
                let mut span = end.signed_duration_since(start);
                if span < Duration::zero() {
                    span += Duration::days(1);
                }
                span.num_minutes()
            }
        }
    }
}

/// Output of [`decompose`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub worked_minutes: i64,
    pub minutes: HourBuckets,
}

/// Combines a date and clock times into absolute instants, rolling the
/// end over to the next day when it is not after the start.
pub fn shift_bounds(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> (NaiveDateTime, NaiveDateTime) {
    let start_at = date.and_time(start);
    let mut end_at = date.and_time(end);
    if end_at <= start_at {
        end_at += Duration::days(1);
    }
    (start_at, end_at)
}

/// Minutes of `[start, end)` whose clock hour lies in the night window.
///
/// The interval is walked one clock hour at a time; each slice ends at
/// the next full hour or at `end`, whichever comes first.
pub fn night_minutes(start: NaiveDateTime, end: NaiveDateTime, config: &CountryConfig) -> i64 {
    let mut seconds = 0i64;
    let mut cursor = start;
    while cursor < end {
        let Some(hour_start) = cursor.date().and_hms_opt(cursor.hour(), 0, 0) else {
            break;
        };
        let slice_end = (hour_start + Duration::hours(1)).min(end);
        if config.is_night_hour(cursor.hour()) {
            seconds += (slice_end - cursor).num_seconds();
        }
        cursor = slice_end;
    }
    seconds / 60
}

/// Splits one day of work into minute buckets.
///
/// A missing start or end time yields all zeros.
pub fn decompose(
    date: NaiveDate,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    break_spec: BreakSpec,
    config: &CountryConfig,
    policy: BucketPolicy,
) -> Decomposition {
    let (Some(start), Some(end)) = (start, end) else {
        return Decomposition::default();
    };
    let (start_at, end_at) = shift_bounds(date, start, end);
    let span = (end_at - start_at).num_minutes();
    let worked = (span - break_spec.minutes()).max(0);

    let overtime = (worked - config.daily_threshold_minutes()).max(0);
    let night = night_minutes(start_at, end_at, config).min(worked);
    let sunday = if date.weekday() == Weekday::Sun { worked } else { 0 };
    let holiday = if config.is_holiday(date) { worked } else { 0 };

    let minutes = match policy {
        BucketPolicy::Additive => HourBuckets {
            normal: worked - overtime - night - sunday - holiday,
            overtime,
            night,
            sunday,
            holiday,
        },
        BucketPolicy::Exclusive => {
            let mut remaining = worked;
            let mut take = |wanted: i64| {
                let taken = wanted.min(remaining);
                remaining -= taken;
                taken
            };
            let holiday = take(holiday);
            let sunday = take(sunday);
            let overtime = take(overtime);
            let night = take(night);
            HourBuckets {
                normal: remaining,
                overtime,
                night,
                sunday,
                holiday,
            }
        }
    };
    debug!(
        "decomposed {} {}-{}: worked={} buckets={:?} ({})",
        date, start, end, worked, minutes, policy
    );
    Decomposition {
        worked_minutes: worked,
        minutes,
    }
}

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Displacement between the clock-in and clock-out locations, rounded
/// to two decimals.  Zero unless both points are known.
pub fn displacement_km(start: Option<GeoPoint>, end: Option<GeoPoint>) -> f64 {
    match (start, end) {
        (Some(a), Some(b)) => (haversine_km(a, b) * 100.0).round() / 100.0,
        _ => 0.0,
    }
}

/// Recomputes every derived field of a timesheet in place.
///
/// The base hourly rate is the one stored on the timesheet, else
/// `contract_rate`, else zero.  The config used is pinned on the
/// timesheet.
pub fn recompute_timesheet(
    timesheet: &mut Timesheet,
    config: &CountryConfig,
    contract_rate: Option<f64>,
    policy: BucketPolicy,
) {
    let break_spec = BreakSpec::from_parts(
        timesheet.break_start,
        timesheet.break_end,
        timesheet.break_minutes,
    );
    let decomposition = decompose(
        timesheet.date,
        timesheet.start_time,
        timesheet.end_time,
        break_spec,
        config,
        policy,
    );
    timesheet.worked_minutes = decomposition.worked_minutes;
    timesheet.minutes = decomposition.minutes;
    timesheet.distance_km = displacement_km(timesheet.start_location, timesheet.end_location);

    let base_rate = timesheet.base_hourly_rate.or(contract_rate).unwrap_or(0.0);
    let priced = price_buckets(&timesheet.minutes, base_rate, config);
    timesheet.rates = priced.rates;
    timesheet.amounts = priced.amounts;
    timesheet.total_amount = priced.total;
    timesheet.config_snapshot = Some(config.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::{CountryConfigProvider, StaticCountryRegistry};

    fn t(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    fn gabon() -> CountryConfig {
        StaticCountryRegistry::builtin().resolve("GA")
    }

    // 2025-06-03 is a Tuesday and not a Gabonese holiday.
    fn weekday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 3).unwrap()
    }

    #[test]
    fn test_regular_day_shift() {
        let d = decompose(
            weekday(),
            t(8, 0),
            t(17, 0),
            BreakSpec::Minutes(60),
            &gabon(),
            BucketPolicy::Additive,
        );
        assert_eq!(d.worked_minutes, 480);
        assert_eq!(d.minutes.overtime, 0);
        assert_eq!(d.minutes.night, 0);
        assert_eq!(d.minutes.normal, 480);
    }

    #[test]
    fn test_night_shift_crossing_midnight() {
        let d = decompose(
            weekday(),
            t(22, 0),
            t(6, 0),
            BreakSpec::None,
            &gabon(),
            BucketPolicy::Additive,
        );
        assert_eq!(d.worked_minutes, 480);
        assert_eq!(d.minutes.night, 420);
        assert_eq!(d.minutes.normal, 60);
        assert_eq!(d.minutes.total(), d.worked_minutes);
    }

    #[test]
    fn test_night_minutes_sub_hour_precision() {
        let ga = gabon();
        let (start, end) = shift_bounds(weekday(), t(21, 30).unwrap(), t(22, 45).unwrap());
        assert_eq!(night_minutes(start, end, &ga), 45);
        let (start, end) = shift_bounds(weekday(), t(4, 20).unwrap(), t(5, 10).unwrap());
        assert_eq!(night_minutes(start, end, &ga), 40);
    }

    #[test]
    fn test_overtime_beyond_daily_threshold() {
        let d = decompose(
            weekday(),
            t(7, 0),
            t(18, 0),
            BreakSpec::Minutes(60),
            &gabon(),
            BucketPolicy::Additive,
        );
        assert_eq!(d.worked_minutes, 600);
        assert_eq!(d.minutes.overtime, 120);
        assert_eq!(d.minutes.normal, 480);
        assert_eq!(d.minutes.total(), 600);
    }

    #[test]
    fn test_break_window_is_subtracted() {
        let d = decompose(
            weekday(),
            t(8, 0),
            t(12, 0),
            BreakSpec::from_parts(t(10, 0), t(10, 30), Some(90)),
            &gabon(),
            BucketPolicy::Additive,
        );
        assert_eq!(d.worked_minutes, 210);
    }

    #[test]
    fn test_break_longer_than_shift_clamps_to_zero() {
        let d = decompose(
            weekday(),
            t(8, 0),
            t(9, 0),
            BreakSpec::Minutes(120),
            &gabon(),
            BucketPolicy::Additive,
        );
        assert_eq!(d.worked_minutes, 0);
        assert_eq!(d.minutes, HourBuckets::default());
    }

    #[test]
    fn test_missing_times_yield_zero() {
        let d = decompose(
            weekday(),
            None,
            t(17, 0),
            BreakSpec::None,
            &gabon(),
            BucketPolicy::Additive,
        );
        assert_eq!(d, Decomposition::default());
    }

    #[test]
    fn test_sunday_additive_goes_negative() {
        // 2025-06-01 is a Sunday.
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let d = decompose(
            sunday,
            t(20, 0),
            t(23, 0),
            BreakSpec::None,
            &gabon(),
            BucketPolicy::Additive,
        );
        assert_eq!(d.minutes.sunday, 180);
        assert_eq!(d.minutes.night, 60);
        assert_eq!(d.minutes.normal, -60);
    }

    #[test]
    fn test_sunday_exclusive_never_negative() {
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let d = decompose(
            sunday,
            t(20, 0),
            t(23, 0),
            BreakSpec::None,
            &gabon(),
            BucketPolicy::Exclusive,
        );
        assert_eq!(d.minutes.sunday, 180);
        assert_eq!(d.minutes.night, 0);
        assert_eq!(d.minutes.normal, 0);
        assert_eq!(d.minutes.total(), d.worked_minutes);
    }

    #[test]
    fn test_holiday_takes_priority_when_exclusive() {
        // Gabonese independence day.
        let holiday = NaiveDate::from_ymd_opt(2025, 8, 17).unwrap();
        let d = decompose(
            holiday,
            t(8, 0),
            t(18, 0),
            BreakSpec::None,
            &gabon(),
            BucketPolicy::Exclusive,
        );
        assert_eq!(d.minutes.holiday, 600);
        assert_eq!(d.minutes.overtime, 0);
        assert_eq!(d.minutes.normal, 0);
    }

    #[test]
    fn test_decompose_is_deterministic() {
        let ga = gabon();
        let run = || {
            decompose(
                weekday(),
                t(19, 15),
                t(3, 40),
                BreakSpec::Minutes(25),
                &ga,
                BucketPolicy::Additive,
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_haversine_properties() {
        let libreville = GeoPoint { lat: 0.4162, lon: 9.4673 };
        let douala = GeoPoint { lat: 4.0511, lon: 9.7679 };
        assert_eq!(haversine_km(libreville, libreville), 0.0);
        assert_eq!(haversine_km(libreville, douala), haversine_km(douala, libreville));
        let d = displacement_km(Some(libreville), Some(douala));
        assert!((d - 405.0).abs() < 5.0, "unexpected distance {d}");
        assert_eq!(displacement_km(Some(libreville), None), 0.0);
    }

    #[test]
    fn test_recompute_timesheet_prices_buckets() {
        let ga = gabon();
        let mut ts = Timesheet::new("t1", "acme", "w1", weekday(), "GA");
        ts.start_time = t(8, 0);
        ts.end_time = t(17, 0);
        ts.break_minutes = Some(60);
        ts.worked_minutes = 9999;
        recompute_timesheet(&mut ts, &ga, Some(1_000.0), BucketPolicy::Additive);
        assert_eq!(ts.worked_minutes, 480);
        assert_eq!(ts.total_amount, 8_000.0);
        assert_eq!(ts.config_snapshot.as_ref().map(|c| c.code.as_str()), Some("GA"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Exclusive".parse::<BucketPolicy>(), Ok(BucketPolicy::Exclusive));
        assert!("clamped".parse::<BucketPolicy>().is_err());
    }
}
