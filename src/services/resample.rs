//! Normalization of provider weather onto the fixed 15-minute day grid.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::models::weather::{RawWeatherRecord, WeatherRecord};

pub const SLOT_MINUTES: i64 = 15;
pub const SLOTS_PER_DAY: usize = 96;

/// The 96 civil timestamps 00:00 .. 23:45 of `date`.
pub fn day_grid(date: NaiveDate) -> Vec<NaiveDateTime> {
    let start = date.and_time(chrono::NaiveTime::MIN);
    (0..SLOTS_PER_DAY as i64)
        .map(|i| start + TimeDelta::minutes(i * SLOT_MINUTES))
        .collect()
}

/// Resamples one day of provider records onto the 15-minute grid.
///
/// Records of other dates are dropped, duplicate timestamps are averaged,
/// then each field is linearly interpolated over its own non-null
/// observations. Slots outside the observed span hold the nearest value.
/// Returns an empty vector when no record falls on `date`.
pub fn normalize_day(raw: &[RawWeatherRecord], date: NaiveDate) -> Vec<WeatherRecord> {
    let merged = merge_duplicates(raw.iter().filter(|r| r.time.date() == date));
    if merged.is_empty() {
        return Vec::new();
    }

    let temps: Vec<(NaiveDateTime, f64)> = merged.iter().filter_map(|(t, (temp, _))| Some((*t, (*temp)?))).collect();
    let clouds: Vec<(NaiveDateTime, f64)> = merged.iter().filter_map(|(t, (_, cloud))| Some((*t, (*cloud)?))).collect();

    let grid = day_grid(date);
    let temp_grid = interpolate(&temps, &grid);
    let cloud_grid = interpolate(&clouds, &grid);

    grid.into_iter()
        .zip(temp_grid.into_iter().zip(cloud_grid))
        .map(|(time, (temp_c, cloud))| WeatherRecord {
            time,
            temp_c,
            cloud: cloud.map(|c| c.round_ties_even() as i32),
        })
        .collect()
}

type Fields = (Option<f64>, Option<f64>);

fn merge_duplicates<'a>(records: impl Iterator<Item = &'a RawWeatherRecord>) -> BTreeMap<NaiveDateTime, Fields> {
    let mut sums: BTreeMap<NaiveDateTime, [(f64, u32); 2]> = BTreeMap::new();
    let mut seen: BTreeMap<NaiveDateTime, u32> = BTreeMap::new();
    for rec in records {
        *seen.entry(rec.time).or_default() += 1;
        let acc = sums.entry(rec.time).or_default();
        for (slot, value) in acc.iter_mut().zip([rec.temp_c, rec.cloud]) {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    if seen.values().any(|&n| n > 1) {
        tracing::warn!("duplicate weather timestamps detected; averaging before resample");
    }

    let mean = |(sum, n): (f64, u32)| (n > 0).then(|| sum / f64::from(n));
    sums.into_iter().map(|(t, [temp, cloud])| (t, (mean(temp), mean(cloud)))).collect()
}

/// Piecewise-linear interpolation of sorted `obs` at each grid instant.
fn interpolate(obs: &[(NaiveDateTime, f64)], grid: &[NaiveDateTime]) -> Vec<Option<f64>> {
    let (Some(first), Some(last)) = (obs.first(), obs.last()) else {
        return vec![None; grid.len()];
    };

    grid.iter()
        .map(|&t| {
            if t <= first.0 {
                return Some(first.1);
            }
            if t >= last.0 {
                return Some(last.1);
            }
            // First observation strictly after t; t lies in [idx-1, idx)
            let idx = obs.partition_point(|(ot, _)| *ot <= t);
            let (t0, v0) = obs[idx - 1];
            let (t1, v1) = obs[idx];
            let span = (t1 - t0).num_seconds() as f64;
            let frac = (t - t0).num_seconds() as f64 / span;
            Some(v0 + frac * (v1 - v0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn raw(h: u32, m: u32, temp: Option<f64>, cloud: Option<f64>) -> RawWeatherRecord {
        RawWeatherRecord { time: at(h, m), temp_c: temp, cloud }
    }

    fn slot(out: &[WeatherRecord], h: u32, m: u32) -> &WeatherRecord {
        out.iter().find(|r| r.time == at(h, m)).unwrap()
    }

    #[test]
    fn grid_has_96_quarter_hours() {
        let grid = day_grid(day());
        assert_eq!(grid.len(), 96);
        assert_eq!(grid[0], at(0, 0));
        assert_eq!(grid[95], at(23, 45));
    }

    #[test]
    fn hourly_series_hits_hour_boundaries_exactly() {
        let hourly: Vec<RawWeatherRecord> = (0..24)
            .map(|h| raw(h, 0, Some(5.0 + f64::from(h) * 0.37), Some(f64::from(h * 4))))
            .collect();
        let out = normalize_day(&hourly, day());

        assert_eq!(out.len(), 96);
        for h in 0..24 {
            let point = &out[(h * 4) as usize];
            assert_eq!(point.time, at(h, 0));
            assert_eq!(point.temp_c, Some(5.0 + f64::from(h) * 0.37));
            assert_eq!(point.cloud, Some((h * 4) as i32));
        }
    }

    #[test]
    fn sparse_archive_is_interpolated_between_hours() {
        let out = normalize_day(&[raw(6, 0, Some(10.0), Some(50.0)), raw(7, 0, Some(12.0), Some(40.0))], day());

        assert_eq!(slot(&out, 6, 15).temp_c, Some(10.5));
        assert_eq!(slot(&out, 6, 30).temp_c, Some(11.0));
        assert_eq!(slot(&out, 6, 45).temp_c, Some(11.5));
        // ties go to the even neighbour: 47.5 -> 48, 42.5 -> 42
        assert_eq!(slot(&out, 6, 15).cloud, Some(48));
        assert_eq!(slot(&out, 6, 30).cloud, Some(45));
        assert_eq!(slot(&out, 6, 45).cloud, Some(42));
    }

    #[test]
    fn edges_hold_nearest_observation() {
        let out = normalize_day(&[raw(6, 0, Some(10.0), None), raw(7, 0, Some(12.0), None)], day());
        assert_eq!(slot(&out, 0, 0).temp_c, Some(10.0));
        assert_eq!(slot(&out, 23, 45).temp_c, Some(12.0));
        assert!(out.iter().all(|r| r.cloud.is_none()));
    }

    #[test]
    fn duplicates_are_averaged() {
        let out = normalize_day(
            &[raw(6, 0, Some(10.0), Some(40.0)), raw(6, 0, Some(14.0), None), raw(7, 0, Some(12.0), Some(40.0))],
            day(),
        );
        assert_eq!(slot(&out, 6, 0).temp_c, Some(12.0));
        assert_eq!(slot(&out, 6, 0).cloud, Some(40));
    }

    #[test]
    fn nulls_are_skipped_per_field() {
        let out = normalize_day(
            &[raw(6, 0, Some(10.0), Some(0.0)), raw(7, 0, None, Some(100.0)), raw(8, 0, Some(20.0), None)],
            day(),
        );
        assert_eq!(slot(&out, 7, 0).temp_c, Some(15.0));
        assert_eq!(slot(&out, 8, 0).cloud, Some(100));
    }

    #[test]
    fn other_dates_are_dropped() {
        let next = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(6, 0, 0).unwrap();
        let records = [RawWeatherRecord { time: next, temp_c: Some(1.0), cloud: None }];
        assert!(normalize_day(&records, day()).is_empty());
    }
}
