/// ============================================================
///  Clear-Sky Plane-of-Array Irradiance
///
///  Algorithm pipeline:
///   1. Civil time -> UTC  – via the installation's IANA timezone
///   2. Solar geometry     – declination, equation of time, hour angle,
///                           elevation angle, azimuth angle
///   3. Extraterrestrial irradiance – eccentricity-corrected solar constant
///   4. Clear-sky model    – Ineichen-Perez: DNI, DHI, GHI
///   5. Transposition      – isotropic sky + ground reflection onto the
///                           tilted panel plane
///
///  Pure and deterministic: same inputs, same W/m².
/// ============================================================

use chrono::{DateTime, Datelike, LocalResult, NaiveDateTime, Offset, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::f64::consts::PI;

// ─── Physical constants ──────────────────────────────────────
const SC: f64 = 1361.0; // Solar constant W/m²
const DEG: f64 = PI / 180.0;
const LINKE_TURBIDITY: f64 = 3.0; // typical continental
const ALBEDO: f64 = 0.20;

// ─── Public output ───────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    pub elevation_deg: f64,
    /// Degrees from North, clockwise
    pub azimuth_deg: f64,
}

/// Main entry point – clear-sky irradiance on the panel plane (W/m²).
///
/// * `lat_deg`, `lon_deg` – installation coordinates
/// * `local`   – civil wall-clock timestamp in `tz`
/// * `tilt_deg` – panel tilt from horizontal
/// * `azimuth_deg` – panel facing, 180 = south
pub fn clear_sky_irradiance(
    lat_deg: f64,
    lon_deg: f64,
    local: NaiveDateTime,
    tilt_deg: f64,
    azimuth_deg: f64,
    tz: Tz,
) -> f64 {
    let utc = civil_to_utc(local, tz);
    let sun = solar_position(lat_deg, lon_deg, utc);
    if sun.elevation_deg <= 0.0 {
        return 0.0;
    }

    let (dni, dhi, ghi) = ineichen_clearsky(sun.elevation_deg, utc.ordinal());
    let poa = plane_of_array(dni, dhi, ghi, sun, tilt_deg, azimuth_deg);
    if poa.is_finite() { poa.max(0.0) } else { 0.0 }
}

// ─── 1. Civil time -> UTC ────────────────────────────────────
/// Ambiguous wall-clock times (DST fall-back) take the earlier instant;
/// times inside a spring-forward gap use the offset in force at that moment.
pub fn civil_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let offset = tz.offset_from_utc_datetime(&local).fix();
            (local - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
        }
    }
}

// ─── 2. Solar geometry ───────────────────────────────────────
pub fn solar_position(lat_deg: f64, lon_deg: f64, utc: DateTime<Utc>) -> SolarPosition {
    let doy = utc.ordinal() as f64;
    let ut_h = utc.hour() as f64 + utc.minute() as f64 / 60.0 + utc.second() as f64 / 3600.0;

    // a) Declination (Spencer 1971)
    let b = day_angle(doy);
    let decl = 0.006918
        - 0.399912 * b.cos()
        + 0.070257 * b.sin()
        - 0.006758 * (2.0 * b).cos()
        + 0.000907 * (2.0 * b).sin()
        - 0.002697 * (3.0 * b).cos()
        + 0.00148 * (3.0 * b).sin();

    // b) Equation of Time (minutes, Spencer 1971)
    let eot_min = 229.18
        * (0.000075
            + 0.001868 * b.cos()
            - 0.032077 * b.sin()
            - 0.014615 * (2.0 * b).cos()
            - 0.04089 * (2.0 * b).sin());

    // c) True solar time from UTC and true longitude
    let tst_h = ut_h + lon_deg / 15.0 + eot_min / 60.0;

    // d) Hour angle (negative in morning, positive afternoon)
    let omega_deg = 15.0 * (tst_h - 12.0);
    let omega = omega_deg * DEG;

    // e) Elevation
    let lat = lat_deg * DEG;
    let sin_alpha = (lat.sin() * decl.sin() + lat.cos() * decl.cos() * omega.cos()).clamp(-1.0, 1.0);
    let alpha = sin_alpha.asin();

    // f) Azimuth from North, clockwise
    let denom = alpha.cos() * lat.cos();
    let cos_az = if denom.abs() > 1e-9 {
        (decl.sin() - sin_alpha * lat.sin()) / denom
    } else {
        0.0
    };
    let az_abs = cos_az.clamp(-1.0, 1.0).acos() / DEG;
    // Wrap the hour angle so afternoon is detected across the date line
    let afternoon = omega_deg.rem_euclid(360.0) < 180.0 && omega_deg.rem_euclid(360.0) > 0.0;
    let azimuth_deg = if afternoon { 360.0 - az_abs } else { az_abs };

    SolarPosition { elevation_deg: alpha / DEG, azimuth_deg }
}

#[inline]
fn day_angle(doy: f64) -> f64 {
    2.0 * PI * (doy - 1.0) / 365.0
}

// ─── 3. Extraterrestrial irradiance ──────────────────────────
fn extraterrestrial(doy: u32) -> f64 {
    let b = day_angle(doy as f64);
    SC * (1.00011
        + 0.034221 * b.cos()
        + 0.00128 * b.sin()
        + 0.000719 * (2.0 * b).cos()
        + 0.000077 * (2.0 * b).sin())
}

// ─── 4. Clear-sky model (Ineichen-Perez, sea level) ──────────
/// Returns (DNI, DHI, GHI) in W/m².
fn ineichen_clearsky(elevation_deg: f64, doy: u32) -> (f64, f64, f64) {
    let zenith_deg = 90.0 - elevation_deg;
    // Air mass – Kasten & Young (1989)
    let am = 1.0 / ((zenith_deg * DEG).cos() + 0.50572 * (96.07995 - zenith_deg).powf(-1.6364));
    if !am.is_finite() || am <= 0.0 {
        return (0.0, 0.0, 0.0);
    }

    let i0 = extraterrestrial(doy);
    let sin_elev = (elevation_deg * DEG).sin();

    // Sea-level coefficients: fh1 = fh2 = 1
    let cg1 = 0.868;
    let cg2 = 0.0387;
    let tl = LINKE_TURBIDITY;

    let dni = (0.827 * i0 * (-cg2 * am * tl).exp()).clamp(0.0, i0);
    let ghi_raw = (cg1 * i0 * sin_elev * (-cg2 * am * tl * 1.1).exp()).max(0.0);

    // GHI cannot be lower than its own beam component
    let direct_horizontal = dni * sin_elev;
    let ghi = ghi_raw.max(direct_horizontal);
    let dhi = (ghi - direct_horizontal).max(0.0);
    (dni, dhi, ghi)
}

// ─── 5. Panel tilt / POA irradiance ──────────────────────────
fn plane_of_array(dni: f64, dhi: f64, ghi: f64, sun: SolarPosition, tilt_deg: f64, azimuth_deg: f64) -> f64 {
    let tilt = tilt_deg * DEG;
    let alpha = sun.elevation_deg * DEG;
    let az_diff = (sun.azimuth_deg - azimuth_deg) * DEG;

    // Angle of incidence between sun and panel normal
    let cos_theta = (alpha.sin() * tilt.cos() + alpha.cos() * tilt.sin() * az_diff.cos()).max(0.0);

    let beam_poa = dni * cos_theta;
    let diffuse_poa = dhi * (1.0 + tilt.cos()) / 2.0;
    let reflected_poa = ghi * ALBEDO * (1.0 - tilt.cos()) / 2.0;

    beam_poa + diffuse_poa + reflected_poa
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_summer_noon_nicosia() {
        let irr = clear_sky_irradiance(35.0, 33.0, local(2024, 6, 21, 12, 0), 20.0, 180.0, chrono_tz::Asia::Nicosia);
        assert!(irr > 700.0 && irr < 1300.0, "POA at summer noon should be high, got {irr:.1}");
    }

    #[test]
    fn test_midnight_zero() {
        let irr = clear_sky_irradiance(35.0, 33.0, local(2024, 6, 21, 0, 0), 20.0, 180.0, chrono_tz::Asia::Nicosia);
        assert_eq!(irr, 0.0);
    }

    #[test]
    fn test_dawn_below_cutoff() {
        // Sunrise in Nicosia on New Year is close to 06:50 local
        let irr = clear_sky_irradiance(35.0, 33.0, local(2024, 1, 1, 6, 45), 20.0, 180.0, chrono_tz::Asia::Nicosia);
        assert!(irr < 40.0, "dawn irradiance should sit under the cutoff, got {irr:.1}");
    }

    #[test]
    fn test_deterministic() {
        let a = clear_sky_irradiance(35.0, 33.0, local(2024, 3, 1, 10, 15), 20.0, 180.0, chrono_tz::Asia::Nicosia);
        let b = clear_sky_irradiance(35.0, 33.0, local(2024, 3, 1, 10, 15), 20.0, 180.0, chrono_tz::Asia::Nicosia);
        assert_eq!(a, b);
    }

    #[test]
    fn test_north_facing_panel_gets_less_in_winter() {
        let ts = local(2024, 1, 15, 12, 0);
        let south = clear_sky_irradiance(35.0, 33.0, ts, 30.0, 180.0, chrono_tz::Asia::Nicosia);
        let north = clear_sky_irradiance(35.0, 33.0, ts, 30.0, 0.0, chrono_tz::Asia::Nicosia);
        assert!(south > north, "south {south:.1} should beat north {north:.1}");
    }

    #[test]
    fn test_solar_noon_azimuth_is_south() {
        // Solar noon at lon 0 on the equinox is near 12:07 UTC
        let utc = local(2024, 3, 20, 12, 7).and_utc();
        let sun = solar_position(45.0, 0.0, utc);
        assert!((sun.azimuth_deg - 180.0).abs() < 5.0, "azimuth {:.1}", sun.azimuth_deg);
        assert!((sun.elevation_deg - 45.0).abs() < 2.0, "elevation {:.1}", sun.elevation_deg);
    }

    #[test]
    fn test_spring_forward_gap_is_handled() {
        // 03:30 does not exist in Nicosia on 2024-03-31
        let utc = civil_to_utc(local(2024, 3, 31, 3, 30), chrono_tz::Asia::Nicosia);
        assert_eq!(utc.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }
}
