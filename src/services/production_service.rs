/// ============================================================
///  Production Estimator
///
///  Per 15-minute slot:
///   1. Night/dawn cutoff  – irradiance below 40 W/m² yields 0 W
///   2. Correction model   – optional, maps (irradiance, cloud %) to
///                           an effective irradiance
///   3. Panel DC power     – irradiance · area · efficiency
///   4. System production  – temperature derating, cloud derating,
///                           panel count, linear age degradation
///   5. Sanitization       – a non-finite result becomes `None`
/// ============================================================

use chrono::NaiveDate;

use crate::models::topic::TopicSpec;
use crate::models::weather::WeatherRecord;
use crate::services::correction_model::CorrectionModel;

// ─── Constants ───────────────────────────────────────────────
pub const THRESHOLD_RADIATION: f64 = 40.0; // W/m²
const TEMP_COEFF: f64 = 0.004; // per °C above 25 °C
const STC_TEMP_C: f64 = 25.0;
const CLOUD_LOSS: f64 = 0.75; // output lost under full overcast
const CLOUD_EXP: f64 = 3.4;
const DAYS_PER_YEAR: f64 = 365.25;

/// Power in watts for one slot, or `None` when the result is not finite.
///
/// A topic without a commissioning date is treated as new on the slot's date.
pub fn estimate(
    irradiance: f64,
    weather: &WeatherRecord,
    spec: &TopicSpec,
    model: Option<&dyn CorrectionModel>,
) -> Option<f64> {
    if irradiance < THRESHOLD_RADIATION {
        return Some(0.0);
    }

    let cloud_pct = weather.cloud.map_or(0.0, f64::from);
    let effective = match model {
        Some(m) => m.predict(irradiance, cloud_pct),
        None => irradiance,
    };
    let base = effective * spec.panel_area_m2() * (spec.module_efficiency / 100.0);

    let slot_date = weather.time.date();
    let commissioning = spec.commissioning_date.unwrap_or(slot_date);
    let power = system_production(
        base,
        weather.temp_c.unwrap_or(STC_TEMP_C),
        cloud_pct / 100.0,
        spec.total_panels,
        age_years(commissioning, slot_date),
        spec.degradation_rate,
    );

    #[cfg(feature = "verbose_log")]
    tracing::debug!(topic = %spec.tag, ts = %weather.time, irradiance, effective, base, power, "slot estimate");

    power.is_finite().then_some(power)
}

/// Whole-system output from single-panel DC power.
///
/// * `cloud_fraction` – 0.0 (clear) ..= 1.0 (overcast)
/// * `age_years` – elapsed time since commissioning, clamped at 0
pub fn system_production(
    panel_power: f64,
    temp_c: f64,
    cloud_fraction: f64,
    panels: u32,
    age_years: f64,
    degradation_rate: f64,
) -> f64 {
    let temp_factor = (1.0 - TEMP_COEFF * (temp_c - STC_TEMP_C)).max(0.0);
    let cloud_factor = 1.0 - CLOUD_LOSS * cloud_fraction.clamp(0.0, 1.0).powf(CLOUD_EXP);
    let degradation = (1.0 - degradation_rate * age_years.max(0.0)).max(0.0);
    panel_power * temp_factor * cloud_factor * f64::from(panels.max(1)) * degradation
}

fn age_years(commissioning: NaiveDate, on: NaiveDate) -> f64 {
    ((on - commissioning).num_days() as f64 / DAYS_PER_YEAR).max(0.0)
}
