use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_azimuth() -> f64 { 180.0 }
fn default_module_mm() -> f64 { 1000.0 }
fn default_efficiency() -> f64 { 17.7 }
fn default_panels() -> u32 { 1 }

/// Static description of one PV installation ("topic").
///
/// Read-only to the forecast core; owned by whichever `TopicStore` serves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopicSpec {
    pub tag: String,
    /// Key used for archive weather lookups.
    #[serde(default)]
    pub user_object_id: Option<i64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Panel tilt from horizontal (degrees)
    #[serde(default)]
    pub tilt: f64,
    /// Panel azimuth, 180 = south (degrees)
    #[serde(default = "default_azimuth")]
    pub azimuth: f64,
    /// Module length (mm)
    #[serde(default = "default_module_mm")]
    pub module_length: f64,
    /// Module width (mm)
    #[serde(default = "default_module_mm")]
    pub module_width: f64,
    /// Module efficiency (%)
    #[serde(default = "default_efficiency")]
    pub module_efficiency: f64,
    #[serde(default = "default_panels")]
    pub total_panels: u32,
    #[serde(default)]
    pub commissioning_date: Option<NaiveDate>,
    /// Fractional annual output loss
    #[serde(default)]
    pub degradation_rate: f64,
    /// Correction model artifact override; defaults to one derived from the tag.
    #[serde(default)]
    pub model_name: Option<String>,
}

impl TopicSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            user_object_id: None,
            latitude: None,
            longitude: None,
            tilt: 0.0,
            azimuth: default_azimuth(),
            module_length: default_module_mm(),
            module_width: default_module_mm(),
            module_efficiency: default_efficiency(),
            total_panels: default_panels(),
            commissioning_date: None,
            degradation_rate: 0.0,
            model_name: None,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Problems that do not block a computation but degrade it.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.user_object_id.is_none() {
            out.push("missing user_object_id".to_string());
        }
        if self.coordinates().is_none() {
            out.push("missing coordinates".to_string());
        }
        out
    }

    /// Panel area in m² from module dimensions in mm.
    pub fn panel_area_m2(&self) -> f64 {
        (self.module_length / 1000.0) * (self.module_width / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults_fill_missing_fields() {
        let spec: TopicSpec = serde_json::from_str(r#"{ "tag": "P1/E1", "latitude": 35.0, "longitude": 33.0 }"#).unwrap();
        assert_eq!(spec.azimuth, 180.0);
        assert_eq!(spec.module_efficiency, 17.7);
        assert_eq!(spec.total_panels, 1);
        assert_eq!(spec.panel_area_m2(), 1.0);
        assert_eq!(spec.warnings(), vec!["missing user_object_id".to_string()]);
    }

    #[test]
    fn coordinates_need_both_axes() {
        let mut spec = TopicSpec::new("T1");
        spec.latitude = Some(35.0);
        assert!(spec.coordinates().is_none());
        spec.longitude = Some(33.0);
        assert_eq!(spec.coordinates(), Some((35.0, 33.0)));
    }
}
