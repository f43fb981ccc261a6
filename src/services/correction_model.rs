use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::ModelConfig;
use crate::models::topic::TopicSpec;

/// Reported as `used_model` when no artifact was found.
pub const NO_MODEL: &str = "fallback_or_none";

/// Maps raw clear-sky irradiance and cloud cover to an effective irradiance.
pub trait CorrectionModel: Send + Sync {
    fn predict(&self, irradiance: f64, cloud: f64) -> f64;
}

/// A model together with the artifact name it was loaded from.
#[derive(Clone)]
pub struct LoadedModel {
    pub name: String,
    pub model: Arc<dyn CorrectionModel>,
}

pub trait ModelLoader: Send + Sync {
    /// `None` is a valid outcome: the estimator then passes irradiance through.
    fn load(&self, topic: &TopicSpec) -> Option<LoadedModel>;
}

// ─── Linear artifact ─────────────────────────────────────────────────────────

/// `y = intercept + a·irr + b·cloud + c·irr·cloud`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub intercept: f64,
    pub irradiance_coef: f64,
    #[serde(default)]
    pub cloud_coef: f64,
    #[serde(default)]
    pub interaction_coef: f64,
}

impl CorrectionModel for LinearModel {
    fn predict(&self, irradiance: f64, cloud: f64) -> f64 {
        self.intercept + self.irradiance_coef * irradiance + self.cloud_coef * cloud + self.interaction_coef * irradiance * cloud
    }
}

// ─── Loaders ─────────────────────────────────────────────────────────────────

/// Reads `{dir}/{name}_model.json`, where `name` is the topic's `model_name`
/// or its tag with `/` replaced by `_`. Falls back to the configured artifact.
pub struct JsonModelLoader {
    dir: PathBuf,
    fallback: Option<String>,
}

impl JsonModelLoader {
    pub fn new(cfg: &ModelConfig) -> Self {
        Self { dir: PathBuf::from(&cfg.dir), fallback: cfg.fallback.clone() }
    }

    pub fn artifact_name(topic: &TopicSpec) -> String {
        topic.model_name.clone().unwrap_or_else(|| topic.tag.replace('/', "_"))
    }

    fn read(&self, name: &str) -> Option<LoadedModel> {
        let path = self.dir.join(format!("{name}_model.json"));
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<LinearModel>(&raw) {
            Ok(model) => Some(LoadedModel { name: name.to_string(), model: Arc::new(model) }),
            Err(e) => {
                tracing::warn!("ignoring malformed model {}: {e}", path.display());
                None
            }
        }
    }
}

impl ModelLoader for JsonModelLoader {
    fn load(&self, topic: &TopicSpec) -> Option<LoadedModel> {
        self.read(&Self::artifact_name(topic))
            .or_else(|| self.fallback.as_deref().and_then(|name| self.read(name)))
    }
}

/// Loader that never finds a model.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModelLoader;

impl ModelLoader for NoModelLoader {
    fn load(&self, _topic: &TopicSpec) -> Option<LoadedModel> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(dir: &std::path::Path, fallback: Option<&str>) -> JsonModelLoader {
        JsonModelLoader::new(&ModelConfig {
            dir: dir.to_string_lossy().into_owned(),
            fallback: fallback.map(str::to_string),
        })
    }

    #[test]
    fn linear_prediction() {
        let m = LinearModel { intercept: 5.0, irradiance_coef: 0.9, cloud_coef: -1.0, interaction_coef: -0.001 };
        assert!((m.predict(500.0, 20.0) - (5.0 + 450.0 - 20.0 - 10.0)).abs() < 1e-9);
    }

    #[test]
    fn loads_model_named_after_tag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("P1_E1_model.json"), r#"{"irradiance_coef": 0.5}"#).unwrap();

        let loaded = loader(dir.path(), None).load(&TopicSpec::new("P1/E1")).unwrap();
        assert_eq!(loaded.name, "P1_E1");
        assert_eq!(loaded.model.predict(100.0, 0.0), 50.0);
    }

    #[test]
    fn falls_back_then_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("global_model.json"), r#"{"irradiance_coef": 1.0}"#).unwrap();

        let with_fallback = loader(dir.path(), Some("global")).load(&TopicSpec::new("T9")).unwrap();
        assert_eq!(with_fallback.name, "global");
        assert!(loader(dir.path(), None).load(&TopicSpec::new("T9")).is_none());
    }

    #[test]
    fn malformed_artifact_is_no_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("T1_model.json"), "not json").unwrap();
        assert!(loader(dir.path(), None).load(&TopicSpec::new("T1")).is_none());
    }
}
