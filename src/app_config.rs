use anyhow::Context;
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    workspace: Option<PathBuf>,
    log_level: String,
    default_radius_m: f64,
}

impl AppConfig {
    /// `sekolahd.toml` (optional) overlaid by `SEKOLAHD_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_builder(
            Config::builder()
                .add_source(config::File::with_name("sekolahd").required(false))
                .add_source(config::Environment::with_prefix("SEKOLAHD")),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let cfg: AppConfig = builder
            .set_default("log_level", "info")?
            .set_default("default_radius_m", 100.0)?
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        crate::geofence::validate_radius(cfg.default_radius_m)
            .context("invalid default_radius_m")?;
        Ok(cfg)
    }

    pub fn workspace(&self) -> Option<&PathBuf> {
        self.workspace.as_ref()
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }

    pub fn default_radius_m(&self) -> f64 {
        self.default_radius_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(text: &str) -> anyhow::Result<AppConfig> {
        AppConfig::from_builder(
            Config::builder().add_source(config::File::from_str(text, FileFormat::Toml)),
        )
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = from_toml("").expect("load defaults");
        assert_eq!(cfg.workspace(), None);
        assert_eq!(cfg.log_level(), tracing::Level::INFO);
        assert_eq!(cfg.default_radius_m(), 100.0);
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = from_toml(
            r#"
            workspace = "/srv/sekolah"
            log_level = "debug"
            default_radius_m = 250.0
            "#,
        )
        .expect("load file");
        assert_eq!(cfg.workspace(), Some(&PathBuf::from("/srv/sekolah")));
        assert_eq!(cfg.log_level(), tracing::Level::DEBUG);
        assert_eq!(cfg.default_radius_m(), 250.0);
    }

    #[test]
    fn negative_default_radius_is_rejected() {
        assert!(from_toml("default_radius_m = -5.0").is_err());
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let cfg = from_toml(r#"log_level = "chatty""#).expect("load file");
        assert_eq!(cfg.log_level(), tracing::Level::INFO);
    }
}
