use config::{Config, Environment, File, FileFormat};
use portwatch_core::{PortwatchConfig, PortwatchError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

pub const ENV_PREFIX: &str = "PORTWATCH";
pub const ENV_SEPARATOR: &str = "__";
pub const DEFAULT_CONFIG_FILE: &str = "portwatch.yaml";

/// Upper bound on the default dashboard window.
pub const MAX_WINDOW_YEARS: u32 = 100;

/// Layers an optional YAML file under `PORTWATCH__SECTION__KEY` environment
/// overrides on top of the built-in defaults.
pub struct ConfigManager {
    portwatch_config: PortwatchConfig,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::load(Some(Path::new(DEFAULT_CONFIG_FILE)))
    }

    /// A missing file is not an error; the defaults and environment apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::build(path, false, Self::environment(None))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(Some(path.as_ref()), true, Self::environment(None))
    }

    pub fn from_env() -> Result<Self> {
        Self::build(None, false, Self::environment(None))
    }

    /// Reads overrides from `vars` instead of the process environment.
    pub fn from_vars(path: Option<&Path>, vars: HashMap<String, String>) -> Result<Self> {
        Self::build(path, false, Self::environment(Some(vars)))
    }

    fn environment(vars: Option<HashMap<String, String>>) -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(vars)
    }

    fn build(path: Option<&Path>, required: bool, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
            } else if !required {
                warn!(path = %path.display(), "Configuration file not found, using defaults");
            }
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Yaml)
                    .required(required),
            );
        }

        let config = builder
            .add_source(env)
            .build()
            .map_err(|e| PortwatchError::Configuration(e.to_string()))?;

        let portwatch_config: PortwatchConfig = config
            .try_deserialize()
            .map_err(|e| PortwatchError::Configuration(e.to_string()))?;

        info!("Configuration loaded successfully");

        Ok(Self { portwatch_config })
    }

    pub fn get_config(&self) -> &PortwatchConfig {
        &self.portwatch_config
    }

    pub fn get_config_mut(&mut self) -> &mut PortwatchConfig {
        &mut self.portwatch_config
    }

    pub fn into_config(self) -> PortwatchConfig {
        self.portwatch_config
    }

    pub fn validate(&self) -> Result<()> {
        let config = &self.portwatch_config;

        if config.source.url.trim().is_empty() {
            return Err(PortwatchError::Configuration(
                "Source URL not configured".to_string(),
            ));
        }

        if config.source.timeout_secs == 0 {
            return Err(PortwatchError::Configuration(
                "Source timeout must be at least one second".to_string(),
            ));
        }

        if config.cache.enabled && config.cache.path.as_os_str().is_empty() {
            return Err(PortwatchError::Configuration(
                "Cache is enabled but no cache path is configured".to_string(),
            ));
        }

        let threshold = config.analytics.anomaly_threshold;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(PortwatchError::Configuration(format!(
                "Anomaly threshold must be a positive number, got {}",
                threshold
            )));
        }

        if config.analytics.top_n == 0 {
            return Err(PortwatchError::Configuration(
                "top_n must be at least 1".to_string(),
            ));
        }

        let analytics = &config.analytics;
        if analytics.max_forecast_horizon == 0 {
            return Err(PortwatchError::Configuration(
                "max_forecast_horizon must be at least 1".to_string(),
            ));
        }
        if analytics.forecast_horizon > analytics.max_forecast_horizon {
            return Err(PortwatchError::Configuration(format!(
                "forecast_horizon {} exceeds max_forecast_horizon {}",
                analytics.forecast_horizon, analytics.max_forecast_horizon
            )));
        }

        if !(1..=MAX_WINDOW_YEARS).contains(&analytics.default_window_years) {
            return Err(PortwatchError::Configuration(format!(
                "default_window_years must be between 1 and {}",
                MAX_WINDOW_YEARS
            )));
        }

        if config.api.host.trim().is_empty() {
            return Err(PortwatchError::Configuration(
                "API host not configured".to_string(),
            ));
        }

        // Out-of-range fractions are ignored at fetch time rather than rejected.
        if let Some(fraction) = config.sampling.fraction {
            if !(fraction > 0.0 && fraction < 1.0) {
                warn!(fraction, "Sampling fraction outside (0, 1) will be ignored");
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.portwatch_config)
            .map_err(|e| PortwatchError::Configuration(e.to_string()))?;

        std::fs::write(path.as_ref(), yaml)
            .map_err(|e| PortwatchError::Configuration(e.to_string()))?;

        info!(path = %path.as_ref().display(), "Configuration saved to file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwatch_core::DetectionMethod;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::from_vars(Some(&dir.path().join("absent.yaml")), HashMap::new())
                .unwrap();
        let config = manager.get_config();

        assert_eq!(config.api.port, 8050);
        assert_eq!(config.cache.ttl_secs, 6 * 3600);
        assert_eq!(config.analytics.anomaly_method, DetectionMethod::ZScore);
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_required_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigManager::from_file(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(PortwatchError::Configuration(_))));
    }

    #[test]
    fn test_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portwatch.yaml");
        std::fs::write(
            &path,
            "api:\n  port: 9000\nanalytics:\n  anomaly_method: rolling\n  top_n: 8\n",
        )
        .unwrap();

        let manager = ConfigManager::from_vars(
            Some(&path),
            vars(&[
                ("PORTWATCH__API__PORT", "9100"),
                ("PORTWATCH__CACHE__ENABLED", "false"),
            ]),
        )
        .unwrap();
        let config = manager.get_config();

        assert_eq!(config.api.port, 9100);
        assert!(!config.cache.enabled);
        assert_eq!(config.analytics.anomaly_method, DetectionMethod::Rolling);
        assert_eq!(config.analytics.top_n, 8);
        assert_eq!(config.analytics.forecast_horizon, 30);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut manager = ConfigManager::from_vars(None, HashMap::new()).unwrap();
        manager.get_config_mut().analytics.anomaly_threshold = -1.0;
        assert!(manager.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_default_horizon_above_cap() {
        let mut manager = ConfigManager::from_vars(None, HashMap::new()).unwrap();
        manager.get_config_mut().analytics.forecast_horizon = 400;
        assert!(manager.validate().is_err());

        manager.get_config_mut().analytics.max_forecast_horizon = 400;
        assert!(manager.validate().is_ok());

        manager.get_config_mut().analytics.max_forecast_horizon = 0;
        assert!(manager.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_window() {
        let mut manager = ConfigManager::from_vars(None, HashMap::new()).unwrap();
        manager.get_config_mut().analytics.default_window_years = u32::MAX;
        assert!(manager.validate().is_err());
    }

    #[test]
    fn test_validate_tolerates_out_of_range_fraction() {
        let mut manager = ConfigManager::from_vars(None, HashMap::new()).unwrap();
        manager.get_config_mut().sampling.fraction = Some(1.5);
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.yaml");

        let mut manager = ConfigManager::from_vars(None, HashMap::new()).unwrap();
        manager.get_config_mut().sampling.fraction = Some(0.25);
        manager.get_config_mut().api.port = 8123;
        manager.save_to_file(&path).unwrap();

        let reloaded = ConfigManager::from_vars(Some(&path), HashMap::new())
            .unwrap()
            .into_config();
        assert_eq!(reloaded.sampling.fraction, Some(0.25));
        assert_eq!(reloaded.api.port, 8123);
    }
}
