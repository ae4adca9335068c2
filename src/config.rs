// ⚙️ Configuration - rating weights, grade scale, market figures, storage
//
// Loaded from a JSON file. Every field has a default, so an empty object (or
// no file at all) gives a working setup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregator::{EmissionsAggregator, Granularity};
use crate::error::Result;
use crate::ledger::{CarbonLedger, MarketConfig};
use crate::rating::{RatingConfig, RatingEngine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub granularity: Granularity,
    pub rating: RatingConfig,
    pub market: MarketConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("carbon_audit.db"),
            granularity: Granularity::Monthly,
            rating: RatingConfig::default(),
            market: MarketConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// File config when a path is given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rating.weights.validate()?;
        self.rating.grade_scale.validate()?;
        self.market.validate()?;
        Ok(())
    }

    pub fn rating_engine(&self) -> Result<RatingEngine> {
        RatingEngine::new(self.rating.clone())
    }

    pub fn ledger(&self) -> CarbonLedger {
        CarbonLedger::new(self.market.clone())
    }

    pub fn aggregator(&self) -> EmissionsAggregator {
        EmissionsAggregator::with_granularity(self.granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CarbonError;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let file = write_config("{}");
        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.market.price_per_credit, 2500.0);
        assert_eq!(config.rating.grade_scale.bands.len(), 4);
    }

    #[test]
    fn test_partial_override() {
        let file = write_config(
            r#"{
                "database_path": "/tmp/acme.db",
                "granularity": "quarterly",
                "market": { "price_per_credit": 3100 },
                "rating": {
                    "weights": { "knowledgeWeight": 0.3, "complianceWeight": 0.4, "reductionWeight": 0.3 }
                }
            }"#,
        );
        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/acme.db"));
        assert_eq!(config.granularity, Granularity::Quarterly);
        assert_eq!(config.market.price_per_credit, 3100.0);
        assert_eq!(config.market.available_credits, 1250.0);
        assert_eq!(config.rating.weights.compliance_weight, 0.4);
        assert_eq!(config.rating.grade_scale.floor_grade, "D");
    }

    #[test]
    fn test_invalid_weights_rejected_on_load() {
        let file = write_config(
            r#"{ "rating": { "weights": { "knowledgeWeight": 0.6, "complianceWeight": 0.6, "reductionWeight": 0.6 } } }"#,
        );
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(CarbonError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        assert!(matches!(
            AppConfig::from_file("/nonexistent/carbon.json"),
            Err(CarbonError::Io(_))
        ));

        let file = write_config("{ not json");
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(CarbonError::Serialization(_))
        ));

        assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    }
}
