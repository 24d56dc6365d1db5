//! Runtime configuration.
//!
//! Settings come from environment variables with a JSON pricing file:
//!
//! | variable               | default        |
//! |------------------------|----------------|
//! | `COSTING_BIND_ADDR`    | `127.0.0.1:3000` |
//! | `COSTING_RATE_DIR`     | `rates`        |
//! | `COSTING_PRICING_FILE` | `pricing.json` |
//! | `COSTING_OVERHEAD_RATE`, `COSTING_GST_RATE`, `COSTING_GST_LIABLE` | from the pricing file |
//!
//! The overhead rate, GST rate and GST liability have no defaults; the
//! server refuses to start until they are configured.

use crate::error::CostingError;
use crate::pricing::PricingConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pricing file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse pricing file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{0}` is not configured")]
    Missing(&'static str),
    #[error("invalid value for {key}: `{value}`")]
    Invalid { key: &'static str, value: String },
    #[error("invalid pricing configuration: {0}")]
    Pricing(#[from] CostingError),
}

/// Contents of the pricing file.  Every key may be overridden from the
/// environment, so all are optional here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricingFile {
    overhead_rate: Option<Decimal>,
    gst_rate: Option<Decimal>,
    gst_liable: Option<bool>,
    recompute_on_submit: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub rate_dir: PathBuf,
    pub pricing: PricingConfig,
    /// Recompute the price summary as part of `submit`.
    pub recompute_on_submit: bool,
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let pricing_path =
            PathBuf::from(var("COSTING_PRICING_FILE").unwrap_or_else(|| "pricing.json".into()));
        let file = read_pricing_file(&pricing_path)?;

        let overhead_rate = match var("COSTING_OVERHEAD_RATE") {
            Some(v) => parse("COSTING_OVERHEAD_RATE", v)?,
            None => file.overhead_rate.ok_or(ConfigError::Missing("overheadRate"))?,
        };
        let gst_rate = match var("COSTING_GST_RATE") {
            Some(v) => parse("COSTING_GST_RATE", v)?,
            None => file.gst_rate.ok_or(ConfigError::Missing("gstRate"))?,
        };
        let gst_liable = match var("COSTING_GST_LIABLE") {
            Some(v) => parse("COSTING_GST_LIABLE", v)?,
            None => file.gst_liable.ok_or(ConfigError::Missing("gstLiable"))?,
        };

        let pricing = PricingConfig {
            overhead_rate,
            gst_rate,
            gst_liable,
        };
        pricing.validate()?;

        Ok(Self {
            bind_addr: var("COSTING_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".into()),
            rate_dir: PathBuf::from(var("COSTING_RATE_DIR").unwrap_or_else(|| "rates".into())),
            pricing,
            recompute_on_submit: file.recompute_on_submit.unwrap_or(true),
        })
    }
}

/// A missing file is not an error: the environment may carry every value.
fn read_pricing_file(path: &Path) -> Result<PricingFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(data) => Ok(serde_json::from_str(&data)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PricingFile::default()),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_pricing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        std::fs::write(
            &path,
            r#"{"overheadRate": "0.2", "gstRate": "0.1", "gstLiable": true, "recomputeOnSubmit": false}"#,
        )
        .unwrap();

        let cfg = AppConfig::from_lookup(vars(&[(
            "COSTING_PRICING_FILE",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(cfg.pricing.overhead_rate, dec!(0.2));
        assert_eq!(cfg.pricing.gst_rate, dec!(0.1));
        assert!(cfg.pricing.gst_liable);
        assert!(!cfg.recompute_on_submit);
        assert_eq!(cfg.bind_addr, "127.0.0.1:3000");
        assert_eq!(cfg.rate_dir, PathBuf::from("rates"));
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        std::fs::write(&path, r#"{"overheadRate": 0.2, "gstRate": 0.1, "gstLiable": true}"#).unwrap();

        let cfg = AppConfig::from_lookup(vars(&[
            ("COSTING_PRICING_FILE", path.to_str().unwrap()),
            ("COSTING_OVERHEAD_RATE", "0.35"),
            ("COSTING_GST_LIABLE", "false"),
            ("COSTING_BIND_ADDR", "0.0.0.0:8080"),
        ]))
        .unwrap();
        assert_eq!(cfg.pricing.overhead_rate, dec!(0.35));
        assert!(!cfg.pricing.gst_liable);
        assert!(cfg.recompute_on_submit);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn overhead_rate_has_no_default() {
        let err = AppConfig::from_lookup(vars(&[
            ("COSTING_PRICING_FILE", "/nonexistent/pricing.json"),
            ("COSTING_GST_RATE", "0.1"),
            ("COSTING_GST_LIABLE", "true"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("overheadRate")));
    }

    #[test]
    fn negative_rates_are_rejected() {
        let err = AppConfig::from_lookup(vars(&[
            ("COSTING_PRICING_FILE", "/nonexistent/pricing.json"),
            ("COSTING_OVERHEAD_RATE", "0.2"),
            ("COSTING_GST_RATE", "-0.1"),
            ("COSTING_GST_LIABLE", "true"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Pricing(CostingError::Validation { .. })));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = AppConfig::from_lookup(vars(&[
            ("COSTING_PRICING_FILE", "/nonexistent/pricing.json"),
            ("COSTING_OVERHEAD_RATE", "twenty percent"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "COSTING_OVERHEAD_RATE", .. }
        ));
    }
}
