use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::age::AgeWeights;
use crate::catalog::ReferenceCatalog;
use crate::error::BioAgeError;
use crate::genomic::GenomicTool;
use crate::tools::native::DEFAULT_GENOME_SIZE_BP;
use crate::tools::{ExternalTool, NativeReader};

pub const CONFIG_FILE_NAME: &str = "kira-bioage.json";
pub const DEFAULT_STORE_DIR: &str = ".kira-bioage";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub genomic: GenomicSection,
    #[serde(default)]
    pub biological_age: AgeWeights,
    #[serde(default)]
    pub store: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GenomicSection {
    #[serde(default)]
    pub tool: Option<ToolEntry>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub genome_size_bp: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolEntry {
    Shorthand(String),
    Detailed(ToolEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ToolEntryObject {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolSpec {
    Native,
    External { program: String, args: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog: Option<PathBuf>,
    pub tool: ToolSpec,
    pub timeout: Duration,
    pub genome_size_bp: f64,
    pub weights: AgeWeights,
    pub store_root: Utf8PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            catalog: None,
            tool: ToolSpec::Native,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            genome_size_bp: DEFAULT_GENOME_SIZE_BP,
            weights: AgeWeights::default(),
            store_root: Utf8PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

impl ResolvedConfig {
    pub fn load_catalog(&self) -> Result<ReferenceCatalog, BioAgeError> {
        match &self.catalog {
            Some(path) => ReferenceCatalog::load(path),
            None => ReferenceCatalog::bundled(),
        }
    }

    pub fn build_tool(&self) -> Result<Arc<dyn GenomicTool>, BioAgeError> {
        match &self.tool {
            ToolSpec::Native => Ok(Arc::new(NativeReader::new(self.genome_size_bp))),
            ToolSpec::External { program, args } => Ok(Arc::new(ExternalTool::new(
                program,
                args.clone(),
                self.timeout,
            )?)),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BioAgeError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };
        let Some(config_path) = config_path else {
            tracing::debug!("no config file found, using defaults");
            return Ok(ResolvedConfig::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BioAgeError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BioAgeError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "loaded config");

        Self::resolve_config(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("kira-bioage").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, BioAgeError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(BioAgeError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let tool = match config.genomic.tool {
            None => ToolSpec::Native,
            Some(ToolEntry::Shorthand(value)) if value.eq_ignore_ascii_case("native") => {
                ToolSpec::Native
            }
            Some(ToolEntry::Shorthand(program)) => ToolSpec::External {
                program,
                args: Vec::new(),
            },
            Some(ToolEntry::Detailed(obj)) => ToolSpec::External {
                program: obj.program,
                args: obj.args,
            },
        };

        let timeout_secs = config.genomic.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(BioAgeError::InvalidConfig(
                "genomic.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let genome_size_bp = config
            .genomic
            .genome_size_bp
            .unwrap_or(DEFAULT_GENOME_SIZE_BP);
        if !genome_size_bp.is_finite() || genome_size_bp <= 0.0 {
            return Err(BioAgeError::InvalidConfig(
                "genomic.genome_size_bp must be a positive number".to_string(),
            ));
        }

        config.biological_age.validate()?;

        Ok(ResolvedConfig {
            schema_version,
            catalog: config.catalog.map(PathBuf::from),
            tool,
            timeout: Duration::from_secs(timeout_secs),
            genome_size_bp,
            weights: config.biological_age,
            store_root: Utf8PathBuf::from(config.store.as_deref().unwrap_or(DEFAULT_STORE_DIR)),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_when_empty() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.tool, ToolSpec::Native);
        assert_eq!(resolved.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(resolved.weights, AgeWeights::default());
        assert_eq!(resolved.store_root.as_str(), DEFAULT_STORE_DIR);
    }

    #[test]
    fn tool_shorthand_and_detailed() {
        let config: Config =
            serde_json::from_str(r#"{"genomic": {"tool": "vcf-summary"}}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(
            resolved.tool,
            ToolSpec::External {
                program: "vcf-summary".to_string(),
                args: Vec::new()
            }
        );

        let config: Config = serde_json::from_str(
            r#"{"genomic": {"tool": {"program": "python3", "args": ["summarize.py"]}}}"#,
        )
        .unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_matches!(resolved.tool, ToolSpec::External { args, .. } if args == ["summarize.py"]);
    }

    #[test]
    fn partial_weights_keep_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"biological_age": {"base_age": 35}}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.weights.base_age, 35.0);
        assert_eq!(resolved.weights.metabolic_weight, 1.2);
    }

    #[test]
    fn zero_timeout_rejected() {
        let config: Config = serde_json::from_str(r#"{"genomic": {"timeout_secs": 0}}"#).unwrap();
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, BioAgeError::InvalidConfig(_));
    }
}
