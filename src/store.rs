use std::fs;
use std::io::Write;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::{Domain, FileFormat};
use crate::error::BioAgeError;
use crate::pipeline::AnalysisResult;

pub trait ResultStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<StoredAnalysis>, BioAgeError>;
    fn save(&self, record: &StoredAnalysis) -> Result<(), BioAgeError>;

    fn load_domain(&self, id: &str, domain: Domain) -> Result<Option<StoredAnalysis>, BioAgeError> {
        Ok(self.load(id)?.filter(|record| record.domain == domain))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub id: String,
    pub domain: Domain,
    pub format: FileFormat,
    pub source_path: String,
    pub analyzed_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

impl StoredAnalysis {
    pub fn new(source: &Path, format: FileFormat, result: AnalysisResult) -> Self {
        let analyzed_at = Utc::now();
        let stem = source
            .file_stem()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| format.extension().to_string());
        let id = format!(
            "{}-{}",
            sanitize_id(&stem),
            analyzed_at.format("%Y%m%dT%H%M%S%9f")
        );
        let source_path = fs::canonicalize(source)
            .unwrap_or_else(|_| source.to_path_buf())
            .to_string_lossy()
            .to_string();
        Self {
            id,
            domain: result.domain(),
            format,
            source_path,
            analyzed_at,
            result,
        }
    }

    pub fn replace_result(self, result: AnalysisResult) -> Self {
        Self {
            domain: result.domain(),
            analyzed_at: Utc::now(),
            result,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn results_dir(&self) -> Utf8PathBuf {
        self.root.join("results")
    }

    pub fn result_path(&self, id: &str) -> Result<Utf8PathBuf, BioAgeError> {
        if id.is_empty() || sanitize_id(id) != id {
            return Err(BioAgeError::NotFound(format!("analysis {id}")));
        }
        Ok(self.results_dir().join(format!("{id}.json")))
    }

    pub fn ensure_root(&self) -> Result<(), BioAgeError> {
        fs::create_dir_all(self.results_dir().as_std_path())
            .map_err(|err| BioAgeError::Filesystem(err.to_string()))
    }

    pub fn list(&self) -> Result<Vec<StoredAnalysis>, BioAgeError> {
        let dir = self.results_dir();
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        let entries =
            fs::read_dir(dir.as_std_path()).map_err(|err| BioAgeError::Filesystem(err.to_string()))?;
        for entry in entries {
            let path = entry
                .map_err(|err| BioAgeError::Filesystem(err.to_string()))?
                .path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                records.push(read_record(&path)?);
            }
        }
        records.sort_by(|a, b| a.analyzed_at.cmp(&b.analyzed_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn remove(&self, id: &str) -> Result<(), BioAgeError> {
        let path = self.result_path(id)?;
        if !path.as_std_path().exists() {
            return Err(BioAgeError::NotFound(format!("analysis {id}")));
        }
        fs::remove_file(path.as_std_path()).map_err(|err| BioAgeError::Filesystem(err.to_string()))
    }
}

impl ResultStore for Store {
    fn load(&self, id: &str) -> Result<Option<StoredAnalysis>, BioAgeError> {
        let path = self.result_path(id)?;
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        read_record(path.as_std_path()).map(Some)
    }

    fn save(&self, record: &StoredAnalysis) -> Result<(), BioAgeError> {
        let path = self.result_path(&record.id)?;
        ensure_finite(record)?;
        self.ensure_root()?;
        let content = serde_json::to_vec_pretty(record)
            .map_err(|err| BioAgeError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".kira-bioage-result")
            .tempfile_in(self.results_dir().as_std_path())
            .map_err(|err| BioAgeError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| BioAgeError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| BioAgeError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<StoredAnalysis, BioAgeError> {
    let content =
        fs::read_to_string(path).map_err(|err| BioAgeError::Filesystem(err.to_string()))?;
    serde_json::from_str(&content)
        .map_err(|err| BioAgeError::parse(format!("stored result {}", path.display()), err))
}

fn ensure_finite(record: &StoredAnalysis) -> Result<(), BioAgeError> {
    let values: Vec<f64> = match &record.result {
        AnalysisResult::Genomic(result) => vec![
            result.quality_metrics.coverage_depth,
            result.quality_metrics.accuracy_percent,
        ],
        AnalysisResult::Metabolic(result) => result
            .biomarkers
            .iter()
            .chain(&result.significant_biomarkers)
            .flat_map(|biomarker| [biomarker.value, biomarker.deviation_percent])
            .collect(),
    };
    if values.iter().all(|value| value.is_finite()) {
        Ok(())
    } else {
        Err(BioAgeError::Validation(format!(
            "analysis {} contains non-finite numbers",
            record.id
        )))
    }
}

fn sanitize_id(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new("/tmp/project/.kira-bioage");
        let path = store.result_path("panel-20260101T000000000000000").unwrap();
        assert!(path.ends_with("results/panel-20260101T000000000000000.json"));
    }

    #[test]
    fn ids_cannot_escape_the_store() {
        let store = Store::new("/tmp/project/.kira-bioage");
        assert!(store.result_path("../secrets").is_err());
        assert!(store.result_path("").is_err());
    }

    #[test]
    fn sanitized_stem() {
        assert_eq!(sanitize_id("blood panel (march)"), "blood_panel__march_");
    }
}
