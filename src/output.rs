use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::age::BiologicalAgeEstimate;
use crate::catalog::ReferenceCatalog;
use crate::domain::{Domain, FileFormat};
use crate::error::{BioAgeError, ErrorKind};
use crate::pipeline::AnalysisResult;
use crate::store::StoredAnalysis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyOutput {
    pub path: PathBuf,
    pub format: FileFormat,
    pub domain: Domain,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureOutput {
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
}

impl From<&BioAgeError> for FailureOutput {
    fn from(err: &BioAgeError) -> Self {
        let message = match err {
            BioAgeError::Analysis { .. } => format!("{err}: {}", err.root()),
            other => other.to_string(),
        };
        Self {
            kind: err.kind(),
            status: err.status(),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemOutput {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureOutput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutput {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BatchItemOutput>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_classify(result: &ClassifyOutput) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_analysis(result: &AnalysisResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_stored(record: &StoredAnalysis) -> io::Result<()> {
        Self::print_json(record)
    }

    pub fn print_list(records: &[StoredAnalysis]) -> io::Result<()> {
        Self::print_json(&records)
    }

    pub fn print_batch(result: &BatchOutput) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_age(estimate: &BiologicalAgeEstimate) -> io::Result<()> {
        Self::print_json(estimate)
    }

    pub fn print_catalog(catalog: &ReferenceCatalog) -> io::Result<()> {
        Self::print_json(catalog)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_output_includes_cause() {
        let err = BioAgeError::Validation("no usable rows".to_string())
            .in_domain(Domain::Metabolic, "panel.csv");
        let output = FailureOutput::from(&err);
        assert_eq!(output.kind, ErrorKind::ValidationFailure);
        assert_eq!(output.status, 422);
        assert!(output.message.contains("panel.csv"));
        assert!(output.message.contains("no usable rows"));
    }
}
