use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::catalog::{ImpactLevel, ReferenceCatalog, normalize_key};
use crate::domain::{Domain, FileFormat};
use crate::error::BioAgeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReport {
    pub record_count: u64,
    #[serde(default)]
    pub variant_ids: Vec<String>,
    pub coverage_depth: f64,
    pub accuracy_percent: f64,
}

pub trait GenomicTool: Send + Sync {
    fn name(&self) -> &str;
    fn summarize(&self, path: &Path, format: FileFormat) -> Result<ToolReport, BioAgeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenomicVariantRecord {
    pub variant_id: String,
    pub gene: String,
    pub impact_level: ImpactLevel,
    pub clinical_significance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub coverage_depth: f64,
    pub accuracy_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenomicAnalysisResult {
    pub variant_count: u64,
    pub significant_variants: Vec<GenomicVariantRecord>,
    pub quality_metrics: QualityMetrics,
}

#[derive(Clone)]
pub struct GenomicEngine {
    catalog: Arc<ReferenceCatalog>,
    tool: Arc<dyn GenomicTool>,
    timeout: Duration,
}

impl GenomicEngine {
    pub fn new(catalog: Arc<ReferenceCatalog>, tool: Arc<dyn GenomicTool>, timeout: Duration) -> Self {
        Self {
            catalog,
            tool,
            timeout,
        }
    }

    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }

    pub fn analyze(
        &self,
        path: &Path,
        format: FileFormat,
    ) -> Result<GenomicAnalysisResult, BioAgeError> {
        if format.domain() != Domain::Genomic {
            return Err(BioAgeError::UnsupportedFileType(format!(
                "{format} is not a genomic format"
            )));
        }

        let started = Instant::now();
        let report = self.run_tool(path, format)?;
        let result = self.annotate(report)?;

        tracing::info!(
            path = %path.display(),
            tool = self.tool.name(),
            variants = result.variant_count,
            significant = result.significant_variants.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "genomic analysis completed"
        );
        Ok(result)
    }

    fn run_tool(&self, path: &Path, format: FileFormat) -> Result<ToolReport, BioAgeError> {
        let (tx, rx) = mpsc::channel();
        let tool = Arc::clone(&self.tool);
        let input = path.to_path_buf();
        thread::Builder::new()
            .name("genomic-tool".to_string())
            .spawn(move || {
                let _ = tx.send(tool.summarize(&input, format));
            })
            .map_err(|err| BioAgeError::Processing(err.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    path = %path.display(),
                    tool = self.tool.name(),
                    "genomic tool exceeded its time limit"
                );
                Err(BioAgeError::Timeout {
                    tool: self.tool.name().to_string(),
                    limit: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(BioAgeError::Processing(format!(
                "{} stopped without reporting a result",
                self.tool.name()
            ))),
        }
    }

    pub fn annotate(&self, report: ToolReport) -> Result<GenomicAnalysisResult, BioAgeError> {
        let coverage = report.coverage_depth;
        let accuracy = report.accuracy_percent;
        if !coverage.is_finite() || coverage < 0.0 {
            return Err(BioAgeError::parse(
                "genomic tool report",
                format!("coverage depth out of range: {coverage}"),
            ));
        }
        if !accuracy.is_finite() || !(0.0..=100.0).contains(&accuracy) {
            return Err(BioAgeError::parse(
                "genomic tool report",
                format!("accuracy out of range: {accuracy}"),
            ));
        }

        let mut seen = HashSet::new();
        let mut significant_variants = Vec::new();
        for id in &report.variant_ids {
            let key = normalize_key(id);
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(known) = self.catalog.variant(&key) {
                significant_variants.push(GenomicVariantRecord {
                    variant_id: key,
                    gene: known.gene.clone(),
                    impact_level: known.impact,
                    clinical_significance: known.clinical_significance.clone(),
                });
            }
        }

        if significant_variants.len() as u64 > report.record_count {
            return Err(BioAgeError::parse(
                "genomic tool report",
                format!(
                    "{} catalog matches exceed the {} reported records",
                    significant_variants.len(),
                    report.record_count
                ),
            ));
        }

        Ok(GenomicAnalysisResult {
            variant_count: report.record_count,
            significant_variants,
            quality_metrics: QualityMetrics {
                coverage_depth: coverage,
                accuracy_percent: accuracy,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    struct FixedTool(ToolReport);

    impl GenomicTool for FixedTool {
        fn name(&self) -> &str {
            "fixed"
        }

        fn summarize(&self, _path: &Path, _format: FileFormat) -> Result<ToolReport, BioAgeError> {
            Ok(self.0.clone())
        }
    }

    struct SlowTool;

    impl GenomicTool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn summarize(&self, _path: &Path, _format: FileFormat) -> Result<ToolReport, BioAgeError> {
            thread::sleep(Duration::from_millis(500));
            Err(BioAgeError::Processing("should have timed out".to_string()))
        }
    }

    fn engine(tool: impl GenomicTool + 'static, timeout: Duration) -> GenomicEngine {
        let catalog = Arc::new(ReferenceCatalog::bundled().unwrap());
        GenomicEngine::new(catalog, Arc::new(tool), timeout)
    }

    fn report(ids: &[&str], records: u64) -> ToolReport {
        ToolReport {
            record_count: records,
            variant_ids: ids.iter().map(|id| id.to_string()).collect(),
            coverage_depth: 31.5,
            accuracy_percent: 98.2,
        }
    }

    #[test]
    fn matches_follow_report_order() {
        let engine = engine(
            FixedTool(report(&["rs1801133", "rs999", "RS429358", "rs1801133"], 4)),
            Duration::from_secs(5),
        );
        let result = engine
            .analyze(Path::new("sample.vcf"), FileFormat::Vcf)
            .unwrap();
        let ids: Vec<_> = result
            .significant_variants
            .iter()
            .map(|record| record.variant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["rs1801133", "rs429358"]);
        assert_eq!(result.variant_count, 4);
        assert_eq!(result.quality_metrics.coverage_depth, 31.5);
        assert_eq!(result.significant_variants[1].gene, "APOE");
    }

    #[test]
    fn timeout_is_processing_failure() {
        let engine = engine(SlowTool, Duration::from_millis(20));
        let err = engine
            .analyze(Path::new("sample.fastq"), FileFormat::Fastq)
            .unwrap_err();
        assert_matches!(err, BioAgeError::Timeout { .. });
    }

    #[test]
    fn metabolic_format_rejected() {
        let engine = engine(FixedTool(report(&[], 0)), Duration::from_secs(5));
        let err = engine
            .analyze(Path::new("panel.csv"), FileFormat::Csv)
            .unwrap_err();
        assert_matches!(err, BioAgeError::UnsupportedFileType(_));
    }

    #[test]
    fn out_of_range_metrics_rejected() {
        let engine = engine(FixedTool(report(&[], 0)), Duration::from_secs(5));
        let mut bad = report(&[], 1);
        bad.accuracy_percent = 101.0;
        assert_matches!(engine.annotate(bad), Err(BioAgeError::Parse { .. }));

        let mut bad = report(&[], 1);
        bad.coverage_depth = f64::NAN;
        assert_matches!(engine.annotate(bad), Err(BioAgeError::Parse { .. }));
    }

    #[test]
    fn more_matches_than_records_rejected() {
        let engine = engine(FixedTool(report(&[], 0)), Duration::from_secs(5));
        let err = engine
            .annotate(report(&["rs7412", "rs429358"], 1))
            .unwrap_err();
        assert_matches!(err, BioAgeError::Parse { .. });
    }
}
