use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{ReferenceCatalog, ReferenceRange, normalize_key};
use crate::domain::FileFormat;
use crate::error::BioAgeError;

const MODERATE_RISK_THRESHOLD: f64 = 20.0;
const HIGH_RISK_THRESHOLD: f64 = 50.0;
const SCORE_PENALTY_PER_PERCENT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interpretation {
    Normal,
    ModerateRisk,
    HighRisk,
}

impl Interpretation {
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation > HIGH_RISK_THRESHOLD {
            Interpretation::HighRisk
        } else if deviation > MODERATE_RISK_THRESHOLD {
            Interpretation::ModerateRisk
        } else {
            Interpretation::Normal
        }
    }

    pub fn is_significant(self) -> bool {
        self != Interpretation::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Biomarker {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub reference_range: String,
    pub deviation_percent: f64,
    pub interpretation: Interpretation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetabolicAnalysisResult {
    pub biomarker_count: usize,
    pub biomarkers: Vec<Biomarker>,
    pub significant_biomarkers: Vec<Biomarker>,
    pub metabolic_score: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiomarkerRow {
    pub name: Option<String>,
    pub value: Option<f64>,
}

pub fn deviation_percent(value: f64, range: &ReferenceRange) -> f64 {
    let below = if range.min > 0.0 {
        relative_percent(range.min - value, range.min)
    } else {
        0.0
    };
    let above = if range.max > 0.0 {
        relative_percent(value - range.max, range.max)
    } else {
        0.0
    };
    below.max(above).max(0.0)
}

fn relative_percent(excess: f64, bound: f64) -> f64 {
    let percent = excess * 100.0 / bound;
    if percent.is_finite() {
        percent
    } else {
        (excess / bound * 100.0).min(f64::MAX)
    }
}

pub fn metabolic_score(significant: &[Biomarker]) -> u8 {
    let penalty: f64 = significant
        .iter()
        .map(|biomarker| biomarker.deviation_percent * SCORE_PENALTY_PER_PERCENT)
        .sum();
    (100.0 - penalty).max(0.0).round() as u8
}

#[derive(Debug, Clone)]
pub struct MetabolicEngine {
    catalog: Arc<ReferenceCatalog>,
}

impl MetabolicEngine {
    pub fn new(catalog: Arc<ReferenceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn analyze(
        &self,
        path: &Path,
        format: FileFormat,
    ) -> Result<MetabolicAnalysisResult, BioAgeError> {
        if !matches!(format, FileFormat::Csv | FileFormat::Json) {
            return Err(BioAgeError::UnsupportedFileType(format!(
                "{format} is not a metabolic format"
            )));
        }
        let file = File::open(path).map_err(|err| {
            BioAgeError::Processing(format!("open {}: {err}", path.display()))
        })?;
        let rows = match format {
            FileFormat::Csv => read_csv_rows(BufReader::new(file))?,
            _ => read_json_rows(BufReader::new(file))?,
        };

        let result = self.score_rows(rows)?;
        tracing::info!(
            path = %path.display(),
            biomarkers = result.biomarker_count,
            significant = result.significant_biomarkers.len(),
            score = result.metabolic_score,
            "metabolic analysis completed"
        );
        Ok(result)
    }

    pub fn score_rows(&self, rows: Vec<BiomarkerRow>) -> Result<MetabolicAnalysisResult, BioAgeError> {
        let candidates = rows.len();
        let biomarkers: Vec<Biomarker> = rows
            .into_iter()
            .filter_map(|row| {
                let biomarker = self.biomarker(&row);
                if biomarker.is_none() {
                    tracing::debug!(name = ?row.name, value = ?row.value, "dropping biomarker row");
                }
                biomarker
            })
            .collect();

        if candidates > 0 && biomarkers.is_empty() {
            return Err(BioAgeError::Validation(format!(
                "none of the {candidates} biomarker records matched the reference catalog"
            )));
        }

        let significant_biomarkers: Vec<Biomarker> = biomarkers
            .iter()
            .filter(|biomarker| biomarker.interpretation.is_significant())
            .cloned()
            .collect();
        let metabolic_score = metabolic_score(&significant_biomarkers);

        Ok(MetabolicAnalysisResult {
            biomarker_count: biomarkers.len(),
            biomarkers,
            significant_biomarkers,
            metabolic_score,
        })
    }

    pub fn biomarker(&self, row: &BiomarkerRow) -> Option<Biomarker> {
        let name = normalize_key(row.name.as_deref()?);
        let value = row.value.filter(|value| value.is_finite())?;
        let range = self.catalog.biomarker(&name)?;
        let deviation = deviation_percent(value, range);
        Some(Biomarker {
            name,
            value,
            unit: range.unit.clone(),
            reference_range: range.label(),
            deviation_percent: deviation,
            interpretation: Interpretation::from_deviation(deviation),
        })
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<BiomarkerRow>, BioAgeError> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|err| BioAgeError::parse("csv", err))?
        .clone();
    let column = |wanted: &str| {
        headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BioAgeError::parse("csv", format!("missing `{wanted}` column")))
    };
    let name_column = column("name")?;
    let value_column = column("value")?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| BioAgeError::parse("csv", err))?;
        rows.push(BiomarkerRow {
            name: record
                .get(name_column)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            value: record.get(value_column).and_then(parse_number),
        });
    }
    Ok(rows)
}

pub fn read_json_rows<R: Read>(reader: R) -> Result<Vec<BiomarkerRow>, BioAgeError> {
    let document: Value =
        serde_json::from_reader(reader).map_err(|err| BioAgeError::parse("json", err))?;
    let Value::Array(items) = document else {
        return Err(BioAgeError::parse(
            "json",
            "expected an array of biomarker records",
        ));
    };

    Ok(items
        .iter()
        .map(|item| BiomarkerRow {
            name: item
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            value: item.get("value").and_then(|value| match value {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => parse_number(text),
                _ => None,
            }),
        })
        .collect())
}
