use serde::{Deserialize, Serialize};

use crate::error::BioAgeError;
use crate::genomic::GenomicAnalysisResult;
use crate::metabolic::MetabolicAnalysisResult;

pub const CLOCK_TYPE: &str = "risk-composite";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeWeights {
    pub base_age: f64,
    pub genomic_weight: f64,
    pub metabolic_weight: f64,
}

impl Default for AgeWeights {
    fn default() -> Self {
        Self {
            base_age: 30.0,
            genomic_weight: 0.5,
            metabolic_weight: 1.2,
        }
    }
}

impl AgeWeights {
    pub fn validate(&self) -> Result<(), BioAgeError> {
        let fields = [
            ("base_age", self.base_age),
            ("genomic_weight", self.genomic_weight),
            ("metabolic_weight", self.metabolic_weight),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(BioAgeError::InvalidConfig(format!(
                    "biological_age.{name} must be a finite number"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiologicalAgeEstimate {
    pub biological_age: f64,
    pub chronological_age: Option<f64>,
    pub age_acceleration: f64,
    pub clock_type: String,
}

pub fn estimate_biological_age(
    genomic: &GenomicAnalysisResult,
    metabolic: &MetabolicAnalysisResult,
    chronological_age: Option<f64>,
    weights: &AgeWeights,
) -> Result<BiologicalAgeEstimate, BioAgeError> {
    if let Some(age) = chronological_age {
        if !age.is_finite() || age < 0.0 {
            return Err(BioAgeError::Validation(format!(
                "chronological age must be a non-negative number, got {age}"
            )));
        }
    }

    let raw = weights.base_age
        + genomic.significant_variants.len() as f64 * weights.genomic_weight
        + metabolic.significant_biomarkers.len() as f64 * weights.metabolic_weight;
    let biological_age = raw.round();
    let age_acceleration = chronological_age
        .map(|age| biological_age - age)
        .unwrap_or(0.0);

    Ok(BiologicalAgeEstimate {
        biological_age,
        chronological_age,
        age_acceleration,
        clock_type: CLOCK_TYPE.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::catalog::ImpactLevel;
    use crate::genomic::{GenomicVariantRecord, QualityMetrics};
    use crate::metabolic::{Biomarker, Interpretation};

    fn genomic(significant: usize) -> GenomicAnalysisResult {
        GenomicAnalysisResult {
            variant_count: significant as u64 + 10,
            significant_variants: (0..significant)
                .map(|index| GenomicVariantRecord {
                    variant_id: format!("rs{index}"),
                    gene: "APOE".to_string(),
                    impact_level: ImpactLevel::High,
                    clinical_significance: "test".to_string(),
                })
                .collect(),
            quality_metrics: QualityMetrics {
                coverage_depth: 30.0,
                accuracy_percent: 99.0,
            },
        }
    }

    fn metabolic(significant: usize) -> MetabolicAnalysisResult {
        let biomarkers: Vec<Biomarker> = (0..significant)
            .map(|_| Biomarker {
                name: "glucose".to_string(),
                value: 130.0,
                unit: "mg/dL".to_string(),
                reference_range: "70-100".to_string(),
                deviation_percent: 30.0,
                interpretation: Interpretation::ModerateRisk,
            })
            .collect();
        MetabolicAnalysisResult {
            biomarker_count: biomarkers.len(),
            significant_biomarkers: biomarkers.clone(),
            biomarkers,
            metabolic_score: 100 - 15 * significant as u8,
        }
    }

    #[test]
    fn composite_is_rounded() {
        let estimate =
            estimate_biological_age(&genomic(3), &metabolic(2), None, &AgeWeights::default())
                .unwrap();
        assert_eq!(estimate.biological_age, 34.0);
        assert_eq!(estimate.chronological_age, None);
        assert_eq!(estimate.age_acceleration, 0.0);
        assert_eq!(estimate.clock_type, CLOCK_TYPE);
    }

    #[test]
    fn acceleration_against_chronological_age() {
        let estimate = estimate_biological_age(
            &genomic(1),
            &metabolic(0),
            Some(41.0),
            &AgeWeights::default(),
        )
        .unwrap();
        assert_eq!(estimate.biological_age, 31.0);
        assert_eq!(estimate.age_acceleration, -10.0);
    }

    #[test]
    fn estimate_is_idempotent() {
        let weights = AgeWeights::default();
        let first =
            estimate_biological_age(&genomic(2), &metabolic(3), Some(35.0), &weights).unwrap();
        let second =
            estimate_biological_age(&genomic(2), &metabolic(3), Some(35.0), &weights).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn negative_chronological_age_rejected() {
        let err = estimate_biological_age(
            &genomic(0),
            &metabolic(0),
            Some(-1.0),
            &AgeWeights::default(),
        )
        .unwrap_err();
        assert_matches!(err, BioAgeError::Validation(_));
    }

    #[test]
    fn custom_weights() {
        let weights = AgeWeights {
            base_age: 40.0,
            genomic_weight: 2.0,
            metabolic_weight: 0.0,
        };
        let estimate = estimate_biological_age(&genomic(2), &metabolic(4), None, &weights).unwrap();
        assert_eq!(estimate.biological_age, 44.0);
    }
}
