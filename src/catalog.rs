use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BioAgeError;

const BUNDLED_CATALOG: &str = include_str!("../assets/reference_catalog.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactLevel {
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[serde(alias = "moderate", alias = "MODERATE")]
    Moderate,
    #[serde(alias = "high", alias = "HIGH")]
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownVariant {
    pub gene: String,
    pub impact: ImpactLevel,
    pub clinical_significance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub min: f64,
    pub max: f64,
    pub unit: String,
}

impl ReferenceRange {
    pub fn label(&self) -> String {
        format!("{}-{}", self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCatalog {
    #[serde(default)]
    variants: BTreeMap<String, KnownVariant>,
    #[serde(default)]
    biomarkers: BTreeMap<String, ReferenceRange>,
}

impl ReferenceCatalog {
    pub fn bundled() -> Result<Self, BioAgeError> {
        Self::from_json(BUNDLED_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, BioAgeError> {
        let content = fs::read_to_string(path).map_err(|err| {
            BioAgeError::InvalidCatalog(format!("read {}: {err}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, BioAgeError> {
        let raw: ReferenceCatalog = serde_json::from_str(content)
            .map_err(|err| BioAgeError::InvalidCatalog(err.to_string()))?;
        Self::new(raw.variants, raw.biomarkers)
    }

    pub fn new(
        variants: impl IntoIterator<Item = (String, KnownVariant)>,
        biomarkers: impl IntoIterator<Item = (String, ReferenceRange)>,
    ) -> Result<Self, BioAgeError> {
        let mut catalog = Self::default();

        for (id, variant) in variants {
            let key = normalize_key(&id);
            if key.is_empty() {
                return Err(BioAgeError::InvalidCatalog(
                    "empty variant identifier".to_string(),
                ));
            }
            if catalog.variants.insert(key, variant).is_some() {
                return Err(BioAgeError::InvalidCatalog(format!(
                    "duplicate variant identifier: {id}"
                )));
            }
        }

        for (name, range) in biomarkers {
            let key = normalize_key(&name);
            if key.is_empty() {
                return Err(BioAgeError::InvalidCatalog(
                    "empty biomarker name".to_string(),
                ));
            }
            let valid = range.min.is_finite()
                && range.max.is_finite()
                && range.min >= 0.0
                && range.min <= range.max;
            if !valid {
                return Err(BioAgeError::InvalidCatalog(format!(
                    "biomarker {name} has an invalid range {}",
                    range.label()
                )));
            }
            if catalog.biomarkers.insert(key, range).is_some() {
                return Err(BioAgeError::InvalidCatalog(format!(
                    "duplicate biomarker name: {name}"
                )));
            }
        }

        Ok(catalog)
    }

    pub fn variant(&self, id: &str) -> Option<&KnownVariant> {
        self.variants.get(&normalize_key(id))
    }

    pub fn biomarker(&self, name: &str) -> Option<&ReferenceRange> {
        self.biomarkers.get(&normalize_key(name))
    }

    pub fn variants(&self) -> impl Iterator<Item = (&str, &KnownVariant)> {
        self.variants.iter().map(|(id, variant)| (id.as_str(), variant))
    }

    pub fn biomarkers(&self) -> impl Iterator<Item = (&str, &ReferenceRange)> {
        self.biomarkers.iter().map(|(name, range)| (name.as_str(), range))
    }
}

pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn bundled_catalog_loads() {
        let catalog = ReferenceCatalog::bundled().unwrap();
        let apoe = catalog.variant("rs429358").unwrap();
        assert_eq!(apoe.gene, "APOE");
        assert_eq!(apoe.impact, ImpactLevel::High);
        let glucose = catalog.biomarker("glucose").unwrap();
        assert_eq!(glucose.label(), "70-100");
        assert_eq!(glucose.unit, "mg/dL");
    }

    #[test]
    fn lookups_are_normalized() {
        let catalog = ReferenceCatalog::bundled().unwrap();
        assert!(catalog.variant(" RS7412 ").is_some());
        assert!(catalog.biomarker("Vitamin_D").is_some());
        assert!(catalog.variant("rs7412x").is_none());
    }

    #[test]
    fn rejects_inverted_range() {
        let err = ReferenceCatalog::from_json(
            r#"{"biomarkers": {"glucose": {"min": 100, "max": 70, "unit": "mg/dL"}}}"#,
        )
        .unwrap_err();
        assert_matches!(err, BioAgeError::InvalidCatalog(_));
    }

    #[test]
    fn rejects_keys_colliding_after_normalization() {
        let err = ReferenceCatalog::from_json(
            r#"{"biomarkers": {
                "HDL": {"min": 40, "max": 60, "unit": "mg/dL"},
                "hdl": {"min": 40, "max": 60, "unit": "mg/dL"}
            }}"#,
        )
        .unwrap_err();
        assert_matches!(err, BioAgeError::InvalidCatalog(_));
    }
}
