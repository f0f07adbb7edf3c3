use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::age::{AgeWeights, BiologicalAgeEstimate, estimate_biological_age};
use crate::catalog::ReferenceCatalog;
use crate::config::ResolvedConfig;
use crate::domain::{AnalysisRequest, Domain};
use crate::error::{BioAgeError, ErrorKind};
use crate::genomic::{GenomicAnalysisResult, GenomicEngine, GenomicTool};
use crate::metabolic::{MetabolicAnalysisResult, MetabolicEngine};
use crate::store::{ResultStore, StoredAnalysis};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "result", rename_all = "lowercase")]
pub enum AnalysisResult {
    Genomic(GenomicAnalysisResult),
    Metabolic(MetabolicAnalysisResult),
}

impl AnalysisResult {
    pub fn domain(&self) -> Domain {
        match self {
            AnalysisResult::Genomic(_) => Domain::Genomic,
            AnalysisResult::Metabolic(_) => Domain::Metabolic,
        }
    }

    pub fn into_genomic(self) -> Option<GenomicAnalysisResult> {
        match self {
            AnalysisResult::Genomic(result) => Some(result),
            AnalysisResult::Metabolic(_) => None,
        }
    }

    pub fn into_metabolic(self) -> Option<MetabolicAnalysisResult> {
        match self {
            AnalysisResult::Metabolic(result) => Some(result),
            AnalysisResult::Genomic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgeSource {
    File(AnalysisRequest),
    Stored(String),
}

impl AgeSource {
    pub fn is_stored(&self) -> bool {
        matches!(self, AgeSource::Stored(_))
    }
}

enum Resolved {
    Genomic(Result<GenomicAnalysisResult, BioAgeError>),
    Metabolic(Result<MetabolicAnalysisResult, BioAgeError>),
}

#[derive(Clone)]
pub struct Pipeline {
    genomic: GenomicEngine,
    metabolic: MetabolicEngine,
    weights: AgeWeights,
    store: Option<Arc<dyn ResultStore>>,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<ReferenceCatalog>,
        tool: Arc<dyn GenomicTool>,
        timeout: Duration,
        weights: AgeWeights,
    ) -> Self {
        Self {
            genomic: GenomicEngine::new(Arc::clone(&catalog), tool, timeout),
            metabolic: MetabolicEngine::new(catalog),
            weights,
            store: None,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Result<Self, BioAgeError> {
        let catalog = Arc::new(config.load_catalog()?);
        let tool = config.build_tool()?;
        Ok(Self::new(catalog, tool, config.timeout, config.weights))
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn weights(&self) -> &AgeWeights {
        &self.weights
    }

    pub fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResult, BioAgeError> {
        let format = request.classify()?;
        let domain = format.domain();
        tracing::info!(
            path = %request.path.display(),
            %format,
            %domain,
            "dispatching analysis"
        );

        let result = match domain {
            Domain::Genomic => self
                .genomic
                .analyze(&request.path, format)
                .map(AnalysisResult::Genomic),
            Domain::Metabolic => self
                .metabolic
                .analyze(&request.path, format)
                .map(AnalysisResult::Metabolic),
        };

        result.map_err(|err| {
            tracing::warn!(
                path = %request.path.display(),
                %domain,
                kind = %err.kind(),
                error = %err,
                "analysis failed"
            );
            err.in_domain(domain, &request.path)
        })
    }

    pub fn run_batch(
        &self,
        requests: &[AnalysisRequest],
    ) -> Vec<Result<AnalysisResult, BioAgeError>> {
        requests
            .par_iter()
            .map(|request| self.run(request))
            .collect()
    }

    pub fn run_batch_and_store(
        &self,
        requests: &[AnalysisRequest],
    ) -> Vec<Result<StoredAnalysis, BioAgeError>> {
        requests
            .par_iter()
            .map(|request| self.analyze_and_store(request))
            .collect()
    }

    pub fn analyze_and_store(
        &self,
        request: &AnalysisRequest,
    ) -> Result<StoredAnalysis, BioAgeError> {
        let store = self.require_store()?;
        let format = request.classify()?;
        let result = self.run(request)?;
        let record = StoredAnalysis::new(&request.path, format, result);
        store.save(&record)?;
        tracing::info!(id = %record.id, "stored analysis");
        Ok(record)
    }

    pub fn rerun(&self, id: &str) -> Result<StoredAnalysis, BioAgeError> {
        let store = self.require_store()?;
        let existing = store
            .load(id)?
            .ok_or_else(|| BioAgeError::NotFound(format!("analysis {id}")))?;

        let request = AnalysisRequest::for_path(PathBuf::from(&existing.source_path))
            .with_extension(existing.format.extension());
        let result = self.run(&request)?;
        let updated = existing.replace_result(result);
        store.save(&updated)?;
        tracing::info!(id = %updated.id, "re-ran analysis");
        Ok(updated)
    }

    // First engine error wins. Two missing stored lookups are reported together.
    pub fn biological_age(
        &self,
        genomic: AgeSource,
        metabolic: AgeSource,
        chronological_age: Option<f64>,
    ) -> Result<BiologicalAgeEstimate, BioAgeError> {
        let (genomic, metabolic) = self.resolve_pair(genomic, metabolic)?;
        let estimate =
            estimate_biological_age(&genomic, &metabolic, chronological_age, &self.weights)?;
        tracing::info!(
            biological_age = estimate.biological_age,
            acceleration = estimate.age_acceleration,
            "estimated biological age"
        );
        Ok(estimate)
    }

    fn resolve_pair(
        &self,
        genomic: AgeSource,
        metabolic: AgeSource,
    ) -> Result<(GenomicAnalysisResult, MetabolicAnalysisResult), BioAgeError> {
        let lookups_only = genomic.is_stored() && metabolic.is_stored();
        let (tx, rx) = mpsc::channel();

        let pipeline = self.clone();
        let genomic_tx = tx.clone();
        thread::spawn(move || {
            let _ = genomic_tx.send(Resolved::Genomic(pipeline.resolve_genomic(genomic)));
        });
        let pipeline = self.clone();
        thread::spawn(move || {
            let _ = tx.send(Resolved::Metabolic(pipeline.resolve_metabolic(metabolic)));
        });

        let mut genomic_result = None;
        let mut metabolic_result = None;
        let mut missing = Vec::new();
        for _ in 0..2 {
            let message = rx.recv().map_err(|_| {
                BioAgeError::Processing("analysis worker stopped without a result".to_string())
            })?;
            match message {
                Resolved::Genomic(Ok(result)) => genomic_result = Some(result),
                Resolved::Metabolic(Ok(result)) => metabolic_result = Some(result),
                Resolved::Genomic(Err(err)) | Resolved::Metabolic(Err(err)) => {
                    if lookups_only && err.kind() == ErrorKind::NotFoundFailure {
                        missing.push(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        if missing.len() > 1 {
            let names: Vec<String> = missing.iter().map(|err| err.root().to_string()).collect();
            return Err(BioAgeError::NotFound(names.join("; ")));
        }
        if let Some(err) = missing.pop() {
            return Err(err);
        }

        match (genomic_result, metabolic_result) {
            (Some(genomic), Some(metabolic)) => Ok((genomic, metabolic)),
            _ => Err(BioAgeError::Processing(
                "analysis worker stopped without a result".to_string(),
            )),
        }
    }

    fn resolve_genomic(&self, source: AgeSource) -> Result<GenomicAnalysisResult, BioAgeError> {
        match source {
            AgeSource::File(request) => {
                let request = request.with_domain_hint(Domain::Genomic);
                self.run(&request)?.into_genomic().ok_or_else(|| {
                    BioAgeError::UnsupportedFileType("expected a genomic file".to_string())
                })
            }
            AgeSource::Stored(id) => self
                .require_store()?
                .load_domain(&id, Domain::Genomic)?
                .and_then(|record| record.result.into_genomic())
                .ok_or_else(|| BioAgeError::NotFound(format!("genomic analysis {id}"))),
        }
    }

    fn resolve_metabolic(
        &self,
        source: AgeSource,
    ) -> Result<MetabolicAnalysisResult, BioAgeError> {
        match source {
            AgeSource::File(request) => {
                let request = request.with_domain_hint(Domain::Metabolic);
                self.run(&request)?.into_metabolic().ok_or_else(|| {
                    BioAgeError::UnsupportedFileType("expected a metabolic file".to_string())
                })
            }
            AgeSource::Stored(id) => self
                .require_store()?
                .load_domain(&id, Domain::Metabolic)?
                .and_then(|record| record.result.into_metabolic())
                .ok_or_else(|| BioAgeError::NotFound(format!("metabolic analysis {id}"))),
        }
    }

    fn require_store(&self) -> Result<&Arc<dyn ResultStore>, BioAgeError> {
        self.store
            .as_ref()
            .ok_or_else(|| BioAgeError::InvalidConfig("no result store configured".to_string()))
    }
}
