use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFileType,
    ValidationFailure,
    ParseFailure,
    ProcessingFailure,
    NotFoundFailure,
    Configuration,
}

impl ErrorKind {
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::UnsupportedFileType => 400,
            ErrorKind::ValidationFailure | ErrorKind::ParseFailure => 422,
            ErrorKind::NotFoundFailure => 404,
            ErrorKind::ProcessingFailure | ErrorKind::Configuration => 500,
        }
    }

    pub fn is_caller_error(self) -> bool {
        (400..500).contains(&self.status())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFileType => "unsupported_file_type",
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::ProcessingFailure => "processing_failure",
            ErrorKind::NotFoundFailure => "not_found",
            ErrorKind::Configuration => "configuration",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum BioAgeError {
    #[error("unsupported file type: {0}")]
    #[diagnostic(help("supported types: vcf, fasta, fastq, csv, json"))]
    UnsupportedFileType(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("processing failed: {0}")]
    Processing(String),

    #[error("{tool} timed out after {limit:?}")]
    Timeout { tool: String, limit: Duration },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid reference catalog: {0}")]
    InvalidCatalog(String),

    #[error("{domain} analysis of {} failed", .path.display())]
    Analysis {
        domain: Domain,
        path: PathBuf,
        #[source]
        source: Box<BioAgeError>,
    },
}

impl BioAgeError {
    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        BioAgeError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BioAgeError::UnsupportedFileType(_) => ErrorKind::UnsupportedFileType,
            BioAgeError::Validation(_) => ErrorKind::ValidationFailure,
            BioAgeError::Parse { .. } => ErrorKind::ParseFailure,
            BioAgeError::Processing(_)
            | BioAgeError::Timeout { .. }
            | BioAgeError::MissingTool(_)
            | BioAgeError::Filesystem(_) => ErrorKind::ProcessingFailure,
            BioAgeError::NotFound(_) => ErrorKind::NotFoundFailure,
            BioAgeError::ConfigRead(_)
            | BioAgeError::ConfigParse(_)
            | BioAgeError::InvalidConfig(_)
            | BioAgeError::InvalidCatalog(_) => ErrorKind::Configuration,
            BioAgeError::Analysis { source, .. } => source.kind(),
        }
    }

    pub fn status(&self) -> u16 {
        self.kind().status()
    }

    pub fn root(&self) -> &BioAgeError {
        match self {
            BioAgeError::Analysis { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn in_domain(self, domain: Domain, path: impl Into<PathBuf>) -> Self {
        match self {
            already @ BioAgeError::Analysis { .. } => already,
            other => BioAgeError::Analysis {
                domain,
                path: path.into(),
                source: Box::new(other),
            },
        }
    }
}
