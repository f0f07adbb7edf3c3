use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::BioAgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Vcf,
    Fasta,
    Fastq,
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Genomic,
    Metabolic,
}

impl FileFormat {
    pub const ALL: [FileFormat; 5] = [
        FileFormat::Vcf,
        FileFormat::Fasta,
        FileFormat::Fastq,
        FileFormat::Csv,
        FileFormat::Json,
    ];

    pub fn domain(self) -> Domain {
        match self {
            FileFormat::Vcf | FileFormat::Fasta | FileFormat::Fastq => Domain::Genomic,
            FileFormat::Csv | FileFormat::Json => Domain::Metabolic,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Vcf => "vcf",
            FileFormat::Fasta => "fasta",
            FileFormat::Fastq => "fastq",
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }

    pub fn from_content_type(value: &str) -> Result<Self, BioAgeError> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/vcf" | "text/x-vcf" => Ok(FileFormat::Vcf),
            "text/x-fasta" | "application/x-fasta" => Ok(FileFormat::Fasta),
            "text/x-fastq" | "application/x-fastq" => Ok(FileFormat::Fastq),
            "text/csv" => Ok(FileFormat::Csv),
            "application/json" => Ok(FileFormat::Json),
            _ => Err(BioAgeError::UnsupportedFileType(value.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = BioAgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().trim_start_matches('.').to_ascii_lowercase();
        FileFormat::ALL
            .into_iter()
            .find(|format| format.extension() == normalized)
            .ok_or_else(|| BioAgeError::UnsupportedFileType(value.to_string()))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Genomic => write!(f, "genomic"),
            Domain::Metabolic => write!(f, "metabolic"),
        }
    }
}

pub fn classify(
    extension: Option<&str>,
    content_type: Option<&str>,
) -> Result<FileFormat, BioAgeError> {
    let extension = extension.map(str::trim).filter(|value| !value.is_empty());
    match (extension, content_type) {
        (Some(ext), _) => ext.parse(),
        (None, Some(content_type)) => FileFormat::from_content_type(content_type),
        (None, None) => Err(BioAgeError::UnsupportedFileType(
            "no extension or content type declared".to_string(),
        )),
    }
}

pub fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|value| value.to_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub path: PathBuf,
    pub declared_extension: Option<String>,
    pub content_type: Option<String>,
    pub domain_hint: Option<Domain>,
}

impl AnalysisRequest {
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let declared_extension = extension_of(&path).map(str::to_string);
        Self {
            path,
            declared_extension,
            content_type: None,
            domain_hint: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.declared_extension = Some(extension.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_domain_hint(mut self, domain: Domain) -> Self {
        self.domain_hint = Some(domain);
        self
    }

    pub fn classify(&self) -> Result<FileFormat, BioAgeError> {
        let format = classify(
            self.declared_extension.as_deref(),
            self.content_type.as_deref(),
        )?;
        match self.domain_hint {
            Some(hint) if hint != format.domain() => Err(BioAgeError::UnsupportedFileType(
                format!("{format} is not a {hint} file"),
            )),
            _ => Ok(format),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!("VCF".parse::<FileFormat>().unwrap(), FileFormat::Vcf);
        assert_eq!(".FastQ".parse::<FileFormat>().unwrap(), FileFormat::Fastq);
    }

    #[test]
    fn content_type_parameters_ignored() {
        let format = FileFormat::from_content_type("text/csv; charset=utf-8").unwrap();
        assert_eq!(format, FileFormat::Csv);
    }

    #[test]
    fn extension_wins_over_content_type() {
        let format = classify(Some("json"), Some("text/csv")).unwrap();
        assert_eq!(format, FileFormat::Json);
    }

    #[test]
    fn nothing_declared() {
        assert_matches!(classify(None, None), Err(BioAgeError::UnsupportedFileType(_)));
        assert_matches!(
            classify(Some("  "), None),
            Err(BioAgeError::UnsupportedFileType(_))
        );
    }

    #[test]
    fn request_uses_path_extension() {
        let request = AnalysisRequest::for_path("/uploads/file-123.Fasta");
        assert_eq!(request.declared_extension.as_deref(), Some("Fasta"));
        assert_eq!(request.classify().unwrap(), FileFormat::Fasta);
    }
}
