use assert_matches::assert_matches;

use kira_bioage::domain::{AnalysisRequest, Domain, FileFormat, classify};
use kira_bioage::error::{BioAgeError, ErrorKind};

#[test]
fn every_supported_extension_classifies() {
    for format in FileFormat::ALL {
        let classified = classify(Some(format.extension()), None).unwrap();
        assert_eq!(classified, format);
    }
    assert_eq!(classify(Some("vcf"), None).unwrap().domain(), Domain::Genomic);
    assert_eq!(classify(Some("fastq"), None).unwrap().domain(), Domain::Genomic);
    assert_eq!(classify(Some("csv"), None).unwrap().domain(), Domain::Metabolic);
}

#[test]
fn extension_is_case_insensitive() {
    assert_eq!(classify(Some(".VCF"), None).unwrap(), FileFormat::Vcf);
    assert_eq!(classify(Some("Json"), None).unwrap(), FileFormat::Json);
}

#[test]
fn unknown_extension_rejected() {
    let err = classify(Some("txt"), None).unwrap_err();
    assert_matches!(err, BioAgeError::UnsupportedFileType(_));
    assert_eq!(err.kind(), ErrorKind::UnsupportedFileType);
    assert_eq!(err.status(), 400);
}

#[test]
fn content_type_used_without_extension() {
    let request = AnalysisRequest::for_path("upload").with_content_type("text/csv");
    assert_eq!(request.classify().unwrap(), FileFormat::Csv);
}

#[test]
fn extension_wins_over_content_type() {
    let request = AnalysisRequest::for_path("panel.csv").with_content_type("application/json");
    assert_eq!(request.classify().unwrap(), FileFormat::Csv);
}

#[test]
fn nothing_to_classify_by() {
    let err = AnalysisRequest::for_path("upload").classify().unwrap_err();
    assert_matches!(err, BioAgeError::UnsupportedFileType(_));
}

#[test]
fn declared_extension_overrides_path() {
    let request = AnalysisRequest::for_path("sample.data").with_extension("fasta");
    assert_eq!(request.classify().unwrap(), FileFormat::Fasta);
}

#[test]
fn domain_hint_mismatch() {
    let request = AnalysisRequest::for_path("panel.csv").with_domain_hint(Domain::Genomic);
    let err = request.classify().unwrap_err();
    assert_matches!(err, BioAgeError::UnsupportedFileType(_));

    let request = AnalysisRequest::for_path("panel.csv").with_domain_hint(Domain::Metabolic);
    assert_eq!(request.classify().unwrap(), FileFormat::Csv);
}
