use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use bio::io::{fasta, fastq};
use noodles_vcf as vcf;
use noodles_vcf::variant::record::info::field::Value;
use noodles_vcf::variant::record::{Filters as _, Ids as _, Info as _};

use crate::domain::FileFormat;
use crate::error::BioAgeError;
use crate::genomic::{GenomicTool, ToolReport};

pub const DEFAULT_GENOME_SIZE_BP: f64 = 3_100_000_000.0;

const PHRED_OFFSET: u8 = 33;

#[derive(Debug, Clone)]
pub struct NativeReader {
    genome_size_bp: f64,
}

impl Default for NativeReader {
    fn default() -> Self {
        Self::new(DEFAULT_GENOME_SIZE_BP)
    }
}

impl NativeReader {
    pub fn new(genome_size_bp: f64) -> Self {
        Self { genome_size_bp }
    }

    pub fn read<R: BufRead>(&self, reader: R, format: FileFormat) -> Result<ToolReport, BioAgeError> {
        match format {
            FileFormat::Vcf => read_vcf(reader),
            FileFormat::Fasta => read_fasta(reader, self.genome_size_bp),
            FileFormat::Fastq => read_fastq(reader, self.genome_size_bp),
            FileFormat::Csv | FileFormat::Json => Err(BioAgeError::UnsupportedFileType(format!(
                "{format} is not a genomic format"
            ))),
        }
    }
}

impl GenomicTool for NativeReader {
    fn name(&self) -> &str {
        "native"
    }

    fn summarize(&self, path: &Path, format: FileFormat) -> Result<ToolReport, BioAgeError> {
        let file = File::open(path).map_err(|err| {
            BioAgeError::Processing(format!("open {}: {err}", path.display()))
        })?;
        self.read(BufReader::new(file), format)
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

fn read_vcf<R: BufRead>(reader: R) -> Result<ToolReport, BioAgeError> {
    let mut reader = vcf::io::Reader::new(reader);
    let header = reader
        .read_header()
        .map_err(|err| BioAgeError::parse("vcf header", err))?;

    let mut record_count = 0u64;
    let mut passing = 0u64;
    let mut depth_sum = 0.0;
    let mut depth_records = 0u64;
    let mut variant_ids = Vec::new();

    for result in reader.records() {
        let record = result.map_err(|err| BioAgeError::parse("vcf", err))?;
        record_count += 1;
        variant_ids.extend(
            record
                .ids()
                .iter()
                .map(str::trim)
                .filter(|id| !id.is_empty() && *id != ".")
                .map(str::to_string),
        );
        if passes_filters(&record, &header)? {
            passing += 1;
        }
        if let Some(depth) = total_depth(&record, &header) {
            depth_sum += depth;
            depth_records += 1;
        }
    }

    let coverage_depth = if depth_records > 0 {
        depth_sum / depth_records as f64
    } else {
        0.0
    };

    Ok(ToolReport {
        record_count,
        variant_ids,
        coverage_depth,
        accuracy_percent: percent(passing as f64, record_count as f64),
    })
}

fn passes_filters(record: &vcf::Record, header: &vcf::Header) -> Result<bool, BioAgeError> {
    let filters = record.filters();
    let names = filters
        .iter(header)
        .collect::<io::Result<Vec<_>>>()
        .map_err(|err| BioAgeError::parse("vcf FILTER", err))?;
    Ok(names.iter().all(|name| matches!(*name, "PASS" | ".")))
}

fn total_depth(record: &vcf::Record, header: &vcf::Header) -> Option<f64> {
    let info = record.info();
    let depth = match info.get(header, "DP")? {
        Ok(Some(Value::Integer(depth))) => f64::from(depth),
        Ok(Some(Value::Float(depth))) => f64::from(depth),
        Ok(Some(Value::String(depth))) => depth.trim().parse::<f64>().ok()?,
        Ok(_) => return None,
        Err(err) => {
            tracing::debug!(error = %err, "skipping unreadable INFO/DP");
            return None;
        }
    };
    (depth.is_finite() && depth >= 0.0).then_some(depth)
}

fn read_fasta<R: BufRead>(reader: R, genome_size_bp: f64) -> Result<ToolReport, BioAgeError> {
    let mut record_count = 0u64;
    let mut bases = 0u64;
    let mut unambiguous = 0u64;

    for result in fasta::Reader::new(reader).records() {
        let record = result.map_err(|err| BioAgeError::parse("fasta", err))?;
        record_count += 1;
        for base in record.seq().iter().filter(|byte| !byte.is_ascii_whitespace()) {
            bases += 1;
            if matches!(base.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T') {
                unambiguous += 1;
            }
        }
    }

    Ok(ToolReport {
        record_count,
        variant_ids: Vec::new(),
        coverage_depth: bases as f64 / genome_size_bp,
        accuracy_percent: percent(unambiguous as f64, bases as f64),
    })
}

fn read_fastq<R: BufRead>(reader: R, genome_size_bp: f64) -> Result<ToolReport, BioAgeError> {
    let mut record_count = 0u64;
    let mut bases = 0u64;
    let mut accuracy_sum = 0.0;

    for result in fastq::Reader::new(reader).records() {
        let record = result.map_err(|err| BioAgeError::parse("fastq", err))?;
        if record.qual().len() != record.seq().len() {
            return Err(BioAgeError::parse(
                "fastq",
                format!(
                    "record {}: quality length {} does not match sequence length {}",
                    record.id(),
                    record.qual().len(),
                    record.seq().len()
                ),
            ));
        }

        for &symbol in record.qual() {
            let score = symbol.checked_sub(PHRED_OFFSET).ok_or_else(|| {
                BioAgeError::parse(
                    "fastq",
                    format!("record {}: invalid quality symbol {symbol:#04x}", record.id()),
                )
            })?;
            accuracy_sum += 1.0 - 10f64.powf(-f64::from(score) / 10.0);
        }

        record_count += 1;
        bases += record.seq().len() as u64;
    }

    Ok(ToolReport {
        record_count,
        variant_ids: Vec::new(),
        coverage_depth: bases as f64 / genome_size_bp,
        accuracy_percent: percent(accuracy_sum, bases as f64),
    })
}
