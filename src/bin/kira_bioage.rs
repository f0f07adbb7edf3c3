use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_bioage::config::{ConfigLoader, ResolvedConfig};
use kira_bioage::domain::{AnalysisRequest, FileFormat};
use kira_bioage::error::{BioAgeError, ErrorKind};
use kira_bioage::output::{
    BatchItemOutput, BatchOutput, ClassifyOutput, FailureOutput, JsonOutput,
};
use kira_bioage::pipeline::{AgeSource, Pipeline};
use kira_bioage::store::{ResultStore, Store};

#[derive(Parser)]
#[command(name = "kira-bioage")]
#[command(about = "Genomic and metabolic file analysis with a composite biological-age estimate")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve the analysis domain of a file")]
    Classify(FileArgs),
    #[command(about = "Analyze one genomic or metabolic file")]
    Analyze(AnalyzeArgs),
    #[command(about = "Analyze several files concurrently")]
    Batch(BatchArgs),
    #[command(about = "Re-run a stored analysis against its source file")]
    Rerun(IdArgs),
    #[command(about = "Show a stored analysis")]
    Show(IdArgs),
    #[command(about = "List stored analyses")]
    List,
    #[command(about = "Remove a stored analysis")]
    Remove(IdArgs),
    #[command(about = "Estimate biological age from a genomic and a metabolic source")]
    Age(AgeArgs),
    #[command(about = "Print the loaded reference catalog")]
    Catalog,
}

#[derive(Args, Clone)]
struct FileArgs {
    file: PathBuf,

    #[arg(long = "type", value_enum)]
    file_type: Option<FileFormat>,

    #[arg(long)]
    content_type: Option<String>,
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    file: FileArgs,

    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct BatchArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct IdArgs {
    id: String,
}

#[derive(Args)]
struct AgeArgs {
    #[arg(long, help = "Genomic file to analyze, or id of a stored genomic analysis")]
    genomic: String,

    #[arg(long, help = "Metabolic file to analyze, or id of a stored metabolic analysis")]
    metabolic: String,

    #[arg(long)]
    chronological_age: Option<f64>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<BioAgeError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &BioAgeError) -> u8 {
    let kind = error.kind();
    if kind.is_caller_error() {
        2
    } else if kind == ErrorKind::ProcessingFailure {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(config.store_root.clone());

    match cli.command {
        Commands::Classify(args) => {
            let request = build_request(&args);
            let format = request.classify()?;
            JsonOutput::print_classify(&ClassifyOutput {
                path: args.file,
                format,
                domain: format.domain(),
            })
            .into_diagnostic()?;
        }
        Commands::Analyze(args) => {
            let pipeline = build_pipeline(&config, &store)?;
            let request = build_request(&args.file);
            if args.save {
                let record = pipeline.analyze_and_store(&request)?;
                JsonOutput::print_stored(&record).into_diagnostic()?;
            } else {
                let result = pipeline.run(&request)?;
                JsonOutput::print_analysis(&result).into_diagnostic()?;
            }
        }
        Commands::Batch(args) => return run_batch(args, &config, &store),
        Commands::Rerun(args) => {
            let pipeline = build_pipeline(&config, &store)?;
            let record = pipeline.rerun(&args.id)?;
            JsonOutput::print_stored(&record).into_diagnostic()?;
        }
        Commands::Show(args) => {
            let record = store
                .load(&args.id)?
                .ok_or_else(|| BioAgeError::NotFound(format!("analysis {}", args.id)))?;
            JsonOutput::print_stored(&record).into_diagnostic()?;
        }
        Commands::List => {
            let records = store.list()?;
            JsonOutput::print_list(&records).into_diagnostic()?;
        }
        Commands::Remove(args) => {
            store.remove(&args.id)?;
            eprintln!("removed {}", args.id);
        }
        Commands::Age(args) => {
            let pipeline = build_pipeline(&config, &store)?;
            let estimate = pipeline.biological_age(
                age_source(&args.genomic),
                age_source(&args.metabolic),
                args.chronological_age,
            )?;
            JsonOutput::print_age(&estimate).into_diagnostic()?;
        }
        Commands::Catalog => {
            let catalog = config.load_catalog()?;
            JsonOutput::print_catalog(&catalog).into_diagnostic()?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn run_batch(args: BatchArgs, config: &ResolvedConfig, store: &Store) -> miette::Result<ExitCode> {
    let pipeline = build_pipeline(config, store)?;
    let requests: Vec<AnalysisRequest> = args
        .files
        .iter()
        .map(|file| AnalysisRequest::for_path(file.clone()))
        .collect();
    let items: Vec<BatchItemOutput> = if args.save {
        requests
            .iter()
            .zip(pipeline.run_batch_and_store(&requests))
            .map(|(request, outcome)| match outcome {
                Ok(record) => BatchItemOutput {
                    path: request.path.clone(),
                    id: Some(record.id),
                    analysis: Some(record.result),
                    error: None,
                },
                Err(err) => failed_item(request, &err),
            })
            .collect()
    } else {
        requests
            .iter()
            .zip(pipeline.run_batch(&requests))
            .map(|(request, outcome)| match outcome {
                Ok(analysis) => BatchItemOutput {
                    path: request.path.clone(),
                    id: None,
                    analysis: Some(analysis),
                    error: None,
                },
                Err(err) => failed_item(request, &err),
            })
            .collect()
    };

    let failed = items.iter().filter(|item| item.error.is_some()).count();
    let output = BatchOutput {
        succeeded: items.len() - failed,
        failed,
        items,
    };
    JsonOutput::print_batch(&output).into_diagnostic()?;

    if failed > 0 {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn failed_item(request: &AnalysisRequest, err: &BioAgeError) -> BatchItemOutput {
    BatchItemOutput {
        path: request.path.clone(),
        id: None,
        analysis: None,
        error: Some(FailureOutput::from(err)),
    }
}

fn build_pipeline(config: &ResolvedConfig, store: &Store) -> Result<Pipeline, BioAgeError> {
    Ok(Pipeline::from_config(config)?.with_store(Arc::new(store.clone())))
}

fn build_request(args: &FileArgs) -> AnalysisRequest {
    let mut request = AnalysisRequest::for_path(args.file.clone());
    if let Some(format) = args.file_type {
        request = request.with_extension(format.extension());
    }
    if let Some(content_type) = &args.content_type {
        request = request.with_content_type(content_type.clone());
    }
    request
}

fn age_source(value: &str) -> AgeSource {
    if Path::new(value).is_file() {
        AgeSource::File(AnalysisRequest::for_path(value))
    } else {
        AgeSource::Stored(value.to_string())
    }
}
