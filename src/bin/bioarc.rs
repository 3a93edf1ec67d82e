use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use bioarchiver::checklist::{ChecklistBuilder, SampleVariant};
use bioarchiver::config::{ConfigLoader, Credentials};
use bioarchiver::error::ArchiveError;
use bioarchiver::output::JsonOutput;
use bioarchiver::reconcile::Reconciler;
use bioarchiver::registry::RegistryHttpClient;
use bioarchiver::runner::{SnakemakeRunner, WorkflowRunner};

#[derive(Parser)]
#[command(name = "bioarc")]
#[command(about = "Archive sequencing runs and specimen metadata in public repositories")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build nucleotide-archive checklists and hand off to the upload workflow")]
    Nucleotide(NucleotideArgs),
    #[command(about = "Reconcile specimen metadata against the sample registry")]
    Sample(SampleArgs),
}

#[derive(Args)]
struct NucleotideArgs {
    #[arg(short, long)]
    metadata: PathBuf,

    #[arg(short, long)]
    data_dir: PathBuf,

    #[arg(short, long)]
    output: Utf8PathBuf,

    #[arg(long, value_enum, default_value = "standard")]
    sample_variant: SampleVariant,

    #[arg(long)]
    launch: bool,

    #[arg(short, long, default_value = "slurm")]
    profile: String,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,
}

#[derive(Args)]
struct SampleArgs {
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long)]
    output: Utf8PathBuf,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(archive) = report.downcast_ref::<ArchiveError>() {
            return ExitCode::from(map_exit_code(archive));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ArchiveError) -> u8 {
    match error {
        ArchiveError::MissingInput(_)
        | ArchiveError::TableRead { .. }
        | ArchiveError::TableParse { .. }
        | ArchiveError::MissingColumn(_)
        | ArchiveError::EmptyField { .. }
        | ArchiveError::InvalidColumn { .. }
        | ArchiveError::ConfigRead(_)
        | ArchiveError::ConfigParse(_)
        | ArchiveError::MissingCredentials(_) => 2,
        ArchiveError::AuthHttp(_)
        | ArchiveError::AuthStatus { .. }
        | ArchiveError::RegistryHttp(_)
        | ArchiveError::Runner(_)
        | ArchiveError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Nucleotide(args) => run_nucleotide(args),
        Commands::Sample(args) => run_sample(args),
    }
}

fn run_nucleotide(args: NucleotideArgs) -> miette::Result<()> {
    let credentials = Credentials::resolve(args.username, args.password).into_diagnostic()?;
    let builder = ChecklistBuilder::new(
        args.metadata,
        args.data_dir,
        args.output.clone(),
        args.sample_variant,
    );
    let report = builder.build(&credentials).into_diagnostic()?;
    JsonOutput::print_checklist(&report).into_diagnostic()?;

    if args.launch {
        SnakemakeRunner::new()
            .launch(args.output.as_std_path(), &args.profile)
            .into_diagnostic()?;
    }
    Ok(())
}

fn run_sample(args: SampleArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    let credentials = Credentials::resolve(args.username, args.password).into_diagnostic()?;
    let registry = RegistryHttpClient::new(&config).into_diagnostic()?;
    let reconciler = Reconciler::new(registry, credentials, args.output);
    let report = reconciler.run(&args.input).into_diagnostic()?;
    JsonOutput::print_reconcile(&report).into_diagnostic()?;
    Ok(())
}
