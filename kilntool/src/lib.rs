#![forbid(unsafe_code)]

use ariadne::{ColorGenerator, Config, IndexType, Label, Report, ReportKind, Source};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kiln_extract::{
    ExtractError, ExtractedTask, NormalizerRegistry, Target, TaskExtractor, TaskSummary,
};
use kiln_ir::{Module, ParseError, parse_module};
use serde::Serialize;
use std::{
    fmt::Display,
    fs,
    ops::Range,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// This environment variable is used to control logs.
const LOG_ENV_VAR: &str = "LOG";

/// kilntool – kernel task extraction tool
#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract tuning tasks from module (.kiln) files
    Extract(Extract),
    /// Check module (.kiln) files for errors
    Check(Check),
    /// Print a module (.kiln) file in canonical form
    Print(Print),
}

#[derive(Args)]
#[command(arg_required_else_help(true))]
pub struct Extract {
    /// Module files to extract tasks from
    pub files: Vec<PathBuf>,

    /// Compilation target attached to every task, e.g. "cuda -arch=sm_80"
    #[arg(short, long, default_value = "llvm")]
    pub target: Target,

    /// Normalizer turning kernels into standalone modules
    #[arg(short, long, default_value = "standalone")]
    pub normalizer: String,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: Format,
}

#[derive(Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Args)]
#[command(arg_required_else_help(true))]
pub struct Check {
    /// Module files to check
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
#[command(arg_required_else_help(true))]
pub struct Print {
    /// Module file to print
    pub file: PathBuf,
}

#[derive(Debug, Error)]
pub enum KilntoolError {
    #[error("No input files")]
    NoInputFiles,
    #[error("Parse error")]
    Parse,
    #[error("{0}")]
    Extract(#[from] ExtractError),
    #[error("{0:?}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("{0}")]
    IO(#[from] std::io::Error),
}

pub fn run() -> Result<(), KilntoolError> {
    let cli = Cli::parse();

    init_tracing();

    if let Some(command) = cli.command {
        run_command(command)
    } else {
        Ok(())
    }
}

pub fn run_command(command: Command) -> Result<(), KilntoolError> {
    match command {
        Command::Extract(args) => {
            let reports = extract(&args)?;

            match args.format {
                Format::Text => {
                    for report in &reports {
                        print!("{report}");
                    }
                }
                Format::Json => {
                    println!("{}", serde_json::to_string_pretty(&reports)?);
                }
            }

            Ok(())
        }
        Command::Check(args) => {
            load_modules(&args.files)?;
            println!("No errors found.");

            Ok(())
        }
        Command::Print(args) => {
            let module = load_module(&args.file)?;
            println!("{module}");

            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var(LOG_ENV_VAR)
                .from_env_lossy(),
        )
        .init();
}

/// The tasks extracted from one module file.
#[derive(Serialize, Debug)]
pub struct FileReport {
    pub file: String,
    pub target: Target,
    pub tasks: Vec<TaskSummary>,
}

impl Display for FileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({})", self.file, self.target)?;
        for task in &self.tasks {
            writeln!(
                f,
                "    {:<24} {:>6}  {}",
                task.name.as_str(),
                task.weight,
                task.hash
            )?;
        }
        Ok(())
    }
}

fn extract(args: &Extract) -> Result<Vec<FileReport>, KilntoolError> {
    let registry = NormalizerRegistry::with_defaults();

    // An unknown normalizer is reported before any module is read
    registry.resolve(&args.normalizer)?;

    let modules = load_modules(&args.files)?;
    let mut reports = Vec::with_capacity(modules.len());

    for (path, module) in &modules {
        let extractor =
            TaskExtractor::from_registry(module, &args.target, &registry, &args.normalizer)?;
        let tasks = extractor.extract()?;

        info!(
            "{}: {} tasks from {} dispatches",
            path.display(),
            tasks.len(),
            tasks.iter().map(|task| task.weight).sum::<usize>()
        );

        reports.push(FileReport {
            file: path.display().to_string(),
            target: args.target.clone(),
            tasks: tasks.iter().map(ExtractedTask::summary).collect(),
        });
    }

    Ok(reports)
}

/// Parse all files, reporting every parse error before failing.
fn load_modules(files: &[PathBuf]) -> Result<Vec<(PathBuf, Module)>, KilntoolError> {
    if files.is_empty() {
        return Err(KilntoolError::NoInputFiles);
    }

    let mut modules = Vec::with_capacity(files.len());
    let mut failed = false;

    for path in files {
        match load_module(path) {
            Ok(module) => modules.push((path.clone(), module)),
            Err(KilntoolError::Parse) => failed = true,
            Err(error) => return Err(error),
        }
    }

    if failed {
        Err(KilntoolError::Parse)
    } else {
        Ok(modules)
    }
}

fn load_module(path: &Path) -> Result<Module, KilntoolError> {
    let source = fs::read_to_string(path)?;

    match parse_module(&source) {
        Ok(module) => {
            debug!("{}: {} functions", path.display(), module.len());
            Ok(module)
        }
        Err(error) => {
            print_parse_error(path, &source, error)?;
            Err(KilntoolError::Parse)
        }
    }
}

fn print_parse_error(path: &Path, source: &str, error: ParseError) -> Result<(), KilntoolError> {
    let origin = path.display().to_string();

    parse_error_report(&origin, error, true).eprint((origin, Source::from(source)))?;

    Ok(())
}

fn parse_error_report(
    origin: &str,
    error: ParseError,
    color: bool,
) -> Report<'static, (String, Range<usize>)> {
    let mut colors = ColorGenerator::new();
    let span: Range<usize> = error.span.into();

    // Parse spans are byte offsets into the source
    Report::build(ReportKind::Error, origin.to_string(), span.start)
        .with_config(
            Config::default()
                .with_index_type(IndexType::Byte)
                .with_color(color),
        )
        .with_label(
            Label::new((origin.to_string(), span))
                .with_message(error.msg)
                .with_color(colors.next()),
        )
        .finish()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use kiln_macros::test;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_extract_command() {
        let cli = Cli::try_parse_from([
            "kilntool",
            "extract",
            "a.kiln",
            "b.kiln",
            "--target",
            "cuda -arch=sm_80",
            "--format",
            "json",
        ])
        .unwrap();

        let Some(Command::Extract(args)) = cli.command else {
            panic!("expected extract command");
        };
        assert_eq!(
            vec![PathBuf::from("a.kiln"), PathBuf::from("b.kiln")],
            args.files
        );
        assert_eq!("cuda -arch=sm_80", args.target.to_string());
        assert_eq!("standalone", args.normalizer);
        assert_eq!(Format::Json, args.format);
    }

    #[test]
    fn invalid_target_is_rejected_by_cli() {
        assert!(Cli::try_parse_from(["kilntool", "extract", "a.kiln", "-t", "cuda sm_80"]).is_err());
    }

    #[test]
    fn unknown_normalizer_is_reported_before_reading_files() {
        let result = run_command(Command::Extract(Extract {
            files: vec![PathBuf::from("does/not/exist.kiln")],
            target: Target::new("llvm"),
            normalizer: "tir-lowering".to_string(),
            format: Format::Text,
        }));

        assert_matches!(
            result,
            Err(KilntoolError::Extract(ExtractError::NormalizerNotFound(_)))
        );
    }

    #[test]
    fn no_input_files() {
        assert_matches!(
            run_command(Command::Check(Check { files: vec![] })),
            Err(KilntoolError::NoInputFiles)
        );
    }

    #[test]
    fn parse_error_label_follows_non_ascii_text() {
        let source = format!("// {}\n(module (kernel @k () (bogus 1)))", "é".repeat(40));
        let error = parse_module(&source).unwrap_err();
        assert_eq!("unknown symbol `bogus`", error.msg);

        let mut output = vec![];
        parse_error_report("model.kiln", error, false)
            .write(("model.kiln".to_string(), Source::from(source.as_str())), &mut output)
            .unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.contains("(bogus 1)"), "{output}");
        assert!(output.contains("unknown symbol `bogus`"), "{output}");
    }

    #[test]
    fn text_report() {
        let report = FileReport {
            file: "model.kiln".to_string(),
            target: Target::new("llvm").with_option("mcpu", "skylake"),
            tasks: vec![TaskSummary {
                name: "fused_add".into(),
                weight: 3,
                hash: "00000000deadbeef".to_string(),
            }],
        };

        assert_eq!(
            "model.kiln (llvm -mcpu=skylake)\n    fused_add                     3  00000000deadbeef\n",
            report.to_string()
        );
    }
}
