mod driver;
mod inputs;
mod sink;
mod status;

use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};
use rsigmac_backend::{BACKENDS, BackendOptions, DEFAULT_TARGET, SigmaConfig, lookup};
use rsigmac_parser::RuleFilter;

use driver::{Driver, RunOptions};
use sink::OutputSink;
use status::{EXIT_OK, Failure};

#[derive(Parser)]
#[command(name = "rsigmac")]
#[command(about = "Convert Sigma rules into SIEM queries")]
#[command(version)]
struct Cli {
    /// Sigma rule files or directories
    inputs: Vec<PathBuf>,

    /// Recurse into directories, skipping hidden entries
    #[arg(short, long = "recurse")]
    recurse: bool,

    /// Only convert matching rules, e.g. "level>=high,status=stable"
    #[arg(short, long)]
    filter: Option<String>,

    /// Output target format
    #[arg(short, long, default_value = DEFAULT_TARGET)]
    target: String,

    /// List available output targets and exit
    #[arg(short = 'l', long)]
    target_list: bool,

    /// Mapping configuration file; repeat to chain several in order
    #[arg(short = 'c', long = "config")]
    configs: Vec<PathBuf>,

    /// Write output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Backend option KEY=VALUE (a bare KEY means true); repeatable
    #[arg(short = 'O', long = "backend-option")]
    backend_options: Vec<String>,

    /// YAML file of backend options; -O options override it
    #[arg(long)]
    backend_config: Option<PathBuf>,

    /// Keep going after errors and exit with the last error code
    #[arg(short, long)]
    defer_abort: bool,

    /// Skip files with rules the backend cannot convert
    #[arg(short = 'I', long)]
    ignore_backend_errors: bool,

    /// Log progress
    #[arg(short, long)]
    verbose: bool,

    /// Log debugging details
    #[arg(short = 'D', long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();
    let code = run(cli);
    process::exit(code);
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Everything the binary does; returns the exit code so that every
/// resource is dropped before `process::exit`.
fn run(cli: Cli) -> i32 {
    init_logging(&cli);

    if cli.target_list {
        for info in BACKENDS {
            println!("{:>10} : {}", info.name, info.description);
        }
        return EXIT_OK;
    }

    if cli.inputs.is_empty() {
        eprintln!("{}", Cli::command().render_usage());
        eprintln!("No input files given; see --help.");
        return EXIT_OK;
    }

    // ---------------------------------------------------------------------
    // Pre-flight: every failure here exits immediately
    // ---------------------------------------------------------------------

    let filter = match RuleFilter::compile(cli.filter.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Invalid filter: {e}");
            return Failure::Filter.code();
        }
    };

    let Some(info) = lookup(&cli.target) else {
        eprintln!("Unknown target '{}'; use --target-list to see all targets", cli.target);
        return Failure::UnknownTarget.code();
    };

    let mut config = SigmaConfig::default();
    for path in &cli.configs {
        let next = SigmaConfig::load(path).and_then(|c| {
            c.check_backend(info.name)?;
            Ok(c)
        });
        match next {
            Ok(c) => {
                log::debug!("loaded configuration {}", path.display());
                config = config.merge(c);
            }
            Err(e) => {
                eprintln!("Failed to load configuration {}: {e}", path.display());
                return Failure::from(&e).code();
            }
        }
    }

    let mut options = BackendOptions::new();
    if let Some(path) = &cli.backend_config {
        match BackendOptions::load(path) {
            Ok(o) => options = o,
            Err(e) => {
                eprintln!("Failed to load backend configuration {}: {e}", path.display());
                return Failure::from(&e).code();
            }
        }
    }
    let options = options.merged_with(&BackendOptions::from_args(&cli.backend_options));

    let mut backend = match info.create(config, &options) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to initialize backend '{}': {e}", info.name);
            return Failure::Backend.code();
        }
    };

    let mut sink = match OutputSink::open(cli.output.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            let target = cli
                .output
                .as_deref()
                .map_or("stdout".to_string(), |p| p.display().to_string());
            eprintln!("Failed to open output {target}: {e}");
            return Failure::Output.code();
        }
    };

    // ---------------------------------------------------------------------
    // Conversion
    // ---------------------------------------------------------------------

    let files = inputs::locate(&cli.inputs, cli.recurse);
    log::debug!("{} input file(s)", files.len());

    let run_options = RunOptions {
        defer_abort: cli.defer_abort,
        ignore_backend_errors: cli.ignore_backend_errors,
    };
    let code = Driver::new(backend.as_mut(), &filter, &mut sink, run_options).run(&files);

    if let Err(e) = sink.close() {
        eprintln!("cannot write output: {e}");
        return Failure::Output.code();
    }
    code
}
