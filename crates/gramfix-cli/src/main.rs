use anyhow::Context as _;
use clap::Parser;
use gramfix::{
    build::CommandBuilder,
    driver::{Driver, DriverError},
    engine::ToolchainEngine,
    fuzz::Entropy,
    oracle::OracleError,
    syntax::minimal::MinimalFrontend,
    util,
};
use std::{fs, path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The translated grammar file to repair.
    grammar: PathBuf,

    /// The original grammar definition used for oracle comparison.
    reference: PathBuf,

    /// Optional companion lexer definition.
    lexer: Option<PathBuf>,

    /// Start rule passed to the reference runner.
    #[arg(long)]
    start_rule: Option<String>,

    /// Command that builds the translated grammar.
    #[arg(long, default_value = "lezer-generator")]
    build_command: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("parsed CLI args = {:?}", args);

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    for file in [&args.grammar, &args.reference]
        .into_iter()
        .chain(&args.lexer)
    {
        if !file.exists() {
            eprintln!("error: no such file: {}", file.display());
            return Ok(ExitCode::from(1));
        }
    }

    if args.reference.extension().map_or(true, |ext| ext != "g4") {
        eprintln!("warning: the reference definition should end with \".g4\"");
    }
    if let Some(lexer) = &args.lexer {
        let names_a_lexer = |path: &PathBuf| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with("Lexer.g4"))
        };
        if !names_a_lexer(&args.reference) && !names_a_lexer(lexer) {
            eprintln!("warning: neither reference definition ends with \"Lexer.g4\"");
        }
    }

    let mut engine = ToolchainEngine::new(&args.reference, args.lexer.clone());
    if let Some(start) = &args.start_rule {
        engine = engine.start_rule(start);
    }
    if let Err(err) = engine.prepare() {
        eprintln!("error: {}", err);
        if let Some(code) = err.exit_code() {
            return Ok(ExitCode::from(code.clamp(0, 255) as u8));
        }
        return Ok(ExitCode::FAILURE);
    }

    let source = fs::read_to_string(&args.grammar)
        .with_context(|| format!("failed to read {}", args.grammar.display()))?;

    let builder = CommandBuilder::new(&args.build_command);
    let mut driver = Driver::new(MinimalFrontend, builder, engine, Entropy::new());

    let outcome = match driver.run(&source) {
        Ok(outcome) => outcome,
        Err(DriverError::Frontend(err)) => {
            if let Some((line, column)) = err.location {
                eprintln!("{}", util::source_context(&source, line, column));
            }
            return Err(anyhow::anyhow!("syntax error in grammar: {}", err));
        }
        Err(DriverError::Oracle(OracleError::Engine(err))) => {
            eprintln!("error: {}", err);
            if let Some(code) = err.exit_code() {
                return Ok(ExitCode::from(code.clamp(0, 255) as u8));
            }
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("finished after {} generations", outcome.generations);

    if !outcome.changed {
        println!("no change");
        return Ok(ExitCode::SUCCESS);
    }

    let fixed = PathBuf::from(format!("{}.fixed", args.grammar.display()));
    fs::write(&fixed, &outcome.text)
        .with_context(|| format!("failed to write {}", fixed.display()))?;

    println!("------");
    println!("done {}", fixed.display());
    println!("compare:");
    println!(
        "diff -u --color=auto {} {}",
        args.grammar.display(),
        fixed.display()
    );
    println!("replace:");
    println!("mv -v {} {}", fixed.display(), args.grammar.display());

    Ok(ExitCode::SUCCESS)
}
