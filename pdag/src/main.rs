use clap::Parser;
use std::path::PathBuf;

use pdag::target::Target;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Graph dump: nodes, stages, loops and edges
    Dag,
    /// Per-stage feature histograms as JSON
    Features,
    /// Bounds of every function computed at root over the output estimates
    Bounds,
    /// Parsed syntax tree
    Ast,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TargetName {
    Sse,
    Avx2,
    Avx512,
    Neon,
}

#[derive(Parser, Debug)]
#[command(
    name = "pdag",
    version,
    about = "Builds the function dependency graph of a .hpl pipeline and reports its bounds and features"
)]
struct Cli {
    /// Input .hpl source file
    source: PathBuf,

    /// What to print
    #[arg(long, value_enum, default_value_t = EmitStage::Dag)]
    emit: EmitStage,

    /// Vector ISA used for natural vector sizes
    #[arg(long, value_enum, default_value_t = TargetName::Avx2)]
    target: TargetName,

    /// Override the target's vector register width in bits
    #[arg(long)]
    vector_bits: Option<u32>,

    /// Log phases and timing (same as RUST_LOG=debug)
    #[arg(long)]
    verbose: bool,
}

fn report(diagnostics: &[pdag::diag::Diagnostic]) -> ! {
    for d in diagnostics {
        match d.span {
            Some(span) => eprintln!("pdag: {} (at {}..{})", d, span.start, span.end),
            None => eprintln!("pdag: {}", d),
        }
    }
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut target = match cli.target {
        TargetName::Sse => Target::SSE,
        TargetName::Avx2 => Target::AVX2,
        TargetName::Avx512 => Target::AVX512,
        TargetName::Neon => Target::NEON,
    };
    if let Some(bits) = cli.vector_bits {
        target = Target::new(bits);
    }

    log::debug!("source = {}", cli.source.display());
    log::debug!("emit   = {:?}", cli.emit);

    // ── Read source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("pdag: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    if let EmitStage::Ast = cli.emit {
        match pdag::driver::parse_program(&source) {
            Ok(program) => println!("{program:#?}"),
            Err(diags) => report(&diags),
        }
        return;
    }

    let analysis = match pdag::driver::analyze_source(&source, &target) {
        Ok(a) => a,
        Err(diags) => report(&diags),
    };

    match cli.emit {
        EmitStage::Dag => print!("{}", analysis.dag),
        EmitStage::Features => match pdag::driver::features_json(&analysis.dag) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("pdag: error: {e}");
                std::process::exit(2);
            }
        },
        EmitStage::Bounds => print!("{}", pdag::driver::root_bounds_report(&analysis.dag)),
        EmitStage::Ast => unreachable!("handled before analysis"),
    }
}
