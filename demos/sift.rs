//! Sifting a random circuit.
//!
//! Builds the QMDD of a random circuit whose controlled gates couple distant
//! lines, then sifts it and reports node counts before and after.
//!
//! Run with:
//! ```bash
//! cargo run --example sift -- --lines 8 --gates 80
//! ```

use std::time::Instant;

use clap::Parser;
use qmdd_rs::engine::{Engine, EngineConfig};
use qmdd_rs::gate::GateMatrix;
use qmdd_rs::reorder::ReorderContext;
use qmdd_rs::types::Var;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Parser)]
#[command(author, version, about = "Sift the QMDD of a random circuit")]
struct Cli {
    /// Number of circuit lines
    #[arg(long, default_value = "8")]
    lines: usize,

    /// Number of gates
    #[arg(long, default_value = "80")]
    gates: usize,

    /// Seed for the circuit generator
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Log every sifted variable
    #[arg(short, long)]
    verbose: bool,

    /// Print the final diagram
    #[arg(long)]
    print: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    simplelog::TermLogger::init(
        if cli.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let n = cli.lines;
    let mut engine = Engine::with_config(EngineConfig {
        num_vars: n,
        ..Default::default()
    });
    println!("engine = {:?}", engine);

    let gates = [GateMatrix::not(), GateMatrix::hadamard(), GateMatrix::v(), GateMatrix::s()];
    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);

    let time_build = Instant::now();
    let mut f = engine.identity(n)?;
    engine.incref(f);
    for _ in 0..cli.gates {
        let target = rng.random_range(0..n);
        // Prefer controls on the far half of the circuit.
        let control = (target + n / 2 + rng.random_range(0..n.div_ceil(2).max(1))) % n;
        let controls = if control != target { vec![Var::from(control)] } else { vec![] };
        let g = engine.gate(&gates[rng.random_range(0..gates.len())], n, &controls, Var::from(target))?;
        let next = engine.multiply(g, f)?;
        engine.incref(next);
        engine.decref(f);
        f = next;
        engine.collect();
    }
    println!(
        "Built circuit with {} gates on {} lines in {:.3}s: {} nodes",
        cli.gates,
        n,
        time_build.elapsed().as_secs_f64(),
        engine.node_count(f)
    );
    println!("{}", engine.debug_ordering());

    let time_sift = Instant::now();
    let mut roots = [f];
    let mut ctx = ReorderContext::new(cli.verbose);
    let stats = engine.sift_with(&mut ctx, &mut roots, n)?;
    println!(
        "Sifted in {:.3}s: {} -> {} nodes ({:.1}% reduction), {} swaps, largest {}, {} factor changes",
        time_sift.elapsed().as_secs_f64(),
        stats.initial_size,
        stats.final_size,
        stats.reduction_percent(),
        stats.swaps,
        stats.largest_size,
        stats.factor_changes
    );
    println!("{}", engine.debug_ordering());
    println!("{}", engine.stats());

    if cli.print {
        println!("{}", engine.print(roots[0]));
    }

    Ok(())
}
