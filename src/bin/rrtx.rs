//! Run an RRTx planning problem described by a TOML file
//!
//! ```text
//! rrtx --config problem.toml --output-dir out --plot
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_rrtx::path_planning::rrtx::{EdgeModelConfig, Planner, PlannerConfig, Termination};
use rust_rrtx::utils::{export_run, plot_planner};
use rust_rrtx::{EdgeModel, RrtxResult};

#[derive(Debug, Parser)]
#[command(name = "rrtx", about = "Incremental real-time motion planning with RRTx")]
struct Args {
    /// Problem description; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the RNG seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory receiving robot_path.txt, tree_nodes.txt and tree_edges.txt
    #[arg(short, long, default_value = "rrtx_out")]
    output_dir: PathBuf,

    /// Also save a PNG snapshot of the final tree
    #[arg(long)]
    plot: bool,

    /// Sleep so that each slice takes its wall-clock share
    #[arg(long)]
    realtime: bool,
}

fn main() -> RrtxResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rust_rrtx=info,rrtx=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PlannerConfig::load(path)?,
        None => PlannerConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.realtime {
        config.realtime = true;
    }

    match config.edge_model.clone() {
        EdgeModelConfig::Straight => execute(Planner::straight(config)?, &args),
        EdgeModelConfig::Dubins {
            min_turning_radius,
            resolution,
        } => execute(Planner::dubins(config, min_turning_radius, resolution)?, &args),
    }
}

fn execute<M: EdgeModel>(mut planner: Planner<M>, args: &Args) -> RrtxResult<()> {
    info!(
        dims = planner.space().dims(),
        obstacles = planner.config().obstacles.len(),
        "planning started"
    );
    let report = planner.run()?;

    info!(
        termination = ?report.termination,
        slices = report.slices,
        tree = report.tree_size,
        travelled = report.distance_travelled,
        "planning finished"
    );
    if report.termination == Termination::ReachedGoal {
        info!(poses = report.robot_path.len(), "goal reached");
    }

    let files = export_run(&planner, &args.output_dir)?;
    for file in &files {
        info!(path = %file.display(), "wrote");
    }

    if args.plot {
        let png = args.output_dir.join("rrtx.png");
        plot_planner(&planner, "RRTx").save_png(&png, 800, 800)?;
        info!(path = %png.display(), "saved plot");
    }

    report.into_result().map(|_| ())
}
