use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::{generate, Shell};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hla_donor_match::config::Config;
use hla_donor_match::discovery::discover_candidates;
use hla_donor_match::donor_db::DonorInfoTable;
use hla_donor_match::donor_graph::build_donor_graph;
use hla_donor_match::graph::{load, save, Graph};
use hla_donor_match::output::write_patient_results;
use hla_donor_match::patient_graph::{load_patient_blocks, PatientGraph};
use hla_donor_match::scorer::{score_and_rank, ScoreParams};

#[derive(Parser)]
#[command(name = "hla-donor-match", version, about = "HLA-compatible bone-marrow donor search")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Worker threads for the rayon pool (defaults to available CPUs)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a donor index from a directory of donor imputation CSVs.
    BuildGraph {
        /// Directory of donor imputation files, processed in lexicographic order
        #[arg(long)]
        donors_dir: PathBuf,

        /// Where to write the persisted graph blob
        #[arg(long)]
        output: PathBuf,

        /// Overwrite the output file without prompting
        #[arg(long)]
        force: bool,
    },

    /// Match patients against a previously built donor index.
    Match {
        /// Path to a donor graph produced by `build-graph`
        #[arg(long)]
        graph: PathBuf,

        /// Directory of patient imputation files
        #[arg(long)]
        patients_dir: PathBuf,

        /// Directory to write one result CSV per patient
        #[arg(long)]
        out_dir: PathBuf,

        /// Optional TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured cutoff (max donors returned per patient)
        #[arg(long)]
        cutoff: Option<usize>,

        /// Override the configured threshold (minimum joint match probability)
        #[arg(long)]
        threshold: Option<f64>,

        /// Optional CSV of auxiliary donor metadata, joined by donor_id
        #[arg(long)]
        donors_info: Option<PathBuf>,

        /// Auxiliary column names to join from --donors-info
        #[arg(long, value_delimiter = ',')]
        donors_info_columns: Vec<String>,
    },

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    init_thread_pool(cli.threads)?;

    match cli.command {
        Command::BuildGraph {
            donors_dir,
            output,
            force,
        } => run_build_graph(&donors_dir, &output, force),
        Command::Match {
            graph,
            patients_dir,
            out_dir,
            config,
            cutoff,
            threshold,
            donors_info,
            donors_info_columns,
        } => run_match(
            &graph,
            &patients_dir,
            &out_dir,
            config.as_deref(),
            cutoff,
            threshold,
            donors_info.as_deref(),
            donors_info_columns,
        ),
        Command::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn init_thread_pool(threads: Option<usize>) -> Result<()> {
    let num_threads = threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .context("failed to initialize worker thread pool")?;
    info!(num_threads, "worker thread pool initialized");
    Ok(())
}

fn run_build_graph(donors_dir: &std::path::Path, output: &std::path::Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        let proceed = dialoguer::Confirm::new()
            .with_prompt(format!("{} already exists, overwrite?", output.display()))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !proceed {
            println!("{}", style("aborted").yellow());
            return Ok(());
        }
    }

    println!("{}", style("building donor index...").bold());
    let graph = build_donor_graph(donors_dir).context("failed to build donor graph")?;
    println!(
        "built donor graph: {} nodes, {} edges",
        graph.num_nodes(),
        graph.num_edges()
    );

    save(&graph, output).context("failed to persist donor graph")?;
    println!("{} {}", style("saved to").green(), output.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_match(
    graph_path: &std::path::Path,
    patients_dir: &std::path::Path,
    out_dir: &std::path::Path,
    config_path: Option<&std::path::Path>,
    cutoff_override: Option<usize>,
    threshold_override: Option<f64>,
    donors_info_path: Option<&std::path::Path>,
    donors_info_columns: Vec<String>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path).context("failed to load configuration")?,
        None => Config::default(),
    };
    if let Some(cutoff) = cutoff_override {
        config.cutoff = cutoff;
    }
    if let Some(threshold) = threshold_override {
        config.threshold = threshold;
    }
    if !donors_info_columns.is_empty() {
        config.donors_info = donors_info_columns;
    }

    let donor_info = match donors_info_path {
        Some(path) => Some(DonorInfoTable::load(path).context("failed to load donor info table")?),
        None => {
            if !config.donors_info.is_empty() {
                warn!("donors_info columns requested but no --donors-info file provided; aux columns will be blank");
            }
            None
        }
    };

    println!("{}", style("loading donor graph...").bold());
    let graph: Graph = load(graph_path).context("failed to load donor graph")?;

    let blocks = load_patient_blocks(patients_dir).context("failed to load patient imputation files")?;
    let params = ScoreParams {
        cutoff: config.cutoff,
        threshold: config.threshold,
    };

    let progress = ProgressBar::new(blocks.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} patients matched")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    blocks
        .par_iter()
        .try_for_each(|block| -> Result<()> {
            let patient = PatientGraph::build(block);
            let candidates = discover_candidates(&graph, &patient);
            let rows = score_and_rank(&graph, &patient, &candidates, &params, donor_info.as_ref(), &config.donors_info);
            write_patient_results(out_dir, patient.patient_id(), &rows, &config.donors_info)
                .context("failed to write result CSV")?;
            progress.inc(1);
            Ok(())
        })?;

    progress.finish_with_message("done");
    println!("{} {}", style("wrote results to").green(), out_dir.display());
    Ok(())
}
