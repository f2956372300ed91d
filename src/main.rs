#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use thiserror::Error;

use scope::facade::explorer_for;
use scope::{
    Algorithm, ConfigError, DataError, Family, IcType, PathType, RegressionData, SolveError,
    SolveResult, Solver, SolverConfig, load_regression_csv,
};

#[derive(Parser)]
#[command(
    name = "scope",
    about = "Best-subset selection by splicing",
    long_about = "Selects the sparse set of features that best explains a response, using splicing \
                 local search over support sizes chosen by information criterion or cross-validation."
)]
struct Cli {
    /// Log progress for every candidate size
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a sparse GLM to a CSV/TSV file
    #[command(about = "Select features for a GLM (outputs: scope_result.toml)")]
    Fit(FitArgs),

    /// Print the default solver configuration as TOML
    Template,
}

#[derive(Clone, Copy, ValueEnum)]
enum FamilyCli {
    Gaussian,
    Binomial,
    Poisson,
}

impl From<FamilyCli> for Family {
    fn from(value: FamilyCli) -> Self {
        match value {
            FamilyCli::Gaussian => Family::Gaussian,
            FamilyCli::Binomial => Family::Binomial,
            FamilyCli::Poisson => Family::Poisson,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmCli {
    Splicing,
    Iht,
    Grahtp,
    Grasp,
    Omp,
}

impl From<AlgorithmCli> for Algorithm {
    fn from(value: AlgorithmCli) -> Self {
        match value {
            AlgorithmCli::Splicing => Algorithm::Splicing,
            AlgorithmCli::Iht => Algorithm::Iht,
            AlgorithmCli::Grahtp => Algorithm::Grahtp,
            AlgorithmCli::Grasp => Algorithm::Grasp,
            AlgorithmCli::Omp => Algorithm::Omp,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum IcCli {
    Aic,
    Bic,
    Gic,
    Ebic,
}

impl From<IcCli> for IcType {
    fn from(value: IcCli) -> Self {
        match value {
            IcCli::Aic => IcType::Aic,
            IcCli::Bic => IcType::Bic,
            IcCli::Gic => IcType::Gic,
            IcCli::Ebic => IcType::Ebic,
        }
    }
}

#[derive(Args)]
struct FitArgs {
    /// Input table with a header row; every column except the response is a feature
    #[arg(value_name = "DATA_PATH")]
    data: PathBuf,

    /// Solver configuration file (see `scope template`)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Name of the response column
    #[arg(long, default_value = "y")]
    response: String,

    #[arg(long, value_enum, default_value_t = FamilyCli::Gaussian)]
    family: FamilyCli,

    /// Search exactly these support sizes (repeatable)
    #[arg(long = "size", value_name = "K")]
    sizes: Vec<usize>,

    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmCli>,

    #[arg(long, value_enum)]
    ic: Option<IcCli>,

    /// Number of cross-validation folds; 1 selects by information criterion
    #[arg(long)]
    cv: Option<usize>,

    /// Use golden-section search over the sizes instead of visiting every size
    #[arg(long)]
    golden: bool,

    /// Keep only this many features before the search
    #[arg(long, value_name = "N")]
    screening: Option<usize>,

    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Output path for the TOML result
    #[arg(long, default_value = "scope_result.toml")]
    output: PathBuf,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error("Failed to serialize the result: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Fit(args) => fit_command(args),
        Commands::Template => template_command(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn template_command() -> Result<(), CliError> {
    print!("{}", SolverConfig::default().to_toml_string()?);
    Ok(())
}

fn fit_command(args: FitArgs) -> Result<(), CliError> {
    let data = load_regression_csv(&args.data, &args.response)?;
    let config = build_config(&args, &data)?;
    let family = Family::from(args.family);

    // First-order variants reject a hessian callable.
    let objective = if explorer_for::<RegressionData>(config.algorithm).uses_second_order() {
        family.objective()
    } else {
        family.objective().without_hessian()
    };
    let mut solver = Solver::new(config.clone())?;
    let result = solver.solve(&objective, &data)?;
    println!(
        "Selected {} of {} features ({} family, score {:.4}).",
        result.support_set.len(),
        data.n_features(),
        family.name(),
        result.score
    );

    let report = FitReport::new(family, &config, &data, result);
    if !report.support.is_empty() {
        println!("Support: {}", report.support.iter().join(", "));
    }
    let text = toml::to_string_pretty(&report)?;
    fs::write(&args.output, text).map_err(|source| CliError::Write {
        path: args.output.clone(),
        source,
    })?;
    println!("Result written to {}", args.output.display());
    Ok(())
}

fn build_config(args: &FitArgs, data: &RegressionData) -> Result<SolverConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => SolverConfig::from_toml_file(path)?,
        None => SolverConfig::default(),
    };
    if config.n_features != data.n_features() {
        log::debug!(
            "Setting n_features to {} from the input columns.",
            data.n_features()
        );
        config.n_features = data.n_features();
    }
    if !args.sizes.is_empty() {
        config.sparsity = Some(args.sizes.clone());
    }
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm.into();
    }
    if let Some(ic) = args.ic {
        config.ic_type = ic.into();
    }
    if let Some(cv) = args.cv {
        config.cv = cv;
    }
    if args.golden {
        config.path_type = PathType::Gs;
    }
    if args.screening.is_some() {
        config.screening_size = args.screening;
    }
    if let Some(threads) = args.threads {
        config.thread_count = threads;
    }
    Ok(config)
}

#[derive(Serialize)]
struct Coefficient {
    name: String,
    index: usize,
    value: f64,
}

#[derive(Serialize)]
struct PathEntry {
    size: usize,
    score: f64,
    loss: f64,
    support: Vec<usize>,
}

#[derive(Serialize)]
struct FitReport {
    family: Family,
    algorithm: Algorithm,
    selected_size: usize,
    score: f64,
    loss: f64,
    converged: bool,
    support: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    screened_groups: Option<Vec<usize>>,
    coefficients: Vec<Coefficient>,
    path: Vec<PathEntry>,
}

impl FitReport {
    fn new(
        family: Family,
        config: &SolverConfig,
        data: &RegressionData,
        result: &SolveResult,
    ) -> Self {
        let coefficients: Vec<Coefficient> = result
            .support_set
            .iter()
            .map(|&index| Coefficient {
                name: data.feature_names[index].clone(),
                index,
                value: result.params[index],
            })
            .collect();
        Self {
            family,
            algorithm: config.algorithm,
            selected_size: result.selected_size,
            score: result.score,
            loss: result.loss,
            converged: result.converged,
            support: coefficients.iter().map(|c| c.name.clone()).collect(),
            screened_groups: result.screened_groups.clone(),
            coefficients,
            path: result
                .path
                .iter()
                .map(|point| PathEntry {
                    size: point.size,
                    score: point.score,
                    loss: point.model.loss,
                    support: point.model.coordinates.clone(),
                })
                .collect(),
        }
    }
}
