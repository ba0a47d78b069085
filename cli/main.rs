#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::process;

use regpoison::data::{load_labeled_tsv, write_labeled_tsv};
use regpoison::optimizer::IterationRecord;
use regpoison::progress::PoisonProgressObserver;
use regpoison::{CategoricalMask, PoisonConfig, PoisoningOptimizer, RegressionModel, RunResult};

#[derive(Args)]
pub struct GenerateArgs {
    /// Path to training TSV file with a `label` column and numeric feature columns
    pub training_data: String,

    /// Where to write the poisoned rows as TSV
    #[arg(long, value_name = "PATH")]
    pub output: String,

    /// TOML configuration file; command line flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Zero-based indices of the categorical feature columns, comma separated
    #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
    pub categorical: Vec<usize>,

    /// Poison rows as a share of the clean rows, in (0, 1]
    #[arg(long, value_name = "P")]
    pub proportion: Option<f64>,

    /// Number of independent restarts
    #[arg(long, value_name = "N")]
    pub num_inits: Option<usize>,

    /// Iteration cap per restart
    #[arg(long, value_name = "N")]
    pub max_iters: Option<usize>,

    /// Smallest objective gain that counts as progress
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Use ridge regression with this penalty as the surrogate model
    #[arg(long, value_name = "LAMBDA")]
    pub lambda: Option<f64>,

    /// Write the clean rows followed by the poison rows instead of the poison rows alone
    #[arg(long)]
    pub with_clean: bool,

    /// Base random seed; restart r uses seed + r
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write a TOML diagnostics report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<String>,
}

#[derive(Parser)]
#[command(
    name = "regpoison",
    about = "Gradient-based data poisoning for linear and ridge regression",
    long_about = "Crafts a small set of training rows that maximize the validation error of a \
                 least-squares or ridge model trained on the poisoned data, keeping categorical \
                 features on observed categories and labels inside the observed range."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate poison rows for a training set
    #[command(about = "Generate poison rows (outputs: poisoned TSV)")]
    Generate(GenerateArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

/// Restart-level progress bar fed by the optimizer.
struct RestartProgress {
    bar: ProgressBar,
}

impl RestartProgress {
    fn new(restarts: usize) -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(restarts as u64), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} restarts {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        Self { bar }
    }
}

impl PoisonProgressObserver for RestartProgress {
    fn on_iteration(&self, restart: usize, record: &IterationRecord) {
        self.bar.set_message(format!(
            "restart {restart} iteration {} objective {:.4e}",
            record.iteration, record.objective
        ));
    }

    fn on_restart_finish(&self, _: usize, _: &RunResult) {
        self.bar.inc(1);
    }
}

fn build_config(args: &GenerateArgs) -> Result<PoisonConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading configuration from: {path}");
            PoisonConfig::load(path)?
        }
        None => PoisonConfig::default(),
    };
    if let Some(proportion) = args.proportion {
        config.poison_proportion = proportion;
    }
    if let Some(num_inits) = args.num_inits {
        config.num_inits = num_inits;
    }
    if let Some(max_iters) = args.max_iters {
        config.max_iters = max_iters;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(lambda) = args.lambda {
        config.model = RegressionModel::Ridge { lambda };
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.with_clean {
        config.return_only_poisoned = false;
    }
    Ok(config)
}

pub fn generate(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    println!("Loading training data from: {}", args.training_data);
    let table = load_labeled_tsv(&args.training_data)?;
    println!(
        "Loaded {} samples with {} features",
        table.data.n_samples(),
        table.data.n_features()
    );

    let mask = CategoricalMask::from_columns(table.data.n_features(), &args.categorical)?;
    if !args.categorical.is_empty() {
        let names: Vec<&str> = mask
            .columns()
            .map(|j| table.feature_names[j].as_str())
            .collect();
        println!("Categorical columns: {}", names.join(", "));
    }

    let optimizer = PoisoningOptimizer::new(config)?;
    let progress = RestartProgress::new(optimizer.config().num_inits);
    let (poisoned, report) = optimizer.generate_with_report(
        table.data.x.view(),
        table.data.y.view(),
        &mask,
        &progress,
    )?;
    progress.bar.finish_and_clear();

    if let Some(clean) = report.clean_objective {
        println!("Clean validation MSE:    {clean:.6e}");
    }
    println!(
        "Poisoned validation MSE: {:.6e} (restart {}, {} poison rows)",
        report.best_objective, report.best_restart, report.budget
    );

    write_labeled_tsv(
        &args.output,
        &table.feature_names,
        poisoned.x.view(),
        poisoned.y.view(),
    )?;
    println!("Wrote {} rows to {}", poisoned.y.len(), args.output);

    if let Some(path) = &args.report {
        report.save(path)?;
        println!("Wrote diagnostics report to {path}");
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Generate(args)) => generate(args),
        Some(Commands::Version) => {
            println!("regpoison {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
