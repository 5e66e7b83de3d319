//! Headless skirmish runner.
//!
//! Runs CPU-only skirmishes without graphics, for AI soak testing and CI
//! determinism checks. Reports go to stdout as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run a single game and print its report
//! cargo run -p skirmish_headless -- run --scenario skirmish_1v1 --frames 600
//!
//! # Save after 300 frames, then resume for another 300
//! cargo run -p skirmish_headless -- run --frames 300 --save game.ron
//! cargo run -p skirmish_headless -- run --frames 300 --resume game.ron
//!
//! # Run a batch with inline and threaded AI mixed
//! cargo run -p skirmish_headless -- batch --count 32 --mode mixed
//!
//! # Verify threaded AI and save/reload don't change the outcome
//! cargo run -p skirmish_headless -- verify --scenario skirmish_ffa4
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skirmish_headless::{
    batch::{default_output_path, run_batch, BatchConfig, ThreadMode},
    runner::{run_game, GameConfig},
    scenario::Scenario,
    verify::verify,
};

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless skirmish runner for AI soak testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Inline,
    Threaded,
    Mixed,
}

impl From<Mode> for ThreadMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Inline => Self::Inline,
            Mode::Threaded => Self::Threaded,
            Mode::Mixed => Self::Mixed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single game
    Run {
        /// Built-in scenario name or scenario file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Frames to run (default: the scenario's own)
        #[arg(short, long)]
        frames: Option<u64>,

        /// Run AI ticks on the master thread
        #[arg(long)]
        inline: bool,

        /// Gate worker ticks with a master/slave barrier
        #[arg(long)]
        barrier: bool,

        /// AI log level (0 = off)
        #[arg(long)]
        log_level: Option<u8>,

        /// Directory for per-faction AI logs
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Mirror AI log lines to the console
        #[arg(long)]
        log_redirect: bool,

        /// Save the game after the last frame (.ron for text, else binary)
        #[arg(long)]
        save: Option<PathBuf>,

        /// Resume from a save instead of starting the scenario
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Run a batch of games in parallel
    Batch {
        /// Built-in scenario name or scenario file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Number of games to run
        #[arg(short, long, default_value = "16")]
        count: u32,

        /// Maximum parallel games (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Frames per game (default: the scenario's own)
        #[arg(short, long)]
        frames: Option<u64>,

        /// AI scheduling
        #[arg(long, value_enum, default_value = "threaded")]
        mode: Mode,

        /// Output JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check threaded AI and save/reload against an inline run
    Verify {
        /// Built-in scenario name or scenario file
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Frames per run
        #[arg(short, long, default_value = "300")]
        frames: u64,

        /// Threaded runs to compare
        #[arg(short, long, default_value = "3")]
        runs: usize,

        /// Skip the save/reload check
        #[arg(long)]
        no_save: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for reports)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            frames,
            inline,
            barrier,
            log_level,
            log_dir,
            log_redirect,
            save,
            resume,
        } => {
            let scenario = load_scenario(&scenario);
            let mut config = GameConfig::new(scenario.name.clone(), scenario);
            if let Some(frames) = frames {
                config = config.with_frames(frames);
            }
            if inline {
                config = config.with_worker_threads(false);
            }
            config.ai.master_slave_barrier |= barrier;
            config.ai.log_redirect |= log_redirect;
            if let Some(level) = log_level {
                config.ai.log_level = level;
            }
            if let Some(dir) = log_dir {
                config.ai.log_dir = dir;
            }
            config.save_to = save;
            config.resume_from = resume;

            match run_game(&config) {
                Ok(report) => print_json(&report),
                Err(e) => fatal(&format!("Game failed: {e}")),
            }
        }
        Commands::Batch {
            scenario,
            count,
            parallel,
            frames,
            mode,
            output,
        } => {
            let output = output.unwrap_or_else(|| default_output_path(&scenario));
            let mut config = BatchConfig::new(&scenario, count).with_mode(mode.into());
            config.parallel_games = parallel;
            config.frames = frames;

            let results = match run_batch(config) {
                Ok(results) => results,
                Err(e) => fatal(&format!("Batch failed: {e}")),
            };
            if let Err(e) = results.save(&output) {
                tracing::error!(error = %e, path = %output.display(), "Failed to save results");
                fatal(&format!("Failed to save results: {e}"));
            }

            eprintln!("\n{}", "=".repeat(50));
            eprintln!("BATCH COMPLETE");
            eprintln!("{}", "=".repeat(50));
            eprintln!("Games played: {}", results.summary.completed);
            if !results.errors.is_empty() {
                eprintln!("Games FAILED: {}", results.errors.len());
                for error in results.errors.iter().take(10) {
                    eprintln!("  Game {}: {}", error.game_index, error.message);
                }
            }
            eprintln!("Duration: {:.1}s", results.duration_seconds);
            eprintln!("Unique final hashes: {}", results.summary.unique_hashes.len());
            eprintln!("Results saved to: {}", output.display());

            print_json(&results.summary);
            if !results.summary.is_deterministic() {
                std::process::exit(2);
            }
        }
        Commands::Verify {
            scenario,
            frames,
            runs,
            no_save,
        } => {
            let scenario = load_scenario(&scenario);
            let save_dir = (!no_save).then(std::env::temp_dir);
            match verify(&scenario, frames, runs, save_dir) {
                Ok(report) => {
                    print_json(&report);
                    if !report.passed {
                        std::process::exit(2);
                    }
                }
                Err(e) => fatal(&format!("Verification failed: {e}")),
            }
        }
    }
}

fn load_scenario(name: &str) -> Scenario {
    match Scenario::resolve(name) {
        Ok(scenario) => scenario,
        Err(e) => fatal(&e.to_string()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => fatal(&format!("Failed to serialize report: {e}")),
    }
}

fn fatal(message: &str) -> ! {
    eprintln!("FATAL: {message}");
    std::process::exit(1);
}
