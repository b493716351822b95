//! datadesk - load a tabular dataset, then run analysis operations or render
//! charts against it from the command line.

use anyhow::Result;
use clap::{Parser, Subcommand};

use datadesk::session::DEFAULT_STAGING_PATH;
use datadesk::{AnalysisDispatcher, ChartRenderer, DatasetLoader, Session};

#[derive(Parser, Debug)]
#[command(
    name = "datadesk",
    about = "Tabular dataset staging, declarative analysis, and chart rendering",
    version
)]
struct Cli {
    /// Staging path shared by all commands in a session
    #[arg(long, default_value = DEFAULT_STAGING_PATH)]
    staging: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a csv/xls/xlsx/json file and stage it for analysis
    Load {
        /// Path to the source file
        file: String,
    },
    /// Run one analysis operation, e.g.
    /// '{"operation": "describe", "parameters": {}}'
    Analyze {
        /// Operation request JSON
        request: String,
    },
    /// Render one chart, e.g.
    /// '{"plot_type": "histogram", "parameters": {"column": "age"}}'
    Visualize {
        /// Plot request JSON
        request: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let session = Session::new(&cli.staging);

    let output = match &cli.command {
        Command::Load { file } => DatasetLoader::run(&session, file),
        Command::Analyze { request } => AnalysisDispatcher::run(&session, request),
        Command::Visualize { request } => ChartRenderer::run(&session, request),
    };
    println!("{output}");
    Ok(())
}
