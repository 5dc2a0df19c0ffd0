use clap::{Parser, Subcommand};
use tracing::{error, info};

use permit_pipeline::config::Config;
use permit_pipeline::error::Result;
use permit_pipeline::logging::init_logging;
use permit_pipeline::pipeline::{ingest, transform};
use permit_pipeline::query::{store_for_data_root, QueryFilter};

#[derive(Parser)]
#[command(name = "permit_pipeline")]
#[command(about = "San Diego development-permit reconciliation pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the raw permit CSVs from the city data portal
    Ingest {
        /// Re-download files that are already present
        #[arg(long)]
        force: bool,
    },
    /// Rebuild the canonical permit table and all nine aggregates
    Transform,
    /// Run ingest then transform sequentially
    Run {
        /// Re-download files that are already present
        #[arg(long)]
        force: bool,
    },
    /// Read one aggregate view and print its rows as JSON
    Query {
        /// View name, e.g. permit_volume_monthly, overview, filter_options
        #[arg(long)]
        view: String,
        #[arg(long)]
        year_min: Option<i32>,
        #[arg(long)]
        year_max: Option<i32>,
        #[arg(long)]
        permit_type: Option<String>,
        #[arg(long)]
        zip: Option<String>,
    },
}

async fn run_ingest(config: &Config, force: bool) -> Result<()> {
    println!("── Step 1: Ingest ──");
    let paths = ingest::ingest(config, force).await?;
    info!("{} raw files ready", paths.len());
    println!("  {} files ready", paths.len());
    Ok(())
}

fn run_transform(config: &Config) -> Result<()> {
    println!("── Step 2: Transform ──");
    let result = transform::run(config)?;
    println!("\n📊 Transform results:");
    println!("   Legacy rows:  {}", result.legacy_rows);
    println!("   Current rows: {}", result.current_rows);
    println!("   Union rows:   {}", result.union_rows);
    println!("   Final rows:   {}", result.final_rows);
    println!("   Output file:  {}", result.permits_file);
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Ingest { force } => run_ingest(&config, force).await,
        Commands::Transform => run_transform(&config),
        Commands::Run { force } => {
            let start = std::time::Instant::now();
            let result = run_ingest(&config, force)
                .await
                .and_then(|()| run_transform(&config));
            if result.is_ok() {
                println!("\nPipeline complete in {:.1}s", start.elapsed().as_secs_f64());
            }
            result
        }
        Commands::Query {
            view,
            year_min,
            year_max,
            permit_type,
            zip,
        } => {
            let filter = QueryFilter {
                year_min,
                year_max,
                permit_type,
                zip_code: zip,
            };
            let store = store_for_data_root(&config.data_root);
            store.view_as_json(&view, &filter).and_then(|rows| {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                Ok(())
            })
        }
    };

    if let Err(e) = outcome {
        error!("Pipeline failed: {}", e);
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
}
