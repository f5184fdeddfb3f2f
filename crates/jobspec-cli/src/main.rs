//! `jobspec` - compile, import, validate and simulate job specs

mod config;
mod simulate;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use jobspec_engine::{validate_job, SpecStore, Workspace};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "jobspec", about = "Job spec pipeline builder")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/jobspec/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a TOML job spec and print its canonical form
    Import {
        file: PathBuf,
        /// Also save it as the next version of this spec id
        #[arg(long)]
        save: Option<String>,
    },

    /// Print a stored spec
    Compile {
        spec_id: String,
        /// Version to print (defaults to the latest)
        #[arg(long)]
        version: Option<u32>,
    },

    /// Check a TOML job spec for invalid fields, dangling references and cycles
    Validate { file: PathBuf },

    /// List stored specs
    List,

    /// Step through a TOML job spec's pipeline
    Simulate {
        file: PathBuf,
        /// Use the configured graph-parse service instead of the built-in parser
        #[arg(long)]
        remote_parser: bool,
        /// Run side-effect tasks for real instead of using their mocks
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Import { file, save } => {
            let ws = import_file(&file)?;
            println!("{}", ws.text());
            if let Some(spec_id) = save {
                let mut store = open_store(&config)?;
                let version = store.save(&spec_id, ws.job())?;
                log::info!("Saved '{}' as version {}", spec_id, version);
            }
        }
        Commands::Compile { spec_id, version } => {
            let store = open_store(&config)?;
            let entry = match version {
                Some(v) => store.get(&spec_id, v),
                None => store.latest(&spec_id),
            }
            .with_context(|| format!("no stored spec '{}'", spec_id))?;
            println!("{}", Workspace::restore(&entry.snapshot)?.text());
        }
        Commands::Validate { file } => {
            let ws = import_file(&file)?;
            let errors = validate_job(ws.job());
            for error in &errors {
                println!("{}", error);
            }
            if !errors.is_empty() {
                bail!("{} validation error(s)", errors.len());
            }
            println!("valid");
        }
        Commands::List => {
            let store = open_store(&config)?;
            for spec in store.list() {
                println!(
                    "{}\tv{}\t{}\t{}",
                    spec.id,
                    spec.latest_version,
                    spec.updated_at.to_rfc3339(),
                    spec.name.unwrap_or_default()
                );
            }
        }
        Commands::Simulate {
            file,
            remote_parser,
            execute,
        } => {
            let ws = import_file(&file)?;
            simulate::run(ws, &config, remote_parser, execute).await?;
        }
    }
    Ok(())
}

fn import_file(path: &Path) -> anyhow::Result<Workspace> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let (ws, warnings) = Workspace::import(&text)?;
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(ws)
}

fn open_store(config: &CliConfig) -> anyhow::Result<SpecStore> {
    let mut store = SpecStore::with_persistence(&config.store_dir);
    store.load_from_disk()?;
    Ok(store)
}
