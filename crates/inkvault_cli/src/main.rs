//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `inkvault_core` linkage, store migrations and book seeding from a shell.
//! - Keep output deterministic `key=value` lines.

use clap::{Parser, Subcommand, ValueEnum};
use inkvault_core::db::migrations::current_user_version;
use inkvault_core::repo::instance_repo::{InstanceRepository, SqliteInstanceRepository};
use inkvault_core::repo::scene_repo::{ManuscriptRepository, SqliteManuscriptRepository};
use inkvault_core::repo::schema_repo::{SchemaRepository, SqliteSchemaRepository};
use inkvault_core::{
    init_book_store, init_logging, open_book_db, open_library_db, LoggingConfig, StoreKind,
};
use log::error;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "inkvault", version, about = "Inkvault storage core command line")]
struct Cli {
    /// Absolute directory for rolling log files; logging stays off when omitted.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, global = true, requires = "log_dir")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print core health and version.
    Ping,
    /// Open a store file, applying pending migrations.
    Migrate {
        #[arg(long, value_enum)]
        store: StoreArg,
        path: PathBuf,
    },
    /// Seed an empty book store from a catalog book's configuration.
    InitBook {
        #[arg(long)]
        library: PathBuf,
        #[arg(long)]
        book: Uuid,
        path: PathBuf,
    },
    /// Count blocks, instances and scenes of a book store.
    Stats { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Library,
    Book,
}

impl From<StoreArg> for StoreKind {
    fn from(value: StoreArg) -> Self {
        match value {
            StoreArg::Library => StoreKind::Library,
            StoreArg::Book => StoreKind::Book,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(log_dir) = cli.log_dir {
        let mut config = LoggingConfig::new(log_dir);
        if let Some(level) = cli.log_level {
            config = config.with_level(level);
        }
        if let Err(err) = init_logging(&config) {
            eprintln!("error={err}");
            return ExitCode::FAILURE;
        }
    }
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Ping => {
            println!("inkvault_core ping={}", inkvault_core::ping());
            println!("inkvault_core version={}", inkvault_core::core_version());
        }
        Command::Migrate { store, path } => {
            let kind = StoreKind::from(store);
            let conn = match kind {
                StoreKind::Library => open_library_db(&path)?,
                StoreKind::Book => open_book_db(&path)?,
            };
            println!(
                "store={} path={} user_version={}",
                kind.as_str(),
                path.display(),
                current_user_version(&conn)?
            );
        }
        Command::InitBook {
            library,
            book,
            path,
        } => {
            let library = open_library_db(&library)?;
            let store = open_book_db(&path)?;
            let info = init_book_store(&library, &store, book)?;
            println!(
                "book_uuid={} configuration_uuid={} sync_state={}",
                info.book_uuid,
                info.configuration_uuid,
                info.sync_state.as_str()
            );
        }
        Command::Stats { path } => {
            let conn = open_book_db(&path)?;
            let schema = SqliteSchemaRepository::try_new(&conn)?;
            let instances = SqliteInstanceRepository::try_new(&conn)?;
            let manuscript = SqliteManuscriptRepository::try_new(&conn)?;

            let mut blocks = 0usize;
            let mut instance_count = 0i64;
            for configuration in schema.list_configurations()? {
                for block in schema.list_blocks(configuration.uuid)? {
                    blocks += 1;
                    instance_count += instances.count_instances(block.uuid)?;
                }
            }
            println!(
                "blocks={} instances={} scenes={}",
                blocks,
                instance_count,
                manuscript.count_scenes()?
            );
        }
    }
    Ok(())
}
