use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;

use ledger_cache::accounting::{ledger, LedgerResult, Money};
use ledger_cache::cache::{CachingSession, FlushRetry};
use ledger_cache::config::Config;
use ledger_cache::store::{AccountingStore, SqliteStore};
use ledger_cache::{logging, resources};

#[derive(Parser, Debug)]
#[command(name = "ledger-cache")]
#[command(about = "Book marketplace accounting through a write-back caching session")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ledger-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Ledger database to use instead of the configured one
  #[arg(short, long)]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  #[command(flatten)]
  Ledger(LedgerCommand),
  /// Locate the resource directory for a name and version
  Resources {
    name: Option<String>,
    version: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum LedgerCommand {
  /// Show a participant's account
  Account { participant: String },
  /// Show a ledger movement
  Movement { key: String },
  /// Credit an incoming payment
  Deposit {
    uid: String,
    participant: String,
    amount: Money,
    #[arg(long)]
    reference: Option<String>,
  },
  /// Move available funds between participants
  Transfer {
    from: String,
    to: String,
    amount: Money,
    #[arg(long)]
    reference: Option<String>,
  },
  /// Reserve available funds
  Block { participant: String, amount: Money },
  /// Release blocked funds
  Unblock { participant: String, amount: Money },
}

fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let _log_guard = logging::init(&config.log)?;

  match args.command {
    Command::Resources { name, version } => {
      locate_resources(&config, name.as_deref(), version.as_deref())
    }
    Command::Ledger(command) => {
      // The command line wins over LEDGER_CACHE_DB and the config file
      let path = match args.database {
        Some(path) => path,
        None => config.database_path()?,
      };
      let mut store = SqliteStore::open(&path)?;
      run_ledger_command(command, &mut store, &config.flush.retry())
    }
  }
}

fn run_ledger_command(
  command: LedgerCommand,
  store: &mut SqliteStore,
  retry: &FlushRetry,
) -> Result<()> {
  match command {
    LedgerCommand::Account { participant } => print_json(&store.get_account(&participant)?),
    LedgerCommand::Movement { key } => print_json(&store.get_movement(&key)?),
    LedgerCommand::Deposit {
      uid,
      participant,
      amount,
      reference,
    } => {
      let movement = unit_of_work(store, retry, |session| {
        ledger::book_deposit(session, &uid, &participant, amount, reference)
      })?;
      print_json(&movement)
    }
    LedgerCommand::Transfer {
      from,
      to,
      amount,
      reference,
    } => {
      let movements = unit_of_work(store, retry, |session| {
        ledger::transfer(session, &from, &to, amount, reference)
      })?;
      print_json(&movements)
    }
    LedgerCommand::Block {
      participant,
      amount,
    } => {
      let movement = unit_of_work(store, retry, |session| {
        ledger::block(session, &participant, amount)
      })?;
      print_json(&movement)
    }
    LedgerCommand::Unblock {
      participant,
      amount,
    } => {
      let movement = unit_of_work(store, retry, |session| {
        ledger::unblock(session, &participant, amount)
      })?;
      print_json(&movement)
    }
  }
}

/// Run `work` in a fresh caching session and commit it.
fn unit_of_work<T, F>(store: &mut SqliteStore, retry: &FlushRetry, work: F) -> Result<T>
where
  F: FnOnce(&mut CachingSession<'_, SqliteStore>) -> LedgerResult<T>,
{
  let mut session = CachingSession::new(store);
  let output = work(&mut session)?;
  session.flush_with_retry(retry).map_err(|e| {
    eyre!(
      "Flush failed, {} write(s) not persisted: {}",
      session.pending_writes(),
      e
    )
  })?;
  Ok(output)
}

fn locate_resources(config: &Config, name: Option<&str>, version: Option<&str>) -> Result<()> {
  let configured = config.resources.as_ref();
  let name = name
    .or(configured.map(|r| r.name.as_str()))
    .ok_or_else(|| eyre!("No resource name given and none configured"))?;
  let version = version
    .or(configured.map(|r| r.version.as_str()))
    .ok_or_else(|| eyre!("No resource version given and none configured"))?;

  let dir = resources::find_resource_dir(name, version)
    .map_err(|e| eyre!("Failed to locate {} {} resources: {}", name, version, e))?;
  println!("{}", dir.display());
  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to render output: {}", e))?;
  println!("{}", json);
  Ok(())
}
