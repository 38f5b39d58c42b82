use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
mod auth;
use keyvault::{KdfParams, Keychain, Storage, default_storage};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage(),
    }
}

#[derive(Debug, Parser)]
#[command(name = "keyvault")]
#[command(
    version,
    about = "Password-protected keychain with blinded domains and tamper detection."
)]
struct Cli {
    /// Path to the keychain file
    #[arg(long, global = true, value_name = "PATH", env = "KEYVAULT_PATH")]
    store: Option<PathBuf>,

    /// Trusted SHA-256 digest of the keychain file (overrides the stored one)
    #[arg(long, global = true, value_name = "HEX")]
    digest: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates an empty keychain
    Init {
        /// PBKDF2 iterations (minimum and default: 100000)
        #[arg(long = "pbkdf2-iterations")]
        iterations: Option<u32>,
    },

    /// Stores a value for a domain, replacing any existing one
    #[command(arg_required_else_help = true)]
    Set { domain: String, value: String },

    /// Prints the value stored for a domain
    #[command(arg_required_else_help = true)]
    Get { domain: String },

    /// Removes the value stored for a domain
    #[command(arg_required_else_help = true)]
    Remove { domain: String },

    /// Prints the SHA-256 digest of the keychain file
    Digest,

    /// Checks the keychain's integrity with the master password
    Verify,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_env("KEYVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn open(storage: &Storage, digest: Option<&str>) -> Result<Keychain> {
    if !storage.exists() {
        bail!("keychain does not exist at {}", storage.path().display());
    }
    let stored = storage.load()?;
    let trusted = digest.or(stored.digest.as_deref());

    let password = auth::read_password(false)?;
    let keychain = Keychain::open(&password, &stored.repr, trusted)?;
    Ok(keychain)
}

fn save(storage: &Storage, keychain: &Keychain) -> Result<()> {
    let dump = keychain
        .dump()?
        .context("keychain is not initialized")?;
    storage.save(&dump)
}

fn main() -> Result<()> {
    init_tracing();
    let args = Cli::parse();
    let storage = resolve_storage(args.store.clone())?;
    let digest = args.digest.as_deref();

    match args.command {
        Commands::Init { iterations } => {
            if storage.exists() {
                bail!("keychain already exists at {}", storage.path().display());
            }
            let kdf = match iterations {
                Some(n) => KdfParams::new(n)?,
                None => KdfParams::default(),
            };
            let password = auth::read_password(true)?;
            let keychain = Keychain::create_with_kdf(&password, kdf)?;
            drop(password);
            save(&storage, &keychain)?;
            println!("keychain initialized");
        }
        Commands::Set { domain, value } => {
            let mut keychain = open(&storage, digest)?;
            keychain.set(&domain, &value)?;
            save(&storage, &keychain)?;
            println!("stored value for '{domain}'");
        }
        Commands::Get { domain } => {
            let keychain = open(&storage, digest)?;
            match keychain.get(&domain)? {
                Some(value) => println!("{value}"),
                None => println!("domain not found"),
            }
        }
        Commands::Remove { domain } => {
            let mut keychain = open(&storage, digest)?;
            if keychain.remove(&domain)? {
                save(&storage, &keychain)?;
                println!("removed '{domain}'");
            } else {
                println!("domain not found");
            }
        }
        Commands::Digest => {
            let stored = storage.load()?;
            println!("{}", keyvault::compute_digest(&stored.repr));
        }
        Commands::Verify => {
            let keychain = open(&storage, digest)?;
            println!(
                "keychain ok ({} records, {} pbkdf2 iterations)",
                keychain.record_count()?,
                keychain.kdf()?.iterations()
            );
        }
    }

    Ok(())
}
