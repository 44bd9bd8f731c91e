//! Fieldseal - envelope encryption walkthrough

use clap::{Parser, Subcommand};
use fieldseal_cli::{run_demo, DemoOptions};
use fieldseal_core::EngineConfig;
use fieldseal_crypto::KdfParams;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fieldseal")]
#[command(about = "Field-level envelope encryption with multi-recipient sharing")]
#[command(version)]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, env = "FIELDSEAL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "FIELDSEAL_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert, read, share and update one record between two users
    Demo {
        /// Collection name
        #[arg(long, default_value = "notes")]
        collection: String,

        /// Protected field
        #[arg(long, default_value = "title")]
        field: String,

        /// Plaintext to insert
        #[arg(long, default_value = "hello")]
        value: String,

        /// Owner user id
        #[arg(long, default_value = "alice")]
        owner: String,

        /// Grantee user id
        #[arg(long, default_value = "bob")]
        grantee: String,

        /// Use cheap Argon2id parameters (for trying things out only!)
        #[arg(long)]
        fast_kdf: bool,
    },

    /// Print the effective engine configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("fieldseal={log_level},fieldseal_core={log_level},fieldseal_cli={log_level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = EngineConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Demo {
            collection,
            field,
            value,
            owner,
            grantee,
            fast_kdf,
        } => {
            if fast_kdf {
                tracing::warn!("using insecure Argon2id parameters");
                config.kdf = KdfParams::insecure_fast();
            }
            tracing::info!(%collection, %field, "running walkthrough");

            let options = DemoOptions {
                collection,
                field,
                value,
                owner,
                grantee,
                ..DemoOptions::default()
            };
            let report = run_demo(config, &options)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
