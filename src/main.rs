//! # garagectl
//!
//! Command-line front end for the Garage reconciler.
//!
//! ## Usage
//!
//! ```bash
//! # Create an access key (the secret is printed once)
//! garagectl key create alice
//!
//! # Create a bucket whose objects expire after 30 days
//! garagectl bucket create --alias logs --expiration-days 30
//!
//! # Give a key read/write access to a bucket
//! garagectl grant apply <bucket-id> <key-id> --read --write
//!
//! # Inspect the expiration policy of a bucket
//! garagectl lifecycle get <bucket-id>
//!
//! # Show the data-plane address derived from an admin address
//! garagectl endpoint derive 127.0.0.1:3903
//! ```
//!
//! Connection settings come from `GARAGE_*` environment variables and can be
//! overridden with the global flags.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use garage_reconciler::observability::{self, metrics};
use garage_reconciler::prelude::*;
use serde::Serialize;
use tracing::info;

/// Garage reconciler CLI
#[derive(Parser)]
#[command(name = "garagectl")]
#[command(
    about = "Reconcile Garage access keys, buckets and grants",
    long_about = None,
    after_help = "\
Environment:
  GARAGE_SCHEME, GARAGE_HOST, GARAGE_TOKEN, GARAGE_S3_PORT,
  GARAGE_REQUEST_TIMEOUT_SECS, LOG_LEVEL, LOG_FORMAT

Examples:
  garagectl key create alice
  garagectl bucket create --alias logs --expiration-days 7
  garagectl grant apply 5f1e... GK31... --read
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Admin API scheme (http or https)
    #[arg(long, global = true)]
    scheme: Option<String>,

    /// Admin API host[:port]
    #[arg(long, global = true)]
    host: Option<String>,

    /// Admin bearer token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Port of the S3-compatible endpoint
    #[arg(long, global = true)]
    s3_port: Option<u16>,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long, global = true)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage access keys
    #[command(subcommand)]
    Key(KeyCommand),
    /// Manage buckets
    #[command(subcommand)]
    Bucket(BucketCommand),
    /// Manage bucket/key grants
    #[command(subcommand)]
    Grant(GrantCommand),
    /// Manage bucket expiration policies directly
    #[command(subcommand)]
    Lifecycle(LifecycleCommand),
    /// Endpoint helpers
    #[command(subcommand)]
    Endpoint(EndpointCommand),
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Create an access key and print its secret
    Create {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Show an access key
    Read {
        #[arg(value_name = "ACCESS_KEY_ID")]
        id: String,
    },
    /// Rename an access key (recreates it with a new id and secret)
    Rename {
        #[arg(value_name = "ACCESS_KEY_ID")]
        id: String,
        #[arg(value_name = "NEW_NAME")]
        name: String,
    },
}

#[derive(Args)]
struct BucketArgs {
    /// Global alias
    #[arg(long)]
    alias: Option<String>,

    /// Expire objects after this many days (0 for no policy)
    #[arg(long, default_value_t = 0)]
    expiration_days: u32,
}

impl BucketArgs {
    fn spec(self) -> BucketSpec {
        BucketSpec {
            global_alias: self.alias,
            expiration_days: self.expiration_days,
        }
    }
}

#[derive(Subcommand)]
enum BucketCommand {
    /// Create a bucket
    Create(BucketArgs),
    /// Show a bucket and its expiration policy
    Read {
        #[arg(value_name = "BUCKET_ID")]
        id: String,
    },
    /// Change the expiration policy of a bucket
    Update {
        #[arg(value_name = "BUCKET_ID")]
        id: String,
        #[command(flatten)]
        args: BucketArgs,
    },
    /// Stop managing a bucket (the bucket itself is kept)
    Delete {
        #[arg(value_name = "BUCKET_ID")]
        id: String,
    },
}

#[derive(Subcommand)]
enum GrantCommand {
    /// Create or update the grant of a key on a bucket
    Apply {
        #[arg(value_name = "BUCKET_ID")]
        bucket_id: String,
        #[arg(value_name = "ACCESS_KEY_ID")]
        access_key_id: String,
        #[arg(long)]
        read: bool,
        #[arg(long)]
        write: bool,
        #[arg(long)]
        owner: bool,
    },
    /// Show a grant
    Read {
        #[arg(value_name = "BUCKET_ID/ACCESS_KEY_ID")]
        id: GrantId,
    },
    /// Revoke every capability of a grant
    Revoke {
        #[arg(value_name = "BUCKET_ID/ACCESS_KEY_ID")]
        id: GrantId,
    },
}

#[derive(Subcommand)]
enum LifecycleCommand {
    /// Print the expiration in days (0 when there is no policy)
    Get {
        #[arg(value_name = "BUCKET_ID")]
        id: String,
    },
    /// Expire objects after DAYS days
    Set {
        #[arg(value_name = "BUCKET_ID")]
        id: String,
        #[arg(value_name = "DAYS")]
        days: u32,
    },
    /// Remove the expiration policy
    Clear {
        #[arg(value_name = "BUCKET_ID")]
        id: String,
    },
}

#[derive(Subcommand)]
enum EndpointCommand {
    /// Print the data-plane host derived from an admin host
    Derive {
        #[arg(value_name = "HOST")]
        host: String,
        /// Data-plane port (defaults to --s3-port or GARAGE_S3_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    let mut config = GarageConfig::from_env();
    if let Some(scheme) = cli.scheme {
        config.scheme = scheme;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(token) = cli.token {
        config.token = Some(BearerToken::new(token));
    }
    if let Some(port) = cli.s3_port {
        config.data_plane_port = port;
    }

    observability::init_logging(&config)?;
    metrics::register_metrics()?;

    match cli.command {
        Commands::Endpoint(EndpointCommand::Derive { host, port }) => {
            let port = port.unwrap_or(config.data_plane_port);
            println!("{}", derive_data_plane_host(&host, port));
        }
        command => {
            let client = GarageClient::from_config(&config)
                .context("Failed to create Garage client")?;
            run(&client, command).await?;
        }
    }

    if cli.print_metrics {
        eprintln!("{}", metrics::gather_text()?);
    }
    Ok(())
}

async fn run(client: &GarageClient, command: Commands) -> Result<()> {
    match command {
        Commands::Key(command) => key_command(client, command).await,
        Commands::Bucket(command) => bucket_command(client, command).await,
        Commands::Grant(command) => grant_command(client, command).await,
        Commands::Lifecycle(command) => lifecycle_command(client, command).await,
        Commands::Endpoint(_) => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

async fn key_command(client: &GarageClient, command: KeyCommand) -> Result<()> {
    match command {
        KeyCommand::Create { name } => {
            let mut key = ManagedResource::new(KeyReconciler);
            let state = key.create(client, &KeySpec::new(name)).await?;
            print_json(&state)
        }
        KeyCommand::Read { id } => {
            let mut key = ManagedResource::tracked(KeyReconciler, id);
            print_json(&key.read(client).await?)
        }
        KeyCommand::Rename { id, name } => {
            let mut key = ManagedResource::tracked(KeyReconciler, id);
            print_json(&key.update(client, &KeySpec::new(name)).await?)
        }
    }
}

async fn bucket_command(client: &GarageClient, command: BucketCommand) -> Result<()> {
    match command {
        BucketCommand::Create(args) => {
            let mut bucket = ManagedResource::new(BucketReconciler);
            print_bucket_outcome(bucket.create(client, &args.spec()).await.map(Some))
        }
        BucketCommand::Read { id } => {
            let mut bucket = ManagedResource::tracked(BucketReconciler, id);
            print_bucket_outcome(bucket.read(client).await)
        }
        BucketCommand::Update { id, args } => {
            let mut bucket = ManagedResource::tracked(BucketReconciler, id);
            print_json(&bucket.update(client, &args.spec()).await?)
        }
        BucketCommand::Delete { id } => {
            let mut bucket = ManagedResource::tracked(BucketReconciler, id.clone());
            bucket.delete(client).await?;
            info!("Bucket {} is no longer managed", id);
            Ok(())
        }
    }
}

/// Print what is known about a bucket even when its policy step failed
fn print_bucket_outcome(outcome: Result<Option<BucketState>, ReconcileError>) -> Result<()> {
    match outcome {
        Ok(state) => print_json(&state),
        Err(error) => {
            if let ReconcileError::PartialCreate { state, .. }
            | ReconcileError::PartialRead { state, .. } = &error
            {
                print_json(state)?;
            }
            Err(error.into())
        }
    }
}

async fn grant_command(client: &GarageClient, command: GrantCommand) -> Result<()> {
    match command {
        GrantCommand::Apply {
            bucket_id,
            access_key_id,
            read,
            write,
            owner,
        } => {
            let spec = GrantSpec::new(bucket_id, access_key_id, Permissions::new(read, write, owner));
            let mut grant = ManagedResource::tracked(GrantReconciler, spec.id());
            // An absent grant is untracked by the read and created instead
            let state = match grant.read(client).await? {
                Some(_) => grant.update(client, &spec).await?,
                None => Some(grant.create(client, &spec).await?),
            };
            print_json(&state)
        }
        GrantCommand::Read { id } => {
            let mut grant = ManagedResource::tracked(GrantReconciler, id);
            print_json(&grant.read(client).await?)
        }
        GrantCommand::Revoke { id } => {
            let mut grant = ManagedResource::tracked(GrantReconciler, id.clone());
            grant.delete(client).await?;
            info!("Revoked grant {}", id);
            Ok(())
        }
    }
}

async fn lifecycle_command(client: &GarageClient, command: LifecycleCommand) -> Result<()> {
    let bridge = LifecycleBridge::new(client);
    match command {
        LifecycleCommand::Get { id } => {
            println!("{}", bridge.get_policy(&id).await?);
        }
        LifecycleCommand::Set { id, days } => {
            bridge.set_policy(&id, days).await?;
        }
        LifecycleCommand::Clear { id } => {
            bridge.clear_policy(&id).await?;
        }
    }
    Ok(())
}
