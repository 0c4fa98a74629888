//! vault-sync CLI - multi-device secret synchronization.
//!
//! Secrets live sealed in a shared object store; each enrolled device
//! keeps its own working manifest and publishes through an atomic
//! compare-and-swap on the manifest head.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use vaultsync_common::{DeviceId, SecretPath};
use vaultsync_crypto::KdfParams;
use vaultsync_manifest::LocalState;
use vaultsync_store::{LocalStore, ObjectStore};
use vaultsync_sync::{SyncConfig, Vault};

mod descriptor;
use descriptor::VaultDescriptor;

#[derive(Parser)]
#[command(name = "vault-sync")]
#[command(about = "Encrypted multi-device secret synchronization")]
#[command(version)]
struct Cli {
    /// Root directory of the shared object store.
    #[arg(long, env = "VAULT_SYNC_STORE", global = true)]
    store: Option<PathBuf>,

    /// Directory for this device's local state.
    #[arg(long, env = "VAULT_SYNC_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a vault in the store, or enroll this device into an
    /// existing one.
    Init {
        /// Name for this device (random id if omitted).
        #[arg(short, long)]
        device: Option<String>,

        /// KDF strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long, default_value = "interactive")]
        strength: String,
    },

    /// Add or overwrite a secret.
    Add {
        /// Logical secret path, e.g. "prod/db/password".
        path: String,

        /// File holding the secret value (stdin if omitted).
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Print a secret's value.
    Get {
        /// Logical secret path.
        path: String,

        /// Write the value to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a secret.
    Rm {
        /// Logical secret path.
        path: String,
    },

    /// List secrets in the working manifest.
    Ls,

    /// Synchronize with the shared store.
    Sync {
        /// Compute and report the outcome without writing anything.
        #[arg(long, visible_alias = "check")]
        dry_run: bool,

        /// Maximum retry attempts on transient failures.
        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-operation store deadline in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Emit the sync report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show local and remote vault state.
    Status {
        /// Emit the status as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = open_store(cli.store)?;
    let state_dir = state_dir(cli.state_dir)?;

    match cli.command {
        Commands::Init { device, strength } => cmd_init(store, state_dir, device, &strength).await,

        Commands::Add { path, source } => {
            let mut vault = open_vault(store, &state_dir, SyncConfig::default()).await?;
            cmd_add(&mut vault, &path, source).await
        }

        Commands::Get { path, output } => {
            let vault = open_vault(store, &state_dir, SyncConfig::default()).await?;
            cmd_get(&vault, &path, output).await
        }

        Commands::Rm { path } => {
            let mut vault = open_vault(store, &state_dir, SyncConfig::default()).await?;
            cmd_rm(&mut vault, &path).await
        }

        Commands::Ls => {
            let vault = open_vault(store, &state_dir, SyncConfig::default()).await?;
            cmd_ls(&vault)
        }

        Commands::Sync {
            dry_run,
            max_retries,
            timeout,
            json,
        } => {
            let mut config = SyncConfig {
                dry_run,
                ..SyncConfig::default()
            };
            if let Some(retries) = max_retries {
                config.max_retries = retries;
            }
            if let Some(secs) = timeout {
                config.op_timeout = Duration::from_secs(secs);
            }

            let mut vault = open_vault(store, &state_dir, config).await?;
            cmd_sync(&mut vault, json).await
        }

        Commands::Status { json } => {
            let vault = open_vault(store, &state_dir, SyncConfig::default()).await?;
            cmd_status(&vault, json).await
        }
    }
}

fn open_store(path: Option<PathBuf>) -> Result<Arc<dyn ObjectStore>> {
    let path = path.context("No store given; pass --store or set VAULT_SYNC_STORE")?;
    let store = LocalStore::new(&path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn state_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = dir {
        return Ok(dir);
    }
    let base = dirs::data_dir().context("Could not determine a data directory for device state")?;
    Ok(base.join("vault-sync"))
}

/// Read the passphrase from the environment or prompt for it.
fn passphrase(confirm: bool) -> Result<Zeroizing<Vec<u8>>> {
    if let Ok(value) = std::env::var("VAULT_SYNC_PASSPHRASE") {
        return Ok(Zeroizing::new(value.into_bytes()));
    }

    let entered = rpassword::prompt_password("Enter passphrase: ")
        .context("Failed to read passphrase")?;
    if confirm {
        let again = rpassword::prompt_password("Confirm passphrase: ")
            .context("Failed to read passphrase")?;
        if entered != again {
            bail!("Passphrases do not match");
        }
    }
    if entered.is_empty() {
        bail!("Passphrase cannot be empty");
    }
    Ok(Zeroizing::new(entered.into_bytes()))
}

async fn open_vault(
    store: Arc<dyn ObjectStore>,
    state_dir: &PathBuf,
    config: SyncConfig,
) -> Result<Vault> {
    let descriptor = VaultDescriptor::fetch(&store).await?;
    let key = descriptor
        .unlock(&passphrase(false)?)
        .context("Failed to unlock vault")?;

    let state = LocalState::load(state_dir)
        .await
        .context("This device is not enrolled; run 'init' first")?;

    Ok(Vault::open_with(store, state, key, config).await?)
}

async fn cmd_init(
    store: Arc<dyn ObjectStore>,
    state_dir: PathBuf,
    device: Option<String>,
    strength: &str,
) -> Result<()> {
    let kdf = match strength {
        "interactive" => KdfParams::interactive(),
        "moderate" => KdfParams::moderate(),
        "sensitive" => KdfParams::sensitive(),
        _ => bail!("Invalid strength. Use: interactive, moderate, or sensitive"),
    };

    let device_id = match device {
        Some(name) => DeviceId::new(name).context("Invalid device name")?,
        None => DeviceId::generate(),
    };

    match VaultDescriptor::fetch(&store).await {
        Ok(descriptor) => {
            // Existing vault: verify the passphrase, then enroll locally.
            descriptor
                .unlock(&passphrase(false)?)
                .context("Failed to unlock vault")?;
            LocalState::create(&state_dir, device_id.clone()).await?;
            println!("Enrolled device '{}' into existing vault.", device_id);
            println!("Run 'vault-sync sync' to fetch the current secrets.");
        }
        Err(vaultsync_common::Error::NotFound(_)) => {
            let pass = passphrase(true)?;
            let (descriptor, _key) = VaultDescriptor::create(&pass, kdf)?;
            descriptor.publish(&store).await?;
            LocalState::create(&state_dir, device_id.clone()).await?;
            info!("vault descriptor published");
            println!("Vault initialized.");
            println!("  Device: {}", device_id);
            println!("  State:  {}", state_dir.display());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn cmd_add(vault: &mut Vault, path: &str, source: Option<PathBuf>) -> Result<()> {
    let path = SecretPath::parse(path).context("Invalid secret path")?;

    let value = match source {
        Some(file) => tokio::fs::read(&file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?,
        None => {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read secret from stdin")?;
            buf
        }
    };
    if value.is_empty() {
        bail!("Refusing to store an empty secret");
    }

    vault.add(path.clone(), &value).await?;
    println!("Stored '{}' ({} bytes). Run 'sync' to publish.", path, value.len());
    Ok(())
}

async fn cmd_get(vault: &Vault, path: &str, output: Option<PathBuf>) -> Result<()> {
    let path = SecretPath::parse(path).context("Invalid secret path")?;
    let secret = vault.read(&path).await?;

    match output {
        Some(file) => {
            tokio::fs::write(&file, secret.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("Wrote '{}' to {}", path, file.display());
        }
        None => {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(secret.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn cmd_rm(vault: &mut Vault, path: &str) -> Result<()> {
    let path = SecretPath::parse(path).context("Invalid secret path")?;
    vault.remove(&path).await?;
    println!("Deleted '{}'. Run 'sync' to publish.", path);
    Ok(())
}

fn cmd_ls(vault: &Vault) -> Result<()> {
    let entries = vault.list();
    if entries.is_empty() {
        println!("Vault is empty.");
        return Ok(());
    }

    for (path, entry) in entries {
        println!("{}  {} bytes  [{}]", path, entry.size, entry.device);
    }

    let conflicts = &vault.manifest().conflicts;
    if !conflicts.is_empty() {
        println!();
        println!("{} unresolved conflict(s):", conflicts.len());
        for marker in conflicts {
            match &marker.renamed_path {
                Some(renamed) => println!("  {} (other version at {})", marker.path, renamed),
                None => println!("  {} (concurrent deletion lost)", marker.path),
            }
        }
    }
    Ok(())
}

async fn cmd_sync(vault: &mut Vault, json: bool) -> Result<()> {
    let report = vault.sync_with_retry().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if vault.config().dry_run {
        println!("Dry run; nothing was written.");
    }
    println!(
        "Sync complete in {} ms: {} pushed, {} pulled, {} auto-merged, {} unchanged.",
        report.duration_ms, report.pushed, report.pulled, report.auto_merged, report.unchanged
    );
    if report.published {
        println!("Published new manifest head.");
    }
    for conflict in &report.conflicts {
        match &conflict.renamed_path {
            Some(renamed) => println!(
                "CONFLICT {}: version from {} kept at {}",
                conflict.path, conflict.conflicting_device, renamed
            ),
            None => println!(
                "CONFLICT {}: concurrent deletion by {} lost to an edit",
                conflict.path, conflict.conflicting_device
            ),
        }
    }
    Ok(())
}

async fn cmd_status(vault: &Vault, json: bool) -> Result<()> {
    let status = vault.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Device:      {}", status.device);
    println!("Sequence:    {}", status.sequence);
    println!("Secrets:     {}", status.live_entries);
    println!("Tombstones:  {}", status.tombstones);
    println!(
        "Local head:  {}",
        status
            .local_head
            .map(|h| h.to_hex())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "Remote head: {}",
        status
            .remote_head
            .map(|h| h.to_hex())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "In sync:     {}",
        if status.in_sync { "yes" } else { "no" }
    );
    if !status.conflicts.is_empty() {
        println!("Conflicts:   {}", status.conflicts.len());
    }
    Ok(())
}
