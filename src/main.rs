//! VeWorld wallet CLI
//!
//! Command-line interface over the wallet core: key derivation, signing,
//! fee delegation and broadcast.

use alloy::primitives::hex;
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use veworld_core::config::store_keys;
use veworld_core::signing::{self, Chain, RecoverRequest};
use veworld_core::storage::{
    self, AlwaysGrant, EncryptedStore, FileStorage, KeyHolder, MemoryStorage, SecureStorage,
};
use veworld_core::transaction::{
    DelegationOption, DelegationRequest, SponsorClient, TransactionBody, TransactionBroadcaster,
    TransactionPipeline,
};
use veworld_core::wallet::{
    self, address_hex, device, DeviceRegistry, ImportType, LocalSigner, NewDevice, XPubDescriptor,
};
use veworld_core::{Config, Error, Result};

/// Mnemonic for `derive`
const MNEMONIC_ENV: &str = "VEWORLD_MNEMONIC";
/// Mnemonic or private key for `import`
const SECRET_ENV: &str = "VEWORLD_SECRET";
/// Origin private key for `send`
const PRIVATE_KEY_ENV: &str = "VEWORLD_PRIVATE_KEY";
/// Password of a keystore file
const KEYSTORE_PASSWORD_ENV: &str = "VEWORLD_KEYSTORE_PASSWORD";
/// Credential protecting the local stores
const PIN_ENV: &str = "VEWORLD_PIN";

#[derive(Parser)]
#[command(name = "veworld")]
#[command(about = "VeChain wallet core: keys, signing, fee delegation and broadcast")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new mnemonic and show its root address
    Generate {
        /// Number of words (12, 15, 18, 21 or 24)
        #[arg(short, long, default_value_t = 12)]
        words: usize,

        /// Encrypt and store the wallet (credential from VEWORLD_PIN)
        #[arg(long)]
        save: bool,
    },

    /// Derive root address, xPub and accounts from VEWORLD_MNEMONIC
    Derive {
        /// Number of accounts to list
        #[arg(short, long, default_value_t = 1)]
        accounts: u32,
    },

    /// Derive an account address from an xPub
    Account {
        /// Uncompressed public key (hex)
        #[arg(long)]
        public_key: String,

        /// Chain code (hex)
        #[arg(long)]
        chain_code: String,

        /// Account index
        #[arg(short, long, default_value_t = 0)]
        index: u32,
    },

    /// Import a mnemonic or private key from VEWORLD_SECRET
    Import {
        /// Encrypt and store the wallet (credential from VEWORLD_PIN)
        #[arg(long)]
        save: bool,
    },

    /// Decrypt a keystore v3 file (password from VEWORLD_KEYSTORE_PASSWORD)
    ImportKeystore {
        /// Path to the keystore JSON
        file: PathBuf,

        /// Encrypt and store the key (credential from VEWORLD_PIN)
        #[arg(long)]
        save: bool,
    },

    /// List stored devices (credential from VEWORLD_PIN)
    Devices,

    /// Hash a message with chain framing
    HashMessage {
        message: String,

        #[arg(long, value_enum, default_value_t = Chain::Vechain)]
        chain: Chain,
    },

    /// Recover the signer of a message
    Recover {
        message: String,

        /// 65-byte signature (hex)
        #[arg(long)]
        signature: String,

        #[arg(long, value_enum, default_value_t = Chain::Vechain)]
        chain: Chain,
    },

    /// Request a sponsor signature for a transaction body
    Sponsor {
        /// Transaction body JSON
        tx: PathBuf,

        /// Origin address
        #[arg(long)]
        origin: String,

        /// Sponsor URL (defaults to the configured delegate URL)
        #[arg(long)]
        url: Option<String>,
    },

    /// Broadcast an encoded signed transaction
    Broadcast {
        /// Raw transaction (hex)
        raw: String,
    },

    /// Sign and broadcast a transaction body with VEWORLD_PRIVATE_KEY
    Send {
        /// Transaction body JSON
        tx: PathBuf,

        /// Sponsor URL for fee delegation
        #[arg(long, conflicts_with = "gas_payer_env")]
        delegate: Option<String>,

        /// Environment variable holding a gas-payer private key
        #[arg(long)]
        gas_payer_env: Option<String>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate { words, save } => run_generate(&config, words, save).await?,
        Commands::Derive { accounts } => run_derive(accounts)?,
        Commands::Account {
            public_key,
            chain_code,
            index,
        } => {
            let x_pub = XPubDescriptor {
                public_key,
                chain_code,
            };
            println!("{}", address_hex(&wallet::derive_account(&x_pub, index)?));
        }
        Commands::Import { save } => run_import(&config, save).await?,
        Commands::ImportKeystore { file, save } => run_import_keystore(&config, file, save).await?,
        Commands::Devices => run_devices(&config).await?,
        Commands::HashMessage { message, chain } => {
            println!("{}", signing::hash_message(message.as_bytes(), chain));
        }
        Commands::Recover {
            message,
            signature,
            chain,
        } => {
            let signer = signing::recover(&RecoverRequest {
                message,
                signature,
                chain,
            })?;
            println!("{}", address_hex(&signer));
        }
        Commands::Sponsor { tx, origin, url } => run_sponsor(&config, tx, origin, url).await?,
        Commands::Broadcast { raw } => {
            let bytes = hex::decode(raw.trim())
                .map_err(|e| Error::InvalidArgument(format!("raw transaction: {}", e)))?;
            let broadcaster = TransactionBroadcaster::new(config.http.broadcast_timeout())?;
            let id = broadcaster.submit(&bytes, &config.node_url()).await?;
            println!("{}", id);
        }
        Commands::Send {
            tx,
            delegate,
            gas_payer_env,
        } => run_send(&config, tx, delegate, gas_payer_env).await?,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn secret_from_env(var: &str) -> Result<SecretString> {
    std::env::var(var)
        .map(SecretString::from)
        .map_err(|_| Error::InvalidArgument(format!("{} is not set", var)))
}

fn read_body(path: &PathBuf) -> Result<TransactionBody> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

async fn run_generate(config: &Config, words: usize, save: bool) -> Result<()> {
    let mnemonic = wallet::generate_mnemonic(words)?;
    let root = wallet::derive_root(&mnemonic)?;

    println!("{}", mnemonic.join(" "));
    println!("root address: {}", address_hex(&root.root_address));

    if save {
        persist_local(config, |index, alias| {
            device::generate_device_for_mnemonic(&mnemonic, index, alias, false)
        })
        .await?;
    }
    Ok(())
}

fn run_derive(accounts: u32) -> Result<()> {
    let phrase = secret_from_env(MNEMONIC_ENV)?;
    let words = wallet::parse_mnemonic(phrase.expose_secret());
    let root = wallet::derive_root(&words)?;

    println!("root address: {}", address_hex(&root.root_address));
    println!("xPub: {}", serde_json::to_string(&root.x_pub)?);
    for index in 0..accounts {
        let address = wallet::derive_account(&root.x_pub, index)?;
        println!("{:>4}  {}", index, address_hex(&address));
    }
    Ok(())
}

async fn run_import(config: &Config, save: bool) -> Result<()> {
    let secret = secret_from_env(SECRET_ENV)?;
    let import_type = wallet::detect_import_type(secret.expose_secret());
    tracing::info!(?import_type, "Detected import type");

    let build = |index: u32, alias: &str| -> Result<NewDevice> {
        match import_type {
            ImportType::Mnemonic => {
                let words = wallet::parse_mnemonic(secret.expose_secret());
                device::generate_device_for_mnemonic(&words, index, alias, true)
            }
            ImportType::PrivateKey => {
                device::generate_device_for_private_key(secret.expose_secret().trim(), index, alias)
            }
            ImportType::KeystoreFile => Err(Error::InvalidArgument(
                "use import-keystore for keystore files".into(),
            )),
            ImportType::Unknown => Err(Error::InvalidArgument(
                "not a mnemonic or private key".into(),
            )),
        }
    };

    if save {
        persist_local(config, build).await
    } else {
        let new = build(0, &device::default_alias(1))?;
        println!("root address: {}", address_hex(&new.device.root_address));
        Ok(())
    }
}

async fn run_import_keystore(config: &Config, file: PathBuf, save: bool) -> Result<()> {
    let content = std::fs::read_to_string(&file)
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", file.display(), e)))?;
    let keystore: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| Error::InvalidKeystore(e.to_string()))?;
    let password = secret_from_env(KEYSTORE_PASSWORD_ENV)?;

    // scrypt with keystore-grade parameters is slow; keep it off the runtime
    let key = tokio::task::spawn_blocking(move || {
        storage::keystore::import_private_key(&keystore, password.expose_secret().as_bytes())
    })
    .await
    .map_err(|e| Error::Storage(format!("keystore task failed: {}", e)))??;

    let signer = LocalSigner::from_bytes(&key)?;
    println!("address: {}", signer.address_string());

    if save {
        persist_local(config, |index, alias| {
            device::generate_device_for_key_bytes(&key, index, alias)
        })
        .await?;
    }
    Ok(())
}

/// Storage backend chosen by the configuration
fn open_storage(config: &Config) -> Arc<dyn SecureStorage> {
    match &config.storage.dir {
        Some(dir) => Arc::new(FileStorage::new(dir)),
        None => {
            tracing::warn!("No storage directory configured; using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
    }
}

/// Unlocked device registry and wallet store
async fn open_stores(config: &Config) -> Result<(DeviceRegistry, EncryptedStore)> {
    let credential = secret_from_env(PIN_ENV)?;
    let backend = open_storage(config);
    let open = |key: &str| {
        EncryptedStore::new(
            key,
            backend.clone(),
            Arc::new(KeyHolder::new()),
            Arc::new(AlwaysGrant),
            config.storage.kdf,
        )
    };

    let devices = open(store_keys::DEVICES);
    devices.unlock(&credential).await?;
    let wallets = open(store_keys::WALLET);
    wallets.unlock(&credential).await?;
    Ok((DeviceRegistry::new(Arc::new(devices)), wallets))
}

/// Register a new local device and store its secret
async fn persist_local<F>(config: &Config, build: F) -> Result<()>
where
    F: FnOnce(u32, &str) -> Result<NewDevice>,
{
    let (registry, wallets) = open_stores(config).await?;
    let existing = registry.list().await?;
    let alias = device::default_alias(device::next_alias_index(&existing));
    let new = build(device::next_device_index(&existing), &alias)?;

    registry.add_local(&wallets, &new).await?;

    println!(
        "saved {} as \"{}\" (device {})",
        address_hex(&new.device.root_address),
        new.device.alias,
        new.device.index
    );
    Ok(())
}

async fn run_devices(config: &Config) -> Result<()> {
    let (registry, _) = open_stores(config).await?;
    for device in registry.list().await? {
        println!(
            "{:>3}  {}  {:<20}  {:?}",
            device.index,
            address_hex(&device.root_address),
            device.alias,
            device.device_type
        );
    }
    Ok(())
}

async fn run_sponsor(
    config: &Config,
    tx: PathBuf,
    origin: String,
    url: Option<String>,
) -> Result<()> {
    let mut body = read_body(&tx)?;
    body.set_delegated(true);
    let origin = wallet::parse_address(&origin)?;
    let url = url
        .or_else(|| config.delegate_url.clone())
        .ok_or_else(|| Error::Config("no sponsor URL configured".into()))?;

    let client = SponsorClient::new(config.http.sponsor_timeout())?;
    let signature = client
        .request_sponsorship(&url, &DelegationRequest::new(&origin, &body))
        .await?;
    println!("{}", hex::encode_prefixed(signature));
    Ok(())
}

async fn run_send(
    config: &Config,
    tx: PathBuf,
    delegate: Option<String>,
    gas_payer_env: Option<String>,
) -> Result<()> {
    let mut body = read_body(&tx)?;
    if body.chain_tag != config.network.chain_tag() {
        tracing::warn!(
            chain_tag = body.chain_tag,
            network = config.network.name(),
            "Chain tag does not match the configured network"
        );
    }

    let origin = LocalSigner::from_hex(secret_from_env(PRIVATE_KEY_ENV)?.expose_secret())?;
    let gas_payer = match gas_payer_env {
        Some(var) => Some(LocalSigner::from_hex(secret_from_env(&var)?.expose_secret())?),
        None => None,
    };

    let delegation = match (&delegate, &gas_payer) {
        (Some(url), _) => DelegationOption::Url(url),
        (None, Some(payer)) => DelegationOption::Account(payer),
        (None, None) => DelegationOption::None,
    };
    body.set_delegated(!matches!(delegation, DelegationOption::None));

    tracing::info!(origin = %origin.address_string(), "Sending transaction");
    let pipeline = TransactionPipeline::new(config)?;
    let id = pipeline.sign_and_send(body, &origin, delegation).await?;
    println!("{}", id);
    Ok(())
}
