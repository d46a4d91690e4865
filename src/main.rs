//! airgap-tx - move an Ethereum transaction across an air gap
//!
//! `prepare` runs on a networked machine and writes an unsigned transaction
//! file, `sign` runs on the offline machine holding the key, and `push`
//! broadcasts the signed file from a networked machine again.

use airgap_tx::chain::EthersNodeClient;
use airgap_tx::config::Settings;
use airgap_tx::error::AirgapError;
use airgap_tx::signer::{
    DerivationPath, HardwareDevice, KeySource, PassphraseKeystore, TcpTransport,
};
use airgap_tx::tx::{file, AmountSpec, GasPolicy};
use airgap_tx::workflow::{self, PrepareRequest, SenderSource, Summary};

use anyhow::{Context, Result};
use clap::Parser;
use ethers::types::{Address, U256};
use std::io::{self, BufRead, Write};
use tracing::{debug, info};
use zeroize::Zeroizing;

mod cli;

use cli::{Cli, Commands, DeviceArgs, KeyType, PrepareArgs, PushArgs, SignArgs};

const PASSPHRASE_ENV: &str = "AIRGAP_PASSPHRASE";
const PIN_ENV: &str = "AIRGAP_PIN";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<AirgapError>()
            .map(AirgapError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "debug" } else { "info,airgap_tx=debug" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(verbose))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    debug!("airgap-tx v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Commands::Prepare(args) => run_prepare(args, settings).await,
        Commands::Sign(args) => run_sign(args, settings).await,
        Commands::Push(args) => run_push(args, settings).await,
    }
}

async fn run_prepare(args: PrepareArgs, mut settings: Settings) -> Result<()> {
    apply_device_args(&mut settings, &args.device);

    let amount = AmountSpec::parse(&args.amount, args.ether)?;
    let recipient = workflow::parse_recipient(&args.to)?;
    let payload = workflow::parse_payload(&args.data)?;
    let endpoint = args.node.unwrap_or_else(|| settings.node.endpoint.clone());
    let output = args.output.unwrap_or_else(|| settings.output.unsigned_path.clone());

    let sender = match SenderSource::parse(&args.from)? {
        SenderSource::Address(address) => address,
        SenderSource::DevicePath(path) => {
            let device = connect_device(&settings, path).await?;
            device.get_address().await?
        }
    };

    let node = EthersNodeClient::new(&endpoint)?;
    info!("Preparing transaction via {}", node.endpoint());

    let request = PrepareRequest {
        amount,
        sender,
        recipient,
        nonce: args.nonce,
        gas_limit: args.gas,
        gas_price: args.gas_price.map(U256::from),
        payload,
    };
    let policy = GasPolicy::new(settings.node.max_gas_price_gwei);
    let unsigned = workflow::prepare(&request, &policy, &node).await?;

    println!("{}", Summary::new(unsigned.record()).with_sender(sender));
    file::write_unsigned(&output, &unsigned)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("{}", file::to_hex(&unsigned.encoding()));
    println!("Unsigned transaction written to {}", output.display());
    Ok(())
}

async fn run_sign(args: SignArgs, mut settings: Settings) -> Result<()> {
    apply_device_args(&mut settings, &args.device);

    let unsigned = file::read_unsigned(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    println!("{}", Summary::new(unsigned.record()));

    let backend = match args.key_type {
        KeyType::Keystore => {
            let passphrase = read_secret("Keystore passphrase: ", PASSPHRASE_ENV)?;
            KeySource::Keystore(PassphraseKeystore::new(&args.key, passphrase))
        }
        KeyType::Device => {
            let path: DerivationPath = args.key.parse()?;
            let mut device = connect_device(&settings, path).await?;
            if args.pin {
                device = device.with_pin(read_secret("Device PIN: ", PIN_ENV)?);
            }
            KeySource::Device(device)
        }
    };

    let (signed, signer) = workflow::sign(&unsigned, &backend).await?;
    drop(backend);

    let path = file::write_signed(&args.file, &signed)
        .with_context(|| format!("writing signed copy of {}", args.file.display()))?;

    println!("{}", file::to_hex(&signed.encoding()));
    println!("Signed transaction written to {}", path.display());
    println!("Signed by {}", checksum(signer));
    Ok(())
}

async fn run_push(args: PushArgs, settings: Settings) -> Result<()> {
    let signed = file::read_signed(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let sender = signed.sender()?;
    println!("{}", Summary::new(signed.record()).with_sender(sender));

    if !args.yes && !confirm("Broadcast this transaction? [y/N] ")? {
        println!("Aborted, nothing was sent");
        return Ok(());
    }

    let endpoint = args.node.unwrap_or(settings.node.endpoint);
    let node = EthersNodeClient::new(&endpoint)?;
    let broadcast = workflow::push(signed, &node).await?;

    println!("Transaction id: {:?}", broadcast.tx_id());
    Ok(())
}

fn apply_device_args(settings: &mut Settings, args: &DeviceArgs) {
    if let Some(address) = &args.address {
        settings.device.address = address.clone();
    }
    if let Some(format) = args.format {
        settings.device.response_format = format;
    }
    if args.confirm_address {
        settings.device.confirm_address = true;
    }
}

async fn connect_device(settings: &Settings, path: DerivationPath) -> Result<HardwareDevice> {
    let options = settings.device.options();
    let transport = TcpTransport::connect(&settings.device.address, options.command_timeout)
        .await
        .map_err(AirgapError::from)?;

    Ok(HardwareDevice::new(
        Box::new(transport),
        path,
        settings.device.response_format,
        options,
    ))
}

/// Secret from `env_var`, or a line typed on stdin
fn read_secret(prompt: &str, env_var: &str) -> Result<Zeroizing<String>> {
    if let Ok(value) = std::env::var(env_var) {
        debug!("Using secret from {}", env_var);
        return Ok(Zeroizing::new(value));
    }

    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;

    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(AirgapError::Validation("empty secret".to_string()).into());
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn checksum(address: Address) -> String {
    ethers::utils::to_checksum(&address, None)
}
