//! Command-line surface of `airgap-tx`

use airgap_tx::signer::ResponseFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Prepare, sign and broadcast Ethereum transactions across an air gap.
#[derive(Parser, Debug)]
#[command(name = "airgap-tx", version, propagate_version = true)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short = 'c', global = true, env = "AIRGAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an unsigned transaction from node state (online machine)
    Prepare(PrepareArgs),
    /// Sign an unsigned transaction file (offline machine)
    Sign(SignArgs),
    /// Broadcast a signed transaction file (online machine)
    Push(PushArgs),
}

#[derive(Parser, Debug)]
pub struct PrepareArgs {
    /// Amount to send in wei, or `max` for the whole balance minus fees
    pub amount: String,

    /// Sender address, or a derivation path such as 44'/60'/0'/0/0 to ask the device
    pub from: String,

    /// Recipient address; `create` (or empty) deploys the payload as a contract
    pub to: String,

    /// Read AMOUNT in ether instead of wei
    #[arg(long, short = 'e')]
    pub ether: bool,

    /// Nonce to use instead of the node's transaction count
    #[arg(long)]
    pub nonce: Option<u64>,

    /// Gas limit to use instead of the default or the node's estimate
    #[arg(long)]
    pub gas: Option<u64>,

    /// Gas price in wei to use instead of the node's price
    #[arg(long)]
    pub gas_price: Option<u128>,

    /// Hex payload sent with the transaction
    #[arg(long, short = 'd', default_value = "")]
    pub data: String,

    /// Node JSON-RPC endpoint
    #[arg(long, short = 'n', env = "AIRGAP_NODE")]
    pub node: Option<String>,

    /// Where to write the unsigned transaction
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyType {
    /// Encrypted keystore file unlocked with a passphrase
    Keystore,
    /// Hardware signing device
    Device,
}

#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Where the key lives
    #[arg(long, short = 'k', value_enum, default_value_t = KeyType::Keystore)]
    pub key_type: KeyType,

    /// Keystore file, or derivation path on the device
    pub key: String,

    /// Unsigned transaction file
    pub file: PathBuf,

    /// Send the device PIN before signing (read from AIRGAP_PIN or stdin)
    #[arg(long)]
    pub pin: bool,

    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Signed transaction file
    pub file: PathBuf,

    /// Node JSON-RPC endpoint
    #[arg(long, short = 'n', env = "AIRGAP_NODE")]
    pub node: Option<String>,

    /// Skip the interactive confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Device overrides shared by `prepare` and `sign`
#[derive(Parser, Debug)]
pub struct DeviceArgs {
    /// Device proxy address (host:port)
    #[arg(long = "device")]
    pub address: Option<String>,

    /// Signature layout returned by the device firmware
    #[arg(long, value_parser = parse_format)]
    pub format: Option<ResponseFormat>,

    /// Show the address on the device and wait for approval
    #[arg(long)]
    pub confirm_address: bool,
}

fn parse_format(input: &str) -> Result<ResponseFormat, String> {
    input.parse().map_err(|e| format!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_prepare() {
        let cli = Cli::parse_from([
            "airgap-tx",
            "prepare",
            "--ether",
            "--nonce",
            "3",
            "2.5",
            "0x00000000000000000000000000000000000000aa",
            "0x00000000000000000000000000000000000000bb",
        ]);
        match cli.command {
            Commands::Prepare(args) => {
                assert!(args.ether);
                assert_eq!(args.nonce, Some(3));
                assert_eq!(args.amount, "2.5");
                assert!(args.gas.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_sign_device() {
        let cli = Cli::parse_from([
            "airgap-tx",
            "sign",
            "--key-type",
            "device",
            "--format",
            "structured",
            "44'/60'/0'/0/0",
            "airgap.tx",
        ]);
        match cli.command {
            Commands::Sign(args) => {
                assert_eq!(args.key_type, KeyType::Device);
                assert_eq!(args.device.format, Some(ResponseFormat::Structured));
                assert_eq!(args.file, PathBuf::from("airgap.tx"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
