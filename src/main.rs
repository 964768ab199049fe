//! Command-line entry point: configuration flags in, one spend run out.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use spv_spend::encoding::hash_from_display_hex;
use spv_spend::{Config, Confirmation, Network, SpendWorkflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NetworkArg {
    Mainnet,
    Testnet,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet => Network::Testnet,
        }
    }
}

/// Locate funds for a seed-derived key via a bloom-filtered peer session,
/// spend them to a target address, and report whether the peer echoed the
/// transaction back.
#[derive(Debug, Parser)]
#[command(name = "spv-spend", version)]
struct Cli {
    /// Peer hostname or address
    #[arg(long, default_value = "testnet.programmingbitcoin.com")]
    peer: String,

    /// Peer port (network default when omitted)
    #[arg(long)]
    port: Option<u16>,

    #[arg(long, value_enum, default_value = "testnet")]
    network: NetworkArg,

    /// Passphrase the wallet key is derived from
    #[arg(long, default_value = "banana_lick_gtkhhz@gmail.com")]
    seed: String,

    /// Address the spend pays to
    #[arg(long, default_value = "mv4rnyY3Su5gjcDNzbMLKBQkBicCtHUtFB")]
    target: String,

    /// Fee in satoshis
    #[arg(long, default_value_t = 696)]
    fee: u64,

    /// Last known block hash (display hex); header sync starts after it
    #[arg(
        long,
        default_value = "0000000000004ffbc4098514044473c1df118c2de621decb5f8d33262f483677"
    )]
    start_block: String,

    /// Bloom filter size in bytes
    #[arg(long, default_value_t = 30)]
    filter_size: u32,

    /// Hash functions per bloom filter element
    #[arg(long, default_value_t = 5)]
    filter_hashes: u32,

    /// Bloom filter tweak
    #[arg(long, default_value_t = 912)]
    filter_tweak: u32,

    /// Seconds to wait for any single peer response
    #[arg(long, default_value_t = 20)]
    response_timeout: u64,

    /// Seconds allowed for the whole filtered-block scan
    #[arg(long, default_value_t = 60)]
    scan_timeout: u64,

    /// Seconds between broadcasting and requesting the transaction back
    #[arg(long, default_value_t = 1)]
    broadcast_delay: u64,

    /// Emit the outcome as JSON instead of text
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let start_block = hash_from_display_hex(&self.start_block)
            .with_context(|| format!("invalid start block hash {}", self.start_block))?;
        Ok(Config {
            peer_host: self.peer,
            peer_port: self.port,
            network: self.network.into(),
            seed: self.seed,
            target_address: self.target,
            fee: self.fee,
            start_block,
            filter_size: self.filter_size,
            filter_hash_count: self.filter_hashes,
            filter_tweak: self.filter_tweak,
            response_timeout: Duration::from_secs(self.response_timeout),
            scan_timeout: Duration::from_secs(self.scan_timeout),
            broadcast_delay: Duration::from_secs(self.broadcast_delay),
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let config = cli.into_config()?;

    let mut workflow = SpendWorkflow::new(config).context("configuration rejected")?;
    let outcome = workflow.run().context("spend workflow failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("txid:     {}", outcome.txid);
        println!("raw tx:   {}", outcome.raw_tx);
        println!(
            "funding:  {}:{} ({} sat)",
            outcome.funding_txid, outcome.funding_vout, outcome.funding_amount
        );
        match outcome.confirmation {
            Confirmation::Confirmed => println!("status:   confirmed (peer echoed the tx)"),
            Confirmation::Unconfirmed => {
                println!("status:   unconfirmed (broadcast, but the peer did not echo it)")
            }
        }
    }
    Ok(())
}
