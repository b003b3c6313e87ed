use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use alloy_signer_local::PrivateKeySigner;
use chainlane_client::{
    ClientConfig, EventConfig, FeeConfig, InteractionClient, ReadConfig, SignerRegistry,
    SubmitConfig, WatchConfig,
};
use chainlane_node::{AlloyNodeClient, NodeClient};
use chainlane_primitives::{
    contracts::IERC20, parse_address, BlockTag, CallDescriptor, ChainLog, EventDelta, EventFilter,
};
use clap::Parser;
use eyre::eyre::{eyre, WrapErr};
use futures::StreamExt;
use serde::Serialize;
use tracing::info;

#[derive(Clone, Parser)]
#[command(name = "chainlane", version, about = "Read, write and follow ERC-20 contracts")]
pub struct Opt {
    /// JSON-RPC endpoint of the node.
    #[clap(long, env = "RPC_URL", default_value = "http://localhost:8545", global = true)]
    pub rpc_url: String,

    /// Deadline for each read, estimate and submission.
    #[clap(long, default_value_t = 10_000, global = true)]
    pub timeout_ms: u64,

    /// Confirmations an operation must exceed to be final.
    #[clap(long, default_value_t = 12, global = true)]
    pub finality_depth: u64,

    /// Gas safety margin in basis points, 1000 to 2500.
    #[clap(long, default_value_t = 2_000, global = true)]
    pub gas_margin_bps: u32,

    /// Hex private key used to sign writes.
    #[clap(long, env = "PRIVATE_KEY", hide_env_values = true, global = true)]
    pub private_key: Option<PrivateKeySigner>,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, Clone, Parser)]
pub enum Cmd {
    /// Token balance of a holder.
    Read(ReadArgs),
    /// Fee quote for a token transfer.
    Estimate(TransferArgs),
    /// Send a token transfer and follow it to finality.
    Send(TransferArgs),
    /// Historical Transfer events.
    Logs(LogsArgs),
    /// Live Transfer events, including reorg retractions.
    Follow(FollowArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct ReadArgs {
    #[clap(long, value_parser = parse_address)]
    pub token: Address,

    #[clap(long, value_parser = parse_address)]
    pub holder: Address,

    /// Block height. Defaults to the latest block.
    #[clap(long)]
    pub block: Option<u64>,
}

#[derive(Debug, Clone, Parser)]
pub struct TransferArgs {
    #[clap(long, value_parser = parse_address)]
    pub token: Address,

    #[clap(long, value_parser = parse_address)]
    pub to: Address,

    /// Amount in the token's smallest unit.
    #[clap(long)]
    pub amount: U256,

    /// Sender for `estimate` when no private key is given.
    #[clap(long, value_parser = parse_address)]
    pub from: Option<Address>,
}

#[derive(Debug, Clone, Parser)]
pub struct LogsArgs {
    #[clap(long, value_parser = parse_address)]
    pub token: Address,

    #[clap(long, default_value_t = 0)]
    pub from_block: u64,

    /// Defaults to the latest block.
    #[clap(long)]
    pub to_block: Option<u64>,

    /// Only transfers to this recipient.
    #[clap(long, value_parser = parse_address)]
    pub to: Option<Address>,
}

#[derive(Debug, Clone, Parser)]
pub struct FollowArgs {
    #[clap(long, value_parser = parse_address)]
    pub token: Address,

    /// Only transfers to this recipient.
    #[clap(long, value_parser = parse_address)]
    pub to: Option<Address>,
}

/// A decoded Transfer event as printed by `logs` and `follow`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TransferRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: alloy_primitives::B256,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl TransferRecord {
    pub fn from_log(log: &ChainLog) -> eyre::Result<Self> {
        let event = log
            .decode::<IERC20::Transfer>()
            .wrap_err("log is not an ERC-20 Transfer")?;
        Ok(Self {
            kind: None,
            block_number: log.block_number,
            log_index: log.log_index,
            tx_hash: log.tx_hash,
            from: event.from,
            to: event.to,
            value: event.value,
        })
    }

    pub fn from_delta(delta: &EventDelta) -> eyre::Result<Self> {
        let mut record = Self::from_log(delta.log())?;
        record.kind = Some(if delta.is_removed() { "removed" } else { "added" });
        Ok(record)
    }
}

pub fn transfer_filter(token: Address, to: Option<Address>) -> EventFilter {
    let filter = EventFilter::for_event::<IERC20::Transfer>(token);
    match to {
        Some(to) => filter.with_topic2(to.into_word()),
        None => filter,
    }
}

fn print_json(value: &impl Serialize) -> eyre::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

impl Opt {
    fn config(&self) -> eyre::Result<ClientConfig> {
        let timeout = Duration::from_millis(self.timeout_ms);
        Ok(ClientConfig::builder()
            .read(ReadConfig::builder().timeout(timeout).build())
            .fees(
                FeeConfig::builder()
                    .margin_bps(self.gas_margin_bps)
                    .timeout(timeout)
                    .build()?,
            )
            .submit(SubmitConfig::builder().timeout(timeout).build())
            .watch(WatchConfig::builder().finality_depth(self.finality_depth).build())
            .events(EventConfig::default())
            .build())
    }

    fn client(&self) -> eyre::Result<InteractionClient<AlloyNodeClient>> {
        let node = AlloyNodeClient::http(&self.rpc_url)?;
        let mut signers = SignerRegistry::new();
        if let Some(signer) = &self.private_key {
            signers.register(signer.clone());
        }
        Ok(InteractionClient::new(Arc::new(node), signers, self.config()?))
    }

    fn sender(&self, explicit: Option<Address>) -> eyre::Result<Address> {
        self.private_key
            .as_ref()
            .map(|signer| signer.address())
            .or(explicit)
            .ok_or_else(|| eyre!("a sender is required: pass --private-key (PRIVATE_KEY) or --from"))
    }

    pub async fn run(self) -> eyre::Result<()> {
        let client = self.client()?;
        match &self.cmd {
            Cmd::Read(args) => {
                let block = args.block.map_or(BlockTag::Latest, BlockTag::Number);
                let balance = client
                    .read_typed(
                        args.token,
                        &IERC20::balanceOfCall {
                            account: args.holder,
                        },
                        block,
                    )
                    .await?;
                print_json(&serde_json::json!({
                    "token": args.token,
                    "holder": args.holder,
                    "block": block,
                    "balance": balance,
                }))
            }
            Cmd::Estimate(args) => {
                let from = self.sender(args.from)?;
                let call = transfer_call(args);
                let quote = client.estimate(&call, from).await?;
                print_json(&serde_json::json!({
                    "from": from,
                    "gas_limit": quote.gas_limit(),
                    "raw_gas_estimate": quote.raw_gas_estimate(),
                    "base_fee": quote.base_fee().to_string(),
                    "max_priority_fee": quote.max_priority_fee().to_string(),
                    "max_fee": quote.max_fee().to_string(),
                    "block_number": quote.block_number(),
                }))
            }
            Cmd::Send(args) => {
                if self.private_key.is_none() {
                    eyre::eyre::bail!("send needs a signing key: pass --private-key or set PRIVATE_KEY");
                }
                let from = self.sender(None)?;
                let op = client.send(&transfer_call(args), from).await?;
                info!(target: "chainlane::cli", tx_hash = ?op.tx_hash, nonce = op.nonce, "submitted");

                let tracker = client.watch(op);
                let mut updates = tracker.subscribe();
                let progress = tokio::spawn(async move {
                    while updates.changed().await.is_ok() {
                        let status = updates.borrow_and_update().clone();
                        info!(target: "chainlane::cli", %status, "status");
                    }
                });
                let status = tracker.wait().await;
                progress.abort();

                print_json(&serde_json::json!({
                    "tx_hash": tracker.tx_hash(),
                    "nonce": tracker.operation().nonce,
                    "status": status?,
                }))
            }
            Cmd::Logs(args) => {
                let to_block = match args.to_block {
                    Some(block) => block,
                    None => client.node().block_number().await?,
                };
                let mut logs = std::pin::pin!(client.fetch_historical(
                    transfer_filter(args.token, args.to),
                    args.from_block,
                    to_block,
                ));
                while let Some(log) = logs.next().await {
                    print_json(&TransferRecord::from_log(&log?)?)?;
                }
                Ok(())
            }
            Cmd::Follow(args) => {
                let (handle, mut deltas) = client
                    .subscribe_stream(transfer_filter(args.token, args.to))
                    .await?;
                info!(target: "chainlane::cli", token = %args.token, "following transfers");
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            handle.cancel();
                            return Ok(());
                        }
                        delta = deltas.next() => match delta {
                            Some(delta) => print_json(&TransferRecord::from_delta(&delta?)?)?,
                            None => return Ok(handle.closed().await?),
                        },
                    }
                }
            }
        }
    }
}

fn transfer_call(args: &TransferArgs) -> CallDescriptor {
    CallDescriptor::from_call(
        args.token,
        &IERC20::transferCall {
            to: args.to,
            amount: args.amount,
        },
    )
}
