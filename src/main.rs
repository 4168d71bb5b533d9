//! USDCx Vault Tracker
//!
//! Tracks bridge and vault transactions submitted from a wallet and polls
//! Etherscan / Hiro until each one settles.
//!
//! # Commands
//!
//! - `watch` - run the reconciler until Ctrl+C / SIGTERM
//! - `track` - start tracking a submitted transaction
//! - `list` / `dismiss` - inspect and clear tracked transactions
//! - `encode-recipient` - Stacks address to the 32-byte xReserve recipient
//! - `connect-eth` - remember or forget the Ethereum account
//! - `balances` / `quote` - balance snapshot and amount previews

use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use tracing::info;

use vault_tracker::address_codec::{
    bytes32_to_hex, eth_address_to_bytes, stacks_address_to_bytes32, ChecksumPolicy, DecodeMode,
};
use vault_tracker::amount::{
    estimate_bridge_fee, format_usdc, max_fee_with_buffer, min_shares_for_deposit, parse_usdc,
    plan_withdrawal,
};
use vault_tracker::chains::{EthereumClient, StacksClient};
use vault_tracker::explorer::{http_client, EtherscanSource, HiroSource};
use vault_tracker::notify::LogNotifier;
use vault_tracker::reconciler::{Reconciler, ReconcilerSettings};
use vault_tracker::refresh::DashboardRefresher;
use vault_tracker::session::SessionStore;
use vault_tracker::store::{JsonFileStore, KeyValueStore};
use vault_tracker::types::{ConnectedAccounts, NewPendingTransaction, OriginChain, TxKind};
use vault_tracker::Config;

#[derive(Parser)]
#[command(name = "usdcx-tracker")]
#[command(about = "Track USDC → USDCx bridge and vault transactions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll pending transactions until shutdown
    Watch {
        /// Ethereum account to refresh on completion (defaults to the remembered one)
        #[arg(long)]
        eth_account: Option<String>,
        /// Stacks account to refresh on completion (defaults to STACKS_ADDRESS)
        #[arg(long)]
        stacks_account: Option<String>,
    },
    /// Start tracking a submitted transaction
    Track {
        /// Origin chain: eth or stacks
        #[arg(long)]
        chain: OriginChain,
        /// bridge, bridge-back, deposit or withdraw
        #[arg(long, default_value = "bridge")]
        kind: TxKind,
        /// Transaction hash on the origin chain
        #[arg(long)]
        tx: String,
        /// Decimal amount, e.g. 12.5
        #[arg(long)]
        amount: String,
    },
    /// List tracked transactions
    List,
    /// Dismiss a completed or failed transaction
    Dismiss { id: String },
    /// Encode a Stacks address as a bridge recipient (or an Ethereum address as 20 bytes)
    EncodeRecipient {
        address: String,
        /// Skip characters outside the c32 alphabet
        #[arg(long)]
        lenient: bool,
        /// Do not verify the address checksum
        #[arg(long)]
        unchecked: bool,
    },
    /// Remember, show or forget the connected Ethereum account
    ConnectEth {
        account: Option<String>,
        #[arg(long, conflicts_with = "account")]
        disconnect: bool,
    },
    /// Show balances for the given accounts
    Balances {
        #[arg(long)]
        eth_account: Option<String>,
        #[arg(long)]
        stacks_account: Option<String>,
    },
    /// Preview bridge fees, deposit shares and withdrawal minimums
    Quote {
        amount: String,
        /// Vault USDCx balance backing the position, base units
        #[arg(long, default_value_t = 0)]
        vault_balance: u128,
        /// Vault shares held, base units
        #[arg(long, default_value_t = 0)]
        vault_shares: u128,
    },
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::load()?;
    info!(
        network = %config.network,
        store = %config.store_path.display(),
        "Configuration loaded"
    );

    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&config.store_path));

    match cli.command {
        Command::Watch {
            eth_account,
            stacks_account,
        } => watch(&config, store, eth_account, stacks_account).await,
        Command::Track {
            chain,
            kind,
            tx,
            amount,
        } => {
            let amount = format_usdc(parse_usdc(&amount)?);
            let new = match chain {
                OriginChain::Ethereum if kind == TxKind::Bridge => {
                    NewPendingTransaction::bridge(tx, amount)
                }
                OriginChain::Ethereum => {
                    return Err(eyre!("Only bridge transactions originate on Ethereum"))
                }
                OriginChain::Stacks if kind == TxKind::Bridge => {
                    return Err(eyre!("Bridge transactions originate on Ethereum"))
                }
                OriginChain::Stacks => NewPendingTransaction::stacks(kind, tx, amount),
            };

            let mut reconciler = build_reconciler(&config, store)?;
            let now = Utc::now();
            reconciler.load(now)?;
            let id = reconciler.track(new, now)?;
            println!("{}", id);
            Ok(())
        }
        Command::List => {
            let mut reconciler = build_reconciler(&config, store)?;
            let now = Utc::now();
            reconciler.load(now)?;
            if reconciler.records().is_empty() {
                println!("No tracked transactions");
            }
            for tx in reconciler.records() {
                println!(
                    "{} (started {}, {} min ago)",
                    tx,
                    tx.started_at().format("%Y-%m-%d %H:%M:%S UTC"),
                    tx.minutes_ago(now)
                );
                println!("    {}", tx.explorer_url(config.network));
            }
            Ok(())
        }
        Command::Dismiss { id } => {
            let mut reconciler = build_reconciler(&config, store)?;
            reconciler.load(Utc::now())?;
            reconciler.dismiss(&id)?;
            println!("Dismissed {}", id);
            Ok(())
        }
        Command::EncodeRecipient {
            address,
            lenient,
            unchecked,
        } => {
            if address.starts_with("0x") || address.starts_with("0X") {
                let bytes = eth_address_to_bytes(&address)?;
                println!("0x{}", hex::encode(bytes));
                return Ok(());
            }
            let mode = if lenient {
                DecodeMode::Lenient
            } else {
                DecodeMode::Strict
            };
            let checksum = if unchecked {
                ChecksumPolicy::Unchecked
            } else {
                ChecksumPolicy::Verified
            };
            let bytes = stacks_address_to_bytes32(&address, mode, checksum)?;
            println!("{}", bytes32_to_hex(&bytes));
            Ok(())
        }
        Command::ConnectEth {
            account,
            disconnect,
        } => {
            let session = SessionStore::new(store);
            if disconnect {
                session.forget()?;
                println!("Disconnected");
            } else if let Some(account) = account {
                eth_address_to_bytes(&account)?;
                if let Some(active) = session.connect(&[account])? {
                    println!("Connected {}", active);
                }
            } else {
                match session.last_account()? {
                    Some(account) => println!("{}", account),
                    None => println!("No remembered account"),
                }
            }
            Ok(())
        }
        Command::Balances {
            eth_account,
            stacks_account,
        } => {
            let session = SessionStore::new(store);
            let accounts = ConnectedAccounts {
                ethereum: session.connect(eth_account.as_slice())?,
                stacks: stacks_account.or_else(|| config.stacks_address.clone()),
            };
            if accounts.is_empty() {
                return Err(eyre!("No accounts given or remembered"));
            }
            let snapshot = build_refresher(&config)?.fetch(&accounts).await;
            println!("{}", snapshot.summary());
            for tx in &snapshot.vault_history {
                println!("    {:?} {:?} {}", tx.kind, tx.status, tx.tx_id);
            }
            Ok(())
        }
        Command::Quote {
            amount,
            vault_balance,
            vault_shares,
        } => {
            let amount = parse_usdc(&amount)?;
            let fee = estimate_bridge_fee(amount);
            println!("Bridge fee estimate: {} USDC", format_usdc(fee));
            println!(
                "Bridge max fee:      {} USDC",
                format_usdc(max_fee_with_buffer(fee)?)
            );
            println!(
                "Deposit min shares:  {}",
                format_usdc(min_shares_for_deposit(amount)?)
            );
            let plan = plan_withdrawal(amount, vault_balance, vault_shares)?;
            println!(
                "Withdraw shares:     {} (min {} USDCx)",
                format_usdc(plan.shares),
                format_usdc(plan.min_amount)
            );
            Ok(())
        }
    }
}

async fn watch(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    eth_account: Option<String>,
    stacks_account: Option<String>,
) -> Result<()> {
    let session = SessionStore::new(store.clone());
    let accounts = ConnectedAccounts {
        ethereum: session.connect(eth_account.as_slice())?,
        stacks: stacks_account.or_else(|| config.stacks_address.clone()),
    };

    let mut reconciler = build_reconciler(config, store)?;
    reconciler.set_accounts(accounts);
    reconciler.load(Utc::now())?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    reconciler.run(shutdown_rx).await?;

    info!("Tracker stopped");
    Ok(())
}

fn build_refresher(config: &Config) -> Result<DashboardRefresher> {
    let http = http_client(config.http_timeout()).wrap_err("Failed to build HTTP client")?;
    Ok(DashboardRefresher::new(
        EthereumClient::new(&config.eth_rpc_url, &config.contracts),
        StacksClient::new(http, &config.hiro_api_url, &config.contracts),
    ))
}

fn build_reconciler(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Reconciler> {
    let http = http_client(config.http_timeout()).wrap_err("Failed to build HTTP client")?;

    let ethereum = EtherscanSource::new(
        http.clone(),
        &config.etherscan_api_url,
        config.etherscan_api_key.clone(),
    );
    let stacks = HiroSource::new(http, &config.hiro_api_url);

    Ok(Reconciler::new(
        store,
        Arc::new(ethereum),
        Arc::new(stacks),
        Arc::new(LogNotifier),
        Arc::new(build_refresher(config)?),
        ReconcilerSettings::from(config),
    ))
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,usdcx_tracker=debug,vault_tracker=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
