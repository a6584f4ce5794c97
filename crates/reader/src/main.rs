use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;

use fxvault_common::config::AppConfig;
use fxvault_common::context::{ProtocolConfig, ProtocolContext};
use fxvault_common::types::OrderDirection;
use fxvault_engine::fixed_point::parse_fixed;
use fxvault_engine::{
    BatchLayout, CollateralType, SelectionRequest, VaultEntity, compute_valuations,
    fetch_snapshots, select_redemption_candidates,
};
use fxvault_reader::multicall::MulticallExecutor;
use fxvault_reader::subgraph::{IndexedVaultSource, SubgraphClient};

const USAGE: &str = "usage:
  fxvault-scan vaults <account>
  fxvault-scan redeem <fxToken> <amount> <asc|desc> [--strict]";

enum Command {
    Vaults {
        account: Address,
    },
    Redeem {
        fx_token: String,
        amount: String,
        direction: OrderDirection,
        strict: bool,
    },
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    match args {
        [cmd, account] if cmd == "vaults" => Ok(Command::Vaults {
            account: account
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid account address: {account}"))?,
        }),
        [cmd, fx_token, amount, direction, rest @ ..] if cmd == "redeem" => {
            let strict = match rest {
                [] => false,
                [flag] if flag == "--strict" => true,
                _ => anyhow::bail!("{USAGE}"),
            };
            Ok(Command::Redeem {
                fx_token: fx_token.clone(),
                amount: amount.clone(),
                direction: direction.parse().map_err(anyhow::Error::msg)?,
                strict,
            })
        }
        _ => anyhow::bail!("{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fxvault_reader=info,fxvault_engine=debug".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    let config = AppConfig::from_env()?;

    tokio::select! {
        result = run(command, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, aborting scan");
            Ok(())
        }
    }
}

async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let subgraph = SubgraphClient::new(
        config.subgraph_url.clone(),
        Duration::from_secs(config.http_timeout_secs),
    )?;
    let table = subgraph.fetch_token_table().await?;
    let context = ProtocolContext::new(
        ProtocolConfig::arbitrum().with_multicall(config.multicall_address),
    )?
    .with_collateral_tokens(table.collateral_tokens.clone())?;

    tracing::info!(
        network = %context.network(),
        chain_id = context.network().chain_id(),
        collateral_tokens = context.collateral_tokens().len(),
        "Protocol context loaded"
    );

    match command {
        Command::Vaults { account } => {
            let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
            let executor = MulticallExecutor::new(provider, context.clone());

            let entities: Vec<VaultEntity> = context
                .fx_tokens()
                .iter()
                .map(|fx| VaultEntity::new(account, fx.clone()))
                .collect();
            let layout = BatchLayout::full(
                context
                    .collateral_tokens()
                    .iter()
                    .map(|c| CollateralType::new(c.symbol.clone(), c.address))
                    .collect(),
            )?;

            let snapshots = fetch_snapshots(
                &executor,
                &entities,
                &layout,
                &table.collateral_rates_by_symbol(),
            )
            .await?;
            let valuations = compute_valuations(&snapshots)?;
            tracing::info!(%account, vaults = valuations.len(), "Vaults valued");
            println!("{}", serde_json::to_string_pretty(&valuations)?);
        }
        Command::Redeem {
            fx_token,
            amount,
            direction,
            strict,
        } => {
            let requested = parse_fixed(&amount)?;
            let mut request = SelectionRequest::new(fx_token, requested, direction)
                .with_max_search_count(config.redemption_max_search_count);
            if strict {
                request = request.require_full_coverage();
            }

            let source = IndexedVaultSource::new(subgraph, context, table);
            let batch = select_redemption_candidates(&source, &request).await?;
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
    }
    Ok(())
}
