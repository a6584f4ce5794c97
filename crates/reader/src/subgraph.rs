//! Protocol subgraph reader.
//!
//! Reads the token tables and indexed vault records over GraphQL and turns
//! them into the same [`VaultSnapshot`] shape the multicall path produces.
//! Valuations are always recomputed locally from those snapshots.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use fxvault_common::context::ProtocolContext;
use fxvault_common::error::{DomainError, ProtocolError, ValidationError, VaultError};
use fxvault_common::types::{
    CollateralHolding, CollateralToken, OrderDirection, VaultSnapshot, VaultValuation,
};
use fxvault_engine::valuation::{compute_valuation, weighted_liquidation_fee};
use fxvault_engine::{CandidateQuery, CandidateSource, CollateralRates};

const TOKENS_QUERY: &str = r#"
query Tokens {
  fxTokens {
    id
    symbol
    rate
  }
  collateralTokens {
    id
    symbol
    rate
    liquidationFee
  }
}
"#;

const ACCOUNT_VAULTS_QUERY: &str = r#"
query AccountVaults($account: String!) {
  vaults(where: { account: $account }) {
    account
    debt
    fxToken
    collateralTokens {
      address
      amount
    }
    collateralAsEther
    minimumRatio
  }
}
"#;

const REDEEMABLE_VAULTS_QUERY: &str = r#"
query RedeemableVaults(
  $fxToken: String!
  $first: Int!
  $orderBy: Vault_orderBy!
  $orderDirection: OrderDirection!
) {
  vaults(
    first: $first
    where: { fxToken: $fxToken, isRedeemable: true }
    orderBy: $orderBy
    orderDirection: $orderDirection
  ) {
    account
    debt
    fxToken
    collateralTokens {
      address
      amount
    }
    collateralAsEther
    minimumRatio
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedFxToken {
    pub id: String,
    pub symbol: String,
    pub rate: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedCollateralToken {
    pub id: String,
    pub symbol: String,
    pub rate: String,
    pub liquidation_fee: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedCollateralAmount {
    pub address: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedVault {
    pub account: String,
    pub debt: String,
    pub fx_token: String,
    pub collateral_tokens: Vec<IndexedCollateralAmount>,
    pub collateral_as_ether: String,
    pub minimum_ratio: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokensData {
    fx_tokens: Vec<IndexedFxToken>,
    collateral_tokens: Vec<IndexedCollateralToken>,
}

#[derive(Debug, Deserialize)]
struct VaultsData {
    vaults: Vec<IndexedVault>,
}

/// Token metadata and rates at the time of one read.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    /// fxToken address → value in ether.
    pub fx_rates: HashMap<Address, U256>,
    pub collateral_tokens: Vec<CollateralToken>,
    /// Collateral address → value in ether.
    pub collateral_rates: HashMap<Address, U256>,
}

impl TokenTable {
    /// Collateral rates keyed by symbol, as the batch decoder expects.
    pub fn collateral_rates_by_symbol(&self) -> CollateralRates {
        self.collateral_tokens
            .iter()
            .filter_map(|t| {
                self.collateral_rates
                    .get(&t.address)
                    .map(|rate| (t.symbol.clone(), *rate))
            })
            .collect()
    }

    fn liquidation_fees_by_symbol(&self) -> HashMap<String, U256> {
        self.collateral_tokens
            .iter()
            .map(|t| (t.symbol.clone(), t.liquidation_fee))
            .collect()
    }
}

/// Raw GraphQL client for the protocol subgraph.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    http: reqwest::Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ProtocolError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProtocolError::Indexer(e.to_string()))?;

        let body: GraphResponse<T> = response
            .json()
            .await
            .map_err(|e| ProtocolError::Decode(format!("invalid subgraph response: {e}")))?;

        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(ProtocolError::Indexer(messages.join("; ")));
        }
        body.data
            .ok_or_else(|| ProtocolError::Indexer("subgraph response has no data".to_string()))
    }

    /// Read the fxToken and collateral token tables with their current rates.
    pub async fn fetch_token_table(&self) -> Result<TokenTable, VaultError> {
        let data: TokensData = self.query(TOKENS_QUERY, json!({})).await?;
        let table = parse_token_table(data)?;
        tracing::debug!(
            fx_tokens = table.fx_rates.len(),
            collateral_tokens = table.collateral_tokens.len(),
            "Loaded token table from subgraph"
        );
        Ok(table)
    }

    pub async fn fetch_account_vaults(
        &self,
        account: Address,
    ) -> Result<Vec<IndexedVault>, VaultError> {
        let data: VaultsData = self
            .query(
                ACCOUNT_VAULTS_QUERY,
                json!({ "account": format!("{account:#x}") }),
            )
            .await?;
        Ok(data.vaults)
    }

    pub async fn fetch_redeemable_vaults(
        &self,
        fx_token: Address,
        query: &CandidateQuery,
    ) -> Result<Vec<IndexedVault>, VaultError> {
        let data: VaultsData = self
            .query(
                REDEEMABLE_VAULTS_QUERY,
                json!({
                    "fxToken": format!("{fx_token:#x}"),
                    "first": query.max_results,
                    "orderBy": query.order_by,
                    "orderDirection": query.order_direction,
                }),
            )
            .await?;
        Ok(data.vaults)
    }
}

/// Snapshot and candidate source backed by the subgraph.
///
/// Rates are fixed when the source is built; build a new one for a fresh
/// price snapshot.
pub struct IndexedVaultSource {
    client: SubgraphClient,
    context: Arc<ProtocolContext>,
    table: TokenTable,
}

impl IndexedVaultSource {
    pub fn new(client: SubgraphClient, context: Arc<ProtocolContext>, table: TokenTable) -> Self {
        Self {
            client,
            context,
            table,
        }
    }

    /// All of an account's vaults, one snapshot per fxToken.
    pub async fn account_snapshots(
        &self,
        account: Address,
    ) -> Result<Vec<VaultSnapshot>, VaultError> {
        self.client
            .fetch_account_vaults(account)
            .await?
            .iter()
            .map(|vault| vault.to_snapshot(&self.context, &self.table))
            .collect()
    }
}

impl CandidateSource for IndexedVaultSource {
    async fn redeemable_vaults(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<VaultValuation>, VaultError> {
        let fx_token = self
            .context
            .fx_token_by_symbol(&query.fx_token)
            .ok_or_else(|| DomainError::UnknownFxToken(query.fx_token.clone()))?;

        let indexed = self
            .client
            .fetch_redeemable_vaults(fx_token.address, query)
            .await?;
        let mut valuations = indexed
            .iter()
            .map(|vault| compute_valuation(&vault.to_snapshot(&self.context, &self.table)?))
            .collect::<Result<Vec<_>, _>>()?;

        // Membership comes from the indexer; order follows the local values.
        rank_by_redeemable(&mut valuations, query.order_direction);
        Ok(valuations)
    }
}

/// Stable sort by `redeemable_tokens` in `direction`.
fn rank_by_redeemable(valuations: &mut [VaultValuation], direction: OrderDirection) {
    valuations.sort_by(|a, b| match direction {
        OrderDirection::Ascending => a.redeemable_tokens.cmp(&b.redeemable_tokens),
        OrderDirection::Descending => b.redeemable_tokens.cmp(&a.redeemable_tokens),
    });
}

impl IndexedVault {
    /// Convert an indexed record into a snapshot priced by `table`.
    pub fn to_snapshot(
        &self,
        context: &ProtocolContext,
        table: &TokenTable,
    ) -> Result<VaultSnapshot, VaultError> {
        let account = parse_address(&self.account, &self.account)?;
        let fx_address = parse_address(&self.account, &self.fx_token)?;
        let fx_token = context
            .fx_token_by_address(fx_address)
            .ok_or_else(|| DomainError::UnknownFxToken(self.fx_token.clone()))?;
        let token_price = table.fx_rates.get(&fx_address).copied().ok_or_else(|| {
            ValidationError::snapshot(&self.account, format!("no rate for {}", fx_token.symbol))
        })?;

        let mut collateral_holdings = Vec::new();
        for entry in &self.collateral_tokens {
            let amount = parse_amount(&self.account, "collateral amount", &entry.amount)?;
            if amount.is_zero() {
                continue;
            }
            let address = parse_address(&self.account, &entry.address)?;
            let collateral = context
                .collateral_by_address(address)
                .ok_or(DomainError::UnknownCollateral(address))?;
            let rate = table.collateral_rates.get(&address).copied().ok_or_else(|| {
                ValidationError::snapshot(
                    &self.account,
                    format!("no rate for {}", collateral.symbol),
                )
            })?;
            collateral_holdings.push(CollateralHolding {
                token_symbol: collateral.symbol.clone(),
                amount,
                rate,
            });
        }

        let liquidation_fee =
            weighted_liquidation_fee(&collateral_holdings, &table.liquidation_fees_by_symbol())?;

        Ok(VaultSnapshot {
            account,
            fx_token_symbol: fx_token.symbol.clone(),
            debt: parse_amount(&self.account, "debt", &self.debt)?,
            total_collateral_as_ether: Some(parse_amount(
                &self.account,
                "collateralAsEther",
                &self.collateral_as_ether,
            )?),
            minimum_ratio: parse_amount(&self.account, "minimumRatio", &self.minimum_ratio)?,
            liquidation_fee,
            token_price,
            collateral_holdings,
        })
    }
}

fn parse_token_table(data: TokensData) -> Result<TokenTable, ValidationError> {
    let mut table = TokenTable::default();

    for token in data.fx_tokens {
        let address = parse_address(&token.symbol, &token.id)?;
        let rate = parse_amount(&token.symbol, "rate", &token.rate)?;
        table.fx_rates.insert(address, rate);
    }

    for token in data.collateral_tokens {
        let address = parse_address(&token.symbol, &token.id)?;
        table.collateral_rates.insert(
            address,
            parse_amount(&token.symbol, "rate", &token.rate)?,
        );
        table.collateral_tokens.push(CollateralToken {
            address,
            liquidation_fee: parse_amount(
                &token.symbol,
                "liquidationFee",
                &token.liquidation_fee,
            )?,
            symbol: token.symbol,
        });
    }

    Ok(table)
}

fn parse_address(owner: &str, raw: &str) -> Result<Address, ValidationError> {
    Address::from_str(raw)
        .map_err(|_| ValidationError::snapshot(owner, format!("invalid address {raw:?}")))
}

/// Parse an indexed base-10 integer. Only plain ASCII digits are accepted.
fn parse_amount(owner: &str, field: &str, raw: &str) -> Result<U256, ValidationError> {
    if raw.starts_with('-') {
        return Err(ValidationError::snapshot(
            owner,
            format!("negative {field}: {raw}"),
        ));
    }
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::snapshot(
            owner,
            format!("invalid {field}: {raw:?}"),
        ));
    }
    U256::from_str_radix(raw, 10)
        .map_err(|_| ValidationError::snapshot(owner, format!("invalid {field}: {raw:?}")))
}
