use alloy::primitives::{Address, I256, U256};
use serde::Serialize;
use std::str::FromStr;

/// A synthetic asset ("fxToken") minted against vault collateral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FxToken {
    pub symbol: String,
    pub address: Address,
}

impl FxToken {
    pub fn new(symbol: impl Into<String>, address: Address) -> Self {
        Self {
            symbol: symbol.into(),
            address,
        }
    }
}

/// A token accepted as vault collateral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CollateralToken {
    pub symbol: String,
    pub address: Address,
    /// Liquidation fee ratio, scaled by 1e18.
    pub liquidation_fee: U256,
}

/// One collateral type held by a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollateralHolding {
    pub token_symbol: String,
    /// Token amount, scaled by 1e18.
    pub amount: U256,
    /// Token value in ether, scaled by 1e18.
    pub rate: U256,
}

/// Raw per-vault input, produced by either the multicall or the indexer path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultSnapshot {
    pub account: Address,
    pub fx_token_symbol: String,
    pub debt: U256,
    /// Pre-aggregated collateral value. When absent, holdings are summed.
    pub total_collateral_as_ether: Option<U256>,
    pub minimum_ratio: U256,
    pub liquidation_fee: U256,
    /// fxToken value in ether, scaled by 1e18.
    pub token_price: U256,
    pub collateral_holdings: Vec<CollateralHolding>,
}

/// Fully derived valuation of a single vault.
///
/// Always rebuilt from a [`VaultSnapshot`]; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultValuation {
    pub account: Address,
    pub fx_token_symbol: String,
    pub debt: U256,
    pub debt_as_ether: U256,
    pub collateral_as_ether: U256,
    pub collateral_ratio: U256,
    pub minimum_ratio: U256,
    /// Always 80% of the minimum ratio, floored at 110%.
    pub liquidation_ratio: U256,
    pub liquidation_fee: U256,
    pub is_redeemable: bool,
    pub is_liquidatable: bool,
    pub redeemable_tokens: U256,
    /// Collateral surplus above the minimum ratio; negative when under-collateralised.
    pub free_collateral_as_ether: I256,
    pub collateral_holdings: Vec<CollateralHolding>,
}

/// Sort direction of a ranked candidate page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderDirection {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "asc",
            OrderDirection::Descending => "desc",
        }
    }

    /// Whether `next` may follow `previous` in this direction.
    pub fn allows(&self, previous: U256, next: U256) -> bool {
        match self {
            OrderDirection::Ascending => previous <= next,
            OrderDirection::Descending => previous >= next,
        }
    }
}

impl std::fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(OrderDirection::Ascending),
            "desc" | "descending" => Ok(OrderDirection::Descending),
            other => Err(format!("unknown order direction: {other}")),
        }
    }
}
