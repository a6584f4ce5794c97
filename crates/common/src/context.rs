//! Immutable protocol context: deployment addresses and token tables.
//!
//! A context is built once per provider/signer and shared behind an `Arc`.
//! Changing any part of it means building a new one; there are no setters.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::{Address, address};

use crate::error::ValidationError;
use crate::types::{CollateralToken, FxToken};

/// Canonical Multicall3 deployment, identical on every EVM chain.
pub const MULTICALL3_ADDRESS: Address = address!("0xcA11bde05977b3631167028862bE2a173976CA11");

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Arbitrum,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Arbitrum => 42161,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Arbitrum => write!(f, "arbitrum"),
        }
    }
}

/// On-chain contracts the vault reads are issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolAddresses {
    pub handle: Address,
    pub vault_library: Address,
    pub multicall: Address,
}

/// Plain configuration value a [`ProtocolContext`] is built from.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub network: Network,
    pub addresses: ProtocolAddresses,
    pub fx_tokens: Vec<FxToken>,
    pub collateral_tokens: Vec<CollateralToken>,
}

impl ProtocolConfig {
    /// Default Arbitrum deployment. Collateral tokens are read from the indexer.
    pub fn arbitrum() -> Self {
        Self {
            network: Network::Arbitrum,
            addresses: ProtocolAddresses {
                handle: address!("0xA112D1bFd43fcFbF2bE2eBFcaebD6B6DB73aaD8B"),
                vault_library: address!("0xeaE0f01393114Dfc95c82AafB227f31ba5ECf886"),
                multicall: MULTICALL3_ADDRESS,
            },
            fx_tokens: vec![
                FxToken::new("fxAUD", address!("0x7E141940932E3D13bfa54B224cb4a16510519308")),
                FxToken::new("fxPHP", address!("0x3d147cD9aC957B2a5F968dE9d1c6B9d0872286a0")),
                FxToken::new("fxUSD", address!("0x8616E8EA83f048ab9A5eC513c9412Dd2993bcE3F")),
                FxToken::new("fxEUR", address!("0x116172B2482c5dC3E6f445C16Ac13367aC3FCd35")),
                FxToken::new("fxKRW", address!("0xF4E8BA79d058fFf263Fd043Ef50e1010c1BdF991")),
                FxToken::new("fxCNY", address!("0x2C29daAce6Aa05e3b65743EFd61f8A2C448302a3")),
            ],
            collateral_tokens: Vec::new(),
        }
    }

    pub fn with_multicall(mut self, multicall: Address) -> Self {
        self.addresses.multicall = multicall;
        self
    }
}

/// Frozen view of a protocol deployment.
#[derive(Debug)]
pub struct ProtocolContext {
    network: Network,
    addresses: ProtocolAddresses,
    fx_tokens: Vec<FxToken>,
    collateral_tokens: Vec<CollateralToken>,
}

impl ProtocolContext {
    pub fn new(config: ProtocolConfig) -> Result<Arc<Self>, ValidationError> {
        check_unique(
            "fxToken",
            config.fx_tokens.iter().map(|t| (t.symbol.as_str(), t.address)),
        )?;
        check_unique(
            "collateral token",
            config
                .collateral_tokens
                .iter()
                .map(|t| (t.symbol.as_str(), t.address)),
        )?;

        tracing::debug!(
            network = %config.network,
            fx_tokens = config.fx_tokens.len(),
            collateral_tokens = config.collateral_tokens.len(),
            "Built protocol context"
        );

        Ok(Arc::new(Self {
            network: config.network,
            addresses: config.addresses,
            fx_tokens: config.fx_tokens,
            collateral_tokens: config.collateral_tokens,
        }))
    }

    /// Build a new context that carries the given collateral table.
    pub fn with_collateral_tokens(
        &self,
        collateral_tokens: Vec<CollateralToken>,
    ) -> Result<Arc<Self>, ValidationError> {
        Self::new(ProtocolConfig {
            network: self.network,
            addresses: self.addresses.clone(),
            fx_tokens: self.fx_tokens.clone(),
            collateral_tokens,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn addresses(&self) -> &ProtocolAddresses {
        &self.addresses
    }

    pub fn fx_tokens(&self) -> &[FxToken] {
        &self.fx_tokens
    }

    pub fn collateral_tokens(&self) -> &[CollateralToken] {
        &self.collateral_tokens
    }

    pub fn fx_token_by_symbol(&self, symbol: &str) -> Option<&FxToken> {
        self.fx_tokens.iter().find(|t| t.symbol == symbol)
    }

    pub fn fx_token_by_address(&self, address: Address) -> Option<&FxToken> {
        self.fx_tokens.iter().find(|t| t.address == address)
    }

    pub fn collateral_by_symbol(&self, symbol: &str) -> Option<&CollateralToken> {
        self.collateral_tokens.iter().find(|t| t.symbol == symbol)
    }

    pub fn collateral_by_address(&self, address: Address) -> Option<&CollateralToken> {
        self.collateral_tokens.iter().find(|t| t.address == address)
    }
}

fn check_unique<'a>(
    kind: &str,
    entries: impl Iterator<Item = (&'a str, Address)>,
) -> Result<(), ValidationError> {
    let mut symbols = HashSet::new();
    let mut addresses = HashSet::new();
    for (symbol, address) in entries {
        if symbol.is_empty() {
            return Err(ValidationError::InvalidConfig(format!(
                "{kind} at {address} has an empty symbol"
            )));
        }
        if !symbols.insert(symbol) {
            return Err(ValidationError::InvalidConfig(format!(
                "duplicate {kind} symbol {symbol}"
            )));
        }
        if !addresses.insert(address) {
            return Err(ValidationError::InvalidConfig(format!(
                "duplicate {kind} address {address}"
            )));
        }
    }
    Ok(())
}
