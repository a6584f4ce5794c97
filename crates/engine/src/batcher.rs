//! Multicall batcher: flattens per-vault reads into one request and
//! rebuilds per-vault snapshots from the positional response.
//!
//! Request building and response decoding both walk the same [`BatchLayout`],
//! so the entity-major, descriptor-minor ordering cannot drift between the two:
//!
//! ```text
//! core:       [e0.f0, e0.f1, .., e0.fM, e1.f0, .., eN.fM]
//! collateral: [e0.c0, .., e0.cK, e1.c0, .., eN.cK]
//! ```
//!
//! A response whose length differs from the request is rejected outright.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use alloy::primitives::{Address, U256};

use fxvault_common::error::{ProtocolError, ValidationError, VaultError};
use fxvault_common::types::{CollateralHolding, FxToken, VaultSnapshot};

/// Collateral symbol → value in ether (1e18-scaled), for one snapshot.
pub type CollateralRates = HashMap<String, U256>;

/// A vault to read: one account's position in one fxToken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEntity {
    pub account: Address,
    pub fx_token: FxToken,
}

impl VaultEntity {
    pub fn new(account: Address, fx_token: FxToken) -> Self {
        Self { account, fx_token }
    }
}

/// Per-vault scalar fields readable from the protocol contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VaultField {
    Debt,
    TotalCollateralAsEther,
    MinimumRatio,
    LiquidationFee,
    TokenPrice,
}

impl VaultField {
    pub const ALL: [VaultField; 5] = [
        VaultField::Debt,
        VaultField::TotalCollateralAsEther,
        VaultField::MinimumRatio,
        VaultField::LiquidationFee,
        VaultField::TokenPrice,
    ];

    /// Fields a snapshot cannot be built without.
    pub const REQUIRED: [VaultField; 4] = [
        VaultField::Debt,
        VaultField::MinimumRatio,
        VaultField::LiquidationFee,
        VaultField::TokenPrice,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VaultField::Debt => "debt",
            VaultField::TotalCollateralAsEther => "totalCollateralAsEther",
            VaultField::MinimumRatio => "minimumRatio",
            VaultField::LiquidationFee => "liquidationFee",
            VaultField::TokenPrice => "tokenPrice",
        }
    }
}

/// A collateral token whose per-vault balance is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollateralType {
    pub symbol: String,
    pub address: Address,
}

impl CollateralType {
    pub fn new(symbol: impl Into<String>, address: Address) -> Self {
        Self {
            symbol: symbol.into(),
            address,
        }
    }
}

/// The single ordered descriptor shared by request building and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    fields: Vec<VaultField>,
    collateral_types: Vec<CollateralType>,
}

impl BatchLayout {
    pub fn new(
        fields: Vec<VaultField>,
        collateral_types: Vec<CollateralType>,
    ) -> Result<Self, ValidationError> {
        let mut seen_fields = HashSet::new();
        for field in &fields {
            if !seen_fields.insert(*field) {
                return Err(ValidationError::InvalidLayout(format!(
                    "duplicate field {}",
                    field.name()
                )));
            }
        }
        let mut seen_collateral = HashSet::new();
        for collateral in &collateral_types {
            if !seen_collateral.insert(collateral.symbol.as_str()) {
                return Err(ValidationError::InvalidLayout(format!(
                    "duplicate collateral type {}",
                    collateral.symbol
                )));
            }
        }
        Ok(Self {
            fields,
            collateral_types,
        })
    }

    /// Every vault field, plus the given collateral types.
    pub fn full(collateral_types: Vec<CollateralType>) -> Result<Self, ValidationError> {
        Self::new(VaultField::ALL.to_vec(), collateral_types)
    }

    pub fn fields(&self) -> &[VaultField] {
        &self.fields
    }

    pub fn collateral_types(&self) -> &[CollateralType] {
        &self.collateral_types
    }

    pub fn position(&self, field: VaultField) -> Option<usize> {
        self.fields.iter().position(|f| *f == field)
    }

    pub fn core_len(&self, entities: usize) -> usize {
        entities * self.fields.len()
    }

    pub fn collateral_len(&self, entities: usize) -> usize {
        entities * self.collateral_types.len()
    }

    fn require_snapshot_fields(&self) -> Result<(), ValidationError> {
        for field in VaultField::REQUIRED {
            if self.position(field).is_none() {
                return Err(ValidationError::InvalidLayout(format!(
                    "layout is missing required field {}",
                    field.name()
                )));
            }
        }
        Ok(())
    }
}

/// What a single call reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultRead {
    Field(VaultField),
    CollateralBalance(CollateralType),
}

/// One read call in a flat batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultCall {
    /// Position of the entity this call belongs to.
    pub entity_index: usize,
    pub account: Address,
    pub fx_token: Address,
    pub read: VaultRead,
}

/// The two independent flat call lists for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    pub core: Vec<VaultCall>,
    pub collateral: Vec<VaultCall>,
}

/// The RPC boundary: executes calls and returns one value per call, in order.
pub trait BatchExecutor {
    fn execute(
        &self,
        calls: &[VaultCall],
    ) -> impl Future<Output = Result<Vec<U256>, ProtocolError>> + Send;
}

/// Build the flat core and collateral call lists, entity-major.
pub fn build_batch_request(entities: &[VaultEntity], layout: &BatchLayout) -> BatchRequest {
    let mut request = BatchRequest {
        core: Vec::with_capacity(layout.core_len(entities.len())),
        collateral: Vec::with_capacity(layout.collateral_len(entities.len())),
    };

    for (entity_index, entity) in entities.iter().enumerate() {
        let call = |read| VaultCall {
            entity_index,
            account: entity.account,
            fx_token: entity.fx_token.address,
            read,
        };
        request
            .core
            .extend(layout.fields.iter().map(|f| call(VaultRead::Field(*f))));
        request.collateral.extend(
            layout
                .collateral_types
                .iter()
                .map(|c| call(VaultRead::CollateralBalance(c.clone()))),
        );
    }

    request
}

/// Rebuild per-vault snapshots from the flat responses.
pub fn decode_batch_response(
    core_results: &[U256],
    collateral_results: &[U256],
    entities: &[VaultEntity],
    layout: &BatchLayout,
    rates: &CollateralRates,
) -> Result<Vec<VaultSnapshot>, VaultError> {
    layout.require_snapshot_fields()?;
    check_len("core", layout.core_len(entities.len()), core_results.len())?;
    check_len(
        "collateral",
        layout.collateral_len(entities.len()),
        collateral_results.len(),
    )?;

    let field_count = layout.fields.len();
    let collateral_count = layout.collateral_types.len();

    entities
        .iter()
        .enumerate()
        .map(|(i, entity)| {
            let values = &core_results[i * field_count..(i + 1) * field_count];
            let balances = &collateral_results[i * collateral_count..(i + 1) * collateral_count];
            decode_entity(entity, values, balances, layout, rates)
        })
        .collect()
}

fn check_len(batch: &'static str, expected: usize, actual: usize) -> Result<(), ProtocolError> {
    if expected != actual {
        tracing::warn!(batch, expected, actual, "Batch response length mismatch");
        return Err(ProtocolError::ResponseLengthMismatch {
            batch,
            expected,
            actual,
        });
    }
    Ok(())
}

fn decode_entity(
    entity: &VaultEntity,
    values: &[U256],
    balances: &[U256],
    layout: &BatchLayout,
    rates: &CollateralRates,
) -> Result<VaultSnapshot, VaultError> {
    let value = |field| layout.position(field).map(|p| values[p]);
    let required = |field: VaultField| {
        value(field).ok_or_else(|| {
            ValidationError::snapshot(entity.account, format!("missing {}", field.name()))
        })
    };

    let mut collateral_holdings = Vec::new();
    for (collateral, amount) in layout.collateral_types.iter().zip(balances) {
        if amount.is_zero() {
            continue;
        }
        let rate = rates.get(&collateral.symbol).copied().ok_or_else(|| {
            ValidationError::snapshot(
                entity.account,
                format!("no rate for collateral {}", collateral.symbol),
            )
        })?;
        collateral_holdings.push(CollateralHolding {
            token_symbol: collateral.symbol.clone(),
            amount: *amount,
            rate,
        });
    }

    Ok(VaultSnapshot {
        account: entity.account,
        fx_token_symbol: entity.fx_token.symbol.clone(),
        debt: required(VaultField::Debt)?,
        total_collateral_as_ether: value(VaultField::TotalCollateralAsEther),
        minimum_ratio: required(VaultField::MinimumRatio)?,
        liquidation_fee: required(VaultField::LiquidationFee)?,
        token_price: required(VaultField::TokenPrice)?,
        collateral_holdings,
    })
}

/// Build, execute and decode one batch.
///
/// The core and collateral lists are independent reads and are issued
/// concurrently; empty lists are never sent.
pub async fn fetch_snapshots<E: BatchExecutor>(
    executor: &E,
    entities: &[VaultEntity],
    layout: &BatchLayout,
    rates: &CollateralRates,
) -> Result<Vec<VaultSnapshot>, VaultError> {
    let request = build_batch_request(entities, layout);

    tracing::debug!(
        entities = entities.len(),
        core_calls = request.core.len(),
        collateral_calls = request.collateral.len(),
        "Executing vault batch"
    );

    let (core, collateral) = tokio::join!(
        execute_non_empty(executor, &request.core),
        execute_non_empty(executor, &request.collateral),
    );

    decode_batch_response(&core?, &collateral?, entities, layout, rates)
}

async fn execute_non_empty<E: BatchExecutor>(
    executor: &E,
    calls: &[VaultCall],
) -> Result<Vec<U256>, ProtocolError> {
    if calls.is_empty() {
        return Ok(Vec::new());
    }
    executor.execute(calls).await
}
