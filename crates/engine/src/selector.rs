//! Redemption selector: greedily picks the vaults to redeem a bulk fxToken
//! amount against.
//!
//! A single page of redeemable candidates is requested, ranked by
//! `redeemable_tokens` in the caller's direction. Candidates are taken in the
//! order received until their cumulative capacity covers the request.
//! The ranking direction decides whose vaults are drained first, so it is
//! always supplied by the caller.

use std::future::Future;

use alloy::primitives::{Address, U256};
use serde::Serialize;

use fxvault_common::config::DEFAULT_MAX_SEARCH_COUNT;
use fxvault_common::error::{DomainError, ProtocolError, VaultError};
use fxvault_common::types::{OrderDirection, VaultValuation};

use crate::fixed_point::{self, checked_add};

/// Ranking key of a candidate page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderBy {
    #[serde(rename = "redeemableTokens")]
    RedeemableTokens,
}

/// Parameters passed to a [`CandidateSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub fx_token: String,
    pub max_results: usize,
    pub order_by: OrderBy,
    pub order_direction: OrderDirection,
}

/// Supplies ranked redeemable vaults for one fxToken.
pub trait CandidateSource {
    fn redeemable_vaults(
        &self,
        query: &CandidateQuery,
    ) -> impl Future<Output = Result<Vec<VaultValuation>, VaultError>> + Send;
}

/// A redemption the caller wants to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub fx_token: String,
    pub requested_amount: U256,
    pub max_search_count: usize,
    pub order_direction: OrderDirection,
    /// Fail instead of returning a batch that cannot cover the request.
    pub full_coverage: bool,
}

impl SelectionRequest {
    pub fn new(
        fx_token: impl Into<String>,
        requested_amount: U256,
        order_direction: OrderDirection,
    ) -> Self {
        Self {
            fx_token: fx_token.into(),
            requested_amount,
            max_search_count: DEFAULT_MAX_SEARCH_COUNT,
            order_direction,
            full_coverage: false,
        }
    }

    pub fn with_max_search_count(mut self, max_search_count: usize) -> Self {
        self.max_search_count = max_search_count;
        self
    }

    pub fn require_full_coverage(mut self) -> Self {
        self.full_coverage = true;
        self
    }

    pub fn query(&self) -> CandidateQuery {
        CandidateQuery {
            fx_token: self.fx_token.clone(),
            max_results: self.max_search_count,
            order_by: OrderBy::RedeemableTokens,
            order_direction: self.order_direction,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.requested_amount.is_zero() {
            return Err(DomainError::InvalidAmount);
        }
        if self.max_search_count == 0 {
            return Err(DomainError::InvalidSearchCount);
        }
        Ok(())
    }
}

/// One vault to redeem against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionTarget {
    pub account: Address,
    pub redeemable_tokens: U256,
}

/// Ordered accounts selected for a redemption and their summed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionBatch {
    pub fx_token: String,
    pub requested_amount: U256,
    pub targets: Vec<RedemptionTarget>,
    pub total_redeemable: U256,
}

impl RedemptionBatch {
    pub fn accounts(&self) -> Vec<Address> {
        self.targets.iter().map(|t| t.account).collect()
    }

    pub fn is_covered(&self) -> bool {
        self.total_redeemable >= self.requested_amount
    }

    /// Amount the batch falls short of the request by; zero when covered.
    pub fn shortfall(&self) -> U256 {
        self.requested_amount.saturating_sub(self.total_redeemable)
    }
}

/// Select the smallest candidate prefix whose capacity covers the request.
pub fn select_from_candidates(
    request: &SelectionRequest,
    candidates: &[VaultValuation],
) -> Result<RedemptionBatch, VaultError> {
    request.validate()?;

    let page = &candidates[..candidates.len().min(request.max_search_count)];
    check_order(page, request.order_direction)?;

    let mut targets = Vec::new();
    let mut total_redeemable = U256::ZERO;

    for candidate in page {
        if let Some(reason) = skip_reason(candidate, &request.fx_token) {
            tracing::warn!(
                account = %candidate.account,
                fx_token = %candidate.fx_token_symbol,
                reason,
                "Skipping redemption candidate"
            );
            continue;
        }

        targets.push(RedemptionTarget {
            account: candidate.account,
            redeemable_tokens: candidate.redeemable_tokens,
        });
        total_redeemable = checked_add(total_redeemable, candidate.redeemable_tokens)?;

        if total_redeemable >= request.requested_amount {
            break;
        }
    }

    if targets.is_empty() {
        return Err(DomainError::NoRedeemableVaults {
            fx_token: request.fx_token.clone(),
        }
        .into());
    }

    let batch = RedemptionBatch {
        fx_token: request.fx_token.clone(),
        requested_amount: request.requested_amount,
        targets,
        total_redeemable,
    };

    if !batch.is_covered() {
        if request.full_coverage {
            return Err(DomainError::InsufficientCapacity {
                fx_token: batch.fx_token,
                requested: batch.requested_amount,
                available: batch.total_redeemable,
            }
            .into());
        }
        tracing::warn!(
            fx_token = %batch.fx_token,
            shortfall = %fixed_point::format_fixed(batch.shortfall()),
            candidates = batch.targets.len(),
            "Redeemable capacity does not cover the requested amount"
        );
    }

    tracing::info!(
        fx_token = %batch.fx_token,
        accounts = batch.targets.len(),
        requested = %fixed_point::format_fixed(batch.requested_amount),
        total_redeemable = %fixed_point::format_fixed(batch.total_redeemable),
        direction = %request.order_direction,
        "Selected redemption batch"
    );

    Ok(batch)
}

/// Fetch one ranked page from `source` and select from it.
pub async fn select_redemption_candidates<S: CandidateSource>(
    source: &S,
    request: &SelectionRequest,
) -> Result<RedemptionBatch, VaultError> {
    request.validate()?;
    let candidates = source.redeemable_vaults(&request.query()).await?;
    tracing::debug!(
        fx_token = %request.fx_token,
        candidates = candidates.len(),
        "Fetched redemption candidates"
    );
    select_from_candidates(request, &candidates)
}

fn skip_reason(candidate: &VaultValuation, fx_token: &str) -> Option<&'static str> {
    if candidate.fx_token_symbol != fx_token {
        Some("different fxToken")
    } else if !candidate.is_redeemable {
        Some("not redeemable")
    } else if candidate.redeemable_tokens.is_zero() {
        Some("no redeemable tokens")
    } else {
        None
    }
}

fn check_order(page: &[VaultValuation], direction: OrderDirection) -> Result<(), ProtocolError> {
    for (position, pair) in page.windows(2).enumerate() {
        let (previous, next) = (pair[0].redeemable_tokens, pair[1].redeemable_tokens);
        if !direction.allows(previous, next) {
            return Err(ProtocolError::OutOfOrder {
                position: position + 1,
                reason: format!(
                    "redeemableTokens {next} follows {previous} in {direction} order"
                ),
            });
        }
    }
    Ok(())
}
