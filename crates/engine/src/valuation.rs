//! Vault valuation: derives collateralisation health from a raw snapshot.
//!
//! ```text
//! debt_as_ether      = debt * token_price / ONE
//! collateral_ratio   = collateral_as_ether * ONE / debt_as_ether   (0 when no debt)
//! liquidation_ratio  = max(minimum_ratio * 80 / 100, 1.1)
//! redeemable (ether) = (minimum_ratio * debt_as_ether - collateral_as_ether * ONE)
//!                      / (minimum_ratio - ONE)
//! ```
//!
//! Redeemed collateral is valued 1:1 against the redeemed debt, so the
//! redeemable amount is exactly what lifts the ratio back to the minimum.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy::primitives::{Address, I256, U256};

use fxvault_common::error::{ArithmeticError, ValidationError, VaultError};
use fxvault_common::types::{CollateralHolding, VaultSnapshot, VaultValuation};

use crate::fixed_point::{
    self, MIN_LIQUIDATION_RATIO, ONE, checked_add, checked_sub, div_down, mul_down,
};

/// Share of the minimum ratio below which a vault becomes liquidatable.
const LIQUIDATION_RATIO_PERCENT: u64 = 80;

/// Derive the full valuation of a vault.
pub fn compute_valuation(snapshot: &VaultSnapshot) -> Result<VaultValuation, VaultError> {
    validate_snapshot(snapshot)?;

    let debt_as_ether = mul_down(snapshot.debt, snapshot.token_price)?;
    let collateral_as_ether = match snapshot.total_collateral_as_ether {
        Some(total) => total,
        None => collateral_value(&snapshot.collateral_holdings)?,
    };

    // No debt means no meaningful ratio; reported as zero.
    let collateral_ratio = if debt_as_ether.is_zero() {
        U256::ZERO
    } else {
        div_down(collateral_as_ether, debt_as_ether)?
    };

    let is_redeemable = is_redeemable(
        collateral_ratio,
        snapshot.minimum_ratio,
        collateral_as_ether,
        snapshot.debt,
    );
    let redeemable_tokens = if is_redeemable {
        redeemable_tokens(
            snapshot.debt,
            debt_as_ether,
            collateral_as_ether,
            snapshot.minimum_ratio,
            snapshot.token_price,
        )?
    } else {
        U256::ZERO
    };

    let liquidation_ratio = liquidation_ratio(snapshot.minimum_ratio)?;
    let is_liquidatable = is_redeemable && collateral_ratio < liquidation_ratio;
    let free_collateral_as_ether =
        free_collateral_as_ether(collateral_as_ether, debt_as_ether, snapshot.minimum_ratio)?;

    tracing::debug!(
        account = %snapshot.account,
        fx_token = %snapshot.fx_token_symbol,
        collateral_ratio = %fixed_point::format_fixed(collateral_ratio),
        is_redeemable,
        is_liquidatable,
        "Valued vault"
    );

    Ok(VaultValuation {
        account: snapshot.account,
        fx_token_symbol: snapshot.fx_token_symbol.clone(),
        debt: snapshot.debt,
        debt_as_ether,
        collateral_as_ether,
        collateral_ratio,
        minimum_ratio: snapshot.minimum_ratio,
        liquidation_ratio,
        liquidation_fee: snapshot.liquidation_fee,
        is_redeemable,
        is_liquidatable,
        redeemable_tokens,
        free_collateral_as_ether,
        collateral_holdings: snapshot.collateral_holdings.clone(),
    })
}

/// Value a batch of snapshots, stopping at the first failure.
pub fn compute_valuations(snapshots: &[VaultSnapshot]) -> Result<Vec<VaultValuation>, VaultError> {
    snapshots.iter().map(compute_valuation).collect()
}

/// Reject malformed snapshots before any arithmetic runs.
pub fn validate_snapshot(snapshot: &VaultSnapshot) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::snapshot(snapshot.account, reason);

    if snapshot.account == Address::ZERO {
        return Err(invalid("account is the zero address"));
    }
    if snapshot.fx_token_symbol.is_empty() {
        return Err(invalid("missing fxToken symbol"));
    }
    if !snapshot.debt.is_zero() && snapshot.token_price.is_zero() {
        return Err(invalid("zero token price for a vault with debt"));
    }

    let mut symbols = HashSet::new();
    for holding in &snapshot.collateral_holdings {
        if holding.token_symbol.is_empty() {
            return Err(invalid("collateral holding without a symbol"));
        }
        if !symbols.insert(holding.token_symbol.as_str()) {
            return Err(ValidationError::snapshot(
                snapshot.account,
                format!("duplicate collateral holding {}", holding.token_symbol),
            ));
        }
    }

    Ok(())
}

/// Sum of `amount * rate / ONE` over all holdings.
pub fn collateral_value(holdings: &[CollateralHolding]) -> Result<U256, ArithmeticError> {
    holdings.iter().try_fold(U256::ZERO, |total, holding| {
        checked_add(total, mul_down(holding.amount, holding.rate)?)
    })
}

pub fn is_redeemable(
    collateral_ratio: U256,
    minimum_ratio: U256,
    collateral_as_ether: U256,
    debt: U256,
) -> bool {
    collateral_ratio < minimum_ratio
        && collateral_ratio >= ONE
        && !collateral_as_ether.is_zero()
        && !debt.is_zero()
}

/// `max(minimum_ratio * 80%, 1.1)`.
pub fn liquidation_ratio(minimum_ratio: U256) -> Result<U256, ArithmeticError> {
    let scaled = fixed_point::scale_percent(minimum_ratio, LIQUIDATION_RATIO_PERCENT)?;
    Ok(scaled.max(MIN_LIQUIDATION_RATIO))
}

/// Token amount that restores the minimum ratio, capped at the vault's debt.
///
/// Only defined for redeemable vaults, where `ONE <= ratio < minimum_ratio`
/// keeps both the numerator and the denominator positive.
pub fn redeemable_tokens(
    debt: U256,
    debt_as_ether: U256,
    collateral_as_ether: U256,
    minimum_ratio: U256,
    token_price: U256,
) -> Result<U256, ArithmeticError> {
    let numerator = checked_sub(
        fixed_point::checked_mul(minimum_ratio, debt_as_ether)?,
        fixed_point::checked_mul(collateral_as_ether, ONE)?,
    )?;
    let denominator = checked_sub(minimum_ratio, ONE)?;
    let redeemable_as_ether = fixed_point::checked_div(numerator, denominator)?;
    let tokens = div_down(redeemable_as_ether, token_price)?;
    Ok(tokens.min(debt))
}

/// `collateral - debt_as_ether * minimum_ratio / ONE`; zero for an empty vault.
pub fn free_collateral_as_ether(
    collateral_as_ether: U256,
    debt_as_ether: U256,
    minimum_ratio: U256,
) -> Result<I256, ArithmeticError> {
    if collateral_as_ether.is_zero() {
        return Ok(I256::ZERO);
    }
    let required = mul_down(debt_as_ether, minimum_ratio)?;
    let collateral = I256::try_from(collateral_as_ether).map_err(|_| ArithmeticError::Overflow)?;
    let required = I256::try_from(required).map_err(|_| ArithmeticError::Overflow)?;
    collateral
        .checked_sub(required)
        .ok_or(ArithmeticError::Overflow)
}

/// Collateral-value-weighted average of per-token liquidation fees.
///
/// Used where no per-vault fee is available (indexed snapshots).
pub fn weighted_liquidation_fee(
    holdings: &[CollateralHolding],
    fees: &HashMap<String, U256>,
) -> Result<U256, VaultError> {
    let mut total_value = U256::ZERO;
    let mut weighted = U256::ZERO;
    for holding in holdings {
        let fee = fees.get(&holding.token_symbol).copied().ok_or_else(|| {
            VaultError::Config(format!(
                "no liquidation fee for collateral {}",
                holding.token_symbol
            ))
        })?;
        let value = mul_down(holding.amount, holding.rate)?;
        total_value = checked_add(total_value, value)?;
        weighted = checked_add(weighted, fixed_point::checked_mul(value, fee)?)?;
    }
    if total_value.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok(fixed_point::checked_div(weighted, total_value)?)
}

/// The vault with the lowest collateral ratio for each fxToken, by symbol.
///
/// Vaults without debt have no ratio and are ignored.
pub fn lowest_ratio_per_fx_token(valuations: &[VaultValuation]) -> Vec<&VaultValuation> {
    let mut lowest: BTreeMap<&str, &VaultValuation> = BTreeMap::new();
    for valuation in valuations.iter().filter(|v| !v.debt_as_ether.is_zero()) {
        lowest
            .entry(valuation.fx_token_symbol.as_str())
            .and_modify(|current| {
                if valuation.collateral_ratio < current.collateral_ratio {
                    *current = valuation;
                }
            })
            .or_insert(valuation);
    }
    lowest.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::parse_fixed;
    use proptest::prelude::*;

    fn fp(literal: &str) -> U256 {
        parse_fixed(literal).unwrap()
    }

    fn snapshot(debt: &str, collateral: &str, minimum_ratio: &str) -> VaultSnapshot {
        VaultSnapshot {
            account: Address::repeat_byte(0x11),
            fx_token_symbol: "fxAUD".to_string(),
            debt: fp(debt),
            total_collateral_as_ether: Some(fp(collateral)),
            minimum_ratio: fp(minimum_ratio),
            liquidation_fee: fp("0.125"),
            token_price: ONE,
            collateral_holdings: vec![],
        }
    }

    #[test]
    fn test_redeemable_vault_scenario() {
        let valuation = compute_valuation(&snapshot("100", "105", "1.5")).unwrap();

        assert_eq!(valuation.debt_as_ether, fp("100"));
        assert_eq!(valuation.collateral_ratio, fp("1.05"));
        assert!(valuation.is_redeemable);
        // (1.5 * 100 - 105) / 0.5 = 90
        assert_eq!(valuation.redeemable_tokens, fp("90"));
        assert!(valuation.redeemable_tokens <= valuation.debt);
        assert_eq!(valuation.liquidation_ratio, fp("1.2"));
        assert!(valuation.is_liquidatable);
        // 105 - 100 * 1.5
        assert_eq!(valuation.free_collateral_as_ether, -I256::try_from(fp("45")).unwrap());
    }

    #[test]
    fn test_redemption_restores_minimum_ratio() {
        let valuation = compute_valuation(&snapshot("100", "105", "1.5")).unwrap();
        let redeemed = valuation.redeemable_tokens;
        let ratio_after = div_down(fp("105") - redeemed, fp("100") - redeemed).unwrap();
        assert_eq!(ratio_after, fp("1.5"));
    }

    #[test]
    fn test_redeemable_but_not_liquidatable() {
        let valuation = compute_valuation(&snapshot("100", "130", "1.5")).unwrap();
        assert!(valuation.is_redeemable);
        assert!(!valuation.is_liquidatable);
        assert_eq!(valuation.redeemable_tokens, fp("40"));
    }

    #[test]
    fn test_healthy_vault_not_redeemable() {
        let valuation = compute_valuation(&snapshot("100", "200", "1.5")).unwrap();
        assert_eq!(valuation.collateral_ratio, fp("2"));
        assert!(!valuation.is_redeemable);
        assert!(!valuation.is_liquidatable);
        assert_eq!(valuation.redeemable_tokens, U256::ZERO);
        assert_eq!(valuation.free_collateral_as_ether, I256::try_from(fp("50")).unwrap());
    }

    #[test]
    fn test_insolvent_vault_not_redeemable() {
        let valuation = compute_valuation(&snapshot("100", "90", "1.5")).unwrap();
        assert_eq!(valuation.collateral_ratio, fp("0.9"));
        assert!(!valuation.is_redeemable);
        assert!(!valuation.is_liquidatable);
        assert_eq!(valuation.redeemable_tokens, U256::ZERO);
    }

    #[test]
    fn test_zero_debt_reports_zero_ratio() {
        let valuation = compute_valuation(&snapshot("0", "10", "1.5")).unwrap();
        assert_eq!(valuation.collateral_ratio, U256::ZERO);
        assert!(!valuation.is_redeemable);
        assert_eq!(valuation.redeemable_tokens, U256::ZERO);
        assert_eq!(valuation.free_collateral_as_ether, I256::try_from(fp("10")).unwrap());
    }

    #[test]
    fn test_empty_vault_has_no_free_collateral() {
        let valuation = compute_valuation(&snapshot("100", "0", "1.5")).unwrap();
        assert!(!valuation.is_redeemable);
        assert_eq!(valuation.free_collateral_as_ether, I256::ZERO);
    }

    #[test]
    fn test_token_price_scales_debt() {
        let mut snap = snapshot("100", "105", "1.5");
        snap.token_price = fp("0.5");
        let valuation = compute_valuation(&snap).unwrap();
        assert_eq!(valuation.debt_as_ether, fp("50"));
        assert_eq!(valuation.collateral_ratio, fp("2.1"));
        assert!(!valuation.is_redeemable);
    }

    #[test]
    fn test_redeemable_tokens_converted_at_token_price() {
        let mut snap = snapshot("100", "52.5", "1.5");
        snap.token_price = fp("0.5");
        let valuation = compute_valuation(&snap).unwrap();
        // 45 ether at 0.5 ether per token
        assert_eq!(valuation.redeemable_tokens, fp("90"));
    }

    #[test]
    fn test_collateral_summed_from_holdings() {
        let mut snap = snapshot("100", "0", "1.5");
        snap.total_collateral_as_ether = None;
        snap.collateral_holdings = vec![
            CollateralHolding {
                token_symbol: "WETH".to_string(),
                amount: fp("50"),
                rate: ONE,
            },
            CollateralHolding {
                token_symbol: "wBTC".to_string(),
                amount: fp("2"),
                rate: fp("27.5"),
            },
        ];
        let valuation = compute_valuation(&snap).unwrap();
        assert_eq!(valuation.collateral_as_ether, fp("105"));
        assert!(valuation.is_redeemable);
    }

    #[test]
    fn test_pre_aggregated_collateral_takes_precedence() {
        let mut snap = snapshot("100", "120", "1.5");
        snap.collateral_holdings = vec![CollateralHolding {
            token_symbol: "WETH".to_string(),
            amount: fp("1"),
            rate: ONE,
        }];
        let valuation = compute_valuation(&snap).unwrap();
        assert_eq!(valuation.collateral_as_ether, fp("120"));
    }

    #[test]
    fn test_invalid_snapshots_rejected() {
        let mut zero_account = snapshot("1", "1", "1.5");
        zero_account.account = Address::ZERO;

        let mut no_symbol = snapshot("1", "1", "1.5");
        no_symbol.fx_token_symbol.clear();

        let mut no_price = snapshot("1", "1", "1.5");
        no_price.token_price = U256::ZERO;

        let mut duplicate = snapshot("1", "1", "1.5");
        let holding = CollateralHolding {
            token_symbol: "WETH".to_string(),
            amount: ONE,
            rate: ONE,
        };
        duplicate.collateral_holdings = vec![holding.clone(), holding];

        for snap in [zero_account, no_symbol, no_price, duplicate] {
            let err = compute_valuation(&snap).unwrap_err();
            assert!(matches!(
                err,
                VaultError::Validation(ValidationError::InvalidSnapshot { .. })
            ));
        }
    }

    #[test]
    fn test_zero_price_allowed_without_debt() {
        let mut snap = snapshot("0", "10", "1.5");
        snap.token_price = U256::ZERO;
        assert!(compute_valuation(&snap).is_ok());
    }

    #[test]
    fn test_overflow_surfaces_as_arithmetic_error() {
        let mut snap = snapshot("1", "1", "1.5");
        snap.debt = U256::MAX;
        snap.token_price = fp("2");
        let err = compute_valuation(&snap).unwrap_err();
        assert_eq!(err, VaultError::Arithmetic(ArithmeticError::Overflow));
    }

    #[test]
    fn test_liquidation_ratio_floor_and_boundary() {
        assert_eq!(liquidation_ratio(fp("1.2")).unwrap(), fp("1.1"));
        // 1.375 * 0.8 == 1.1 exactly
        assert_eq!(liquidation_ratio(fp("1.375")).unwrap(), fp("1.1"));
        assert_eq!(liquidation_ratio(fp("2")).unwrap(), fp("1.6"));
        assert_eq!(liquidation_ratio(U256::ZERO).unwrap(), fp("1.1"));
    }

    #[test]
    fn test_weighted_liquidation_fee() {
        let holdings = vec![
            CollateralHolding {
                token_symbol: "WETH".to_string(),
                amount: fp("3"),
                rate: ONE,
            },
            CollateralHolding {
                token_symbol: "wBTC".to_string(),
                amount: fp("1"),
                rate: ONE,
            },
        ];
        let fees = HashMap::from([
            ("WETH".to_string(), fp("0.1")),
            ("wBTC".to_string(), fp("0.2")),
        ]);
        assert_eq!(weighted_liquidation_fee(&holdings, &fees).unwrap(), fp("0.125"));
        assert_eq!(weighted_liquidation_fee(&[], &fees).unwrap(), U256::ZERO);
        assert!(weighted_liquidation_fee(&holdings, &HashMap::new()).is_err());
    }

    #[test]
    fn test_lowest_ratio_per_fx_token() {
        let mut aud_low = compute_valuation(&snapshot("100", "110", "1.5")).unwrap();
        aud_low.account = Address::repeat_byte(0x01);
        let aud_high = compute_valuation(&snapshot("100", "300", "1.5")).unwrap();
        let aud_no_debt = compute_valuation(&snapshot("0", "1", "1.5")).unwrap();
        let mut eur = compute_valuation(&snapshot("10", "20", "1.5")).unwrap();
        eur.fx_token_symbol = "fxEUR".to_string();

        let valuations = vec![aud_high, eur, aud_no_debt, aud_low];
        let lowest = lowest_ratio_per_fx_token(&valuations);

        assert_eq!(lowest.len(), 2);
        assert_eq!(lowest[0].fx_token_symbol, "fxAUD");
        assert_eq!(lowest[0].account, Address::repeat_byte(0x01));
        assert_eq!(lowest[1].fx_token_symbol, "fxEUR");
    }

    #[test]
    fn test_compute_valuations_aborts_on_failure() {
        let mut bad = snapshot("1", "1", "1.5");
        bad.fx_token_symbol.clear();
        let snapshots = vec![snapshot("100", "105", "1.5"), bad];
        assert!(compute_valuations(&snapshots).is_err());
        assert_eq!(compute_valuations(&snapshots[..1]).unwrap().len(), 1);
    }

    fn raw_snapshot(
        debt: u128,
        collateral: u128,
        minimum_ratio: u128,
        price: u128,
    ) -> VaultSnapshot {
        VaultSnapshot {
            account: Address::repeat_byte(0x22),
            fx_token_symbol: "fxUSD".to_string(),
            debt: U256::from(debt),
            total_collateral_as_ether: Some(U256::from(collateral)),
            minimum_ratio: U256::from(minimum_ratio),
            liquidation_fee: U256::ZERO,
            token_price: U256::from(price),
            collateral_holdings: vec![],
        }
    }

    #[test]
    fn proptest_redeemable_tokens_capped_at_debt() {
        proptest!(|(
            debt in 1u128..1_000_000_000_000_000_000_000_000u128,
            collateral in 0u128..1_000_000_000_000_000_000_000_000u128,
            minimum_ratio in 1_000_000_000_000_000_001u128..5_000_000_000_000_000_000u128,
            price in 1u128..1_000_000_000_000_000_000_000u128
        )| {
            let snapshot = raw_snapshot(debt, collateral, minimum_ratio, price);
            let valuation = compute_valuation(&snapshot).unwrap();
            prop_assert!(valuation.redeemable_tokens <= valuation.debt);
            if valuation.is_liquidatable {
                prop_assert!(valuation.is_redeemable);
            }
            if !valuation.is_redeemable {
                prop_assert_eq!(valuation.redeemable_tokens, U256::ZERO);
            }
        });
    }

    #[test]
    fn proptest_zero_debt_never_redeemable() {
        proptest!(|(
            collateral in 0u128..u128::MAX,
            minimum_ratio in 0u128..5_000_000_000_000_000_000u128,
            price in 0u128..1_000_000_000_000_000_000_000u128
        )| {
            let snapshot = raw_snapshot(0, collateral, minimum_ratio, price);
            let valuation = compute_valuation(&snapshot).unwrap();
            prop_assert_eq!(valuation.collateral_ratio, U256::ZERO);
            prop_assert!(!valuation.is_redeemable);
            prop_assert_eq!(valuation.redeemable_tokens, U256::ZERO);
        });
    }

    #[test]
    fn proptest_zero_collateral_never_redeemable() {
        proptest!(|(
            debt in 0u128..u128::MAX,
            minimum_ratio in 0u128..5_000_000_000_000_000_000u128,
            price in 1u128..1_000_000_000_000_000_000_000u128
        )| {
            let snapshot = raw_snapshot(debt, 0, minimum_ratio, price);
            let valuation = compute_valuation(&snapshot).unwrap();
            prop_assert!(!valuation.is_redeemable);
            prop_assert!(!valuation.is_liquidatable);
        });
    }

    #[test]
    fn proptest_liquidation_ratio_is_floored_eighty_percent() {
        proptest!(|(minimum_ratio in 0u128..u128::MAX)| {
            let minimum_ratio = U256::from(minimum_ratio);
            let expected =
                (minimum_ratio * U256::from(80) / U256::from(100)).max(MIN_LIQUIDATION_RATIO);
            prop_assert_eq!(liquidation_ratio(minimum_ratio).unwrap(), expected);
        });
    }
}
