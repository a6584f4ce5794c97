//! Multicall3-backed [`BatchExecutor`].
//!
//! Every [`VaultCall`] is ABI-encoded against the handle or vault-library
//! contract and sent through `aggregate3` with `allowFailure = false`, so a
//! single reverting read fails the whole batch instead of leaving a hole.
//! Large batches are split into sequential chunks; results are concatenated
//! in call order.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use alloy::sol_types::SolCall;

use fxvault_common::context::ProtocolContext;
use fxvault_common::error::ProtocolError;
use fxvault_engine::{BatchExecutor, VaultCall, VaultField, VaultRead};

sol! {
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external
            payable
            returns (Result[] memory returnData);
    }
}

sol! {
    interface IHandle {
        function getDebt(address account, address fxToken) external view returns (uint256);
        function getCollateralBalance(
            address account,
            address collateralType,
            address fxToken
        ) external view returns (uint256);
        function getTokenPrice(address token) external view returns (uint256);
    }

    interface IVaultLibrary {
        function getTotalCollateralBalanceAsEth(address account, address fxToken)
            external
            view
            returns (uint256);
        function getMinimumRatio(address account, address fxToken) external view returns (uint256);
        function getLiquidationFee(address account, address fxToken)
            external
            view
            returns (uint256);
    }
}

/// Default upper bound on calls per `aggregate3` request.
pub const DEFAULT_MAX_CALLS_PER_REQUEST: usize = 500;

/// Executes vault reads through the Multicall3 contract.
pub struct MulticallExecutor<P> {
    provider: P,
    context: Arc<ProtocolContext>,
    max_calls_per_request: usize,
}

impl<P: Provider + Clone> MulticallExecutor<P> {
    pub fn new(provider: P, context: Arc<ProtocolContext>) -> Self {
        Self {
            provider,
            context,
            max_calls_per_request: DEFAULT_MAX_CALLS_PER_REQUEST,
        }
    }

    /// Set the chunk size for large batches (minimum 1).
    pub fn with_max_calls_per_request(mut self, max: usize) -> Self {
        self.max_calls_per_request = max.max(1);
        self
    }

    async fn execute_chunk(&self, calls: &[VaultCall]) -> Result<Vec<U256>, ProtocolError> {
        let encoded: Vec<IMulticall3::Call3> = calls
            .iter()
            .map(|call| encode_call(&self.context, call))
            .collect();

        let multicall = IMulticall3::new(self.context.addresses().multicall, self.provider.clone());
        let results = multicall
            .aggregate3(encoded)
            .call()
            .await
            .map_err(|e| ProtocolError::Rpc(e.to_string()))?;

        if results.len() != calls.len() {
            return Err(ProtocolError::ResponseLengthMismatch {
                batch: "multicall",
                expected: calls.len(),
                actual: results.len(),
            });
        }

        calls
            .iter()
            .zip(results)
            .enumerate()
            .map(|(i, (call, result))| {
                if !result.success {
                    return Err(ProtocolError::Rpc(format!(
                        "call {i} ({}) for {} reverted",
                        read_name(&call.read),
                        call.account
                    )));
                }
                decode_return(&call.read, &result.returnData).map_err(|e| {
                    ProtocolError::Decode(format!("call {i} ({}): {e}", read_name(&call.read)))
                })
            })
            .collect()
    }
}

impl<P: Provider + Clone> BatchExecutor for MulticallExecutor<P> {
    async fn execute(&self, calls: &[VaultCall]) -> Result<Vec<U256>, ProtocolError> {
        let mut values = Vec::with_capacity(calls.len());
        for (chunk_index, chunk) in calls.chunks(self.max_calls_per_request).enumerate() {
            tracing::debug!(
                chunk = chunk_index,
                calls = chunk.len(),
                multicall = %self.context.addresses().multicall,
                "Sending aggregate3 request"
            );
            values.extend(self.execute_chunk(chunk).await?);
        }
        Ok(values)
    }
}

/// Encode a vault read as a Multicall3 call against its target contract.
pub fn encode_call(context: &ProtocolContext, call: &VaultCall) -> IMulticall3::Call3 {
    let addresses = context.addresses();
    let (target, data): (Address, Vec<u8>) = match &call.read {
        VaultRead::Field(VaultField::Debt) => (
            addresses.handle,
            IHandle::getDebtCall {
                account: call.account,
                fxToken: call.fx_token,
            }
            .abi_encode(),
        ),
        VaultRead::Field(VaultField::TokenPrice) => (
            addresses.handle,
            IHandle::getTokenPriceCall {
                token: call.fx_token,
            }
            .abi_encode(),
        ),
        VaultRead::Field(VaultField::TotalCollateralAsEther) => (
            addresses.vault_library,
            IVaultLibrary::getTotalCollateralBalanceAsEthCall {
                account: call.account,
                fxToken: call.fx_token,
            }
            .abi_encode(),
        ),
        VaultRead::Field(VaultField::MinimumRatio) => (
            addresses.vault_library,
            IVaultLibrary::getMinimumRatioCall {
                account: call.account,
                fxToken: call.fx_token,
            }
            .abi_encode(),
        ),
        VaultRead::Field(VaultField::LiquidationFee) => (
            addresses.vault_library,
            IVaultLibrary::getLiquidationFeeCall {
                account: call.account,
                fxToken: call.fx_token,
            }
            .abi_encode(),
        ),
        VaultRead::CollateralBalance(collateral) => (
            addresses.handle,
            IHandle::getCollateralBalanceCall {
                account: call.account,
                collateralType: collateral.address,
                fxToken: call.fx_token,
            }
            .abi_encode(),
        ),
    };

    IMulticall3::Call3 {
        target,
        allowFailure: false,
        callData: data.into(),
    }
}

/// Decode the `uint256` a vault read returns.
pub fn decode_return(read: &VaultRead, data: &[u8]) -> alloy::sol_types::Result<U256> {
    match read {
        VaultRead::Field(VaultField::Debt) => IHandle::getDebtCall::abi_decode_returns(data),
        VaultRead::Field(VaultField::TokenPrice) => {
            IHandle::getTokenPriceCall::abi_decode_returns(data)
        }
        VaultRead::Field(VaultField::TotalCollateralAsEther) => {
            IVaultLibrary::getTotalCollateralBalanceAsEthCall::abi_decode_returns(data)
        }
        VaultRead::Field(VaultField::MinimumRatio) => {
            IVaultLibrary::getMinimumRatioCall::abi_decode_returns(data)
        }
        VaultRead::Field(VaultField::LiquidationFee) => {
            IVaultLibrary::getLiquidationFeeCall::abi_decode_returns(data)
        }
        VaultRead::CollateralBalance(_) => {
            IHandle::getCollateralBalanceCall::abi_decode_returns(data)
        }
    }
}

fn read_name(read: &VaultRead) -> String {
    match read {
        VaultRead::Field(field) => field.name().to_string(),
        VaultRead::CollateralBalance(collateral) => format!("balance of {}", collateral.symbol),
    }
}
