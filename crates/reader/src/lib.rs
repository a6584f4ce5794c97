//! On-chain and indexed readers for fxToken vaults.
//!
//! [`multicall::MulticallExecutor`] answers batched vault reads through
//! Multicall3; [`subgraph::IndexedVaultSource`] supplies token rates, account
//! snapshots and ranked redemption candidates from the protocol subgraph.

pub mod multicall;
pub mod subgraph;
