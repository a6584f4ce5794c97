//! Client-side accounting for fxToken vaults: fixed-point valuation, batched
//! vault reads, and redemption candidate selection.

pub mod batcher;
pub mod fixed_point;
pub mod selector;
pub mod valuation;

pub use batcher::{
    BatchExecutor, BatchLayout, BatchRequest, CollateralRates, CollateralType, VaultCall,
    VaultEntity, VaultField, VaultRead, build_batch_request, decode_batch_response,
    fetch_snapshots,
};
pub use selector::{
    CandidateQuery, CandidateSource, OrderBy, RedemptionBatch, RedemptionTarget,
    SelectionRequest, select_from_candidates, select_redemption_candidates,
};
pub use valuation::{compute_valuation, compute_valuations};
