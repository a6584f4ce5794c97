use alloy::primitives::Address;

use crate::context::MULTICALL3_ADDRESS;

/// Default number of candidates requested per redemption search.
pub const DEFAULT_MAX_SEARCH_COUNT: usize = 100;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Arbitrum RPC URL
    pub rpc_url: String,

    /// Protocol subgraph endpoint
    pub subgraph_url: String,

    /// Multicall3 contract address (default: canonical deployment)
    pub multicall_address: Address,

    /// Candidates requested per redemption search (default: 100)
    pub redemption_max_search_count: usize,

    /// Timeout for subgraph HTTP requests in seconds (default: 15)
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let multicall_address = match std::env::var("MULTICALL_ADDRESS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("MULTICALL_ADDRESS must be a valid address"))?,
            Err(_) => MULTICALL3_ADDRESS,
        };

        let redemption_max_search_count: usize = std::env::var("REDEMPTION_MAX_SEARCH_COUNT")
            .unwrap_or_else(|_| DEFAULT_MAX_SEARCH_COUNT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("REDEMPTION_MAX_SEARCH_COUNT must be a valid usize"))?;
        if redemption_max_search_count == 0 {
            anyhow::bail!("REDEMPTION_MAX_SEARCH_COUNT must be greater than zero");
        }

        Ok(Self {
            rpc_url: std::env::var("RPC_URL")
                .unwrap_or_else(|_| "https://arb1.arbitrum.io/rpc".to_string()),
            subgraph_url: std::env::var("SUBGRAPH_URL").unwrap_or_else(|_| {
                "https://api.thegraph.com/subgraphs/name/handle-fi/handle".to_string()
            }),
            multicall_address,
            redemption_max_search_count,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a valid u64"))?,
        })
    }
}
