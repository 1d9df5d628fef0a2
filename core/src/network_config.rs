use serde::{Deserialize, Serialize};

/// ETH on Starknet; the same address on every public network.
pub const ETH_TOKEN_ADDRESS: &str =
    "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7";

/// Default purchase (token sale) contract.
pub const DEFAULT_PURCHASE_CONTRACT: &str =
    "0x035aeae2de3c0193b3a1139c669254d357b02a747f01735adfa7a111096ff232";

// ── Network presets ───────────────────────────────────────────────────────────

/// Where to reach a network and which token it pays with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkPreset {
    /// Human-readable label for this network.
    pub name: String,
    /// Chain identifier as reported by `starknet_chainId`.
    pub chain_id: String,
    /// Default JSON-RPC endpoint.
    pub rpc_url: String,
    /// Payment token contract.
    pub payment_token: String,
}

pub fn mainnet() -> NetworkPreset {
    NetworkPreset {
        name: "Starknet Mainnet".to_string(),
        chain_id: "SN_MAIN".to_string(),
        rpc_url: "https://starknet-mainnet.public.blastapi.io/rpc/v0_7".to_string(),
        payment_token: ETH_TOKEN_ADDRESS.to_string(),
    }
}

pub fn testnet() -> NetworkPreset {
    NetworkPreset {
        name: "Starknet Sepolia".to_string(),
        chain_id: "SN_SEPOLIA".to_string(),
        rpc_url: "https://starknet-sepolia.public.blastapi.io/rpc/v0_7".to_string(),
        payment_token: ETH_TOKEN_ADDRESS.to_string(),
    }
}

/// Local devnet. It predeploys ETH at the public address and reports the
/// Sepolia chain id.
pub fn devnet() -> NetworkPreset {
    NetworkPreset {
        name: "Local Devnet".to_string(),
        chain_id: "SN_SEPOLIA".to_string(),
        rpc_url: "http://127.0.0.1:5050/rpc".to_string(),
        payment_token: ETH_TOKEN_ADDRESS.to_string(),
    }
}

/// Resolve a preset name to the corresponding `NetworkPreset`.
///
/// Recognised names (case-insensitive):
/// - `"mainnet"` / `"main"`
/// - `"testnet"` / `"sepolia"`
/// - `"devnet"` / `"local"`
pub fn resolve_preset(name: &str) -> Option<NetworkPreset> {
    match name.to_lowercase().as_str() {
        "mainnet" | "main" => Some(mainnet()),
        "testnet" | "sepolia" => Some(testnet()),
        "devnet" | "local" => Some(devnet()),
        _ => None,
    }
}
