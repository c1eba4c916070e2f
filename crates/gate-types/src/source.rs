//! Balance sources and the keys used to deduplicate balance fetches.
//!
//! A [`BalanceSource`] describes *where* a token balance lives (chain, contract,
//! token). Two requirements that read the same balance produce equal
//! [`SourceKey`]s, which is what lets the planner issue a single fetch for them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of balance a source refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSourceType {
    Erc20,
    Erc721,
    Erc1155,
    EthNative,
    CosmosNative,
    Cw20,
    Cw721,
}

impl BalanceSourceType {
    /// Wire name of this source type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceSourceType::Erc20 => "erc20",
            BalanceSourceType::Erc721 => "erc721",
            BalanceSourceType::Erc1155 => "erc1155",
            BalanceSourceType::EthNative => "eth_native",
            BalanceSourceType::CosmosNative => "cosmos_native",
            BalanceSourceType::Cw20 => "cw20",
            BalanceSourceType::Cw721 => "cw721",
        }
    }

    /// Whether balances of this type live on an EVM chain.
    pub fn is_evm(&self) -> bool {
        matches!(
            self,
            BalanceSourceType::Erc20
                | BalanceSourceType::Erc721
                | BalanceSourceType::Erc1155
                | BalanceSourceType::EthNative
        )
    }
}

impl fmt::Display for BalanceSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EVM token contract (erc20, erc721, erc1155).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSource {
    pub evm_chain_id: u64,
    pub contract_address: String,
    /// Only meaningful for erc1155.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

/// Native currency of an EVM chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSource {
    pub evm_chain_id: u64,
}

/// Native denomination of a Cosmos chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosSource {
    pub cosmos_chain_id: String,
    pub token_symbol: String,
}

/// CosmWasm token contract (cw20, cw721).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosContractSource {
    pub cosmos_chain_id: String,
    pub contract_address: String,
}

/// Where a threshold requirement reads its balance from.
///
/// Serialized with a `source_type` tag, e.g.
/// `{"source_type": "erc20", "evm_chain_id": 1, "contract_address": "0x..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum BalanceSource {
    Erc20(ContractSource),
    Erc721(ContractSource),
    Erc1155(ContractSource),
    EthNative(NativeSource),
    CosmosNative(CosmosSource),
    Cw20(CosmosContractSource),
    Cw721(CosmosContractSource),
}

impl BalanceSource {
    pub fn source_type(&self) -> BalanceSourceType {
        match self {
            BalanceSource::Erc20(_) => BalanceSourceType::Erc20,
            BalanceSource::Erc721(_) => BalanceSourceType::Erc721,
            BalanceSource::Erc1155(_) => BalanceSourceType::Erc1155,
            BalanceSource::EthNative(_) => BalanceSourceType::EthNative,
            BalanceSource::CosmosNative(_) => BalanceSourceType::CosmosNative,
            BalanceSource::Cw20(_) => BalanceSourceType::Cw20,
            BalanceSource::Cw721(_) => BalanceSourceType::Cw721,
        }
    }

    /// Identity of the balance this source reads.
    ///
    /// EVM contract addresses are hex and compared case-insensitively, so they
    /// are lower-cased here. `token_id` only distinguishes erc1155 sources.
    pub fn source_key(&self) -> SourceKey {
        let source_type = self.source_type();
        match self {
            BalanceSource::Erc20(c) | BalanceSource::Erc721(c) => SourceKey {
                source_type,
                chain_id: ChainId::Evm(c.evm_chain_id),
                contract_address: Some(c.contract_address.to_ascii_lowercase()),
                token: None,
            },
            BalanceSource::Erc1155(c) => SourceKey {
                source_type,
                chain_id: ChainId::Evm(c.evm_chain_id),
                contract_address: Some(c.contract_address.to_ascii_lowercase()),
                token: c.token_id.clone(),
            },
            BalanceSource::EthNative(n) => SourceKey {
                source_type,
                chain_id: ChainId::Evm(n.evm_chain_id),
                contract_address: None,
                token: None,
            },
            BalanceSource::CosmosNative(c) => SourceKey {
                source_type,
                chain_id: ChainId::Cosmos(c.cosmos_chain_id.clone()),
                contract_address: None,
                token: Some(c.token_symbol.clone()),
            },
            BalanceSource::Cw20(c) | BalanceSource::Cw721(c) => SourceKey {
                source_type,
                chain_id: ChainId::Cosmos(c.cosmos_chain_id.clone()),
                contract_address: Some(c.contract_address.clone()),
                token: None,
            },
        }
    }
}

/// Chain a balance lives on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainId {
    Evm(u64),
    Cosmos(String),
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Evm(id) => write!(f, "{}", id),
            ChainId::Cosmos(id) => f.write_str(id),
        }
    }
}

/// Deduplication key for balance fetches: `(source type, chain, contract, token)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub source_type: BalanceSourceType,
    pub chain_id: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// erc1155 token id, or the cosmos denomination for `cosmos_native`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_type, self.chain_id)?;
        if let Some(contract) = &self.contract_address {
            write!(f, ":{}", contract)?;
        }
        if let Some(token) = &self.token {
            write!(f, ":{}", token)?;
        }
        Ok(())
    }
}
