use serde::{Deserialize, Serialize};

use crate::address::{Address, FriendlyFlags};

/// Network a wallet account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Mainnet,
    Testnet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub address: Address,
    pub chain: Chain,
}

/// A connected wallet as reported by the wallet session. Fields a wallet
/// may not provide are explicit options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub account: Option<WalletAccount>,
}

impl WalletAccount {
    /// Non-bounceable user-friendly address, flagged test-only on testnet.
    pub fn friendly_address(&self) -> String {
        self.address.to_friendly(FriendlyFlags {
            bounceable: false,
            test_only: self.chain == Chain::Testnet,
        })
    }
}

impl WalletInfo {
    pub fn friendly_address(&self) -> Option<String> {
        self.account.as_ref().map(WalletAccount::friendly_address)
    }

    /// Short label for the connected account, e.g. `UQAI...iZVN`.
    pub fn display_label(&self) -> Option<String> {
        self.friendly_address().map(|a| truncate_address(&a))
    }
}

/// Keep the first and last four characters of an address.
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
