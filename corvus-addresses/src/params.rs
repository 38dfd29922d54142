//! Externally-supplied network parameters.

use serde::{Deserialize, Serialize};

/// Smallest output values relayed per locking-script template, in
/// satoshis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DustLimits {
    pub p2pkh: u64,
    pub p2sh: u64,
    pub p2wpkh: u64,
    pub p2wsh: u64,
}

/// Address and policy constants of one network.
///
/// The core never hardcodes a network; everything that renders or parses
/// address strings, recognizes burn outputs or applies dust policy takes a
/// `ChainParams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Base58 version byte of p2pkh addresses.
    pub p2pkh_version: u8,
    /// Base58 version byte of p2sh addresses.
    pub p2sh_version: u8,
    /// Human-readable part of bech32 witness addresses.
    pub segwit_hrp: String,
    /// Addresses the protocol burns asset-operation fees to.
    pub burn_addresses: Vec<String>,
    pub dust_limits: DustLimits,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        ChainParams {
            p2pkh_version: 60,
            p2sh_version: 122,
            segwit_hrp: "rc".to_string(),
            burn_addresses: [
                "RXissueAssetXXXXXXXXXXXXXXXXXhhZGt",
                "RXReissueAssetXXXXXXXXXXXXXXVEFAWu",
                "RXissueSubAssetXXXXXXXXXXXXXWcwhwL",
                "RXissueUniqueAssetXXXXXXXXXXWEAe58",
                "RXissueMsgChanneLAssetXXXXXXSjHvAY",
                "RXissueQuaLifierXXXXXXXXXXXXUgEDbC",
                "RXissueSubQuaLifierXXXXXXXXXVTzvv5",
                "RXissueRestrictedXXXXXXXXXXXXzJZ1q",
                "RXBurnXXXXXXXXXXXXXXXXXXXXXXWUo9FV",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            dust_limits: DustLimits {
                p2pkh: 546,
                p2sh: 540,
                p2wpkh: 294,
                p2wsh: 330,
            },
        }
    }

    pub fn testnet() -> Self {
        ChainParams {
            p2pkh_version: 111,
            p2sh_version: 196,
            segwit_hrp: "trc".to_string(),
            burn_addresses: [
                "n1issueAssetXXXXXXXXXXXXXXXXWdnemQ",
                "n1ReissueAssetXXXXXXXXXXXXXXWG9NLd",
                "n1issueSubAssetXXXXXXXXXXXXXbNiH6v",
                "n1issueUniqueAssetXXXXXXXXXXS4695i",
                "n1issueMsgChanneLAssetXXXXXXT2PBdD",
                "n1issueQuaLifierXXXXXXXXXXXXUysLTj",
                "n1issueSubQuaLifierXXXXXXXXXYffPLh",
                "n1issueRestrictedXXXXXXXXXXXXZVT9V",
                "n1BurnXXXXXXXXXXXXXXXXXXXXXXU1qejP",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            dust_limits: DustLimits {
                p2pkh: 546,
                p2sh: 540,
                p2wpkh: 294,
                p2wsh: 330,
            },
        }
    }

    /// Whether `address` (rendered form) is one of the protocol burn
    /// addresses of this network.
    pub fn is_burn_address(&self, address: &str) -> bool {
        self.burn_addresses.iter().any(|a| a == address)
    }
}
