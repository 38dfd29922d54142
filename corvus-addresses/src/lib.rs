//! Interact with Ravencoin addresses of any type
//!
//! This crate decodes / encodes the address formats the chain uses: base58
//! with a version byte for p2pkh and p2sh, bech32 for segwit v0 programs
//! and bech32m for future witness versions (decode only — v1+ spends are
//! out of scope). The entry point is the [`Address`] enum holding the
//! decoded payload; rendering an address back to text needs the network's
//! [`ChainParams`], which the embedding application supplies.

mod params;

pub use params::{ChainParams, DustLimits};

use std::fmt;

use bech32::{FromBase32, ToBase32, Variant};
use corvus_crypto::hash::{hash160, Hash};
use corvus_script::builder::{p2pkh_script, p2sh_script, ScriptBuilder};
use corvus_script::template::{self, match_template};
use corvus_script::{decode_script, ScriptType};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("error converting from/to bech32 {0}")]
    BadBech32(bech32::Error),

    #[error("error decoding base58 value")]
    BadBase58,

    #[error("base58 payload of unexpected shape")]
    BadBase58Payload,

    #[error("base58 checksum mismatch")]
    BadChecksum,

    #[error("unknown or bad string format for address {0}")]
    UnknownStringFormat(String),

    #[error("address version byte {0:#04x} unknown for this network")]
    UnknownVersionByte(u8),

    #[error("unknown hrp {0} for this network")]
    UnknownHrp(String),

    #[error("invalid witness program (version {version}, {length} bytes)")]
    InvalidWitnessProgram { version: u8, length: usize },

    #[error("script shape does not map to an address")]
    NoAddressForScript,

    #[error("scriptpubkey does not conform to any dust template")]
    NoDustTemplate,

    #[error("amount {amount} is below the dust limit {limit}")]
    BelowDustLimit { amount: u64, limit: u64 },
}

/// A decoded Ravencoin address of any type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    P2pkh(Hash<20>),
    P2sh(Hash<20>),
    /// A segwit program of any version; only v0 is spendable in-scope.
    Witness { version: u8, program: Vec<u8> },
}

fn base58check_encode(version: u8, payload: &[u8]) -> String {
    use base58::ToBase58;

    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = corvus_crypto::hash::sha256d(&data);
    data.extend_from_slice(&checksum[..4]);
    data.to_base58()
}

fn base58check_decode(s: &str) -> Result<(u8, Vec<u8>), Error> {
    use base58::FromBase58;

    let data = s.from_base58().map_err(|_| Error::BadBase58)?;
    if data.len() < 5 {
        return Err(Error::BadBase58Payload);
    }
    let (body, checksum) = data.split_at(data.len() - 4);
    if corvus_crypto::hash::sha256d(body)[..4] != *checksum {
        return Err(Error::BadChecksum);
    }
    Ok((body[0], body[1..].to_vec()))
}

fn validate_witness_program(version: u8, program: &[u8]) -> Result<(), Error> {
    let valid = match version {
        0 => program.len() == 20 || program.len() == 32,
        1..=16 => (2..=40).contains(&program.len()),
        _ => false,
    };
    if !valid {
        return Err(Error::InvalidWitnessProgram {
            version,
            length: program.len(),
        });
    }
    Ok(())
}

impl Address {
    /// Decode an address string against the given network parameters.
    pub fn decode(s: &str, params: &ChainParams) -> Result<Self, Error> {
        if let Ok((hrp, data, variant)) = bech32::decode(s) {
            if hrp != params.segwit_hrp {
                return Err(Error::UnknownHrp(hrp));
            }
            if data.is_empty() {
                return Err(Error::BadBech32(bech32::Error::InvalidLength));
            }
            let version = data[0].to_u8();
            let program = Vec::<u8>::from_base32(&data[1..]).map_err(Error::BadBech32)?;
            validate_witness_program(version, &program)?;
            let expected = if version == 0 {
                Variant::Bech32
            } else {
                Variant::Bech32m
            };
            if variant != expected {
                return Err(Error::InvalidWitnessProgram {
                    version,
                    length: program.len(),
                });
            }
            return Ok(Address::Witness { version, program });
        }

        let (version, payload) = base58check_decode(s)
            .map_err(|_| Error::UnknownStringFormat(s.to_owned()))?;
        let hash: Hash<20> = payload
            .as_slice()
            .try_into()
            .map_err(|_| Error::BadBase58Payload)?;
        if version == params.p2pkh_version {
            Ok(Address::P2pkh(hash))
        } else if version == params.p2sh_version {
            Ok(Address::P2sh(hash))
        } else {
            Err(Error::UnknownVersionByte(version))
        }
    }

    /// Render the address for the given network parameters.
    pub fn encode(&self, params: &ChainParams) -> Result<String, Error> {
        match self {
            Address::P2pkh(hash) => Ok(base58check_encode(params.p2pkh_version, hash.as_ref())),
            Address::P2sh(hash) => Ok(base58check_encode(params.p2sh_version, hash.as_ref())),
            Address::Witness { version, program } => {
                validate_witness_program(*version, program)?;
                let mut data = vec![bech32::u5::try_from_u8(*version).expect("version <= 16")];
                data.extend(program.to_base32());
                let variant = if *version == 0 {
                    Variant::Bech32
                } else {
                    Variant::Bech32m
                };
                bech32::encode(&params.segwit_hrp, data, variant).map_err(Error::BadBech32)
            }
        }
    }

    /// Derive the address of a locking script, ignoring any asset suffix.
    ///
    /// A bare p2pk script is reported as the p2pkh address of its key, the
    /// convention wallets use for those legacy outputs.
    pub fn from_script(script: &[u8]) -> Result<Self, Error> {
        let decoded = decode_script(script).map_err(|_| Error::NoAddressForScript)?;

        if match_template(&decoded, &template::P2PK) {
            let pubkey = decoded[0].push.expect("template push");
            return Ok(Address::P2pkh(hash160(pubkey)));
        }
        if match_template(&decoded, &template::P2PKH) {
            let hash = decoded[2].push.expect("template push");
            return Ok(Address::P2pkh(hash.try_into().expect("20 bytes")));
        }
        if match_template(&decoded, &template::P2SH) {
            let hash = decoded[1].push.expect("template push");
            return Ok(Address::P2sh(hash.try_into().expect("20 bytes")));
        }
        if let Some((version, program)) = template::witness_program(&decoded) {
            return Ok(Address::Witness {
                version,
                program: program.to_vec(),
            });
        }

        Err(Error::NoAddressForScript)
    }

    /// The locking script this address stands for (no asset suffix).
    pub fn script(&self) -> Vec<u8> {
        match self {
            Address::P2pkh(hash) => p2pkh_script(hash),
            Address::P2sh(hash) => p2sh_script(hash),
            Address::Witness { version, program } => ScriptBuilder::new()
                .small_number(*version)
                .data(program)
                .into_script(),
        }
    }

    pub fn is_segwit(&self) -> bool {
        matches!(self, Address::Witness { .. })
    }

    /// The script class an address of this form locks to, when it can be
    /// told from the address alone.
    pub fn script_type(&self) -> Option<ScriptType> {
        match self {
            Address::P2pkh(_) => Some(ScriptType::P2pkh),
            Address::P2sh(_) => Some(ScriptType::P2sh),
            Address::Witness {
                version: 0,
                program,
            } if program.len() == 20 => Some(ScriptType::P2wpkh),
            Address::Witness {
                version: 0,
                program,
            } if program.len() == 32 => Some(ScriptType::P2wsh),
            Address::Witness { .. } => None,
        }
    }
}

impl fmt::Display for Address {
    /// Network-independent debug rendering; use [`Address::encode`] for
    /// user-facing strings.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::P2pkh(hash) => write!(f, "p2pkh:{hash}"),
            Address::P2sh(hash) => write!(f, "p2sh:{hash}"),
            Address::Witness { version, program } => {
                write!(f, "witness_v{version}:{}", hex::encode(program))
            }
        }
    }
}

/// Validate an output against the per-template dust limits of the network.
pub fn check_output_dust(script: &[u8], amount: u64, params: &ChainParams) -> Result<(), Error> {
    let decoded = decode_script(script).map_err(|_| Error::NoDustTemplate)?;
    let limit = if match_template(&decoded, &template::P2PKH) {
        params.dust_limits.p2pkh
    } else if match_template(&decoded, &template::P2SH) {
        params.dust_limits.p2sh
    } else if match_template(&decoded, &template::P2WSH) {
        params.dust_limits.p2wsh
    } else if match_template(&decoded, &template::P2WPKH) {
        params.dust_limits.p2wpkh
    } else {
        return Err(Error::NoDustTemplate);
    };
    if amount < limit {
        return Err(Error::BelowDustLimit { amount, limit });
    }
    Ok(())
}
