//! Auto-detection of transaction input encodings.

use base64::Engine;
use corvus_primitives::Transaction;

use crate::ser::{parse_psbt, PSBT_MAGIC};
use crate::tx::PartialTransaction;
use crate::Error;

/// Deprecated pre-PSBT partial-transaction magic, rejected explicitly.
const LEGACY_PARTIAL_MAGIC: &[u8; 5] = b"EPTF\xff";

/// A transaction of either kind, as recovered from arbitrary input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyTx {
    Partial(PartialTransaction),
    Network(Transaction),
}

impl AnyTx {
    pub fn is_partial(&self) -> bool {
        matches!(self, AnyTx::Partial(_))
    }
}

/// Sanitize tx-describing text (hex / base43 / base64) into raw bytes.
fn text_to_bytes(raw: &str) -> Result<Vec<u8>, Error> {
    if raw.is_empty() {
        return Err(Error::UnrecognizedEncoding);
    }
    if let Ok(bytes) = hex::decode(raw) {
        return Ok(bytes);
    }
    if let Ok(bytes) = corvus_codec::base43::decode(raw) {
        return Ok(bytes);
    }
    // base64 is only attempted for data that looks like a PSBT
    if raw.starts_with("cHNidP") {
        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(raw) {
            return Ok(bytes);
        }
    }
    Err(Error::UnrecognizedEncoding)
}

/// Interpret `raw` text as a PSBT or a network transaction.
pub fn tx_from_any(raw: &str) -> Result<AnyTx, Error> {
    tx_from_any_bytes(&text_to_bytes(raw.trim())?)
}

/// Interpret raw bytes as a PSBT or a network transaction. PSBTs are
/// recognized by magic; anything else parses as a plain transaction.
pub fn tx_from_any_bytes(raw: &[u8]) -> Result<AnyTx, Error> {
    if raw.starts_with(PSBT_MAGIC) {
        return Ok(AnyTx::Partial(parse_psbt(raw)?));
    }
    if raw.starts_with(LEGACY_PARTIAL_MAGIC) {
        return Err(Error::LegacyPartialTx);
    }
    let tx = Transaction::from_wire(raw).map_err(Error::Primitives)?;
    Ok(AnyTx::Network(tx))
}
