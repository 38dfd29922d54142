use crate::hash::Hash;
use cryptoxide::digest::Digest as _;
use cryptoxide::ripemd160::Ripemd160;
use cryptoxide::sha2::Sha256;

/// Streaming SHA-256.
///
/// Used wherever a digest is computed over data that is produced
/// incrementally, e.g. a signature pre-image assembled field by field.
///
/// ```
/// # use corvus_crypto::hash::Hasher;
/// let mut hasher = Hasher::new();
/// hasher.input(b"abc");
///
/// let digest = hasher.finalize();
/// # assert_eq!(
/// #   "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
/// #   hex::encode(digest)
/// # );
/// ```
pub struct Hasher(Sha256);

impl Hasher {
    #[inline]
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// update the [`Hasher`] with the given inputs
    #[inline]
    pub fn input(&mut self, bytes: &[u8]) {
        self.0.input(bytes);
    }

    /// consume the [`Hasher`] and return the computed digest
    pub fn finalize(mut self) -> Hash<32> {
        let mut digest = [0; 32];
        self.0.result(&mut digest);
        Hash::new(digest)
    }

    /// consume the [`Hasher`], hash the digest once more and return it
    ///
    /// This is the chain's `SHA256d`, used for txids and signature digests.
    pub fn finalize_double(self) -> Hash<32> {
        sha256(self.finalize().as_ref())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// convenient function to directly generate the SHA-256 digest of `bytes`
#[inline]
pub fn sha256(bytes: &[u8]) -> Hash<32> {
    let mut hasher = Hasher::new();
    hasher.input(bytes);
    hasher.finalize()
}

/// `SHA256(SHA256(bytes))`
#[inline]
pub fn sha256d(bytes: &[u8]) -> Hash<32> {
    sha256(sha256(bytes).as_ref())
}

/// `RIPEMD160(SHA256(bytes))`, the key- and script-hash of the chain
pub fn hash160(bytes: &[u8]) -> Hash<20> {
    let inner = sha256(bytes);
    let mut ripemd = Ripemd160::new();
    ripemd.input(inner.as_ref());
    let mut digest = [0; 20];
    ripemd.result(&mut digest);
    Hash::new(digest)
}
