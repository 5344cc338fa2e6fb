//! Contiguous N-of-N splitting of secret bytes.
//!
//! This is plain partitioning, not threshold secret sharing: every shard
//! is required to rebuild the secret and each shard holds a readable slice
//! of it before encryption.  It only multiplies the number of encrypted
//! artifacts an attacker has to collect.

use zeroize::Zeroizing;

/// Split `secret` into `n` contiguous pieces.
///
/// Piece sizes differ by at most one byte; the first `len % n` pieces
/// are the longer ones.  When `secret` is shorter than `n`, trailing
/// pieces are empty.
///
/// # Panics
///
/// Panics if `n` is zero.  Shard counts are validated when the vault
/// is opened, so this only fires on a programming error.
pub fn split(secret: &[u8], n: usize) -> Vec<Zeroizing<Vec<u8>>> {
    assert!(n > 0, "shard count must be at least 1");

    let base = secret.len() / n;
    let extra = secret.len() % n;

    let mut shards = Vec::with_capacity(n);
    let mut offset = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        shards.push(Zeroizing::new(secret[offset..offset + len].to_vec()));
        offset += len;
    }
    shards
}

/// Concatenate shards in index order.
///
/// No validation is done here; integrity is checked when each shard is
/// decrypted.
pub fn join<S: AsRef<[u8]>>(shards: &[S]) -> Zeroizing<Vec<u8>> {
    let total = shards.iter().map(|s| s.as_ref().len()).sum();
    let mut secret = Zeroizing::new(Vec::with_capacity(total));
    for shard in shards {
        secret.extend_from_slice(shard.as_ref());
    }
    secret
}
