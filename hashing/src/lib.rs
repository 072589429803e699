use blake2b_simd::Params;
use ethereum_types::H256;

#[inline]
#[must_use]
pub fn blake2<const N: usize>(bytes: &[u8]) -> [u8; N] {
    Params::new()
        .hash_length(N)
        .hash(bytes)
        .as_bytes()
        .try_into()
        .expect("digest length is set to N")
}

#[inline]
#[must_use]
pub fn blake2_256(bytes: &[u8]) -> H256 {
    H256(blake2(bytes))
}
