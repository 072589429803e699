use hashing::blake2_256;
use parity_scale_codec::{Decode, Encode};

use crate::{
    babe::BabePreDigest,
    digest::{Digest, DigestItem},
    error::Error,
    primitives::{BlockNumber, H256},
};

#[derive(Clone, PartialEq, Eq, Default, Debug, Encode, Decode)]
pub struct Header {
    pub parent_hash: H256,
    #[codec(compact)]
    pub number: BlockNumber,
    pub state_root: H256,
    pub extrinsics_root: H256,
    pub digest: Digest,
}

impl Header {
    #[must_use]
    pub fn new(parent_hash: H256, number: BlockNumber) -> Self {
        Self {
            parent_hash,
            number,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_digest_item(mut self, item: impl Into<DigestItem>) -> Self {
        self.digest.logs.push(item.into());
        self
    }

    /// Blake2b-256 of the SCALE encoding.
    ///
    /// Callers are expected to compute this once and pass it along with the header.
    #[must_use]
    pub fn hash(&self) -> H256 {
        self.using_encoded(blake2_256)
    }

    pub fn babe_pre_digest(&self) -> Result<Option<BabePreDigest>, Error> {
        self.digest.babe_pre_digest()
    }

    /// Whether the block was authored in a primary BABE slot.
    ///
    /// Headers without a BABE pre-digest (like the genesis header) are never primary.
    /// Headers reaching the block tree have already been validated,
    /// so a malformed pre-digest is treated the same way.
    #[must_use]
    pub fn is_primary_slot(&self) -> bool {
        matches!(self.babe_pre_digest(), Ok(Some(pre_digest)) if pre_digest.is_primary())
    }
}
