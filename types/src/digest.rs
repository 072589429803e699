use parity_scale_codec::{Decode, Encode};

use crate::{
    babe::BabePreDigest, consts::BABE_ENGINE_ID, error::Error, primitives::ConsensusEngineId,
};

#[derive(Clone, PartialEq, Eq, Default, Debug, Encode, Decode)]
pub struct Digest {
    pub logs: Vec<DigestItem>,
}

impl From<Vec<DigestItem>> for Digest {
    fn from(logs: Vec<DigestItem>) -> Self {
        Self { logs }
    }
}

impl Digest {
    /// Finds the first BABE pre-runtime item and decodes it.
    ///
    /// Returns `Ok(None)` if there is no such item.
    pub fn babe_pre_digest(&self) -> Result<Option<BabePreDigest>, Error> {
        self.logs
            .iter()
            .find_map(|item| match item {
                DigestItem::PreRuntime(engine_id, data) if *engine_id == BABE_ENGINE_ID => {
                    Some(data)
                }
                _ => None,
            })
            .map(|data| BabePreDigest::from_bytes(data))
            .transpose()
    }
}

// Variant indices are part of the header encoding and therefore of block hashes.
#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub enum DigestItem {
    #[codec(index = 0)]
    Other(Vec<u8>),
    #[codec(index = 4)]
    Consensus(ConsensusEngineId, Vec<u8>),
    #[codec(index = 5)]
    Seal(ConsensusEngineId, Vec<u8>),
    #[codec(index = 6)]
    PreRuntime(ConsensusEngineId, Vec<u8>),
}

impl From<BabePreDigest> for DigestItem {
    fn from(pre_digest: BabePreDigest) -> Self {
        Self::PreRuntime(BABE_ENGINE_ID, pre_digest.encode())
    }
}
