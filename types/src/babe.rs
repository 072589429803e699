//! BABE pre-runtime digest.
//!
//! Block authors put one of these into the header of every block they produce.
//! The block tree only needs to know whether the block was authored in a primary slot.
//!
//! The digest is SCALE-encoded as an enum with explicit variant indices:
//!
//! | index | variant          | fields                                        |
//! |-------|------------------|-----------------------------------------------|
//! | 1     | `Primary`        | authority index, slot, VRF output, VRF proof  |
//! | 2     | `SecondaryPlain` | authority index, slot                         |
//! | 3     | `SecondaryVrf`   | authority index, slot, VRF output, VRF proof  |

use parity_scale_codec::{Decode, DecodeAll as _, Encode};

use crate::{
    error::Error,
    primitives::{AuthorityIndex, Slot, VrfOutput, VrfProof},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Encode, Decode)]
pub enum BabePreDigest {
    #[codec(index = 1)]
    Primary {
        authority_index: AuthorityIndex,
        slot: Slot,
        vrf_output: VrfOutput,
        vrf_proof: VrfProof,
    },
    #[codec(index = 2)]
    SecondaryPlain {
        authority_index: AuthorityIndex,
        slot: Slot,
    },
    #[codec(index = 3)]
    SecondaryVrf {
        authority_index: AuthorityIndex,
        slot: Slot,
        vrf_output: VrfOutput,
        vrf_proof: VrfProof,
    },
}

impl BabePreDigest {
    #[must_use]
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::Primary { .. })
    }

    #[must_use]
    pub const fn slot(self) -> Slot {
        match self {
            Self::Primary { slot, .. }
            | Self::SecondaryPlain { slot, .. }
            | Self::SecondaryVrf { slot, .. } => slot,
        }
    }

    #[must_use]
    pub const fn authority_index(self) -> AuthorityIndex {
        match self {
            Self::Primary {
                authority_index, ..
            }
            | Self::SecondaryPlain {
                authority_index, ..
            }
            | Self::SecondaryVrf {
                authority_index, ..
            } => authority_index,
        }
    }

    /// Decodes a pre-digest that must take up all of `bytes`.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, Error> {
        Self::decode_all(&mut bytes).map_err(|source| Error::MalformedPreDigest { source })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use test_case::test_case;

    use super::*;

    #[test_case(
        BabePreDigest::Primary {
            authority_index: 3,
            slot: 42,
            vrf_output: VrfOutput::repeat_byte(7),
            vrf_proof: VrfProof::repeat_byte(8),
        },
        true;
        "primary"
    )]
    #[test_case(
        BabePreDigest::SecondaryPlain { authority_index: 3, slot: 42 },
        false;
        "secondary plain"
    )]
    #[test_case(
        BabePreDigest::SecondaryVrf {
            authority_index: 3,
            slot: 42,
            vrf_output: VrfOutput::zero(),
            vrf_proof: VrfProof::zero(),
        },
        false;
        "secondary vrf"
    )]
    fn pre_digest_survives_encoding(pre_digest: BabePreDigest, primary: bool) {
        let decoded = BabePreDigest::from_bytes(&pre_digest.encode())
            .expect("encoded pre-digest should decode");

        assert_eq!(decoded, pre_digest);
        assert_eq!(decoded.is_primary(), primary);
        assert_eq!(decoded.slot(), 42);
        assert_eq!(decoded.authority_index(), 3);
    }

    #[test]
    fn secondary_plain_encoding_is_index_then_little_endian_fields() {
        let pre_digest = BabePreDigest::SecondaryPlain {
            authority_index: 1,
            slot: 0x0102,
        };

        assert_eq!(
            pre_digest.encode(),
            hex!("02 01000000 0201000000000000"),
        );
    }

    #[test]
    fn primary_encoding_carries_vrf_output_and_proof() {
        let pre_digest = BabePreDigest::Primary {
            authority_index: 0,
            slot: 0,
            vrf_output: VrfOutput::repeat_byte(0xaa),
            vrf_proof: VrfProof::repeat_byte(0xbb),
        };

        let encoded = pre_digest.encode();

        assert_eq!(encoded.len(), 1 + 4 + 8 + 32 + 64);
        assert_eq!(encoded[0], 1);
        assert_eq!(&encoded[13..45], [0xaa; 32]);
        assert_eq!(&encoded[45..], [0xbb; 64]);
    }

    #[test_case(&[]; "empty")]
    #[test_case(&[9, 0, 0]; "unknown variant index")]
    #[test_case(&[1, 0, 0, 0, 0]; "truncated primary")]
    #[test_case(&[2; 1 + 4 + 8 + 1]; "trailing bytes")]
    fn malformed_pre_digest_is_rejected(bytes: &[u8]) {
        assert!(matches!(
            BabePreDigest::from_bytes(bytes),
            Err(Error::MalformedPreDigest { .. }),
        ));
    }
}
