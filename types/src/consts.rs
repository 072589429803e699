use crate::primitives::ConsensusEngineId;

pub const BABE_ENGINE_ID: ConsensusEngineId = *b"BABE";
pub const GRANDPA_ENGINE_ID: ConsensusEngineId = *b"FRNK";
