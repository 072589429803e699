pub use ethereum_types::{H256, H512};

pub type AuthorityIndex = u32;
pub type BlockNumber = u64;
pub type ConsensusEngineId = [u8; 4];
pub type Slot = u64;
pub type VrfOutput = H256;
pub type VrfProof = H512;
