use thiserror::Error;
use types::primitives::{BlockNumber, H256};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("block tree already has a root: {root:?}")]
    AlreadyInitialized { root: H256 },
    #[error("block already exists in block tree: {block_hash:?}")]
    BlockExists { block_hash: H256 },
    #[error("block tree has no root")]
    EmptyTree,
    #[error("runtime handle not found for block {block_hash:?}")]
    HandleNotFound { block_hash: H256 },
    #[error("blocks have no common ancestor: {a:?} and {b:?}")]
    NoCommonAncestor { a: H256, b: H256 },
    #[error("block not found in block tree: {block_hash:?}")]
    NodeNotFound { block_hash: H256 },
    #[error("block {descendant:?} is not a descendant of {ancestor:?}")]
    NotDescendant { ancestor: H256, descendant: H256 },
    #[error("number {number} is above best block number {best_number}")]
    NumberTooHigh {
        number: BlockNumber,
        best_number: BlockNumber,
    },
    #[error("number {number} is below root number {root_number}")]
    NumberTooLow {
        number: BlockNumber,
        root_number: BlockNumber,
    },
    #[error("parent not found in block tree: {parent_hash:?}")]
    ParentNotFound { parent_hash: H256 },
    #[error("block number {number} does not follow parent number {parent_number}")]
    UnexpectedNumber {
        parent_number: BlockNumber,
        number: BlockNumber,
    },
}
