// The `unused_crate_dependencies` lint checks every crate in a package separately.
// See <https://github.com/rust-lang/rust/issues/57274>.
#![allow(unused_crate_dependencies)]

use std::time::Instant;

use block_tree::{BlockTree, BlockTreeConfig};
use log::Level;
use types::{header::Header, primitives::H256};

fn child(parent: H256, number: u64, salt: u64) -> Header {
    Header {
        state_root: H256::from_low_u64_be(salt),
        ..Header::new(parent, number)
    }
}

#[test]
fn pruning_to_unknown_block_warns_and_changes_nothing() {
    let genesis = Header::default();
    let root = genesis.hash();
    let tree: BlockTree = BlockTree::from_root(root, &genesis, BlockTreeConfig::default());

    let header = child(root, 1, 1);
    let block = header.hash();

    tree.insert(block, &header, Instant::now())
        .expect("parent is the root");

    testing_logger::setup();

    assert!(tree.prune(H256::repeat_byte(0xee)).is_empty());
    assert!(tree.prune(root).is_empty());
    assert_eq!(tree.all_blocks().len(), 2);

    testing_logger::validate(|logs| {
        assert!(logs.iter().any(|log| {
            log.level == Level::Warn && log.body.contains("already pruned")
        }));
    });
}

#[test]
fn growing_past_threshold_warns_once() {
    let config = BlockTreeConfig {
        unfinalized_blocks_warning: 2,
        ..BlockTreeConfig::default()
    };

    let genesis = Header::default();
    let mut parent = genesis.hash();
    let tree: BlockTree = BlockTree::from_root(parent, &genesis, config);

    testing_logger::setup();

    for number in 1..=4 {
        let header = child(parent, number, number);
        parent = header.hash();

        tree.insert(parent, &header, Instant::now())
            .expect("parent was inserted in the previous iteration");
    }

    testing_logger::validate(|logs| {
        let warnings = logs
            .iter()
            .filter(|log| log.level == Level::Warn && log.body.contains("unfinalized blocks"))
            .count();

        assert_eq!(warnings, 1);
    });
}

#[test]
fn finalization_logs_new_root() {
    let genesis = Header::default();
    let root = genesis.hash();
    let tree: BlockTree = BlockTree::from_root(root, &genesis, BlockTreeConfig::default());

    let header = child(root, 1, 1);
    let block = header.hash();

    tree.insert(block, &header, Instant::now())
        .expect("parent is the root");

    testing_logger::setup();

    tree.prune(block);

    testing_logger::validate(|logs| {
        assert!(logs.iter().any(|log| {
            log.level == Level::Info && log.body.contains("block tree root moved")
        }));
    });
}
