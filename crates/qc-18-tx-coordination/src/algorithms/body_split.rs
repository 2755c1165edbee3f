//! Body separation by miniblock type.

use std::collections::BTreeMap;

use shared_types::{BlockType, Body};

/// Group the miniblocks of `body` by type.
///
/// Miniblocks keep their body order inside a group; groups iterate in
/// ascending type order.
pub fn separate_body_by_type(body: &Body) -> BTreeMap<BlockType, Body> {
    let mut separated: BTreeMap<BlockType, Body> = BTreeMap::new();
    for mini_block in &body.mini_blocks {
        separated
            .entry(mini_block.block_type)
            .or_default()
            .mini_blocks
            .push(mini_block.clone());
    }
    separated
}
