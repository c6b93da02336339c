//! Item location — the (block offset, item index) pair that uniquely
//! identifies an item in a container file.

/// A plain value type. Index callbacks take it by value; `Scanner::seek`
/// accepts it to resume reading at a specific item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemLocation {
    /// Byte offset of the item's owning block, measured from the start of
    /// the file (the offset of that block's first chunk).
    pub block_offset: u64,
    /// Index of the item within that block.
    pub item_index: u32,
}

impl ItemLocation {
    pub fn new(block_offset: u64, item_index: u32) -> Self {
        Self {
            block_offset,
            item_index,
        }
    }
}
