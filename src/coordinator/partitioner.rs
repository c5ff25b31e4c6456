use super::types::{Block, BlockState};
use crate::error::SieveError;

/// Splits `[2, range_end]` into consecutive blocks of `block_size` numbers.
/// Deterministic: the same inputs always yield the same ids and bounds, so
/// a requeued block is re-issued with identical bounds. The final block may
/// be shorter than `block_size`.
pub fn partition(range_end: u64, block_size: u64) -> Result<Vec<Block>, SieveError> {
    if block_size == 0 {
        return Err(SieveError::InvalidRange(
            "block_size must be positive".to_string(),
        ));
    }
    if range_end < 2 {
        return Err(SieveError::InvalidRange(format!(
            "range_end must be at least 2, got {}",
            range_end
        )));
    }

    let mut blocks = Vec::new();
    let mut lo = 2u64;
    let mut id = 0u64;
    while lo <= range_end {
        let hi = range_end.min(lo.saturating_add(block_size - 1));
        blocks.push(Block {
            id,
            lo,
            hi,
            state: BlockState::Pending,
        });
        id += 1;
        match hi.checked_add(1) {
            Some(next) => lo = next,
            None => break,
        }
    }

    Ok(blocks)
}
