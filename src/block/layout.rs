//! Block size constants and offset-to-block math.

pub const DEFAULT_BLOCK_SIZE: u32 = 512 * 1024;

/// How a file's byte range maps onto fixed-size blocks, plus the per-request
/// I/O bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub block_size: u32,
    /// Largest request the I/O engine accepts, in blocks.
    pub max_io_blocks: u32,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_io_blocks: 4,
        }
    }
}

impl BlockLayout {
    /// Largest read/write buffer accepted, in bytes.
    pub fn max_io(&self) -> usize {
        self.block_size as usize * self.max_io_blocks as usize
    }

    pub fn block_index(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    /// Byte offset of the first byte of `index`.
    pub fn block_offset(&self, index: u64) -> u64 {
        index * self.block_size as u64
    }

    /// Index of the block holding the last valid byte of a `len`-byte file.
    pub fn last_block(&self, len: u64) -> u64 {
        if len == 0 {
            0
        } else {
            (len - 1) / self.block_size as u64
        }
    }

    /// Inclusive block range covering `[offset, offset + len)`, clipped to
    /// the block containing the last valid byte of a `file_len`-byte file.
    ///
    /// Requires `len > 0`.
    pub fn block_range(&self, offset: u64, len: usize, file_len: u64) -> (u64, u64) {
        debug_assert!(len > 0);
        let start = self.block_index(offset);
        let end = self
            .block_index(offset + len as u64 - 1)
            .min(self.last_block(file_len));
        (start, end.max(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_within_single_block() {
        let layout = BlockLayout::default();
        let (s, e) = layout.block_range(123, 4096, 1 << 30);
        assert_eq!((s, e), (0, 0));
    }

    #[test]
    fn range_across_two_blocks() {
        let layout = BlockLayout::default();
        let bs = layout.block_size as u64;
        let (s, e) = layout.block_range(bs - 10, 100, 1 << 30);
        assert_eq!((s, e), (0, 1));
    }

    #[test]
    fn range_clipped_to_eof_block() {
        let layout = BlockLayout::default();
        let bs = layout.block_size as u64;
        // file ends inside block 1, request reaches into block 3
        let (s, e) = layout.block_range(bs / 2, layout.max_io(), bs + bs / 2);
        assert_eq!((s, e), (0, 1));
    }

    #[test]
    fn last_block_at_exact_multiple() {
        let layout = BlockLayout::default();
        let bs = layout.block_size as u64;
        assert_eq!(layout.last_block(bs), 0);
        assert_eq!(layout.last_block(bs + 1), 1);
        assert_eq!(layout.last_block(0), 0);
    }
}
