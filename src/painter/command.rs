//! Deferred draw commands and their block allocator.
//!
//! A command is a self-contained, replayable drawing request: a tagged
//! payload plus frozen references to the two state snapshots and the
//! pattern context it was recorded with. Commands are shared with every
//! worker through `Arc`; the last reference to drop (producer or any
//! worker, in any order) returns the command's bytes to the allocator.
//!
//! The allocator keeps a list of fixed-size blocks. Only the producer
//! bumps a block's position, but the outstanding-byte counter is atomic so
//! releases need no coordination. A block whose counter returns to zero is
//! rotated back to the head instead of growing the list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use super::state::{CapsState, ClipState};
use crate::geom::{IntBox, IntPoint};
use crate::glyph::GlyphSet;
use crate::image::Image;
use crate::pattern::PatternContext;
use crate::raster::Rasterizer;

/// Capacity of the command ring.
pub(crate) const RASTER_MAX_COMMANDS: usize = 4096;

/// Nominal size of one allocator block, in bytes.
pub(crate) const COMMAND_BLOCK_SIZE: usize = 32_000;

/// Boxes carried inline by a single box command; larger requests are
/// split across commands.
pub(crate) const MAX_BOXES_PER_COMMAND: usize = 64;

#[derive(Debug)]
pub(crate) struct BlockShared {
    size: usize,
    used: AtomicUsize,
}

/// Accounting handle for one command's bytes; releasing is `Drop`.
#[derive(Debug)]
pub(crate) struct AllocToken {
    block: Arc<BlockShared>,
    size: usize,
}

impl Drop for AllocToken {
    fn drop(&mut self) {
        let prev = self.block.used.fetch_sub(self.size, Ordering::AcqRel);
        debug_assert!(prev >= self.size, "allocator release underflow");
    }
}

struct BlockSlot {
    shared: Arc<BlockShared>,
    pos: usize,
}

/// Producer-side block pool. `blocks[0]` is the head.
pub(crate) struct CommandAllocator {
    blocks: Vec<BlockSlot>,
}

impl CommandAllocator {
    pub(crate) fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub(crate) fn alloc(&mut self, size: usize) -> AllocToken {
        if let Some(head) = self.blocks.first_mut() {
            if head.pos + size <= head.shared.size {
                head.pos += size;
                head.shared.used.fetch_add(size, Ordering::AcqRel);
                return AllocToken {
                    block: head.shared.clone(),
                    size,
                };
            }
        }

        // Rotate a fully-drained block to the head before growing.
        if let Some(i) = self
            .blocks
            .iter()
            .position(|b| b.shared.size >= size && b.shared.used.load(Ordering::Acquire) == 0)
        {
            let mut block = self.blocks.remove(i);
            block.pos = size;
            block.shared.used.fetch_add(size, Ordering::AcqRel);
            let token = AllocToken {
                block: block.shared.clone(),
                size,
            };
            self.blocks.insert(0, block);
            return token;
        }

        let shared = Arc::new(BlockShared {
            size: COMMAND_BLOCK_SIZE.max(size),
            used: AtomicUsize::new(size),
        });
        let token = AllocToken {
            block: shared.clone(),
            size,
        };
        self.blocks.insert(0, BlockSlot { shared, pos: size });
        token
    }

    /// Total bytes still held by live commands.
    pub(crate) fn outstanding(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.shared.used.load(Ordering::Acquire))
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Drop for CommandAllocator {
    fn drop(&mut self) {
        // Teardown flushes first, so nothing may still be carved out.
        debug_assert_eq!(self.outstanding(), 0, "commands outlive the painter");
    }
}

// ── Command records ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct PathCommand {
    /// Sorted and clipped; workers only sweep it.
    pub(crate) rasterizer: Rasterizer,
}

#[derive(Debug)]
pub(crate) struct BoxCommand {
    pub(crate) boxes: SmallVec<[IntBox; MAX_BOXES_PER_COMMAND]>,
}

#[derive(Debug)]
pub(crate) struct ImageCommand {
    pub(crate) dst: IntBox,
    /// Source-image position matching `dst`'s top-left corner.
    pub(crate) src_x: i32,
    pub(crate) src_y: i32,
    pub(crate) image: Image,
}

#[derive(Debug)]
pub(crate) struct GlyphSetCommand {
    pub(crate) glyphs: Arc<GlyphSet>,
    pub(crate) pen: IntPoint,
    /// Already intersected with the clip.
    pub(crate) bounds: IntBox,
}

#[derive(Debug)]
pub(crate) enum CommandPayload {
    Path(PathCommand),
    Boxes(BoxCommand),
    Image(ImageCommand),
    GlyphSet(GlyphSetCommand),
}

pub(crate) struct Command {
    pub(crate) clip: Arc<ClipState>,
    pub(crate) caps: Arc<CapsState>,
    pub(crate) pattern: Option<Arc<PatternContext>>,
    pub(crate) payload: CommandPayload,
    // Held for the accounting side effect of its Drop.
    #[allow(dead_code)]
    alloc: AllocToken,
}

impl Command {
    pub(crate) fn new(
        allocator: &mut CommandAllocator,
        clip: Arc<ClipState>,
        caps: Arc<CapsState>,
        pattern: Option<Arc<PatternContext>>,
        payload: CommandPayload,
    ) -> Self {
        let size = std::mem::size_of::<Command>();
        let alloc = allocator.alloc(size);
        Self {
            clip,
            caps,
            pattern,
            payload,
            alloc,
        }
    }
}
