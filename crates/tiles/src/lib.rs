//! Scene-side store for finalized tile text geometry.
//!
//! [`TileTextCache`] is purely reactive: it applies the four lifecycle
//! messages the render worker emits (clear, stage, finalize, unload) and
//! answers lookups with finalized batches. It never computes geometry,
//! never requests anything, and holds no eviction policy of its own; the
//! worker is the single authority on which tiles exist.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use render_protocol::{MeshChunk, SheetId, TilePos, WorldRect};
use slotmap::SlotMap;
use smallvec::SmallVec;

slotmap::new_key_type! {
    pub struct BatchKey;
}

/// Geometry a renderer may draw: every chunk delivered for one tile between
/// its clear and the finalize that published it.
#[derive(Debug, Default)]
pub struct MeshBatch {
    chunks: SmallVec<[MeshChunk; 2]>,
}

impl MeshBatch {
    pub fn chunks(&self) -> &[MeshChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total vertices across chunks.
    pub fn vertex_count(&self) -> u64 {
        self.chunks
            .iter()
            .map(|chunk| chunk.vertex_count as u64)
            .sum()
    }
}

#[derive(Debug)]
struct TileEntry {
    view_rect: WorldRect,
    visible: Option<BatchKey>,
    staged: Option<BatchKey>,
}

/// Per-sheet tile map over a shared batch arena.
#[derive(Debug, Default)]
pub struct TileTextCache {
    batches: SlotMap<BatchKey, MeshBatch>,
    sheets: HashMap<SheetId, HashMap<TilePos, TileEntry>>,
}

impl TileTextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-reset a tile. Both its visible and staged batches are
    /// released; until the next finalize the tile shows as empty space
    /// reserved at `view_rect`.
    pub fn clear(&mut self, sheet_id: &SheetId, tile: TilePos, view_rect: WorldRect) {
        let tiles = self.sheets.entry(sheet_id.clone()).or_default();
        match tiles.entry(tile) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if let Some(key) = entry.visible.take() {
                    self.batches.remove(key);
                }
                if let Some(key) = entry.staged.take() {
                    self.batches.remove(key);
                }
                entry.view_rect = view_rect;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TileEntry {
                    view_rect,
                    visible: None,
                    staged: None,
                });
            }
        }
    }

    /// Append one delivery to the tile's staged batch. Chunks for tiles the
    /// cache does not track (stragglers racing an unload) are dropped and
    /// can never become visible.
    pub fn stage(&mut self, sheet_id: &SheetId, tile: TilePos, chunk: MeshChunk) {
        let Some(entry) = self
            .sheets
            .get_mut(sheet_id)
            .and_then(|tiles| tiles.get_mut(&tile))
        else {
            log::debug!("mesh chunk for untracked tile {tile:?} on sheet {sheet_id} dropped");
            return;
        };
        if !chunk.is_well_formed() {
            log::warn!(
                "malformed mesh chunk for tile {tile:?} on sheet {sheet_id} dropped: {} bytes for {} vertices, {} indices",
                chunk.payload.len(),
                chunk.vertex_count,
                chunk.index_count
            );
            return;
        }
        let key = match entry.staged {
            Some(key) => key,
            None => {
                let key = self.batches.insert(MeshBatch::default());
                entry.staged = Some(key);
                key
            }
        };
        self.batches[key].chunks.push(chunk);
    }

    /// Publish the staged batch, releasing whatever was visible before. A
    /// tile finalized with nothing staged becomes a visible empty batch,
    /// which is how blank regions render.
    pub fn finalize(&mut self, sheet_id: &SheetId, tile: TilePos) {
        let Some(entry) = self
            .sheets
            .get_mut(sheet_id)
            .and_then(|tiles| tiles.get_mut(&tile))
        else {
            log::warn!("finalize for untracked tile {tile:?} on sheet {sheet_id} ignored");
            return;
        };
        let next = match entry.staged.take() {
            Some(key) => key,
            None => self.batches.insert(MeshBatch::default()),
        };
        if let Some(previous) = entry.visible.replace(next) {
            self.batches.remove(previous);
        }
    }

    /// Forget the tile entirely, releasing both batches.
    pub fn unload(&mut self, sheet_id: &SheetId, tile: TilePos) {
        let Some(tiles) = self.sheets.get_mut(sheet_id) else {
            log::debug!("unload for unknown sheet {sheet_id} ignored");
            return;
        };
        let Some(entry) = tiles.remove(&tile) else {
            log::debug!("unload for untracked tile {tile:?} on sheet {sheet_id} ignored");
            return;
        };
        if let Some(key) = entry.visible {
            self.batches.remove(key);
        }
        if let Some(key) = entry.staged {
            self.batches.remove(key);
        }
        if tiles.is_empty() {
            self.sheets.remove(sheet_id);
        }
    }

    /// Finalized geometry for a tile. Staged-but-unpublished chunks are
    /// invisible here.
    pub fn batch(&self, sheet_id: &SheetId, tile: TilePos) -> Option<&MeshBatch> {
        let entry = self.sheets.get(sheet_id)?.get(&tile)?;
        self.batches.get(entry.visible?)
    }

    /// World-space footprint recorded by the tile's last clear.
    pub fn view_rect(&self, sheet_id: &SheetId, tile: TilePos) -> Option<WorldRect> {
        let entry = self.sheets.get(sheet_id)?.get(&tile)?;
        Some(entry.view_rect)
    }

    /// Tracked tiles across all sheets.
    pub fn len(&self) -> usize {
        self.sheets.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn sheet_tile_count(&self, sheet_id: &SheetId) -> usize {
        self.sheets.get(sheet_id).map_or(0, HashMap::len)
    }

    pub fn sheet_tiles<'cache>(
        &'cache self,
        sheet_id: &SheetId,
    ) -> impl Iterator<Item = TilePos> + 'cache {
        self.sheets
            .get(sheet_id)
            .into_iter()
            .flat_map(|tiles| tiles.keys().copied())
    }

    /// Live batches in the arena, staged and visible both. Equal to zero
    /// once every tile has been unloaded; a higher count than tracked
    /// batches would mean the swap path leaks.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }
}
