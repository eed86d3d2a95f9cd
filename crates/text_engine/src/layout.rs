//! Single-line cell layout and mesh packing.
//!
//! Layout runs once per data response and caches glyph quads relative to
//! each label's run origin. Packing turns those cached runs into world-space
//! mesh chunks for the current offsets, which is what lets a resize drag
//! re-emit geometry without touching the data engine.

use std::collections::{BTreeMap, HashSet};

use render_protocol::{
    AtlasId, BitmapFontSpec, CELL_TEXT_PADDING, CellAlign, CellRect, FontStyle,
    MESH_CHUNK_GLYPH_LIMIT, MeshChunk, MeshPayload, MeshVertex, RenderCell,
};

use crate::offsets::SheetOffsets;

/// The font specs received at init, indexed by style.
#[derive(Debug, Default)]
pub struct FontTable {
    specs: [Option<BitmapFontSpec>; FontStyle::COUNT],
}

impl FontTable {
    pub fn new(specs: Vec<BitmapFontSpec>) -> Self {
        let mut table = Self::default();
        for spec in specs {
            let index = spec.style.index();
            if table.specs[index].is_some() {
                log::debug!("font spec for {:?} replaces an earlier one", spec.style);
            }
            table.specs[index] = Some(spec);
        }
        table
    }

    /// Spec for a style, falling back to regular when that variant was not
    /// provided.
    pub fn spec(&self, style: FontStyle) -> Option<&BitmapFontSpec> {
        self.specs[style.index()]
            .as_ref()
            .or_else(|| self.specs[FontStyle::Regular.index()].as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.specs.iter().all(Option::is_none)
    }
}

/// One glyph quad relative to its label's run origin.
#[derive(Debug, Clone, Copy)]
struct GlyphQuad {
    dx: f64,
    dy: f64,
    width: f64,
    height: f64,
    uv: [f32; 4],
}

/// Cached layout of one cell's text.
#[derive(Debug)]
pub struct LabelLayout {
    column: i64,
    row: i64,
    align: CellAlign,
    atlas: AtlasId,
    width: f64,
    glyphs: Vec<GlyphQuad>,
}

impl LabelLayout {
    pub fn column(&self) -> i64 {
        self.column
    }

    pub fn width(&self) -> f64 {
        self.width
    }
}

/// All labels laid out for one tile, cached until the tile unloads.
#[derive(Debug, Default)]
pub struct TileLayout {
    labels: Vec<LabelLayout>,
}

impl TileLayout {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[LabelLayout] {
        &self.labels
    }

    /// Widest laid-out text in the column, hidden labels included.
    pub fn max_label_width(&self, column: i64) -> Option<f64> {
        self.labels
            .iter()
            .filter(|label| label.column == column)
            .map(LabelLayout::width)
            .fold(None, |widest, width| {
                Some(widest.map_or(width, |value: f64| value.max(width)))
            })
    }
}

/// Lay out every renderable cell of one tile.
///
/// Cells outside `bounds` and cells whose style resolves to no font are
/// skipped. Characters missing from the atlas advance the pen without
/// producing a quad. The pen runs along the baseline, which sits `ascent`
/// below the row top; that drop is baked into each cached quad so packing
/// stays purely positional.
pub fn layout_cells(cells: Vec<RenderCell>, bounds: CellRect, fonts: &FontTable) -> TileLayout {
    let mut labels = Vec::with_capacity(cells.len());
    for cell in cells {
        if cell.text.is_empty() {
            continue;
        }
        if !bounds.contains(cell.column, cell.row) {
            log::debug!(
                "cell ({}, {}) outside requested range dropped",
                cell.column,
                cell.row
            );
            continue;
        }
        let Some(font) = fonts.spec(cell.style) else {
            log::trace!(
                "no font for style {:?}; cell ({}, {}) skipped",
                cell.style,
                cell.column,
                cell.row
            );
            continue;
        };

        let mut glyphs = Vec::new();
        let mut pen = 0.0f64;
        for ch in cell.text.chars() {
            if let Some(metrics) = font.glyph(ch) {
                glyphs.push(GlyphQuad {
                    dx: pen + metrics.offset[0],
                    dy: font.ascent + metrics.offset[1],
                    width: metrics.size[0],
                    height: metrics.size[1],
                    uv: metrics.uv,
                });
            }
            pen += font.advance_of(ch);
        }
        labels.push(LabelLayout {
            column: cell.column,
            row: cell.row,
            align: cell.align,
            atlas: font.atlas,
            width: pen,
            glyphs,
        });
    }
    labels.sort_by_key(|label| (label.row, label.column));
    TileLayout { labels }
}

/// Pack a cached layout into chunks under the current offsets.
///
/// One chunk per atlas, split when a chunk reaches
/// [`MESH_CHUNK_GLYPH_LIMIT`] quads. Labels in `hidden` contribute nothing.
pub fn pack_tile(
    layout: &TileLayout,
    offsets: &SheetOffsets,
    hidden: &HashSet<(i64, i64)>,
) -> Vec<MeshChunk> {
    let mut buckets: BTreeMap<AtlasId, AtlasBucket> = BTreeMap::new();
    for label in &layout.labels {
        if label.glyphs.is_empty() || hidden.contains(&(label.column, label.row)) {
            continue;
        }
        let origin_x = label_origin_x(offsets, label);
        let origin_y = offsets.row_position(label.row);
        let bucket = buckets.entry(label.atlas).or_insert_with(AtlasBucket::default);
        for quad in &label.glyphs {
            bucket.push_quad(
                origin_x + quad.dx,
                origin_y + quad.dy,
                quad.width,
                quad.height,
                quad.uv,
            );
        }
    }
    buckets
        .into_iter()
        .flat_map(|(atlas, bucket)| bucket.finish(atlas))
        .collect()
}

fn label_origin_x(offsets: &SheetOffsets, label: &LabelLayout) -> f64 {
    let cell_x = offsets.column_position(label.column);
    let inner = offsets.column_width(label.column) - 2.0 * CELL_TEXT_PADDING;
    let align_shift = match label.align {
        CellAlign::Left => 0.0,
        CellAlign::Center => (inner - label.width) / 2.0,
        CellAlign::Right => inner - label.width,
    };
    cell_x + CELL_TEXT_PADDING + align_shift
}

#[derive(Debug, Default)]
struct AtlasBucket {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    chunks: Vec<ChunkParts>,
}

#[derive(Debug)]
struct ChunkParts {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
}

impl AtlasBucket {
    fn push_quad(&mut self, x: f64, y: f64, width: f64, height: f64, uv: [f32; 4]) {
        let (x0, y0) = (x as f32, y as f32);
        let (x1, y1) = ((x + width) as f32, (y + height) as f32);
        let [u0, v0, u1, v1] = uv;
        let base = self.vertices.len() as u32;
        self.vertices.extend([
            MeshVertex { x: x0, y: y0, u: u0, v: v0 },
            MeshVertex { x: x1, y: y0, u: u1, v: v0 },
            MeshVertex { x: x1, y: y1, u: u1, v: v1 },
            MeshVertex { x: x0, y: y1, u: u0, v: v1 },
        ]);
        self.indices
            .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        if self.vertices.len() >= MESH_CHUNK_GLYPH_LIMIT * 4 {
            self.split();
        }
    }

    fn split(&mut self) {
        if self.vertices.is_empty() {
            return;
        }
        self.chunks.push(ChunkParts {
            vertices: std::mem::take(&mut self.vertices),
            indices: std::mem::take(&mut self.indices),
        });
    }

    fn finish(mut self, atlas: AtlasId) -> Vec<MeshChunk> {
        self.split();
        self.chunks
            .into_iter()
            .map(|parts| MeshChunk {
                atlas,
                vertex_count: parts.vertices.len() as u32,
                index_count: parts.indices.len() as u32,
                payload: MeshPayload::pack(&parts.vertices, &parts.indices),
            })
            .collect()
    }
}
