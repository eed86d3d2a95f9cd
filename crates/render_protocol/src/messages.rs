//! The two message families crossing the host/worker boundary.
//!
//! Control messages flow host -> worker, render messages worker -> host.
//! Both enums are `#[non_exhaustive]`: endpoints built against an older
//! protocol revision keep compiling when variants are added, and their
//! wildcard arm is expected to log the unknown [`kind`](ControlMessage::kind)
//! and carry on rather than fail.

use crate::data::DataPort;
use crate::fonts::BitmapFontSpec;
use crate::grid::{SheetId, TilePos, WorldRect};
use crate::mesh::MeshChunk;

/// Correlates a request with its eventual response.
///
/// Ids are allocated by the requesting side from a monotonically increasing
/// counter and are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Host -> render worker.
#[derive(Debug)]
#[non_exhaustive]
pub enum ControlMessage {
    /// First message of every session. Carries the measured fonts and the
    /// worker's half of the data-engine channel; the port is moved here and
    /// the host retains no access to it.
    Init {
        fonts: Vec<BitmapFontSpec>,
        data_port: DataPort,
    },
    /// The visible region changed. Supersedes every earlier `Viewport`.
    Viewport { sheet_id: SheetId, rect: WorldRect },
    /// A column or row is being resized interactively. Exactly one of
    /// `column`/`row` is set; `size` is the new width or height.
    OffsetsDelta {
        sheet_id: SheetId,
        column: Option<i64>,
        row: Option<i64>,
        size: f64,
    },
    /// Show or hide one cell's label without touching its neighbors.
    ShowLabel {
        sheet_id: SheetId,
        column: i64,
        row: i64,
        visible: bool,
    },
    /// Widest rendered text in a column, answered with
    /// [`RenderMessage::ColumnMaxWidthResponse`] carrying the same id.
    ColumnMaxWidth {
        id: RequestId,
        sheet_id: SheetId,
        column: i64,
    },
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Init { .. } => "Init",
            ControlMessage::Viewport { .. } => "Viewport",
            ControlMessage::OffsetsDelta { .. } => "OffsetsDelta",
            ControlMessage::ShowLabel { .. } => "ShowLabel",
            ControlMessage::ColumnMaxWidth { .. } => "ColumnMaxWidth",
        }
    }
}

/// Render worker -> host.
#[derive(Debug)]
#[non_exhaustive]
pub enum RenderMessage {
    /// Drop everything previously delivered for this tile and reserve its
    /// world-space footprint. Always precedes the tile's mesh deliveries.
    TileClear {
        sheet_id: SheetId,
        tile: TilePos,
        view_rect: WorldRect,
    },
    /// One atlas worth of packed glyph geometry for a tile. A tile may
    /// receive zero or more of these between clear and finalize.
    MeshDelivery {
        sheet_id: SheetId,
        tile: TilePos,
        chunk: MeshChunk,
    },
    /// The tile's deliveries since its last clear form a complete, coherent
    /// snapshot and may be shown.
    TileFinalize { sheet_id: SheetId, tile: TilePos },
    /// The tile left the visible region; release everything held for it.
    TileUnload { sheet_id: SheetId, tile: TilePos },
    /// Every tile of the first visible region has been finalized at least
    /// once. Sent exactly once per session.
    FirstRenderComplete,
    /// Answer to [`ControlMessage::ColumnMaxWidth`] with the matching id.
    ColumnMaxWidthResponse { id: RequestId, max_width: f64 },
}

impl RenderMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderMessage::TileClear { .. } => "TileClear",
            RenderMessage::MeshDelivery { .. } => "MeshDelivery",
            RenderMessage::TileFinalize { .. } => "TileFinalize",
            RenderMessage::TileUnload { .. } => "TileUnload",
            RenderMessage::FirstRenderComplete => "FirstRenderComplete",
            RenderMessage::ColumnMaxWidthResponse { .. } => "ColumnMaxWidthResponse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: kind strings are stable; they are the only name an endpoint has
    /// for a variant it does not understand.
    #[test]
    fn test_kind_names_every_variant() {
        let control = ControlMessage::Viewport {
            sheet_id: SheetId::from("s1"),
            rect: WorldRect::new(0.0, 0.0, 800.0, 600.0),
        };
        assert_eq!(control.kind(), "Viewport");

        let render = RenderMessage::FirstRenderComplete;
        assert_eq!(render.kind(), "FirstRenderComplete");

        let unload = RenderMessage::TileUnload {
            sheet_id: SheetId::from("s1"),
            tile: TilePos::new(0, 0),
        };
        assert_eq!(unload.kind(), "TileUnload");
    }

    #[test]
    fn request_ids_order_by_allocation() {
        assert!(RequestId(1) < RequestId(2));
        assert_eq!(RequestId(3), RequestId(3));
    }
}
