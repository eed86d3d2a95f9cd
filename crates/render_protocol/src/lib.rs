//! Shared contract between the grid host and its text render worker.
//!
//! The two sides run on different threads and share no state; everything
//! they exchange is defined here. [`render_channel`] builds the connected
//! endpoint pair, [`ControlMessage`] and [`RenderMessage`] are the traffic,
//! and [`data_channel`] builds the separate port the worker uses to pull
//! cell content from the data engine.

pub mod data;
pub mod fonts;
pub mod grid;
pub mod mesh;
pub mod messages;

pub use data::{CellAlign, DataHost, DataPort, DataRequest, DataResponse, RenderCell, data_channel};
pub use fonts::{AtlasId, BitmapFontSpec, FontStyle, GlyphMetrics};
pub use grid::{
    CELL_TEXT_PADDING, CellRect, DEFAULT_COLUMN_WIDTH, DEFAULT_ROW_HEIGHT, SheetId, TILE_COLUMNS,
    TILE_ROWS, TilePos, WorldRect,
};
pub use mesh::{FLOATS_PER_VERTEX, MESH_CHUNK_GLYPH_LIMIT, MeshChunk, MeshPayload, MeshVertex};
pub use messages::{ControlMessage, RenderMessage, RequestId};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Endpoints kept by the host thread.
#[derive(Debug)]
pub struct HostChannels {
    pub control: Sender<ControlMessage>,
    pub render: Receiver<RenderMessage>,
}

/// Endpoints moved onto the render worker thread.
#[derive(Debug)]
pub struct WorkerChannels {
    pub control: Receiver<ControlMessage>,
    pub render: Sender<RenderMessage>,
}

/// Builds the host/worker channel pair.
///
/// Both directions are unbounded: sends never block or fail while the peer
/// is alive, and per-channel FIFO order is the delivery guarantee the rest
/// of the protocol is built on.
pub fn render_channel() -> (HostChannels, WorkerChannels) {
    let (control_tx, control_rx) = unbounded();
    let (render_tx, render_rx) = unbounded();
    (
        HostChannels {
            control: control_tx,
            render: render_rx,
        },
        WorkerChannels {
            control: control_rx,
            render: render_tx,
        },
    )
}
