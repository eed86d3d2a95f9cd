//! Channel pair linking the render worker to the cell data engine.
//!
//! The host creates the pair, keeps nothing, and forwards the worker-side
//! half inside [`ControlMessage::Init`](crate::ControlMessage::Init). After
//! that the render worker talks to the data engine directly; cell content
//! never flows through the host.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::fonts::FontStyle;
use crate::grid::{CellRect, SheetId};
use crate::messages::RequestId;

/// Horizontal alignment of a cell's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// One renderable cell as reported by the data engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCell {
    pub column: i64,
    pub row: i64,
    pub text: String,
    pub align: CellAlign,
    pub style: FontStyle,
}

/// Render worker -> data engine.
#[derive(Debug)]
#[non_exhaustive]
pub enum DataRequest {
    /// All renderable cells intersecting `rect`. An empty cell list is a
    /// valid answer and means the region is blank.
    RenderCells {
        id: RequestId,
        sheet_id: SheetId,
        rect: CellRect,
    },
}

impl DataRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            DataRequest::RenderCells { .. } => "RenderCells",
        }
    }
}

/// Data engine -> render worker.
#[derive(Debug)]
#[non_exhaustive]
pub enum DataResponse {
    RenderCells {
        id: RequestId,
        sheet_id: SheetId,
        cells: Vec<RenderCell>,
    },
}

impl DataResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            DataResponse::RenderCells { .. } => "RenderCells",
        }
    }
}

/// Render-worker-side endpoints.
#[derive(Debug)]
pub struct DataPort {
    pub requests: Sender<DataRequest>,
    pub responses: Receiver<DataResponse>,
}

/// Data-engine-side endpoints.
#[derive(Debug)]
pub struct DataHost {
    pub requests: Receiver<DataRequest>,
    pub responses: Sender<DataResponse>,
}

/// Builds the connected pair. Both directions are unbounded FIFOs, so a
/// slow consumer delays delivery but never drops or reorders it.
pub fn data_channel() -> (DataPort, DataHost) {
    let (request_tx, request_rx) = unbounded();
    let (response_tx, response_rx) = unbounded();
    (
        DataPort {
            requests: request_tx,
            responses: response_rx,
        },
        DataHost {
            requests: request_rx,
            responses: response_tx,
        },
    )
}
