//! The render worker's coordination core.
//!
//! [`TextEngine`] is owned exclusively by the worker thread, so none of its
//! state needs locking. Handlers mutate state and push outbound traffic into
//! an outbox; [`text_engine_loop`] drains the outbox onto the render channel
//! after every event, which keeps each message's side effects atomic from
//! the host's point of view.

use std::collections::{HashMap, HashSet};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, never, select};
use render_protocol::{
    BitmapFontSpec, CELL_TEXT_PADDING, ControlMessage, DataPort, DataRequest, DataResponse,
    RenderMessage, RequestId, SheetId, TilePos, WorkerChannels, WorldRect,
};

use crate::layout::{FontTable, TileLayout, layout_cells, pack_tile};
use crate::offsets::SheetOffsets;

/// Where an outstanding data request will land when it resolves.
#[derive(Debug, Clone)]
struct TileJob {
    sheet_id: SheetId,
    tile: TilePos,
}

/// Lifecycle of one visible tile. A tile with no slot is not tracked at all.
#[derive(Debug)]
enum TileSlot {
    /// Cleared and waiting for cell data.
    Pending { request: RequestId },
    /// Laid out and published at least once; the layout stays cached for
    /// offset repacks and width queries.
    Ready { layout: TileLayout },
}

#[derive(Debug, Default)]
struct SheetState {
    offsets: SheetOffsets,
    viewport: Option<WorldRect>,
    tiles: HashMap<TilePos, TileSlot>,
    hidden_labels: HashSet<(i64, i64)>,
}

/// Per-worker coordinator state.
pub struct TextEngine {
    fonts: FontTable,
    data: Option<DataPort>,
    next_request: u64,
    pending_data: HashMap<RequestId, TileJob>,
    sheets: HashMap<SheetId, SheetState>,
    outbox: Vec<RenderMessage>,
    first_render_sent: bool,
    viewport_seen: bool,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    pub fn new() -> Self {
        Self {
            fonts: FontTable::default(),
            data: None,
            next_request: 1,
            pending_data: HashMap::new(),
            sheets: HashMap::new(),
            outbox: Vec::new(),
            first_render_sent: false,
            viewport_seen: false,
        }
    }

    /// Messages produced since the last drain, in emission order.
    pub fn drain_outbox(&mut self) -> Vec<RenderMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Response endpoint of the current data port, if one was installed.
    pub fn data_responses(&self) -> Option<Receiver<DataResponse>> {
        self.data.as_ref().map(|port| port.responses.clone())
    }

    pub fn handle_control(&mut self, message: ControlMessage) {
        log::trace!("control message {}", message.kind());
        match message {
            ControlMessage::Init { fonts, data_port } => self.handle_init(fonts, data_port),
            ControlMessage::Viewport { sheet_id, rect } => self.handle_viewport(sheet_id, rect),
            ControlMessage::OffsetsDelta {
                sheet_id,
                column,
                row,
                size,
            } => self.handle_offsets_delta(sheet_id, column, row, size),
            ControlMessage::ShowLabel {
                sheet_id,
                column,
                row,
                visible,
            } => self.handle_show_label(sheet_id, column, row, visible),
            ControlMessage::ColumnMaxWidth {
                id,
                sheet_id,
                column,
            } => self.handle_column_max_width(id, sheet_id, column),
            other => log::warn!("unknown control message kind {} ignored", other.kind()),
        }
    }

    pub fn handle_data_response(&mut self, response: DataResponse) {
        match response {
            DataResponse::RenderCells {
                id,
                sheet_id,
                cells,
            } => {
                let Some(job) = self.pending_data.remove(&id) else {
                    // Superseded while in flight. Routine during scrolling,
                    // so not even a log line.
                    return;
                };
                if job.sheet_id != sheet_id {
                    log::debug!(
                        "data response {id:?} tagged with sheet {sheet_id}, request was for {}",
                        job.sheet_id
                    );
                }
                let Some(state) = self.sheets.get_mut(&job.sheet_id) else {
                    return;
                };
                match state.tiles.get(&job.tile) {
                    Some(TileSlot::Pending { request }) if *request == id => {}
                    _ => return,
                }
                let layout = layout_cells(cells, job.tile.cell_rect(), &self.fonts);
                state.tiles.insert(job.tile, TileSlot::Ready { layout });
                self.publish_tile(&job.sheet_id, job.tile);
                self.check_first_render();
            }
            other => log::warn!("unknown data response kind {} ignored", other.kind()),
        }
    }

    /// The data engine hung up. Outstanding tiles are unloaded so the host
    /// is never left holding a cleared tile that will not finalize; already
    /// published tiles stay valid.
    pub fn on_data_port_closed(&mut self) {
        if self.data.take().is_none() {
            return;
        }
        log::error!("data port disconnected; continuing without cell data");
        self.pending_data.clear();
        let mut flushed = Vec::new();
        for (sheet_id, state) in self.sheets.iter_mut() {
            let pending: Vec<TilePos> = state
                .tiles
                .iter()
                .filter(|(_, slot)| matches!(slot, TileSlot::Pending { .. }))
                .map(|(tile, _)| *tile)
                .collect();
            for tile in pending {
                state.tiles.remove(&tile);
                flushed.push((sheet_id.clone(), tile));
            }
        }
        for (sheet_id, tile) in flushed {
            self.outbox.push(RenderMessage::TileUnload { sheet_id, tile });
        }
    }

    fn handle_init(&mut self, fonts: Vec<BitmapFontSpec>, data_port: DataPort) {
        if self.data.is_some() || !self.fonts.is_empty() {
            // Last init wins. Cached layouts were measured with the old
            // fonts, so every tracked tile goes back through the data path.
            log::info!("re-initialized; resetting all tiles");
            self.pending_data.clear();
            let mut unloads = Vec::new();
            for (sheet_id, state) in self.sheets.iter_mut() {
                for (tile, _) in state.tiles.drain() {
                    unloads.push((sheet_id.clone(), tile));
                }
            }
            for (sheet_id, tile) in unloads {
                self.outbox.push(RenderMessage::TileUnload { sheet_id, tile });
            }
        }

        let count = fonts.len();
        self.fonts = FontTable::new(fonts);
        if self.fonts.is_empty() {
            log::warn!("init carried no font specs; labels cannot be meshed");
        }
        self.data = Some(data_port);
        log::info!("initialized with {count} font specs");

        let queued: Vec<SheetId> = self
            .sheets
            .iter()
            .filter(|(_, state)| state.viewport.is_some())
            .map(|(sheet_id, _)| sheet_id.clone())
            .collect();
        for sheet_id in queued {
            self.refresh_sheet(&sheet_id, false);
        }
        self.check_first_render();
    }

    fn handle_viewport(&mut self, sheet_id: SheetId, rect: WorldRect) {
        self.viewport_seen = true;
        let state = self.sheets.entry(sheet_id.clone()).or_default();
        state.viewport = Some(rect);
        self.refresh_sheet(&sheet_id, false);
        self.check_first_render();
    }

    fn handle_offsets_delta(
        &mut self,
        sheet_id: SheetId,
        column: Option<i64>,
        row: Option<i64>,
        size: f64,
    ) {
        let state = self.sheets.entry(sheet_id.clone()).or_default();
        match (column, row) {
            (Some(column), None) => state.offsets.set_transient_column_width(column, size),
            (None, Some(row)) => state.offsets.set_transient_row_height(row, size),
            _ => {
                log::warn!(
                    "offsets delta for sheet {sheet_id} must target exactly one of column or row"
                );
                return;
            }
        }
        // Geometry moved: re-derive visibility, then republish survivors
        // from their cached layouts. No clear is emitted for survivors, so
        // the host swaps mid-drag without blanking.
        self.refresh_sheet(&sheet_id, true);
        self.check_first_render();
    }

    fn handle_show_label(&mut self, sheet_id: SheetId, column: i64, row: i64, visible: bool) {
        let state = self.sheets.entry(sheet_id.clone()).or_default();
        let changed = if visible {
            state.hidden_labels.remove(&(column, row))
        } else {
            state.hidden_labels.insert((column, row))
        };
        if !changed {
            return;
        }
        let tile = TilePos::containing(column, row);
        if matches!(state.tiles.get(&tile), Some(TileSlot::Ready { .. })) {
            self.publish_tile(&sheet_id, tile);
        }
    }

    /// Answered against whatever is cached right now; the id always comes
    /// back even when the sheet is unknown.
    fn handle_column_max_width(&mut self, id: RequestId, sheet_id: SheetId, column: i64) {
        let widest = self.sheets.get(&sheet_id).and_then(|state| {
            state
                .tiles
                .values()
                .filter_map(|slot| match slot {
                    TileSlot::Ready { layout } => layout.max_label_width(column),
                    TileSlot::Pending { .. } => None,
                })
                .fold(None, |widest: Option<f64>, width| {
                    Some(widest.map_or(width, |value| value.max(width)))
                })
        });
        let max_width = widest.map_or(0.0, |width| width + 2.0 * CELL_TEXT_PADDING);
        self.outbox
            .push(RenderMessage::ColumnMaxWidthResponse { id, max_width });
    }

    /// Reconcile a sheet's tracked tiles with its current viewport.
    ///
    /// Departed tiles unload (their in-flight requests become stale),
    /// newly visible tiles clear and request data, and, when
    /// `repack_survivors` is set, tiles that stay visible republish from
    /// their cached layouts under the current offsets.
    fn refresh_sheet(&mut self, sheet_id: &SheetId, repack_survivors: bool) {
        let Some(state) = self.sheets.get_mut(sheet_id) else {
            return;
        };
        let Some(rect) = state.viewport else {
            return;
        };

        let target = visible_tiles(&state.offsets, rect);
        let target_set: HashSet<TilePos> = target.iter().copied().collect();
        let departures: Vec<TilePos> = state
            .tiles
            .keys()
            .filter(|tile| !target_set.contains(tile))
            .copied()
            .collect();
        let arrivals: Vec<TilePos> = target
            .iter()
            .filter(|tile| !state.tiles.contains_key(tile))
            .copied()
            .collect();
        let survivors: Vec<TilePos> = if repack_survivors {
            target
                .iter()
                .filter(|tile| matches!(state.tiles.get(tile), Some(TileSlot::Ready { .. })))
                .copied()
                .collect()
        } else {
            Vec::new()
        };

        for tile in departures {
            if let Some(TileSlot::Pending { request }) = state.tiles.remove(&tile) {
                self.pending_data.remove(&request);
            }
            self.outbox.push(RenderMessage::TileUnload {
                sheet_id: sheet_id.clone(),
                tile,
            });
        }

        let mut port_closed = false;
        if let Some(port) = &self.data {
            for tile in arrivals {
                let id = RequestId(self.next_request);
                self.next_request += 1;
                state.tiles.insert(tile, TileSlot::Pending { request: id });
                self.pending_data.insert(
                    id,
                    TileJob {
                        sheet_id: sheet_id.clone(),
                        tile,
                    },
                );
                self.outbox.push(RenderMessage::TileClear {
                    sheet_id: sheet_id.clone(),
                    tile,
                    view_rect: state.offsets.tile_view_rect(tile),
                });
                let request = DataRequest::RenderCells {
                    id,
                    sheet_id: sheet_id.clone(),
                    rect: tile.cell_rect(),
                };
                if port.requests.send(request).is_err() {
                    port_closed = true;
                    break;
                }
            }
        }
        if port_closed {
            self.on_data_port_closed();
        }

        for tile in survivors {
            self.publish_tile(sheet_id, tile);
        }
    }

    /// Emit the tile's current geometry followed by its finalize.
    fn publish_tile(&mut self, sheet_id: &SheetId, tile: TilePos) {
        let Some(state) = self.sheets.get(sheet_id) else {
            return;
        };
        let Some(TileSlot::Ready { layout }) = state.tiles.get(&tile) else {
            return;
        };
        let chunks = pack_tile(layout, &state.offsets, &state.hidden_labels);
        for chunk in chunks {
            self.outbox.push(RenderMessage::MeshDelivery {
                sheet_id: sheet_id.clone(),
                tile,
                chunk,
            });
        }
        self.outbox.push(RenderMessage::TileFinalize {
            sheet_id: sheet_id.clone(),
            tile,
        });
    }

    /// Once per worker lifetime: every tile of the first viewport has
    /// finalized and nothing is pending anywhere.
    fn check_first_render(&mut self) {
        if self.first_render_sent || !self.viewport_seen || self.data.is_none() {
            return;
        }
        let any_pending = self.sheets.values().any(|state| {
            state
                .tiles
                .values()
                .any(|slot| matches!(slot, TileSlot::Pending { .. }))
        });
        if any_pending {
            return;
        }
        self.first_render_sent = true;
        self.outbox.push(RenderMessage::FirstRenderComplete);
    }
}

/// Tiles intersecting the rect under the given offsets, row-major.
fn visible_tiles(offsets: &SheetOffsets, rect: WorldRect) -> Vec<TilePos> {
    let finite = rect.x.is_finite()
        && rect.y.is_finite()
        && rect.width.is_finite()
        && rect.height.is_finite();
    if !finite || rect.width <= 0.0 || rect.height <= 0.0 {
        return Vec::new();
    }

    let first_column = offsets.column_at(rect.x);
    let mut last_column = offsets.column_at(rect.right());
    if offsets.column_position(last_column) >= rect.right() {
        last_column -= 1;
    }
    let first_row = offsets.row_at(rect.y);
    let mut last_row = offsets.row_at(rect.bottom());
    if offsets.row_position(last_row) >= rect.bottom() {
        last_row -= 1;
    }
    if last_column < first_column || last_row < first_row {
        return Vec::new();
    }

    let first = TilePos::containing(first_column, first_row);
    let last = TilePos::containing(last_column, last_row);
    let mut tiles = Vec::new();
    for y in first.y..=last.y {
        for x in first.x..=last.x {
            tiles.push(TilePos::new(x, y));
        }
    }
    tiles
}

/// Worker thread body: one event at a time, outbox flushed after each.
///
/// Exits when the control channel disconnects, which is how the host shuts
/// the worker down. A dead data port only degrades the loop; a dead render
/// channel means the host is gone and the control disconnect follows.
pub fn text_engine_loop(mut engine: TextEngine, channels: WorkerChannels) {
    let WorkerChannels { control, render } = channels;
    loop {
        let responses = match engine.data_responses() {
            Some(receiver) => receiver,
            None => never(),
        };
        select! {
            recv(control) -> message => match message {
                Ok(message) => engine.handle_control(message),
                Err(_) => break,
            },
            recv(responses) -> response => match response {
                Ok(response) => engine.handle_data_response(response),
                Err(_) => engine.on_data_port_closed(),
            },
        }
        for message in engine.drain_outbox() {
            if render.send(message).is_err() {
                log::debug!("render channel closed; outbound message dropped");
                break;
            }
        }
    }
    log::info!("text engine loop exiting");
}

/// Production spawner handed to the host bridge.
pub fn spawn_text_engine(channels: WorkerChannels) -> JoinHandle<()> {
    thread::spawn(move || text_engine_loop(TextEngine::new(), channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_protocol::{
        AtlasId, CellAlign, CellRect, DataHost, DataRequest, FontStyle, RenderCell, data_channel,
    };

    fn sheet(name: &str) -> SheetId {
        SheetId::from(name)
    }

    fn test_fonts() -> Vec<BitmapFontSpec> {
        vec![BitmapFontSpec::uniform_ascii(
            FontStyle::Regular,
            AtlasId(0),
            6.0,
            16.0,
        )]
    }

    fn booted_engine() -> (TextEngine, DataHost) {
        let mut engine = TextEngine::new();
        let (port, host) = data_channel();
        engine.handle_control(ControlMessage::Init {
            fonts: test_fonts(),
            data_port: port,
        });
        let drained = engine.drain_outbox();
        assert!(drained.is_empty(), "init alone must not emit render traffic");
        (engine, host)
    }

    fn set_viewport(engine: &mut TextEngine, name: &str, x: f64, y: f64, w: f64, h: f64) {
        engine.handle_control(ControlMessage::Viewport {
            sheet_id: sheet(name),
            rect: WorldRect::new(x, y, w, h),
        });
    }

    fn cell(column: i64, row: i64, text: &str) -> RenderCell {
        RenderCell {
            column,
            row,
            text: text.to_string(),
            align: CellAlign::Left,
            style: FontStyle::Regular,
        }
    }

    /// Answer every outstanding request with the cells `make` produces.
    fn answer_requests(
        engine: &mut TextEngine,
        host: &DataHost,
        mut make: impl FnMut(&SheetId, CellRect) -> Vec<RenderCell>,
    ) {
        while let Ok(request) = host.requests.try_recv() {
            match request {
                DataRequest::RenderCells { id, sheet_id, rect } => {
                    let cells = make(&sheet_id, rect);
                    engine.handle_data_response(DataResponse::RenderCells {
                        id,
                        sheet_id,
                        cells,
                    });
                }
                other => panic!("unexpected data request {}", other.kind()),
            }
        }
    }

    fn kinds(messages: &[RenderMessage]) -> Vec<&'static str> {
        messages.iter().map(RenderMessage::kind).collect()
    }

    fn finalized(messages: &[RenderMessage]) -> Vec<TilePos> {
        messages
            .iter()
            .filter_map(|message| match message {
                RenderMessage::TileFinalize { tile, .. } => Some(*tile),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_viewport_clears_loads_and_completes_first_render() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);

        let boot = engine.drain_outbox();
        assert_eq!(kinds(&boot), vec!["TileClear"]);
        let RenderMessage::TileClear { tile, view_rect, .. } = &boot[0] else {
            unreachable!();
        };
        assert_eq!(*tile, TilePos::new(0, 0));
        assert_eq!(*view_rect, WorldRect::new(0.0, 0.0, 800.0, 672.0));

        answer_requests(&mut engine, &host, |_, rect| {
            assert_eq!(rect, TilePos::new(0, 0).cell_rect());
            vec![cell(0, 0, "hi")]
        });
        let loaded = engine.drain_outbox();
        assert_eq!(
            kinds(&loaded),
            vec!["MeshDelivery", "TileFinalize", "FirstRenderComplete"]
        );
    }

    /// Test: a viewport arriving before earlier responses supersedes them;
    /// the final tile set matches the newest viewport only.
    #[test]
    fn test_newer_viewport_supersedes_in_flight_loads() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();

        // Capture the first request but do not answer yet.
        let stale = host.requests.recv().unwrap();

        set_viewport(&mut engine, "s1", 1000.0, 0.0, 800.0, 600.0);
        let moved = engine.drain_outbox();
        assert_eq!(kinds(&moved), vec!["TileUnload", "TileClear", "TileClear"]);
        let RenderMessage::TileUnload { tile, .. } = &moved[0] else {
            unreachable!();
        };
        assert_eq!(*tile, TilePos::new(0, 0));

        // The stale response lands after supersession: dropped in silence.
        let DataRequest::RenderCells { id, sheet_id, .. } = stale else {
            panic!("unexpected request kind");
        };
        engine.handle_data_response(DataResponse::RenderCells {
            id,
            sheet_id,
            cells: vec![cell(0, 0, "stale")],
        });
        assert!(engine.drain_outbox().is_empty());

        answer_requests(&mut engine, &host, |_, _| Vec::new());
        let settled = engine.drain_outbox();
        let mut tiles = finalized(&settled);
        tiles.sort();
        assert_eq!(tiles, vec![TilePos::new(1, 0), TilePos::new(2, 0)]);
        assert_eq!(settled.last().map(RenderMessage::kind), Some("FirstRenderComplete"));
    }

    #[test]
    fn far_scrolled_viewport_loads_and_unloads_promptly() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 1.0e12, 0.0, 800.0, 600.0);

        let boot = engine.drain_outbox();
        assert_eq!(kinds(&boot), vec!["TileClear"]);
        let RenderMessage::TileClear { tile, .. } = &boot[0] else {
            unreachable!();
        };
        assert_eq!(*tile, TilePos::new(1_250_000_000, 0));

        answer_requests(&mut engine, &host, |_, rect| {
            assert_eq!(rect, TilePos::new(1_250_000_000, 0).cell_rect());
            Vec::new()
        });
        let loaded = engine.drain_outbox();
        assert_eq!(kinds(&loaded), vec!["TileFinalize", "FirstRenderComplete"]);

        // Past ~1e18 an 800-unit viewport is narrower than one ulp of its
        // own origin, so it covers no tile; it must still settle.
        set_viewport(&mut engine, "s1", 1.0e20, 0.0, 800.0, 600.0);
        assert_eq!(kinds(&engine.drain_outbox()), vec!["TileUnload"]);
    }

    /// Test: a payload handed to the host is never the buffer a later
    /// repack writes into.
    #[test]
    fn test_sent_payloads_are_not_reused_by_repacks() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        answer_requests(&mut engine, &host, |_, _| vec![cell(1, 0, "abc")]);
        let first = engine.drain_outbox();

        engine.handle_control(ControlMessage::OffsetsDelta {
            sheet_id: sheet("s1"),
            column: Some(0),
            row: None,
            size: 250.0,
        });
        let second = engine.drain_outbox();

        let addr_of = |messages: &[RenderMessage]| -> Vec<usize> {
            messages
                .iter()
                .filter_map(|message| match message {
                    RenderMessage::MeshDelivery { chunk, .. } => Some(chunk.payload.heap_addr()),
                    _ => None,
                })
                .collect()
        };
        let first_addrs = addr_of(&first);
        let second_addrs = addr_of(&second);
        assert!(!first_addrs.is_empty() && !second_addrs.is_empty());
        // Both generations are alive right now, so equal addresses would
        // mean a shared buffer.
        for addr in &second_addrs {
            assert!(!first_addrs.contains(addr), "payload buffer was reused");
        }
    }

    #[test]
    fn resize_repacks_from_cache_without_data_traffic() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        answer_requests(&mut engine, &host, |_, _| vec![cell(1, 0, "ab")]);
        engine.drain_outbox();

        engine.handle_control(ControlMessage::OffsetsDelta {
            sheet_id: sheet("s1"),
            column: Some(0),
            row: None,
            size: 250.0,
        });
        let repacked = engine.drain_outbox();
        assert_eq!(kinds(&repacked), vec!["MeshDelivery", "TileFinalize"]);
        assert!(
            host.requests.try_recv().is_err(),
            "repack must not query the data engine"
        );

        let RenderMessage::MeshDelivery { chunk, .. } = &repacked[0] else {
            unreachable!();
        };
        let (vertices, _) = chunk.payload.unpack(chunk.vertex_count, chunk.index_count).unwrap();
        // Column 1 now starts at 250; text starts after the padding.
        assert_eq!(vertices[0].x, 253.0);
    }

    #[test]
    fn show_label_repacks_only_loaded_tiles() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        answer_requests(&mut engine, &host, |_, _| {
            vec![cell(0, 0, "one"), cell(0, 1, "two")]
        });
        engine.drain_outbox();

        engine.handle_control(ControlMessage::ShowLabel {
            sheet_id: sheet("s1"),
            column: 0,
            row: 1,
            visible: false,
        });
        let hidden = engine.drain_outbox();
        assert_eq!(kinds(&hidden), vec!["MeshDelivery", "TileFinalize"]);
        let RenderMessage::MeshDelivery { chunk, .. } = &hidden[0] else {
            unreachable!();
        };
        assert_eq!(chunk.vertex_count, 12, "only the shown label remains");

        // Hiding it again is a no-op, as is toggling an unloaded tile.
        engine.handle_control(ControlMessage::ShowLabel {
            sheet_id: sheet("s1"),
            column: 0,
            row: 1,
            visible: false,
        });
        engine.handle_control(ControlMessage::ShowLabel {
            sheet_id: sheet("s1"),
            column: 500,
            row: 500,
            visible: false,
        });
        assert!(engine.drain_outbox().is_empty());
    }

    #[test]
    fn column_max_width_reflects_cached_labels_only() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        answer_requests(&mut engine, &host, |_, _| {
            vec![cell(2, 0, "hello"), cell(2, 3, "hi")]
        });
        engine.drain_outbox();

        engine.handle_control(ControlMessage::ColumnMaxWidth {
            id: RequestId(91),
            sheet_id: sheet("s1"),
            column: 2,
        });
        engine.handle_control(ControlMessage::ColumnMaxWidth {
            id: RequestId(92),
            sheet_id: sheet("nope"),
            column: 2,
        });
        let answers = engine.drain_outbox();
        let widths: Vec<(RequestId, f64)> = answers
            .iter()
            .filter_map(|message| match message {
                RenderMessage::ColumnMaxWidthResponse { id, max_width } => Some((*id, *max_width)),
                _ => None,
            })
            .collect();
        // "hello" is 5 chars at 6.0 plus padding on both sides.
        assert_eq!(widths, vec![(RequestId(91), 36.0), (RequestId(92), 0.0)]);
    }

    #[test]
    fn first_render_complete_is_one_shot() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        answer_requests(&mut engine, &host, |_, _| Vec::new());
        let first = engine.drain_outbox();
        assert_eq!(kinds(&first), vec!["TileFinalize", "FirstRenderComplete"]);

        // A later scroll loads more tiles without re-announcing.
        set_viewport(&mut engine, "s1", 1000.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        answer_requests(&mut engine, &host, |_, _| Vec::new());
        let later = engine.drain_outbox();
        assert!(
            !kinds(&later).contains(&"FirstRenderComplete"),
            "first render must announce exactly once"
        );
    }

    #[test]
    fn data_port_disconnect_unloads_pending_tiles_only() {
        let (mut engine, host) = booted_engine();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        answer_requests(&mut engine, &host, |_, _| vec![cell(0, 0, "kept")]);
        engine.drain_outbox();

        // Scroll partway: tile (0, 0) stays loaded, (1, 0) goes pending.
        // Then the port dies before the answer comes back.
        set_viewport(&mut engine, "s1", 700.0, 0.0, 800.0, 600.0);
        engine.drain_outbox();
        drop(host);
        engine.on_data_port_closed();
        let flushed = engine.drain_outbox();
        let unloaded: Vec<TilePos> = flushed
            .iter()
            .filter_map(|message| match message {
                RenderMessage::TileUnload { tile, .. } => Some(*tile),
                _ => None,
            })
            .collect();
        assert_eq!(unloaded, vec![TilePos::new(1, 0)]);

        // Degraded mode: departures still unload, arrivals are not tracked
        // and nothing is cleared or requested.
        set_viewport(&mut engine, "s1", 2000.0, 0.0, 800.0, 600.0);
        assert_eq!(kinds(&engine.drain_outbox()), vec!["TileUnload"]);
    }

    #[test]
    fn viewport_before_init_waits_for_the_data_port() {
        let mut engine = TextEngine::new();
        set_viewport(&mut engine, "s1", 0.0, 0.0, 800.0, 600.0);
        assert!(
            engine.drain_outbox().is_empty(),
            "nothing can load before init"
        );

        let (port, host) = data_channel();
        engine.handle_control(ControlMessage::Init {
            fonts: test_fonts(),
            data_port: port,
        });
        let boot = engine.drain_outbox();
        assert_eq!(kinds(&boot), vec!["TileClear"]);
        assert!(host.requests.try_recv().is_ok());
    }

    #[test]
    fn engine_thread_exits_when_the_host_hangs_up() {
        let (host_channels, worker_channels) = render_protocol::render_channel();
        let handle = spawn_text_engine(worker_channels);

        let (port, data_host) = data_channel();
        host_channels
            .control
            .send(ControlMessage::Init {
                fonts: test_fonts(),
                data_port: port,
            })
            .unwrap();
        host_channels
            .control
            .send(ControlMessage::Viewport {
                sheet_id: sheet("s1"),
                rect: WorldRect::new(0.0, 0.0, 800.0, 600.0),
            })
            .unwrap();

        let first = host_channels
            .render
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!(first.kind(), "TileClear");

        drop(host_channels);
        handle.join().unwrap();
        drop(data_host);
    }
}
