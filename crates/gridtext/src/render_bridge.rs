//! Render bridge module.
//!
//! Manages cross-thread communication between the application thread (scene
//! owner) and the render worker thread (text meshing). Owned by the
//! application thread.

use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use render_protocol::{
    BitmapFontSpec, ControlMessage, DataPort, RenderMessage, RequestId, SheetId, WorkerChannels,
    WorldRect, render_channel,
};
use thiserror::Error;
use tiles::TileTextCache;

/// A column width request that got no answer before the wait budget ran
/// out. The request's pending entry is gone by the time this is returned;
/// a late answer is dropped on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("column width request {id:?} was not answered in time")]
pub struct RequestTimeout {
    pub id: RequestId,
}

/// Handle for one in-flight column width request.
///
/// The answer arrives through [`RenderWorkerBridge::pump`] (or a blocking
/// [`RenderWorkerBridge::wait_column_max_width`]) and lands in the handle's
/// one-slot channel.
pub struct ColumnWidthQuery {
    id: RequestId,
    receiver: Receiver<f64>,
}

impl ColumnWidthQuery {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Non-blocking check for the resolved width.
    pub fn poll(&self) -> Option<f64> {
        self.receiver.try_recv().ok()
    }
}

/// Inbound dispatch mode. Until the scene reports ready, everything the
/// worker sends is parked in arrival order; `scene_ready` replays the
/// buffer exactly once and the phase never goes back.
enum ScenePhase {
    Booting { preload: Vec<RenderMessage> },
    Live,
}

/// Render worker bridge - manages cross-thread communication.
///
/// Constructed with an injected spawner so tests can stand in a scripted
/// worker; production passes `text_engine::spawn_text_engine`. One bridge,
/// one worker, for the whole session.
pub struct RenderWorkerBridge {
    control: Option<Sender<ControlMessage>>,
    render: Receiver<RenderMessage>,
    worker: Option<JoinHandle<()>>,
    next_request: u64,
    pending_widths: HashMap<RequestId, Sender<f64>>,
    phase: ScenePhase,
    first_render_complete: bool,
}

impl RenderWorkerBridge {
    pub fn new<F>(spawn_worker: F) -> Self
    where
        F: FnOnce(WorkerChannels) -> JoinHandle<()>,
    {
        let (host_channels, worker_channels) = render_channel();
        let worker = spawn_worker(worker_channels);
        Self {
            control: Some(host_channels.control),
            render: host_channels.render,
            worker: Some(worker),
            next_request: 1,
            pending_widths: HashMap::new(),
            phase: ScenePhase::Booting {
                preload: Vec::new(),
            },
            first_render_complete: false,
        }
    }

    /// Hand the worker its fonts and the data port. Not guarded against a
    /// second call; the worker treats the last init as authoritative and
    /// reloads everything.
    pub fn init(&mut self, fonts: Vec<BitmapFontSpec>, data_port: DataPort) {
        self.send_control(ControlMessage::Init { fonts, data_port });
    }

    pub fn update_viewport(&mut self, sheet_id: SheetId, rect: WorldRect) {
        self.send_control(ControlMessage::Viewport { sheet_id, rect });
    }

    /// Forward an uncommitted column or row resize. Exactly one of
    /// `column`/`row` should be set; the worker rejects anything else.
    pub fn update_offsets_transient(
        &mut self,
        sheet_id: SheetId,
        column: Option<i64>,
        row: Option<i64>,
        size: f64,
    ) {
        self.send_control(ControlMessage::OffsetsDelta {
            sheet_id,
            column,
            row,
            size,
        });
    }

    pub fn set_label_visibility(
        &mut self,
        sheet_id: SheetId,
        column: i64,
        row: i64,
        visible: bool,
    ) {
        self.send_control(ControlMessage::ShowLabel {
            sheet_id,
            column,
            row,
            visible,
        });
    }

    /// Ask the worker for the widest cached label in a column. The request
    /// is correlated by id, so several queries can be in flight and resolve
    /// in any order.
    pub fn query_column_max_width(&mut self, sheet_id: SheetId, column: i64) -> ColumnWidthQuery {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        let (reply, receiver) = bounded(1);
        self.pending_widths.insert(id, reply);
        self.send_control(ControlMessage::ColumnMaxWidth {
            id,
            sheet_id,
            column,
        });
        ColumnWidthQuery { id, receiver }
    }

    /// Block until the query resolves or `timeout` passes, pumping inbound
    /// dispatch the whole time so the rest of the stream keeps flowing.
    ///
    /// On timeout the pending entry is removed, so an abandoned request
    /// cannot pin table space; its late answer is dropped when it shows up.
    /// A worker that hung up counts as a timeout too, just an immediate one.
    pub fn wait_column_max_width(
        &mut self,
        query: ColumnWidthQuery,
        scene: &mut TileTextCache,
        timeout: Duration,
    ) -> Result<f64, RequestTimeout> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(width) = query.receiver.try_recv() {
                return Ok(width);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                self.pending_widths.remove(&query.id);
                return Err(RequestTimeout { id: query.id });
            };
            match self.render.recv_timeout(remaining) {
                Ok(message) => self.route(message, scene),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!(
                        "render worker hung up while width request {:?} was outstanding",
                        query.id
                    );
                    self.pending_widths.remove(&query.id);
                    return Err(RequestTimeout { id: query.id });
                }
            }
        }
    }

    /// Boot-phase pump: park everything the worker has sent so far. Width
    /// responses queue like the rest; correlation only happens in live
    /// dispatch.
    pub fn pump_preload(&mut self) {
        let ScenePhase::Booting { preload } = &mut self.phase else {
            log::debug!("pump_preload after scene_ready ignored");
            return;
        };
        while let Ok(message) = self.render.try_recv() {
            log::trace!("preload buffered {}", message.kind());
            preload.push(message);
        }
    }

    /// The scene is ready for tile traffic: replay the preload buffer in
    /// arrival order, then go live. Later calls are no-ops.
    pub fn scene_ready(&mut self, scene: &mut TileTextCache) {
        let buffered = match std::mem::replace(&mut self.phase, ScenePhase::Live) {
            ScenePhase::Booting { preload } => preload,
            ScenePhase::Live => {
                log::debug!("scene_ready called twice ignored");
                return;
            }
        };
        log::info!("scene ready; applying {} preloaded messages", buffered.len());
        for message in buffered {
            self.dispatch(message, scene);
        }
    }

    /// Live pump: apply everything the worker has sent since the last call.
    pub fn pump(&mut self, scene: &mut TileTextCache) {
        while let Ok(message) = self.render.try_recv() {
            self.route(message, scene);
        }
    }

    /// True exactly once after the worker announces its first complete
    /// render.
    pub fn take_first_render_complete(&mut self) -> bool {
        std::mem::take(&mut self.first_render_complete)
    }

    /// Width requests awaiting an answer.
    pub fn pending_width_count(&self) -> usize {
        self.pending_widths.len()
    }

    /// Messages parked for scene readiness. Zero once live.
    pub fn preload_len(&self) -> usize {
        match &self.phase {
            ScenePhase::Booting { preload } => preload.len(),
            ScenePhase::Live => 0,
        }
    }

    fn send_control(&self, message: ControlMessage) {
        let kind = message.kind();
        let Some(control) = &self.control else {
            log::error!("control channel already closed; {kind} dropped");
            return;
        };
        if control.send(message).is_err() {
            log::error!("render worker hung up; {kind} dropped");
        }
    }

    fn route(&mut self, message: RenderMessage, scene: &mut TileTextCache) {
        if let ScenePhase::Booting { preload } = &mut self.phase {
            preload.push(message);
            return;
        }
        self.dispatch(message, scene);
    }

    fn dispatch(&mut self, message: RenderMessage, scene: &mut TileTextCache) {
        log::trace!("render message {}", message.kind());
        match message {
            RenderMessage::TileClear {
                sheet_id,
                tile,
                view_rect,
            } => scene.clear(&sheet_id, tile, view_rect),
            RenderMessage::MeshDelivery {
                sheet_id,
                tile,
                chunk,
            } => scene.stage(&sheet_id, tile, chunk),
            RenderMessage::TileFinalize { sheet_id, tile } => scene.finalize(&sheet_id, tile),
            RenderMessage::TileUnload { sheet_id, tile } => scene.unload(&sheet_id, tile),
            RenderMessage::FirstRenderComplete => {
                self.first_render_complete = true;
            }
            RenderMessage::ColumnMaxWidthResponse { id, max_width } => {
                match self.pending_widths.remove(&id) {
                    Some(reply) => {
                        if reply.send(max_width).is_err() {
                            log::debug!("width query {id:?} was abandoned before its answer");
                        }
                    }
                    None => log::debug!("unmatched width response {id:?} dropped"),
                }
            }
            other => log::warn!("unknown render message kind {} ignored", other.kind()),
        }
    }
}

impl Drop for RenderWorkerBridge {
    fn drop(&mut self) {
        // Abandonment-based shutdown: dropping the control sender
        // disconnects the worker loop, which drains and exits.
        self.control = None;
        if let Some(handle) = self.worker.take() {
            handle
                .join()
                .unwrap_or_else(|err| log::error!("render worker thread panic: {err:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_protocol::{AtlasId, MeshChunk, MeshPayload, MeshVertex, TilePos};
    use std::thread;

    /// Bridge whose "worker" is the test itself: the worker-side channel
    /// ends come back out through a one-slot handoff.
    fn scripted_bridge() -> (RenderWorkerBridge, WorkerChannels) {
        let (slot_tx, slot_rx) = bounded(1);
        let bridge = RenderWorkerBridge::new(move |channels| {
            slot_tx.send(channels).unwrap();
            thread::spawn(|| {})
        });
        let worker = slot_rx.recv().unwrap();
        (bridge, worker)
    }

    fn sheet(name: &str) -> SheetId {
        SheetId::from(name)
    }

    fn one_glyph_chunk() -> MeshChunk {
        let vertices = [
            MeshVertex { x: 0.0, y: 0.0, u: 0.0, v: 0.0 },
            MeshVertex { x: 6.0, y: 0.0, u: 1.0, v: 0.0 },
            MeshVertex { x: 6.0, y: 8.0, u: 1.0, v: 1.0 },
            MeshVertex { x: 0.0, y: 8.0, u: 0.0, v: 1.0 },
        ];
        let indices = [0u32, 1, 2, 0, 2, 3];
        MeshChunk {
            atlas: AtlasId(0),
            vertex_count: 4,
            index_count: 6,
            payload: MeshPayload::pack(&vertices, &indices),
        }
    }

    fn clear_stage_finalize(worker: &WorkerChannels, name: &str, tile: TilePos) {
        let rect = WorldRect::new(0.0, 0.0, 800.0, 672.0);
        worker
            .render
            .send(RenderMessage::TileClear {
                sheet_id: sheet(name),
                tile,
                view_rect: rect,
            })
            .unwrap();
        worker
            .render
            .send(RenderMessage::MeshDelivery {
                sheet_id: sheet(name),
                tile,
                chunk: one_glyph_chunk(),
            })
            .unwrap();
        worker
            .render
            .send(RenderMessage::TileFinalize {
                sheet_id: sheet(name),
                tile,
            })
            .unwrap();
    }

    /// Test: messages parked before readiness replay in arrival order at
    /// scene_ready, exactly once; later traffic flows only through pump.
    #[test]
    fn test_preload_replays_once_in_order() {
        let (mut bridge, worker) = scripted_bridge();
        let mut scene = TileTextCache::new();

        clear_stage_finalize(&worker, "s1", TilePos::new(0, 0));
        bridge.pump_preload();
        assert_eq!(bridge.preload_len(), 3);
        assert!(scene.is_empty(), "nothing reaches the scene while booting");

        // Arrives after the boot pump: sits in the channel, not the buffer.
        clear_stage_finalize(&worker, "s1", TilePos::new(1, 0));

        bridge.scene_ready(&mut scene);
        assert_eq!(bridge.preload_len(), 0);
        let batch = scene.batch(&sheet("s1"), TilePos::new(0, 0));
        assert!(
            batch.is_some_and(|b| !b.is_empty()),
            "replay must preserve clear/stage/finalize order"
        );
        assert!(scene.batch(&sheet("s1"), TilePos::new(1, 0)).is_none());

        bridge.pump(&mut scene);
        assert!(scene.batch(&sheet("s1"), TilePos::new(1, 0)).is_some());

        // A second readiness signal must not replay anything.
        bridge.scene_ready(&mut scene);
        assert_eq!(scene.sheet_tile_count(&sheet("s1")), 2);
    }

    /// Test: width responses arriving out of order resolve their own
    /// queries by id.
    #[test]
    fn test_width_queries_correlate_out_of_order() {
        let (mut bridge, worker) = scripted_bridge();
        let mut scene = TileTextCache::new();
        bridge.scene_ready(&mut scene);

        let first = bridge.query_column_max_width(sheet("s1"), 5);
        let second = bridge.query_column_max_width(sheet("s1"), 9);
        assert_eq!(bridge.pending_width_count(), 2);

        let mut asked = Vec::new();
        while let Ok(message) = worker.control.try_recv() {
            if let ControlMessage::ColumnMaxWidth { id, column, .. } = message {
                asked.push((id, column));
            }
        }
        assert_eq!(asked.len(), 2);

        // Answer in reverse order.
        worker
            .render
            .send(RenderMessage::ColumnMaxWidthResponse {
                id: asked[1].0,
                max_width: 90.0,
            })
            .unwrap();
        worker
            .render
            .send(RenderMessage::ColumnMaxWidthResponse {
                id: asked[0].0,
                max_width: 50.0,
            })
            .unwrap();
        bridge.pump(&mut scene);

        assert_eq!(first.poll(), Some(50.0));
        assert_eq!(second.poll(), Some(90.0));
        assert_eq!(bridge.pending_width_count(), 0);
    }

    /// Test: an unanswered query times out, its table entry disappears,
    /// and the answer that limps in later is dropped without effect.
    #[test]
    fn test_wait_timeout_removes_pending_entry() {
        let (mut bridge, worker) = scripted_bridge();
        let mut scene = TileTextCache::new();
        bridge.scene_ready(&mut scene);

        let query = bridge.query_column_max_width(sheet("s1"), 3);
        let id = query.id();
        let result = bridge.wait_column_max_width(query, &mut scene, Duration::from_millis(50));
        assert_eq!(result, Err(RequestTimeout { id }));
        assert_eq!(bridge.pending_width_count(), 0);

        worker
            .render
            .send(RenderMessage::ColumnMaxWidthResponse {
                id,
                max_width: 120.0,
            })
            .unwrap();
        bridge.pump(&mut scene);
        assert_eq!(bridge.pending_width_count(), 0);
    }

    /// Test: the blocking wait keeps tile traffic flowing while it waits.
    #[test]
    fn test_wait_pumps_scene_traffic() {
        let (mut bridge, worker) = scripted_bridge();
        let mut scene = TileTextCache::new();
        bridge.scene_ready(&mut scene);

        let query = bridge.query_column_max_width(sheet("s1"), 0);
        let id = query.id();
        clear_stage_finalize(&worker, "s1", TilePos::new(0, 0));
        worker
            .render
            .send(RenderMessage::ColumnMaxWidthResponse {
                id,
                max_width: 42.0,
            })
            .unwrap();

        let width = bridge
            .wait_column_max_width(query, &mut scene, Duration::from_secs(5))
            .unwrap();
        assert_eq!(width, 42.0);
        assert!(scene.batch(&sheet("s1"), TilePos::new(0, 0)).is_some());
    }

    #[test]
    fn first_render_flag_reads_once() {
        let (mut bridge, worker) = scripted_bridge();
        let mut scene = TileTextCache::new();

        worker.render.send(RenderMessage::FirstRenderComplete).unwrap();
        bridge.pump_preload();
        assert!(!bridge.take_first_render_complete(), "parked until ready");

        bridge.scene_ready(&mut scene);
        assert!(bridge.take_first_render_complete());
        assert!(!bridge.take_first_render_complete());
    }

    #[test]
    fn sends_after_worker_death_are_logged_not_fatal() {
        let (mut bridge, worker) = scripted_bridge();
        drop(worker);
        bridge.update_viewport(sheet("s1"), WorldRect::new(0.0, 0.0, 800.0, 600.0));
        let query = bridge.query_column_max_width(sheet("s1"), 0);
        let mut scene = TileTextCache::new();
        bridge.scene_ready(&mut scene);
        let result = bridge.wait_column_max_width(query, &mut scene, Duration::from_secs(5));
        assert!(result.is_err(), "dead worker resolves as an immediate timeout");
    }
}
