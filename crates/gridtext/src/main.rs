use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gridtext::RenderWorkerBridge;
use render_protocol::{
    AtlasId, BitmapFontSpec, CellAlign, DataHost, DataRequest, DataResponse, FontStyle,
    RenderCell, SheetId, TilePos, WorldRect, data_channel,
};
use text_engine::spawn_text_engine;
use tiles::TileTextCache;

const DEMO_SHEET: &str = "Sheet1";
const POPULATED_COLUMNS: i64 = 26;
const POPULATED_ROWS: i64 = 50;
const REGULAR_ADVANCE: f64 = 6.0;
const BOLD_ADVANCE: f64 = 7.0;
const LINE_HEIGHT: f64 = 16.0;
const PUMP_BUDGET: Duration = Duration::from_secs(5);

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        eprintln!("[{}] {}", record.level().as_str().to_lowercase(), record.args());
    }

    fn flush(&self) {}
}

/// Level comes from GRIDTEXT_LOG (trace/debug/info/warn/error/off),
/// defaulting to info.
fn init_logging() {
    let level = match std::env::var("GRIDTEXT_LOG").ok().as_deref() {
        Some("trace") => log::LevelFilter::Trace,
        Some("debug") => log::LevelFilter::Debug,
        Some("warn") => log::LevelFilter::Warn,
        Some("error") => log::LevelFilter::Error,
        Some("off") => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    };
    log::set_logger(&LOGGER).expect("install logger");
    log::set_max_level(level);
}

fn demo_fonts() -> Vec<BitmapFontSpec> {
    vec![
        BitmapFontSpec::uniform_ascii(FontStyle::Regular, AtlasId(0), REGULAR_ADVANCE, LINE_HEIGHT),
        BitmapFontSpec::uniform_ascii(FontStyle::Bold, AtlasId(1), BOLD_ADVANCE, LINE_HEIGHT),
    ]
}

/// Spreadsheet column letters: A..Z, then AA, AB, ...
fn column_name(column: i64) -> String {
    let mut remaining = column;
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (remaining % 26) as u8);
        remaining = remaining / 26 - 1;
        if remaining < 0 {
            break;
        }
    }
    letters.reverse();
    String::from_utf8(letters).expect("ascii column name")
}

/// Synthetic data engine: every cell in the populated region carries its
/// own address ("A1", "B2", ...), with a bold centered header row.
fn spawn_data_worker(host: DataHost) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(request) = host.requests.recv() {
            match request {
                DataRequest::RenderCells { id, sheet_id, rect } => {
                    let mut cells = Vec::new();
                    let first_column = rect.min_column.max(0);
                    let last_column = rect.max_column.min(POPULATED_COLUMNS - 1);
                    let first_row = rect.min_row.max(0);
                    let last_row = rect.max_row.min(POPULATED_ROWS - 1);
                    for row in first_row..=last_row {
                        for column in first_column..=last_column {
                            let (text, align, style) = if row == 0 {
                                (column_name(column), CellAlign::Center, FontStyle::Bold)
                            } else {
                                (
                                    format!("{}{}", column_name(column), row + 1),
                                    CellAlign::Left,
                                    FontStyle::Regular,
                                )
                            };
                            cells.push(RenderCell {
                                column,
                                row,
                                text,
                                align,
                                style,
                            });
                        }
                    }
                    let reply = DataResponse::RenderCells {
                        id,
                        sheet_id,
                        cells,
                    };
                    if host.responses.send(reply).is_err() {
                        break;
                    }
                }
                other => log::warn!("data worker ignoring request {}", other.kind()),
            }
        }
    })
}

fn pump_until(
    bridge: &mut RenderWorkerBridge,
    scene: &mut TileTextCache,
    what: &str,
    mut done: impl FnMut(&TileTextCache) -> bool,
) {
    let deadline = Instant::now() + PUMP_BUDGET;
    loop {
        bridge.pump(scene);
        if done(scene) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn print_scene(scene: &TileTextCache, sheet_id: &SheetId) {
    let mut tiles: Vec<TilePos> = scene.sheet_tiles(sheet_id).collect();
    tiles.sort();
    println!(
        "[scene] sheet={} tiles={} batches={}",
        sheet_id,
        tiles.len(),
        scene.batch_count()
    );
    for tile in tiles {
        let vertices = scene
            .batch(sheet_id, tile)
            .map_or(0, tiles::MeshBatch::vertex_count);
        let footprint = scene
            .view_rect(sheet_id, tile)
            .map_or_else(|| "?".to_string(), |rect| format!("{rect:?}"));
        println!(
            "[scene]   tile=({}, {}) vertices={} view={}",
            tile.x, tile.y, vertices, footprint
        );
    }
}

/// First vertex of the regular-text chunk of a tile, if it has one.
fn regular_text_origin(
    scene: &TileTextCache,
    sheet_id: &SheetId,
    tile: TilePos,
) -> Option<(f32, f32)> {
    let batch = scene.batch(sheet_id, tile)?;
    let chunk = batch.chunks().iter().find(|chunk| chunk.atlas == AtlasId(0))?;
    let (vertices, _) = chunk.payload.unpack(chunk.vertex_count, chunk.index_count)?;
    vertices.first().map(|vertex| (vertex.x, vertex.y))
}

fn main() {
    init_logging();

    let (port, data_host) = data_channel();
    let data_worker = spawn_data_worker(data_host);

    let mut bridge = RenderWorkerBridge::new(spawn_text_engine);
    bridge.init(demo_fonts(), port);

    let sheet_id = SheetId::from(DEMO_SHEET);
    bridge.update_viewport(sheet_id.clone(), WorldRect::new(0.0, 0.0, 800.0, 600.0));

    // The scene is "not ready" for a moment, like a renderer still
    // compiling pipelines; worker output piles up in the preload buffer.
    let deadline = Instant::now() + PUMP_BUDGET;
    loop {
        bridge.pump_preload();
        // One visible tile: clear, two mesh chunks, finalize, then the
        // first-render announcement.
        if bridge.preload_len() >= 5 {
            break;
        }
        assert!(Instant::now() < deadline, "timed out waiting for boot traffic");
        thread::sleep(Duration::from_millis(2));
    }
    println!("[boot] {} messages parked before scene readiness", bridge.preload_len());

    let mut scene = TileTextCache::new();
    bridge.scene_ready(&mut scene);
    println!(
        "[boot] first render complete: {}",
        bridge.take_first_render_complete()
    );
    print_scene(&scene, &sheet_id);

    // Scroll right past the first tile; it unloads while two fresh tiles
    // stream in.
    bridge.update_viewport(sheet_id.clone(), WorldRect::new(1000.0, 0.0, 800.0, 600.0));
    pump_until(&mut bridge, &mut scene, "scrolled tiles", |scene| {
        scene.batch(&sheet_id, TilePos::new(1, 0)).is_some()
            && scene.batch(&sheet_id, TilePos::new(2, 0)).is_some()
            && scene.batch(&sheet_id, TilePos::new(0, 0)).is_none()
    });
    println!("[scroll] viewport moved to x=1000");
    print_scene(&scene, &sheet_id);

    // Column K is on screen now; ask how wide its widest label is.
    let query = bridge.query_column_max_width(sheet_id.clone(), 10);
    match bridge.wait_column_max_width(query, &mut scene, Duration::from_secs(2)) {
        Ok(width) => println!("[query] widest label in column K: {width:.1} px"),
        Err(error) => println!("[query] {error}"),
    }

    // Drag the header row taller: loaded meshes below it repack in place,
    // no reload, no blanking.
    let before = regular_text_origin(&scene, &sheet_id, TilePos::new(1, 0));
    bridge.update_offsets_transient(sheet_id.clone(), None, Some(0), 42.0);
    pump_until(&mut bridge, &mut scene, "repacked meshes", |scene| {
        regular_text_origin(scene, &sheet_id, TilePos::new(1, 0)) != before
    });
    let after = regular_text_origin(&scene, &sheet_id, TilePos::new(1, 0));
    println!("[resize] row 1 dragged to 42 px; first body label moved {before:?} -> {after:?}");

    // An editor opens over I1: its label vanishes without touching the
    // rest of the tile.
    let shown = scene
        .batch(&sheet_id, TilePos::new(1, 0))
        .map_or(0, tiles::MeshBatch::vertex_count);
    bridge.set_label_visibility(sheet_id.clone(), 8, 0, false);
    pump_until(&mut bridge, &mut scene, "hidden label", |scene| {
        scene
            .batch(&sheet_id, TilePos::new(1, 0))
            .map_or(0, tiles::MeshBatch::vertex_count)
            < shown
    });
    let hidden = scene
        .batch(&sheet_id, TilePos::new(1, 0))
        .map_or(0, tiles::MeshBatch::vertex_count);
    println!("[editor] label I1 hidden; tile vertices {shown} -> {hidden}");
    bridge.set_label_visibility(sheet_id.clone(), 8, 0, true);
    pump_until(&mut bridge, &mut scene, "restored label", |scene| {
        scene
            .batch(&sheet_id, TilePos::new(1, 0))
            .map_or(0, tiles::MeshBatch::vertex_count)
            == shown
    });
    println!("[editor] label I1 restored");

    drop(bridge);
    data_worker.join().expect("data worker joins after shutdown");
    println!("[shutdown] worker joined; clean exit");
}
