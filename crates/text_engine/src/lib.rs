//! Worker side of the grid text pipeline.
//!
//! The engine owns per-sheet viewports, offset overlays and a cache of laid
//! out tiles. Cell data comes in over the data port, glyph meshes go out as
//! render messages. Layout runs once per tile load; everything after that
//! (column drags, label visibility, width queries) is served from the cached
//! layouts without touching the data engine again.

pub mod engine;
pub mod layout;
pub mod offsets;

pub use engine::{TextEngine, spawn_text_engine, text_engine_loop};
pub use layout::FontTable;
pub use offsets::SheetOffsets;
