//! Host side of the grid text pipeline.
//!
//! The application owns a [`RenderWorkerBridge`] and a [`tiles::TileTextCache`]
//! scene; the bridge spawns the text worker, forwards viewport and offset
//! changes to it, and pumps the worker's mesh traffic into the scene. Until
//! the scene reports ready, inbound traffic parks in the bridge's preload
//! buffer.

pub mod render_bridge;

pub use render_bridge::{ColumnWidthQuery, RenderWorkerBridge, RequestTimeout};
