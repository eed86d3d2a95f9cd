//! Packed glyph geometry.
//!
//! A mesh payload is a single byte buffer laid out as `vertex_count`
//! vertices of four little-endian `f32`s (`x, y, u, v`) followed by
//! `index_count` little-endian `u32` triangle indices. The buffer is built
//! once on the worker and handed to the host by move; neither side ever
//! copies or aliases it.

use crate::fonts::AtlasId;

/// Floats per packed vertex: position `x, y` then atlas `u, v`.
pub const FLOATS_PER_VERTEX: usize = 4;

/// Glyph quads per delivery chunk. A tile whose batch exceeds this ships as
/// several chunks under one finalize.
pub const MESH_CHUNK_GLYPH_LIMIT: usize = 4096;

pub const VERTEX_STRIDE: usize = FLOATS_PER_VERTEX * size_of::<f32>();
pub const INDEX_STRIDE: usize = size_of::<u32>();

/// One glyph-quad corner before packing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
}

/// Owned vertex/index bytes for one atlas.
///
/// Ownership of the inner allocation is the transfer contract: sending a
/// payload moves it, so the producer cannot observe or mutate it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshPayload {
    bytes: Vec<u8>,
}

impl MeshPayload {
    /// Exact byte length of a payload with the given counts.
    pub const fn byte_len(vertex_count: u32, index_count: u32) -> usize {
        vertex_count as usize * VERTEX_STRIDE + index_count as usize * INDEX_STRIDE
    }

    pub fn pack(vertices: &[MeshVertex], indices: &[u32]) -> Self {
        let mut bytes =
            Vec::with_capacity(Self::byte_len(vertices.len() as u32, indices.len() as u32));
        for vertex in vertices {
            bytes.extend_from_slice(&vertex.x.to_le_bytes());
            bytes.extend_from_slice(&vertex.y.to_le_bytes());
            bytes.extend_from_slice(&vertex.u.to_le_bytes());
            bytes.extend_from_slice(&vertex.v.to_le_bytes());
        }
        for index in indices {
            bytes.extend_from_slice(&index.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address of the backing allocation. Stable across moves, which is what
    /// lets a receiver check it got the producer's buffer and not a copy.
    pub fn heap_addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    /// Splits the buffer back into vertices and indices.
    ///
    /// Returns `None` when the byte length does not match the counts, which
    /// marks the chunk as malformed rather than panicking in the consumer.
    pub fn unpack(
        &self,
        vertex_count: u32,
        index_count: u32,
    ) -> Option<(Vec<MeshVertex>, Vec<u32>)> {
        if self.bytes.len() != Self::byte_len(vertex_count, index_count) {
            return None;
        }
        let split = vertex_count as usize * VERTEX_STRIDE;
        let (vertex_bytes, index_bytes) = self.bytes.split_at(split);

        let mut floats = vertex_bytes
            .chunks_exact(size_of::<f32>())
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        let mut vertices = Vec::with_capacity(vertex_count as usize);
        for _ in 0..vertex_count {
            let x = floats.next()?;
            let y = floats.next()?;
            let u = floats.next()?;
            let v = floats.next()?;
            vertices.push(MeshVertex { x, y, u, v });
        }

        let indices = index_bytes
            .chunks_exact(INDEX_STRIDE)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some((vertices, indices))
    }
}

/// Geometry for one atlas within one tile delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshChunk {
    pub atlas: AtlasId,
    pub vertex_count: u32,
    pub index_count: u32,
    pub payload: MeshPayload,
}

impl MeshChunk {
    /// Byte length agrees with the declared counts.
    pub fn is_well_formed(&self) -> bool {
        self.payload.len() == MeshPayload::byte_len(self.vertex_count, self.index_count)
    }
}
