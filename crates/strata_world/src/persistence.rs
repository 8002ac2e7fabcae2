//! # Chunk Persistence
//!
//! Binary chunk records and world metadata.
//!
//! ## Chunk Record
//!
//! ```text
//! ┌──────────────┬──────────────────────┬───────────┬────────────────────┐
//! │ ChunkHeader  │ BlockRecord × 1024   │ u32 count │ EntityRecord × n   │
//! │ (20 bytes)   │ row-major (y, then x)│           │ (52 bytes each)    │
//! └──────────────┴──────────────────────┴───────────┴────────────────────┘
//!                 whole buffer lz4 compressed, size prepended
//! ```
//!
//! World metadata ([`WorldInfo`]) is TOML.

use crate::block::{Block, BlockRecord};
use crate::coords::{ChunkPos, CHUNK_AREA};
use crate::entity::{Entity, EntityRecord};
use crate::error::{StoreError, StoreResult};
use bytemuck::{Pod, Zeroable};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Leading bytes of every chunk record.
pub const CHUNK_MAGIC: [u8; 4] = *b"STRC";

/// Current chunk record version.
pub const CHUNK_VERSION: u16 = 1;

#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
struct ChunkHeader {
    magic: [u8; 4],
    version: u16,
    reserved: u16,
    x: i32,
    y: i32,
    count: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<ChunkHeader>();
const RECORD_SIZE: usize = std::mem::size_of::<BlockRecord>();
/// Upper bound on a decompressed record, checked before allocating.
const MAX_RAW_SIZE: usize = 16 * 1024 * 1024;

/// Persisted contents of one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkData {
    /// Chunk position.
    pub pos: ChunkPos,
    /// Cells in row-major order. Always `CHUNK_AREA` long.
    pub blocks: Vec<Option<Block>>,
    /// Entities whose home is this chunk.
    pub entities: Vec<Entity>,
}

impl ChunkData {
    /// An all-air chunk with no entities.
    #[must_use]
    pub fn empty(pos: ChunkPos) -> Self {
        Self {
            pos,
            blocks: vec![None; CHUNK_AREA],
            entities: Vec::new(),
        }
    }
}

/// Serializes a chunk record.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_chunk(data: &ChunkData) -> Vec<u8> {
    debug_assert_eq!(data.blocks.len(), CHUNK_AREA);

    let header = ChunkHeader {
        magic: CHUNK_MAGIC,
        version: CHUNK_VERSION,
        reserved: 0,
        x: data.pos.x,
        y: data.pos.y,
        count: data.blocks.len() as u32,
    };
    let records: Vec<BlockRecord> = data
        .blocks
        .iter()
        .map(|cell| BlockRecord::from_cell(cell.as_ref()))
        .collect();
    let entities: Vec<EntityRecord> = data.entities.iter().map(EntityRecord::from_entity).collect();

    let mut raw = Vec::with_capacity(
        HEADER_SIZE + records.len() * RECORD_SIZE + 4 + entities.len() * EntityRecord::SIZE,
    );
    raw.extend_from_slice(bytemuck::bytes_of(&header));
    raw.extend_from_slice(bytemuck::cast_slice(&records));
    raw.extend_from_slice(&(entities.len() as u32).to_le_bytes());
    raw.extend_from_slice(bytemuck::cast_slice(&entities));

    compress_prepend_size(&raw)
}

/// Parses a chunk record stored for `expected`.
///
/// # Errors
///
/// [`StoreError::Corrupt`] for malformed buffers,
/// [`StoreError::UnknownMaterial`] for unknown ordinals and
/// [`StoreError::CoordinateMismatch`] if the record names another chunk.
pub fn decode_chunk(bytes: &[u8], expected: ChunkPos) -> StoreResult<ChunkData> {
    let declared = bytes
        .get(..4)
        .map(|prefix| u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize)
        .ok_or_else(|| StoreError::Corrupt("missing size prefix".into()))?;
    if declared > MAX_RAW_SIZE {
        return Err(StoreError::Corrupt(format!("declared size {declared} too large")));
    }
    let raw = decompress_size_prepended(bytes)
        .map_err(|e| StoreError::Corrupt(format!("decompression failed: {e}")))?;

    let header_bytes = raw
        .get(..HEADER_SIZE)
        .ok_or_else(|| StoreError::Corrupt("truncated header".into()))?;
    let header: ChunkHeader = bytemuck::pod_read_unaligned(header_bytes);

    if header.magic != CHUNK_MAGIC {
        return Err(StoreError::Corrupt("bad magic".into()));
    }
    if header.version != CHUNK_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported version {}",
            header.version
        )));
    }
    let found = ChunkPos::new(header.x, header.y);
    if found != expected {
        return Err(StoreError::CoordinateMismatch { expected, found });
    }
    if header.count as usize != CHUNK_AREA {
        return Err(StoreError::Corrupt(format!(
            "record count {} != {CHUNK_AREA}",
            header.count
        )));
    }

    let blocks_end = HEADER_SIZE + CHUNK_AREA * RECORD_SIZE;
    let block_bytes = raw
        .get(HEADER_SIZE..blocks_end)
        .ok_or_else(|| StoreError::Corrupt("truncated block records".into()))?;
    let mut blocks = Vec::with_capacity(CHUNK_AREA);
    for (index, chunk) in block_bytes.chunks_exact(RECORD_SIZE).enumerate() {
        let record: BlockRecord = bytemuck::pod_read_unaligned(chunk);
        let cell = record.to_cell().ok_or(StoreError::UnknownMaterial {
            ordinal: record.material,
            index,
        })?;
        blocks.push(cell);
    }

    let count_bytes: [u8; 4] = raw
        .get(blocks_end..blocks_end + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StoreError::Corrupt("missing entity count".into()))?;
    let entity_count = u32::from_le_bytes(count_bytes) as usize;
    let entities_start = blocks_end + 4;
    let entity_bytes = raw
        .get(entities_start..entities_start + entity_count * EntityRecord::SIZE)
        .ok_or_else(|| StoreError::Corrupt("truncated entity records".into()))?;
    let entities = entity_bytes
        .chunks_exact(EntityRecord::SIZE)
        .map(|chunk| {
            let record: EntityRecord = bytemuck::pod_read_unaligned(chunk);
            record
                .to_entity()
                .ok_or_else(|| StoreError::Corrupt(format!("unknown entity kind {}", record.kind)))
        })
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(ChunkData {
        pos: found,
        blocks,
        entities,
    })
}

// ============================================================================
// WORLD INFO
// ============================================================================

/// World metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldInfo {
    /// Display name.
    pub name: String,
    /// Identity.
    pub uuid: Uuid,
    /// Generator seed.
    #[serde(with = "seed_repr")]
    pub seed: u64,
    /// Spawn point x.
    pub spawn_x: i32,
    /// Spawn point y.
    pub spawn_y: i32,
}

impl WorldInfo {
    /// Fresh metadata with a random UUID.
    #[must_use]
    pub fn new(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
            seed,
            spawn_x: 0,
            spawn_y: 0,
        }
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Info`] if serialization fails.
    pub fn to_toml(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Info(e.to_string()))
    }

    /// Parses TOML.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Info`] on malformed input.
    pub fn from_toml(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Info(e.to_string()))
    }
}

/// TOML integers are signed; seeds keep their bits through an `i64`.
mod seed_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref, clippy::cast_possible_wrap)]
    pub fn serialize<S: Serializer>(seed: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*seed as i64)
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        i64::deserialize(deserializer).map(|v| v as u64)
    }
}

// ============================================================================
// STORES
// ============================================================================

/// Where chunks and world metadata live.
pub trait ChunkStore: Send + Sync {
    /// Loads a chunk, `Ok(None)` if it was never saved.
    ///
    /// # Errors
    ///
    /// I/O and decode failures.
    fn load_chunk(&self, pos: ChunkPos) -> StoreResult<Option<ChunkData>>;

    /// Saves a chunk, replacing any previous record.
    ///
    /// # Errors
    ///
    /// I/O failures.
    fn save_chunk(&self, data: &ChunkData) -> StoreResult<()>;

    /// Returns true if a record exists for `pos`.
    fn has_chunk(&self, pos: ChunkPos) -> bool;

    /// Loads world metadata, `Ok(None)` for a new world.
    ///
    /// # Errors
    ///
    /// I/O and parse failures.
    fn load_info(&self) -> StoreResult<Option<WorldInfo>>;

    /// Saves world metadata.
    ///
    /// # Errors
    ///
    /// I/O and serialization failures.
    fn save_info(&self, info: &WorldInfo) -> StoreResult<()>;
}

/// Directory-backed store.
///
/// ```text
/// <root>/world.toml
/// <root>/chunks/<x>_<y>.chunk
/// ```
#[derive(Debug, Clone)]
pub struct FileChunkStore {
    root: PathBuf,
}

impl FileChunkStore {
    /// File name of the world metadata.
    pub const INFO_FILE: &'static str = "world.toml";

    /// A store rooted at `root`. Directories are created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.root.join("chunks").join(format!("{}_{}.chunk", pos.x, pos.y))
    }

    fn info_path(&self) -> PathBuf {
        self.root.join(Self::INFO_FILE)
    }

    /// Writes through a temporary file so a crash never leaves a torn record.
    fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let io = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(io)?;
        fs::rename(&tmp, path).map_err(io)
    }

    fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl ChunkStore for FileChunkStore {
    fn load_chunk(&self, pos: ChunkPos) -> StoreResult<Option<ChunkData>> {
        Self::read_optional(&self.chunk_path(pos))?
            .map(|bytes| decode_chunk(&bytes, pos))
            .transpose()
    }

    fn save_chunk(&self, data: &ChunkData) -> StoreResult<()> {
        Self::write_atomic(&self.chunk_path(data.pos), &encode_chunk(data))
    }

    fn has_chunk(&self, pos: ChunkPos) -> bool {
        self.chunk_path(pos).is_file()
    }

    fn load_info(&self) -> StoreResult<Option<WorldInfo>> {
        Self::read_optional(&self.info_path())?
            .map(|bytes| {
                let text = String::from_utf8(bytes)
                    .map_err(|e| StoreError::Info(format!("world.toml is not UTF-8: {e}")))?;
                WorldInfo::from_toml(&text)
            })
            .transpose()
    }

    fn save_info(&self, info: &WorldInfo) -> StoreResult<()> {
        Self::write_atomic(&self.info_path(), info.to_toml()?.as_bytes())
    }
}

/// In-memory store holding encoded records. Used by tests and ephemeral worlds.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<HashMap<ChunkPos, Vec<u8>>>,
    info: Mutex<Option<String>>,
}

impl MemoryChunkStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Stores raw bytes for `pos`, bypassing encoding.
    pub fn insert_raw(&self, pos: ChunkPos, bytes: Vec<u8>) {
        self.chunks.lock().insert(pos, bytes);
    }
}

impl ChunkStore for MemoryChunkStore {
    fn load_chunk(&self, pos: ChunkPos) -> StoreResult<Option<ChunkData>> {
        let bytes = self.chunks.lock().get(&pos).cloned();
        bytes.map(|bytes| decode_chunk(&bytes, pos)).transpose()
    }

    fn save_chunk(&self, data: &ChunkData) -> StoreResult<()> {
        self.chunks.lock().insert(data.pos, encode_chunk(data));
        Ok(())
    }

    fn has_chunk(&self, pos: ChunkPos) -> bool {
        self.chunks.lock().contains_key(&pos)
    }

    fn load_info(&self) -> StoreResult<Option<WorldInfo>> {
        self.info.lock().as_deref().map(WorldInfo::from_toml).transpose()
    }

    fn save_info(&self, info: &WorldInfo) -> StoreResult<()> {
        *self.info.lock() = Some(info.to_toml()?);
        Ok(())
    }
}
