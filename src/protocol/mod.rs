//! Binary wire protocol between server and client
//!
//! One tag byte selects the message kind on a shared channel. Chunk
//! payloads are fixed-layout little-endian with no compression, so
//! decode cost is bounded and needs no allocation beyond the output
//! grid:
//!
//! - tag 1 `CONTROL`:      `[1][len:u32le][json]` (structured channel)
//! - tag 2 `CHUNK_DATA`:   `[2][cx:i32le][cy:i32le][cz:i32le][version:u32le][4096 x u16le]`
//! - tag 3 `CHUNK_UPDATE`: `[3][x:i32le][y:i32le][z:i32le][id:u16le]`
//!   (absolute world coordinates)
//!
//! The control channel carries the block-id mapping table and world
//! assignment; it must be applied before numeric ids in any chunk
//! payload are interpreted.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::error::Error;
use crate::core::types::{BlockId, Result};
use crate::world::block::BlockTableExport;
use crate::world::chunk::{Chunk, CHUNK_VOLUME};
use crate::world::coords::ChunkCoord;

pub const TAG_CONTROL: u8 = 1;
pub const TAG_CHUNK_DATA: u8 = 2;
pub const TAG_CHUNK_UPDATE: u8 = 3;

/// Bytes in a CHUNK_DATA message: tag + coord + version + grid
pub const CHUNK_DATA_BYTES: usize = 1 + 12 + 4 + CHUNK_VOLUME * 2;

/// Bytes in a CHUNK_UPDATE message: tag + world coord + block id
pub const CHUNK_UPDATE_BYTES: usize = 1 + 12 + 2;

/// Upper bound on a control frame body; anything larger is treated as a
/// corrupt stream rather than an allocation request
pub const MAX_CONTROL_BYTES: usize = 1 << 20;

/// Structured messages on the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Block-id mapping table; must arrive before any chunk payload
    BlockTableSync { blocks: BlockTableExport },
    /// World assignment for the session
    WorldAssignment {
        spawn: [f32; 3],
        generator: String,
        render_distance: u32,
    },
    /// Entity position push
    EntityPosition { entity: u64, coords: [f32; 3] },
    /// Chat relay (consumed outside the core)
    Chat { from: String, text: String },
}

/// A decoded wire message
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Control(ControlMessage),
    ChunkData {
        coord: ChunkCoord,
        version: u32,
        voxels: Box<[BlockId; CHUNK_VOLUME]>,
    },
    ChunkUpdate {
        x: i32,
        y: i32,
        z: i32,
        block: BlockId,
    },
}

impl WireMessage {
    /// Build a CHUNK_DATA message from a chunk
    pub fn chunk_data(chunk: &Chunk) -> Self {
        WireMessage::ChunkData {
            coord: chunk.coord,
            version: chunk.version(),
            voxels: Box::new(*chunk.voxels()),
        }
    }

    /// Encode to the tagged wire layout
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            WireMessage::Control(msg) => {
                let body = serde_json::to_vec(msg)?;
                let mut buf = Vec::with_capacity(5 + body.len());
                buf.push(TAG_CONTROL);
                buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
                buf.extend_from_slice(&body);
                Ok(buf)
            }
            WireMessage::ChunkData {
                coord,
                version,
                voxels,
            } => {
                let mut buf = Vec::with_capacity(CHUNK_DATA_BYTES);
                buf.push(TAG_CHUNK_DATA);
                buf.extend_from_slice(&coord.x.to_le_bytes());
                buf.extend_from_slice(&coord.y.to_le_bytes());
                buf.extend_from_slice(&coord.z.to_le_bytes());
                buf.extend_from_slice(&version.to_le_bytes());
                for &v in voxels.iter() {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
                Ok(buf)
            }
            WireMessage::ChunkUpdate { x, y, z, block } => {
                let mut buf = Vec::with_capacity(CHUNK_UPDATE_BYTES);
                buf.push(TAG_CHUNK_UPDATE);
                buf.extend_from_slice(&x.to_le_bytes());
                buf.extend_from_slice(&y.to_le_bytes());
                buf.extend_from_slice(&z.to_le_bytes());
                buf.extend_from_slice(&block.to_le_bytes());
                Ok(buf)
            }
        }
    }

    /// Decode a complete message buffer (tag byte included)
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let Some(&tag) = buf.first() else {
            return Err(Error::Protocol("empty message".into()));
        };
        match tag {
            TAG_CONTROL => {
                if buf.len() < 5 {
                    return Err(Error::Protocol("control frame truncated".into()));
                }
                let len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
                if buf.len() != 5 + len {
                    return Err(Error::Protocol(format!(
                        "control frame is {} bytes, header says {}",
                        buf.len() - 5,
                        len
                    )));
                }
                let msg = serde_json::from_slice(&buf[5..])?;
                Ok(WireMessage::Control(msg))
            }
            TAG_CHUNK_DATA => {
                if buf.len() != CHUNK_DATA_BYTES {
                    return Err(Error::Protocol(format!(
                        "chunk data message is {} bytes, expected {}",
                        buf.len(),
                        CHUNK_DATA_BYTES
                    )));
                }
                let coord = ChunkCoord::new(
                    i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
                    i32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
                    i32::from_le_bytes([buf[9], buf[10], buf[11], buf[12]]),
                );
                let version = u32::from_le_bytes([buf[13], buf[14], buf[15], buf[16]]);
                let mut voxels = Box::new([0 as BlockId; CHUNK_VOLUME]);
                for (i, v) in voxels.iter_mut().enumerate() {
                    let off = 17 + i * 2;
                    *v = u16::from_le_bytes([buf[off], buf[off + 1]]);
                }
                Ok(WireMessage::ChunkData {
                    coord,
                    version,
                    voxels,
                })
            }
            TAG_CHUNK_UPDATE => {
                if buf.len() != CHUNK_UPDATE_BYTES {
                    return Err(Error::Protocol(format!(
                        "chunk update message is {} bytes, expected {}",
                        buf.len(),
                        CHUNK_UPDATE_BYTES
                    )));
                }
                Ok(WireMessage::ChunkUpdate {
                    x: i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
                    y: i32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]),
                    z: i32::from_le_bytes([buf[9], buf[10], buf[11], buf[12]]),
                    block: u16::from_le_bytes([buf[13], buf[14]]),
                })
            }
            other => Err(Error::Protocol(format!("unknown message tag {}", other))),
        }
    }

    /// Write this message to an async stream
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.encode()?;
        writer.write_all(&bytes).await?;
        Ok(())
    }

    /// Read one message from an async stream, driven by the tag byte.
    ///
    /// Returns `Ok(None)` on clean end of stream before a tag byte.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Self>> {
        let mut tag = [0u8; 1];
        match reader.read_exact(&mut tag).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut buf = vec![tag[0]];
        match tag[0] {
            TAG_CONTROL => {
                let mut len_bytes = [0u8; 4];
                reader.read_exact(&mut len_bytes).await?;
                let len = u32::from_le_bytes(len_bytes) as usize;
                if len > MAX_CONTROL_BYTES {
                    return Err(Error::Protocol(format!(
                        "control frame of {} bytes exceeds limit",
                        len
                    )));
                }
                buf.extend_from_slice(&len_bytes);
                let start = buf.len();
                buf.resize(start + len, 0);
                reader.read_exact(&mut buf[start..]).await?;
            }
            TAG_CHUNK_DATA => {
                buf.resize(CHUNK_DATA_BYTES, 0);
                reader.read_exact(&mut buf[1..]).await?;
            }
            TAG_CHUNK_UPDATE => {
                buf.resize(CHUNK_UPDATE_BYTES, 0);
                reader.read_exact(&mut buf[1..]).await?;
            }
            other => {
                return Err(Error::Protocol(format!("unknown message tag {}", other)));
            }
        }
        Self::decode(&buf).map(Some)
    }
}
