//! Client-side world state and worker orchestration
//!
//! One main context owns the chunk cache and applies protocol messages;
//! chunk decode and mesh generation run on worker channels and only
//! ever see owned copies. Physics and cache mutation stay synchronous
//! on the main context, so the chunk map needs no locking.

pub mod cache;
pub mod worker;

pub use cache::{ClientChunkCache, MeshRequest, DEFAULT_MESH_CAPACITY};
pub use worker::{CancellationToken, Worker, REQUEST_TIMEOUT};

use crate::core::types::{Result, Vec3};
use crate::mesher::{build_mesh, AtlasLayout, MeshData, MeshInput};
use crate::protocol::{ControlMessage, WireMessage};
use crate::world::block::BlockTable;
use crate::world::chunk::Chunk;

/// Client world session: cache plus decode and mesh workers
pub struct ClientWorld {
    cache: ClientChunkCache,
    /// Block table synced from the server; chunk payloads are
    /// uninterpretable until this arrives
    blocks: Option<BlockTable>,
    spawn: Vec3,
    render_distance: u32,
    decode_worker: Worker<Vec<u8>, Result<WireMessage>>,
    mesh_worker: Worker<MeshInput, MeshData>,
}

impl ClientWorld {
    pub fn new(atlas: AtlasLayout) -> Self {
        let decode_worker =
            Worker::spawn_concurrent("chunk decode", |bytes: Vec<u8>| WireMessage::decode(&bytes));
        let mesh_worker =
            Worker::spawn_serial("mesh generation", move |input: MeshInput| {
                build_mesh(&input, &atlas)
            });
        Self {
            cache: ClientChunkCache::default(),
            blocks: None,
            spawn: Vec3::ZERO,
            render_distance: 0,
            decode_worker,
            mesh_worker,
        }
    }

    pub fn cache(&self) -> &ClientChunkCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ClientChunkCache {
        &mut self.cache
    }

    /// Block table synced from the server, if it has arrived
    pub fn blocks(&self) -> Option<&BlockTable> {
        self.blocks.as_ref()
    }

    pub fn spawn(&self) -> Vec3 {
        self.spawn
    }

    pub fn render_distance(&self) -> u32 {
        self.render_distance
    }

    /// Decode one raw frame on the decode worker and apply it.
    ///
    /// A malformed buffer is logged and dropped; there is no retry.
    pub async fn ingest_frame(&mut self, bytes: Vec<u8>) {
        match self.decode_worker.request(bytes).await {
            Ok(Ok(msg)) => self.apply_message(msg),
            Ok(Err(e)) => log::warn!("dropping malformed frame: {}", e),
            Err(e) => log::warn!("decode request failed: {}", e),
        }
    }

    /// Apply an already-decoded message to the session state
    pub fn apply_message(&mut self, msg: WireMessage) {
        match msg {
            WireMessage::Control(control) => self.apply_control(control),
            WireMessage::ChunkData {
                coord,
                version,
                voxels,
            } => {
                if self.blocks.is_none() {
                    log::warn!(
                        "dropping chunk ({}, {}, {}): block table not yet synced",
                        coord.x,
                        coord.y,
                        coord.z
                    );
                    return;
                }
                self.cache
                    .set_chunk(Chunk::from_parts(coord, version, voxels));
            }
            WireMessage::ChunkUpdate { x, y, z, block } => {
                if self.blocks.is_none() {
                    log::warn!("dropping block update: block table not yet synced");
                    return;
                }
                self.cache.apply_block_update(x, y, z, block);
            }
        }
    }

    fn apply_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::BlockTableSync { blocks } => match BlockTable::import(&blocks) {
                Ok(table) => {
                    log::info!("block table synced: {} blocks", table.len());
                    self.blocks = Some(table);
                }
                Err(e) => log::warn!("rejecting block table sync: {}", e),
            },
            ControlMessage::WorldAssignment {
                spawn,
                generator,
                render_distance,
            } => {
                self.spawn = Vec3::from_array(spawn);
                self.render_distance = render_distance;
                log::info!(
                    "assigned to world (generator: {}, render distance: {})",
                    generator,
                    render_distance
                );
            }
            ControlMessage::EntityPosition { .. } | ControlMessage::Chat { .. } => {
                // Consumed by layers outside the core
            }
        }
    }

    /// Run at most one pending mesh generation to completion.
    ///
    /// Returns the coordinate that was meshed, or `None` if the queue
    /// was empty or a job was already in flight. A worker failure
    /// clears the in-flight slot so the queue keeps draining.
    pub async fn pump_mesh_queue(&mut self) -> Option<crate::world::coords::ChunkCoord> {
        let (coord, input) = self.cache.next_mesh_job()?;
        let built_version = input.chunk.version;
        match self.mesh_worker.request(input).await {
            Ok(mesh) => {
                self.cache.store_mesh(coord, built_version, mesh);
                Some(coord)
            }
            Err(e) => {
                log::warn!(
                    "mesh generation for ({}, {}, {}) failed: {}",
                    coord.x,
                    coord.y,
                    coord.z,
                    e
                );
                self.cache.abort_mesh_job(coord);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::coords::ChunkCoord;

    fn block_table_frame() -> WireMessage {
        let mut table = BlockTable::new();
        table.register("stone").unwrap();
        WireMessage::Control(ControlMessage::BlockTableSync {
            blocks: table.export(),
        })
    }

    fn chunk_frame() -> (ChunkCoord, WireMessage) {
        let mut chunk = Chunk::new(ChunkCoord::new(1, 0, 0));
        chunk.set_block(0, 5, 0, 1).unwrap();
        (chunk.coord, WireMessage::chunk_data(&chunk))
    }

    #[tokio::test]
    async fn test_chunk_dropped_before_table_sync() {
        let mut client = ClientWorld::new(AtlasLayout::default());
        let (coord, frame) = chunk_frame();

        client.apply_message(frame.clone());
        assert!(client.cache().get_chunk(coord).is_none());

        client.apply_message(block_table_frame());
        client.apply_message(frame);
        assert!(client.cache().get_chunk(coord).is_some());
    }

    #[tokio::test]
    async fn test_ingest_decodes_and_applies() {
        let mut client = ClientWorld::new(AtlasLayout::default());
        client.apply_message(block_table_frame());

        let (coord, frame) = chunk_frame();
        client.ingest_frame(frame.encode().unwrap()).await;
        assert!(client.cache().get_chunk(coord).is_some());

        // Malformed bytes are dropped without disturbing state
        client.ingest_frame(vec![99, 1, 2]).await;
        assert_eq!(client.cache().chunk_count(), 1);
    }

    #[tokio::test]
    async fn test_pump_builds_queued_mesh() {
        let mut client = ClientWorld::new(AtlasLayout::default());
        client.apply_message(block_table_frame());
        let (coord, frame) = chunk_frame();
        client.apply_message(frame);

        assert_eq!(client.cache_mut().request_mesh(coord), MeshRequest::Queued);
        assert_eq!(client.pump_mesh_queue().await, Some(coord));
        assert!(matches!(
            client.cache_mut().request_mesh(coord),
            MeshRequest::Cached(_)
        ));
        // Queue drained
        assert_eq!(client.pump_mesh_queue().await, None);
    }

    #[tokio::test]
    async fn test_world_assignment_applied() {
        let mut client = ClientWorld::new(AtlasLayout::default());
        client.apply_message(WireMessage::Control(ControlMessage::WorldAssignment {
            spawn: [0.5, 64.0, 0.5],
            generator: "flat".into(),
            render_distance: 4,
        }));
        assert_eq!(client.spawn(), Vec3::new(0.5, 64.0, 0.5));
        assert_eq!(client.render_distance(), 4);
    }
}
