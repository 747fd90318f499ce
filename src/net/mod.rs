//! TCP world server speaking the binary wire protocol
//!
//! One listener per world process. Each connection gets the control
//! handshake (block table, then world assignment), an initial stream of
//! chunks around spawn, and thereafter lives on the shared channel:
//! inbound block updates mutate the authoritative world and fan out to
//! every session.
//!
//! The world sits behind one async mutex: region load/save and chunk
//! generation are serialized on it, so a large save stalls other work
//! on this process. Known ceiling, not remedied here.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};

use crate::core::types::Result;
use crate::protocol::{ControlMessage, WireMessage};
use crate::world::coords::ChunkCoord;
use crate::world::world::ServerWorld;

/// Fan-out buffer per session; sessions that fall this far behind are
/// disconnected rather than buffered without bound
const BROADCAST_CAPACITY: usize = 256;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    /// Chunk radius streamed around spawn on connect
    pub render_distance: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:4617".into(),
            render_distance: 2,
        }
    }
}

/// Handle to a running world server; keep it alive to keep serving
pub struct WorldServer {
    local_addr: std::net::SocketAddr,
    _handle: tokio::task::JoinHandle<()>,
}

impl WorldServer {
    /// Bind and start serving. Returns once the listener is bound;
    /// sessions run in background tasks.
    pub async fn start(world: Arc<Mutex<ServerWorld>>, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("world server listening on {}", local_addr);

        let (updates_tx, _) = broadcast::channel::<WireMessage>(BROADCAST_CAPACITY);

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        log::info!("client connected from {}", peer);
                        let world = Arc::clone(&world);
                        let updates_tx = updates_tx.clone();
                        let render_distance = config.render_distance;
                        tokio::spawn(async move {
                            if let Err(e) =
                                run_session(stream, world, updates_tx, render_distance).await
                            {
                                log::warn!("session {} ended with error: {}", peer, e);
                            }
                            log::info!("client disconnected: {}", peer);
                        });
                    }
                    Err(e) => {
                        log::error!("accept error: {}", e);
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            _handle: handle,
        })
    }

    /// Address the server is actually bound to
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }
}

/// Chunk coordinates within a cubic radius of `center`, nearest shell
/// first along no particular axis order but deterministic
fn chunks_in_radius(center: ChunkCoord, radius: u32) -> Vec<ChunkCoord> {
    let r = radius as i32;
    let mut coords = Vec::with_capacity(((2 * r + 1) * (2 * r + 1) * (2 * r + 1)) as usize);
    for dy in -r..=r {
        for dz in -r..=r {
            for dx in -r..=r {
                coords.push(ChunkCoord::new(center.x + dx, center.y + dy, center.z + dz));
            }
        }
    }
    coords
}

async fn run_session(
    stream: TcpStream,
    world: Arc<Mutex<ServerWorld>>,
    updates_tx: broadcast::Sender<WireMessage>,
    render_distance: u32,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut updates_rx = updates_tx.subscribe();

    // Control handshake: the block table must land before any chunk
    // payload is meaningful, then the world assignment
    {
        let world = world.lock().await;
        WireMessage::Control(ControlMessage::BlockTableSync {
            blocks: world.blocks().export(),
        })
        .write_to(&mut writer)
        .await?;
        WireMessage::Control(ControlMessage::WorldAssignment {
            spawn: world.spawn().to_array(),
            generator: world.generator_name().to_string(),
            render_distance,
        })
        .write_to(&mut writer)
        .await?;
    }

    // Initial chunk stream around spawn
    let spawn_chunk = {
        let world = world.lock().await;
        let spawn = world.spawn();
        ChunkCoord::containing(
            spawn.x.floor() as i32,
            spawn.y.floor() as i32,
            spawn.z.floor() as i32,
        )
    };
    for coord in chunks_in_radius(spawn_chunk, render_distance) {
        let frame = {
            let mut world = world.lock().await;
            let chunk = world.get_or_create_chunk(coord).await?;
            WireMessage::chunk_data(chunk)
        };
        frame.write_to(&mut writer).await?;
    }

    // Outbound fan-out runs in its own task; frame reads span multiple
    // awaits and must not share the socket with a writer in one select
    // loop. Writer exit (lag or write failure) takes the session down.
    let mut writer_task = tokio::spawn(async move {
        loop {
            match updates_rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = msg.write_to(&mut writer).await {
                        log::debug!("outbound write failed: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("session lagged, {} updates lost; disconnecting", skipped);
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let result = loop {
        tokio::select! {
            // A dropped mid-read frame is fine here: the writer is gone
            // and the connection is closing anyway
            _ = &mut writer_task => break Ok(()),
            frame = WireMessage::read_from(&mut reader) => match frame {
                Ok(Some(WireMessage::ChunkUpdate { x, y, z, block })) => {
                    let applied = {
                        let mut world = world.lock().await;
                        world.set_block(x, y, z, block).await
                    };
                    if let Err(e) = applied {
                        break Err(e);
                    }
                    // Fan out to every session, sender included
                    let _ = updates_tx.send(WireMessage::ChunkUpdate { x, y, z, block });
                }
                Ok(Some(WireMessage::Control(ControlMessage::Chat { from, text }))) => {
                    let _ = updates_tx.send(WireMessage::Control(ControlMessage::Chat {
                        from,
                        text,
                    }));
                }
                Ok(Some(other)) => {
                    log::warn!("ignoring unexpected inbound message: {:?}", other);
                }
                Ok(None) => break Ok(()),
                Err(e) => {
                    log::warn!("closing session on malformed inbound frame: {}", e);
                    break Err(e);
                }
            },
        }
    };
    writer_task.abort();
    result
}
