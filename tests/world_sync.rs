//! End-to-end world sync over a real TCP socket: handshake, initial
//! chunk stream, and block update fan-out between two sessions.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use blockport::client::ClientWorld;
use blockport::mesher::AtlasLayout;
use blockport::net::{ServerConfig, WorldServer};
use blockport::physics::BlockSource;
use blockport::protocol::{ControlMessage, WireMessage};
use blockport::world::coords::ChunkCoord;
use blockport::world::create_or_load_world;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_test_server(dir: &std::path::Path, render_distance: u32) -> WorldServer {
    let world = create_or_load_world(dir, "flat").await.unwrap();
    let config = ServerConfig {
        addr: "127.0.0.1:0".into(),
        render_distance,
    };
    WorldServer::start(Arc::new(Mutex::new(world)), config)
        .await
        .unwrap()
}

async fn next_frame(stream: &mut TcpStream) -> WireMessage {
    timeout(READ_TIMEOUT, WireMessage::read_from(stream))
        .await
        .expect("timed out waiting for frame")
        .expect("read error")
        .expect("connection closed")
}

/// Connect, run the handshake and initial chunk stream into a fresh
/// client session, and return both halves.
async fn connect_client(server: &WorldServer, render_distance: u32) -> (TcpStream, ClientWorld) {
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    let mut client = ClientWorld::new(AtlasLayout::default());

    // Handshake: block table first, then world assignment
    match next_frame(&mut stream).await {
        msg @ WireMessage::Control(ControlMessage::BlockTableSync { .. }) => {
            client.apply_message(msg)
        }
        other => panic!("expected block table sync, got {:?}", other),
    }
    match next_frame(&mut stream).await {
        msg @ WireMessage::Control(ControlMessage::WorldAssignment { .. }) => {
            client.apply_message(msg)
        }
        other => panic!("expected world assignment, got {:?}", other),
    }

    let side = 2 * render_distance as usize + 1;
    for _ in 0..side * side * side {
        match next_frame(&mut stream).await {
            msg @ WireMessage::ChunkData { .. } => client.apply_message(msg),
            other => panic!("expected chunk data, got {:?}", other),
        }
    }
    (stream, client)
}

#[tokio::test]
async fn test_handshake_and_initial_chunk_stream() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(dir.path(), 1).await;
    let (_stream, client) = connect_client(&server, 1).await;

    let blocks = client.blocks().expect("block table should be synced");
    assert_eq!(blocks.id_of("air"), Some(0));
    assert!(blocks.id_of("grass").is_some());

    assert_eq!(client.render_distance(), 1);
    assert_eq!(client.cache().chunk_count(), 27);

    // Flat spawn is (0.5, 64.0, 0.5), so the streamed cube is centered
    // on chunk (0, 4, 0)
    assert_eq!(client.spawn().y, 64.0);
    assert!(client.cache().get_chunk(ChunkCoord::new(0, 4, 0)).is_some());
    assert!(client.cache().get_chunk(ChunkCoord::new(-1, 3, -1)).is_some());
    assert!(client.cache().get_chunk(ChunkCoord::new(1, 5, 1)).is_some());
    assert!(client.cache().get_chunk(ChunkCoord::new(2, 4, 0)).is_none());

    // Ground truth from the flat generator: grass at y = 63, air above
    let grass = blocks.id_of("grass").unwrap();
    assert_eq!(client.cache().block_at(3, 63, 3), Some(grass));
    assert_eq!(client.cache().block_at(3, 64, 3), Some(0));
}

#[tokio::test]
async fn test_block_update_round_trip_and_fan_out() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(dir.path(), 1).await;
    let (mut digger, mut digger_world) = connect_client(&server, 1).await;
    let (mut watcher, mut watcher_world) = connect_client(&server, 1).await;

    let old_version = digger_world
        .cache()
        .get_chunk(ChunkCoord::new(0, 3, 0))
        .unwrap()
        .version();

    // Dig out the grass block at (3, 63, 3)
    WireMessage::ChunkUpdate {
        x: 3,
        y: 63,
        z: 3,
        block: 0,
    }
    .write_to(&mut digger)
    .await
    .unwrap();

    // The update fans out to every session, sender included
    for (stream, client) in [
        (&mut digger, &mut digger_world),
        (&mut watcher, &mut watcher_world),
    ] {
        match next_frame(stream).await {
            msg @ WireMessage::ChunkUpdate {
                x: 3,
                y: 63,
                z: 3,
                block: 0,
            } => client.apply_message(msg),
            other => panic!("expected the block update back, got {:?}", other),
        }
        assert_eq!(client.cache().block_at(3, 63, 3), Some(0));
    }

    let new_version = digger_world
        .cache()
        .get_chunk(ChunkCoord::new(0, 3, 0))
        .unwrap()
        .version();
    assert_eq!(new_version, old_version + 1);

    // Late joiners see the authoritative state, not the generator output
    let (_stream, late) = connect_client(&server, 1).await;
    assert_eq!(late.cache().block_at(3, 63, 3), Some(0));
}

#[tokio::test]
async fn test_lagged_session_is_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(dir.path(), 0).await;

    let (mut stalled, _stalled_world) = connect_client(&server, 0).await;
    let (sender, _sender_world) = connect_client(&server, 0).await;

    let (mut sender_rx, mut sender_tx) = sender.into_split();
    // Drain the sender's own fan-out so only the stalled session backs up
    let drain = tokio::spawn(async move {
        while let Ok(Some(_)) = WireMessage::read_from(&mut sender_rx).await {}
    });

    // Flood far more data than the fan-out buffer and socket buffers
    // can absorb while the stalled session reads nothing
    let text = "x".repeat(256 * 1024);
    for _ in 0..300 {
        WireMessage::Control(ControlMessage::Chat {
            from: "flood".into(),
            text: text.clone(),
        })
        .write_to(&mut sender_tx)
        .await
        .unwrap();
    }

    // The session that fell behind must be closed by the server, not
    // buffered without bound: draining it reaches end of stream
    let closed = timeout(Duration::from_secs(30), async {
        loop {
            match WireMessage::read_from(&mut stalled).await {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server kept the lagged session open");

    drain.abort();
}
