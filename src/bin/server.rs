//! World server binary — serves a voxel world over TCP.
//!
//! Usage: cargo run --release --bin server -- [OPTIONS]
//!
//! Options:
//!   --world <DIR>       World directory (default: "worlds/default")
//!   --generator <NAME>  Generator for new worlds: flat | noise (default: "flat")
//!   --addr <ADDR>       Listen address (default: "127.0.0.1:4617")
//!   --radius <CHUNKS>   Render distance streamed on connect (default: 2)
//!   --pregen <CHUNKS>   Pre-generate a cube of this radius around spawn
//!   --autosave <SECS>   Autosave interval in seconds (default: 60)

use std::sync::Arc;

use rayon::prelude::*;
use tokio::sync::Mutex;

use blockport::net::{ServerConfig, WorldServer};
use blockport::world::coords::ChunkCoord;
use blockport::world::world::create_or_load_world;
use blockport::world::GeneratorRegistry;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let world_dir = parse_str_arg(&args, "--world").unwrap_or_else(|| "worlds/default".to_string());
    let generator = parse_str_arg(&args, "--generator").unwrap_or_else(|| "flat".to_string());
    let addr = parse_str_arg(&args, "--addr").unwrap_or_else(|| "127.0.0.1:4617".to_string());
    let radius = parse_u32_arg(&args, "--radius").unwrap_or(2);
    let pregen = parse_u32_arg(&args, "--pregen");
    let autosave_secs = parse_u32_arg(&args, "--autosave").unwrap_or(60);

    let world = match create_or_load_world(&world_dir, &generator).await {
        Ok(world) => world,
        Err(e) => {
            log::error!("failed to open world at {}: {}", world_dir, e);
            std::process::exit(1);
        }
    };

    if let Some(pregen_radius) = pregen {
        pregenerate(&world_dir, world.generator_name(), pregen_radius, world.spawn()).await;
    }

    let world = Arc::new(Mutex::new(world));

    // Periodic autosave of dirty regions and metadata
    {
        let world = Arc::clone(&world);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(autosave_secs as u64));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                let mut world = world.lock().await;
                if let Err(e) = world.save_modified().await {
                    log::error!("autosave failed: {}", e);
                }
            }
        });
    }

    let config = ServerConfig {
        addr,
        render_distance: radius,
    };
    let server = match WorldServer::start(Arc::clone(&world), config).await {
        Ok(server) => server,
        Err(e) => {
            log::error!("failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("serving on {}", server.local_addr());

    // Run until interrupted, then flush the world
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("signal handler failed: {}", e);
    }
    log::info!("shutting down, saving world");
    let mut world = world.lock().await;
    if let Err(e) = world.save_modified().await {
        log::error!("final save failed: {}", e);
    }
}

/// Pre-generate chunks around spawn in parallel, then let the server's
/// normal load path pick them up from disk on demand.
async fn pregenerate(world_dir: &str, generator_name: &str, radius: u32, spawn: glam::Vec3) {
    use blockport::world::{BlockTable, Region, RegionCoord, WorldStorage};
    use std::collections::HashMap;

    let registry = GeneratorRegistry::with_builtin();
    let mut table = BlockTable::new();
    let generator = match registry.create(
        generator_name,
        &serde_json::Value::Object(Default::default()),
        &mut table,
    ) {
        Ok(generator) => generator,
        Err(e) => {
            log::error!("pre-generation skipped: {}", e);
            return;
        }
    };

    let center = ChunkCoord::containing(
        spawn.x.floor() as i32,
        spawn.y.floor() as i32,
        spawn.z.floor() as i32,
    );
    let r = radius as i32;
    let coords: Vec<ChunkCoord> = (-r..=r)
        .flat_map(|dy| {
            (-r..=r).flat_map(move |dz| {
                (-r..=r).map(move |dx| ChunkCoord::new(center.x + dx, center.y + dy, center.z + dz))
            })
        })
        .collect();

    log::info!("pre-generating {} chunks (radius {})", coords.len(), radius);
    let start = std::time::Instant::now();

    let chunks: Vec<_> = coords
        .par_iter()
        .map(|&coord| generator.generate_chunk(coord))
        .filter(|chunk| !chunk.is_empty())
        .collect();

    let mut regions: HashMap<RegionCoord, Region> = HashMap::new();
    for chunk in chunks {
        let region = regions
            .entry(chunk.coord.region())
            .or_insert_with(|| Region::new(chunk.coord.region()));
        if let Err(e) = region.insert_chunk(chunk) {
            log::error!("pre-generation insert failed: {}", e);
        }
    }

    let storage = WorldStorage::new(world_dir);
    for region in regions.values() {
        if let Err(e) = storage.save_region(region).await {
            log::error!("pre-generation save failed: {}", e);
        }
    }
    log::info!(
        "pre-generated in {:.1}s",
        start.elapsed().as_secs_f32()
    );
}

fn parse_str_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_u32_arg(args: &[String], name: &str) -> Option<u32> {
    parse_str_arg(args, name).and_then(|s| s.parse().ok())
}
