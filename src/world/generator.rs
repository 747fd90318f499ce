//! Pluggable terrain generators
//!
//! A world records its generator by name in metadata, so the terrain
//! algorithm is swappable without touching storage code. The registry
//! is an explicit per-world object; nothing here is process-global.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{BlockId, Result, Vec3};
use crate::world::block::BlockTable;
use crate::world::chunk::{voxel_index, Chunk, CHUNK_VOLUME};
use crate::world::coords::{ChunkCoord, CHUNK_SIZE};

/// Descriptive information about a generator instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorInfo {
    pub name: String,
    pub description: String,
}

/// Terrain generator contract.
///
/// `generate_chunk` must be deterministic for a given coordinate so
/// regenerating an unsaved chunk reproduces the same terrain.
pub trait Generator: Send + Sync {
    fn generate_chunk(&self, coord: ChunkCoord) -> Chunk;
    fn spawn_point(&self) -> Vec3;
    fn info(&self) -> GeneratorInfo;
}

/// Factory signature: builds a generator from JSON options, registering
/// the block names it emits in the session's block table.
pub type GeneratorFactory =
    fn(&serde_json::Value, &mut BlockTable) -> Result<Box<dyn Generator>>;

/// Name -> factory registry, constructed per world/session
pub struct GeneratorRegistry {
    factories: std::collections::HashMap<String, GeneratorFactory>,
}

impl GeneratorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: std::collections::HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in generators
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("flat", FlatGenerator::factory);
        registry.register("noise", NoiseGenerator::factory);
        registry
    }

    /// Register a factory under a name, replacing any existing one
    pub fn register(&mut self, name: &str, factory: GeneratorFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Instantiate a generator by name
    pub fn create(
        &self,
        name: &str,
        options: &serde_json::Value,
        table: &mut BlockTable,
    ) -> Result<Box<dyn Generator>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownGenerator(name.to_string()))?;
        factory(options, table)
    }

    /// Registered generator names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Options for [`FlatGenerator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatOptions {
    pub stone_layers: i32,
    pub dirt_layers: i32,
}

impl Default for FlatOptions {
    fn default() -> Self {
        Self {
            stone_layers: 60,
            dirt_layers: 3,
        }
    }
}

/// Flat world: stone layers, dirt layers, one grass layer on top
pub struct FlatGenerator {
    options: FlatOptions,
    ground_height: i32,
    stone: BlockId,
    dirt: BlockId,
    grass: BlockId,
}

impl FlatGenerator {
    pub fn new(options: FlatOptions, table: &mut BlockTable) -> Result<Self> {
        let stone = table.register("stone")?;
        let dirt = table.register("dirt")?;
        let grass = table.register("grass")?;
        // Grass is the single topmost layer
        let ground_height = options.stone_layers + options.dirt_layers + 1;
        Ok(Self {
            options,
            ground_height,
            stone,
            dirt,
            grass,
        })
    }

    fn factory(options: &serde_json::Value, table: &mut BlockTable) -> Result<Box<dyn Generator>> {
        let options: FlatOptions = serde_json::from_value(options.clone())?;
        Ok(Box::new(Self::new(options, table)?))
    }

    /// World height of the first air block above ground
    pub fn ground_height(&self) -> i32 {
        self.ground_height
    }

    fn block_at_height(&self, wy: i32) -> BlockId {
        if wy < 0 || wy >= self.ground_height {
            0
        } else if wy < self.options.stone_layers {
            self.stone
        } else if wy < self.options.stone_layers + self.options.dirt_layers {
            self.dirt
        } else {
            self.grass
        }
    }
}

impl Generator for FlatGenerator {
    fn generate_chunk(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        let (_, min_wy, _) = coord.world_origin();
        let max_wy = min_wy + CHUNK_SIZE - 1;

        // Early exit: chunks wholly above ground or below the world
        // floor are all air; skipping them never changes output.
        if min_wy >= self.ground_height || max_wy < 0 {
            return chunk;
        }

        let mut grid = [0 as BlockId; CHUNK_VOLUME];
        for y in 0..CHUNK_SIZE {
            let id = self.block_at_height(min_wy + y);
            if id == 0 {
                continue;
            }
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    grid[voxel_index(x, y, z)] = id;
                }
            }
        }
        chunk.fill_from(grid);
        chunk
    }

    fn spawn_point(&self) -> Vec3 {
        Vec3::new(0.5, self.ground_height as f32, 0.5)
    }

    fn info(&self) -> GeneratorInfo {
        GeneratorInfo {
            name: "flat".into(),
            description: format!(
                "flat terrain, {} stone + {} dirt + grass",
                self.options.stone_layers, self.options.dirt_layers
            ),
        }
    }
}

/// Options for [`NoiseGenerator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseOptions {
    pub seed: u32,
    pub scale: f64,
    pub height_scale: f64,
    pub octaves: usize,
    pub persistence: f64,
    pub lacunarity: f64,
}

impl Default for NoiseOptions {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            height_scale: 64.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Heightmap terrain from fractal Brownian motion over Perlin noise
pub struct NoiseGenerator {
    options: NoiseOptions,
    noise: Fbm<Perlin>,
    stone: BlockId,
    dirt: BlockId,
    grass: BlockId,
}

impl NoiseGenerator {
    pub fn new(options: NoiseOptions, table: &mut BlockTable) -> Result<Self> {
        let noise = Fbm::<Perlin>::new(options.seed)
            .set_octaves(options.octaves)
            .set_persistence(options.persistence)
            .set_lacunarity(options.lacunarity);
        let stone = table.register("stone")?;
        let dirt = table.register("dirt")?;
        let grass = table.register("grass")?;
        Ok(Self {
            options,
            noise,
            stone,
            dirt,
            grass,
        })
    }

    fn factory(options: &serde_json::Value, table: &mut BlockTable) -> Result<Box<dyn Generator>> {
        let options: NoiseOptions = serde_json::from_value(options.clone())?;
        Ok(Box::new(Self::new(options, table)?))
    }

    /// Terrain height (first air y) at a world column
    pub fn height_at(&self, wx: i32, wz: i32) -> i32 {
        let nx = wx as f64 / self.options.scale;
        let nz = wz as f64 / self.options.scale;
        let value = self.noise.get([nx, nz]); // [-1, 1]
        let normalized = (value + 1.0) / 2.0;
        (normalized * self.options.height_scale).floor() as i32 + 1
    }
}

impl Generator for NoiseGenerator {
    fn generate_chunk(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        let (min_wx, min_wy, min_wz) = coord.world_origin();
        let max_wy = min_wy + CHUNK_SIZE - 1;

        // Columns below the world floor or far above the height range
        // are all air
        if max_wy < 0 || min_wy > self.options.height_scale as i32 + 1 {
            return chunk;
        }

        let mut grid = [0 as BlockId; CHUNK_VOLUME];
        let mut any = false;
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let height = self.height_at(min_wx + x, min_wz + z);
                for y in 0..CHUNK_SIZE {
                    let wy = min_wy + y;
                    if wy < 0 || wy >= height {
                        continue;
                    }
                    let id = if wy == height - 1 {
                        self.grass
                    } else if wy >= height - 4 {
                        self.dirt
                    } else {
                        self.stone
                    };
                    grid[voxel_index(x, y, z)] = id;
                    any = true;
                }
            }
        }
        if any {
            chunk.fill_from(grid);
        }
        chunk
    }

    fn spawn_point(&self) -> Vec3 {
        let height = self.height_at(0, 0);
        Vec3::new(0.5, height as f32, 0.5)
    }

    fn info(&self) -> GeneratorInfo {
        GeneratorInfo {
            name: "noise".into(),
            description: format!(
                "fbm heightmap terrain, seed {} scale {}",
                self.options.seed, self.options.scale
            ),
        }
    }
}
