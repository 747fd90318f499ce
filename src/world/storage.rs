//! Region file I/O and world metadata
//!
//! Regions persist as `r.{rx}.{ry}.{rz}.dat` under the world directory;
//! a `world.json` sidecar carries the spawn point, generator name and
//! options, and the exported block table so numeric ids survive
//! restarts.
//!
//! Read failures never propagate: a corrupt or missing region file
//! loads as `None` and falls through to the generator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::world::block::BlockTableExport;
use crate::world::coords::RegionCoord;
use crate::world::region::Region;

/// World metadata sidecar, `world.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMeta {
    pub spawn: [f32; 3],
    pub generator: String,
    #[serde(default)]
    pub generator_options: serde_json::Value,
    pub blocks: BlockTableExport,
}

/// File-backed region and metadata store for one world directory
pub struct WorldStorage {
    base_dir: PathBuf,
}

impl WorldStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File path for a region
    pub fn region_path(&self, coord: RegionCoord) -> PathBuf {
        self.base_dir
            .join(format!("r.{}.{}.{}.dat", coord.x, coord.y, coord.z))
    }

    /// Path of the metadata sidecar
    pub fn meta_path(&self) -> PathBuf {
        self.base_dir.join("world.json")
    }

    /// Load a region from disk.
    ///
    /// Missing and corrupt files both yield `None` ("not yet
    /// generated"); corruption is logged.
    pub async fn load_region(&self, coord: RegionCoord) -> Option<Region> {
        let path = self.region_path(coord);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("failed to read region file {}: {}", path.display(), e);
                return None;
            }
        };
        match Region::deserialize(&bytes, coord) {
            Ok(region) => {
                log::debug!(
                    "loaded region ({}, {}, {}) with {} chunks",
                    coord.x,
                    coord.y,
                    coord.z,
                    region.chunk_count()
                );
                Some(region)
            }
            Err(e) => {
                log::warn!("corrupt region file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Save a region to disk.
    ///
    /// Empty regions are not persisted; an existing file for an emptied
    /// region is deleted.
    pub async fn save_region(&self, region: &Region) -> Result<()> {
        let path = self.region_path(region.coord);
        if region.is_empty() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::debug!("deleted empty region file {}", path.display());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, region.serialize()).await?;
        log::debug!(
            "saved region ({}, {}, {}) with {} chunks",
            region.coord.x,
            region.coord.y,
            region.coord.z,
            region.chunk_count()
        );
        Ok(())
    }

    /// Load the metadata sidecar if present
    pub async fn load_meta(&self) -> Result<Option<WorldMeta>> {
        let path = self.meta_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta = serde_json::from_slice(&bytes)?;
        Ok(Some(meta))
    }

    /// Write the metadata sidecar
    pub async fn save_meta(&self, meta: &WorldMeta) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let json = serde_json::to_vec_pretty(meta)?;
        tokio::fs::write(self.meta_path(), json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::block::BlockTable;
    use crate::world::coords::ChunkCoord;

    #[test]
    fn test_region_path_format() {
        let storage = WorldStorage::new("/tmp/world");
        let path = storage.region_path(RegionCoord::new(5, -1, 0));
        assert_eq!(path, PathBuf::from("/tmp/world/r.5.-1.0.dat"));
    }

    #[tokio::test]
    async fn test_load_missing_region_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorldStorage::new(dir.path());
        assert!(storage.load_region(RegionCoord::new(0, 0, 0)).await.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_region() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorldStorage::new(dir.path());

        let coord = RegionCoord::new(1, 0, -2);
        let mut region = Region::new(coord);
        let chunk_coord = coord.chunk_at(3, 4, 5);
        region
            .get_or_create_chunk(chunk_coord)
            .unwrap()
            .set_block(7, 8, 9, 11)
            .unwrap();

        storage.save_region(&region).await.unwrap();
        let loaded = storage.load_region(coord).await.unwrap();
        assert_eq!(loaded.chunk_count(), 1);
        assert_eq!(
            loaded
                .get_chunk(chunk_coord)
                .unwrap()
                .get_block(7, 8, 9)
                .unwrap(),
            11
        );
    }

    #[tokio::test]
    async fn test_corrupt_region_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorldStorage::new(dir.path());
        let coord = RegionCoord::new(0, 0, 0);

        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(storage.region_path(coord), b"garbage")
            .await
            .unwrap();
        assert!(storage.load_region(coord).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_region_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorldStorage::new(dir.path());
        let coord = RegionCoord::new(0, 0, 0);

        let mut region = Region::new(coord);
        let chunk_coord = ChunkCoord::new(0, 0, 0);
        region
            .get_or_create_chunk(chunk_coord)
            .unwrap()
            .set_block(0, 0, 0, 1)
            .unwrap();
        storage.save_region(&region).await.unwrap();
        assert!(storage.region_path(coord).exists());

        // Hollow the region out; saving now removes the file
        region
            .get_chunk_mut(chunk_coord)
            .unwrap()
            .set_block(0, 0, 0, 0)
            .unwrap();
        region.remove_chunk_if_empty(chunk_coord);
        storage.save_region(&region).await.unwrap();
        assert!(!storage.region_path(coord).exists());
    }

    #[tokio::test]
    async fn test_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorldStorage::new(dir.path());

        let mut table = BlockTable::new();
        table.register("stone").unwrap();
        let meta = WorldMeta {
            spawn: [0.5, 64.0, 0.5],
            generator: "flat".into(),
            generator_options: serde_json::json!({ "stone_layers": 60 }),
            blocks: table.export(),
        };
        storage.save_meta(&meta).await.unwrap();

        let loaded = storage.load_meta().await.unwrap().unwrap();
        assert_eq!(loaded.generator, "flat");
        assert_eq!(loaded.spawn, [0.5, 64.0, 0.5]);
        assert_eq!(loaded.blocks, meta.blocks);
    }
}
