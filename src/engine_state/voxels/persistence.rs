//! # Persistence
//!
//! Run-length encoded chunk snapshots. A snapshot stores voxel content (type,
//! color, water level, flags) and the chunk's light sources. Light itself is never
//! stored: loading a chunk rebuilds its lightmap from the sky, its neighbours and
//! its light sources.
//!
//! Voxel types are written by name so snapshots survive changes to the order of
//! the voxel definitions.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use cgmath::Point3;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::{Result, VoxelError};
use crate::engine_state::voxels::chunk::chunk_creation::ChunkCreationIterator;
use crate::engine_state::voxels::chunk::chunk_iteration::ChunkRunIterator;
use crate::engine_state::voxels::chunk::{ChunkHandle, CHUNK_DIMENSION, CHUNK_SIZE};
use crate::engine_state::voxels::voxel::{Voxel, VoxelTypeIndex, FIRST_DEFINITION_TYPE};
use crate::engine_state::voxels::world::World;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A run of voxels with identical content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelRun {
    /// `0` for empty, otherwise the position in `voxel_names` plus one.
    pub voxel: u16,
    /// RGBA tint.
    pub color: [u8; 4],
    /// Fluid fill amount.
    #[serde(default)]
    pub water_level: u8,
    /// Rotation and orientation bits.
    #[serde(default)]
    pub flags: u8,
    /// Number of voxels in the run.
    pub repetitions: u16,
}

/// A stored torch emitter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSourceRecord {
    /// Local voxel index.
    pub voxel_index: u16,
    /// Torch intensity.
    pub intensity: u8,
}

/// Stored content of one chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSnapshot {
    /// World-space minimum corner.
    pub anchor: [i32; 3],
    /// Sunlight falls through the chunk without attenuation.
    pub is_above_surface: bool,
    /// Voxel runs in storage order, covering the whole chunk.
    pub runs: Vec<VoxelRun>,
    /// Torch emitters.
    #[serde(default)]
    pub light_sources: Vec<LightSourceRecord>,
}

/// Stored content of a set of chunks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Format version.
    pub version: u32,
    /// Voxel names referenced by the runs.
    pub voxel_names: Vec<String>,
    /// Chunks.
    pub chunks: Vec<ChunkSnapshot>,
}

impl WorldSnapshot {
    /// Serializes the snapshot as JSON.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self).map_err(|e| VoxelError::Snapshot(e.to_string()))
    }

    /// Deserializes a snapshot from JSON.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let snapshot: WorldSnapshot =
            serde_json::from_reader(reader).map_err(|e| VoxelError::Snapshot(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(VoxelError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Writes the snapshot to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a snapshot from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }

    /// Folds a newer snapshot into this one.
    ///
    /// Chunks of `newer` replace stored chunks with the same anchor, the others
    /// are kept. Run ids of kept chunks are rewritten to the newer name list.
    pub fn merge(&mut self, newer: WorldSnapshot) {
        let mut voxel_names = newer.voxel_names;
        let remap: Vec<u16> = self
            .voxel_names
            .iter()
            .map(|name| {
                let position = match voxel_names.iter().position(|n| n == name) {
                    Some(position) => position,
                    None => {
                        voxel_names.push(name.clone());
                        voxel_names.len() - 1
                    }
                };
                (position + 1) as u16
            })
            .collect();

        let replaced: HashSet<[i32; 3]> = newer.chunks.iter().map(|c| c.anchor).collect();
        let mut chunks: Vec<ChunkSnapshot> = std::mem::take(&mut self.chunks)
            .into_iter()
            .filter(|chunk| !replaced.contains(&chunk.anchor))
            .map(|mut chunk| {
                for run in chunk.runs.iter_mut().filter(|run| run.voxel != 0) {
                    // Unknown ids stay out of range and fail on load.
                    run.voxel = remap.get(run.voxel as usize - 1).copied().unwrap_or(u16::MAX);
                }
                chunk
            })
            .collect();
        chunks.extend(newer.chunks);
        chunks.sort_by_key(|chunk| chunk.anchor);

        self.version = SNAPSHOT_VERSION;
        self.voxel_names = voxel_names;
        self.chunks = chunks;
    }
}

impl World {
    /// Names of every registered voxel type, in type index order.
    fn voxel_names(&self) -> Vec<String> {
        (0..self.registry.len())
            .filter_map(|i| {
                self.registry
                    .name_of(FIRST_DEFINITION_TYPE + i as VoxelTypeIndex)
                    .map(str::to_string)
            })
            .collect()
    }

    /// Encodes a resident chunk.
    ///
    /// Run voxel ids refer to the registry order, see [`World::snapshot`].
    pub fn save_chunk(&self, handle: ChunkHandle) -> ChunkSnapshot {
        let chunk = self.pool.chunk(handle);
        let anchor = chunk.anchor();
        let runs = ChunkRunIterator::new(chunk, u16::MAX as usize)
            .map(|span| {
                let voxel = if span.voxel.has_content() {
                    span.voxel.type_index - FIRST_DEFINITION_TYPE + 1
                } else {
                    0
                };
                VoxelRun {
                    voxel,
                    color: span.voxel.color,
                    water_level: span.voxel.water_level,
                    flags: span.voxel.flags,
                    repetitions: span.repetitions as u16,
                }
            })
            .collect();

        ChunkSnapshot {
            anchor: [anchor.x, anchor.y, anchor.z],
            is_above_surface: chunk.is_above_surface,
            runs,
            light_sources: chunk
                .light_sources
                .iter()
                .map(|s| LightSourceRecord {
                    voxel_index: s.voxel_index as u16,
                    intensity: s.intensity,
                })
                .collect(),
        }
    }

    /// Encodes every resident chunk with unsaved edits.
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut handles: Vec<_> = self
            .pool
            .handles()
            .filter(|h| self.pool.chunk(*h).modified)
            .collect();
        handles.sort_by_key(|h| {
            let c = self.pool.chunk(*h).coord;
            (c.x, c.y, c.z)
        });

        WorldSnapshot {
            version: SNAPSHOT_VERSION,
            voxel_names: self.voxel_names(),
            chunks: handles.into_iter().map(|h| self.save_chunk(h)).collect(),
        }
    }

    /// Clears the unsaved edit flag of every resident chunk.
    pub fn mark_saved(&mut self) {
        let handles: Vec<_> = self.pool.handles().collect();
        for handle in handles {
            self.pool.chunk_mut(handle).modified = false;
        }
    }

    /// Makes a stored chunk resident, replacing whatever was there.
    ///
    /// The chunk counts as populated and edited. Light is rebuilt.
    ///
    /// # Arguments
    /// * `snapshot` - The stored chunk
    /// * `voxel_names` - Names the run ids refer to
    ///
    /// # Errors
    /// `VoxelError::Snapshot` for unknown voxel names, misaligned anchors, runs
    /// that do not cover the chunk exactly and out of range light sources.
    pub fn load_chunk(&mut self, snapshot: &ChunkSnapshot, voxel_names: &[String]) -> Result<ChunkHandle> {
        let types = voxel_names
            .iter()
            .map(|name| {
                self.registry
                    .index_of(name)
                    .ok_or_else(|| VoxelError::Snapshot(format!("unknown voxel '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let [x, y, z] = snapshot.anchor;
        if [x, y, z].iter().any(|c| c.rem_euclid(CHUNK_DIMENSION) != 0) {
            return Err(VoxelError::Snapshot(format!(
                "anchor {:?} is not chunk aligned",
                snapshot.anchor
            )));
        }
        let coord = Point3::new(x, y, z) / CHUNK_DIMENSION;

        let mut builder = ChunkCreationIterator::new(coord);
        for run in &snapshot.runs {
            let voxel = match run.voxel {
                0 => Voxel::EMPTY,
                id => {
                    let type_index = *types.get(id as usize - 1).ok_or_else(|| {
                        VoxelError::Snapshot(format!("voxel id {} out of range", id))
                    })?;
                    let mut voxel = self.registry.make_voxel(type_index);
                    voxel.color = run.color;
                    voxel.water_level = run.water_level;
                    voxel.flags = run.flags;
                    voxel
                }
            };
            builder.push_run(voxel, run.repetitions as usize)?;
        }
        let loaded = builder.return_chunk()?;

        if let Some(bad) = snapshot
            .light_sources
            .iter()
            .find(|s| s.voxel_index as i32 >= CHUNK_SIZE)
        {
            return Err(VoxelError::Snapshot(format!(
                "light source index {} out of range",
                bad.voxel_index
            )));
        }

        let (handle, _) = self.pool.acquire(coord)?;
        let chunk = self.pool.chunk_mut(handle);
        chunk.voxels.copy_from_slice(&loaded.voxels);
        chunk.is_above_surface = snapshot.is_above_surface;
        chunk.is_populated = true;
        chunk.modified = true;
        chunk.light_sources.clear();
        for source in &snapshot.light_sources {
            chunk.add_light_source(source.voxel_index as usize, source.intensity);
        }
        self.clear_generation_pending(coord);
        self.lighting.rebuild_chunk_lightmap(&mut self.pool, handle);

        debug!("Loaded chunk {:?}", coord);
        Ok(handle)
    }

    /// Loads every chunk of a snapshot.
    ///
    /// # Returns
    /// The number of chunks loaded.
    pub fn load_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<usize> {
        for chunk in &snapshot.chunks {
            self.load_chunk(chunk, &snapshot.voxel_names)?;
        }
        info!("Loaded {} chunks from snapshot", snapshot.chunks.len());
        Ok(snapshot.chunks.len())
    }
}
