//! # Voxel Definition Module
//!
//! Named voxel types and the registry that maps them to the compact
//! [`VoxelTypeIndex`] stored in every voxel. The registry is built once from the
//! world definition and then shared immutably (behind an `Arc`) between the
//! controlling thread and the generation worker.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::connected::{ConnectedRuleConfig, ConnectedVoxelRules, VoxelResolver};
use super::{
    Voxel, VoxelTypeIndex, EMPTY_TYPE, FIRST_DEFINITION_TYPE, FULL_OPACITY, MAX_LIGHT,
    MAX_WATER_LEVEL,
};

/// A named voxel type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelDefinition {
    /// Unique name, used by biomes and snapshots to reference the type.
    pub name: String,
    /// Light obstruction, 0..=15.
    pub opacity: u8,
    /// Torch light emitted by the voxel, 0 for none.
    pub light_intensity: u8,
    /// Water voxels are placed with a full water level.
    pub is_water: bool,
    /// Default RGBA tint.
    pub color: [u8; 4],
    /// Whether placements may set a texture rotation.
    pub allows_texture_rotation: bool,
    /// Connected voxel rules applied on placement.
    pub connected: Vec<ConnectedRuleConfig>,
}

impl Default for VoxelDefinition {
    fn default() -> Self {
        VoxelDefinition {
            name: String::new(),
            opacity: FULL_OPACITY,
            light_intensity: 0,
            is_water: false,
            color: [255, 255, 255, 255],
            allows_texture_rotation: false,
            connected: Vec::new(),
        }
    }
}

impl VoxelDefinition {
    /// Creates an opaque definition with the given name and color.
    pub fn solid(name: &str, color: [u8; 4]) -> Self {
        VoxelDefinition {
            name: name.to_string(),
            color,
            ..Default::default()
        }
    }

    /// Creates a definition with a custom opacity.
    pub fn translucent(name: &str, opacity: u8, color: [u8; 4]) -> Self {
        VoxelDefinition {
            opacity,
            ..Self::solid(name, color)
        }
    }
}

/// Maps voxel names to type indices and back.
pub struct VoxelRegistry {
    definitions: Vec<VoxelDefinition>,
    resolvers: Vec<Option<Arc<dyn VoxelResolver>>>,
    by_name: HashMap<String, VoxelTypeIndex>,
    default_voxel: VoxelTypeIndex,
}

impl fmt::Debug for VoxelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelRegistry")
            .field("definitions", &self.definitions.len())
            .field("default_voxel", &self.default_voxel)
            .finish()
    }
}

impl VoxelRegistry {
    /// Builds a registry from a list of definitions.
    ///
    /// Indices are assigned in list order starting at `2`. Duplicate names keep the
    /// first definition. The first definition becomes the fallback for unknown
    /// names. Connected voxel rules are resolved once every name is known.
    ///
    /// # Arguments
    /// * `definitions` - The voxel definitions of the world
    ///
    /// # Returns
    /// A new `VoxelRegistry`.
    pub fn new(definitions: Vec<VoxelDefinition>) -> Self {
        let mut registry = VoxelRegistry {
            definitions: Vec::with_capacity(definitions.len()),
            resolvers: Vec::with_capacity(definitions.len()),
            by_name: HashMap::with_capacity(definitions.len()),
            default_voxel: EMPTY_TYPE,
        };

        for definition in definitions {
            registry.register(definition);
        }

        for slot in 0..registry.definitions.len() {
            let definition = &registry.definitions[slot];
            if definition.connected.is_empty() {
                continue;
            }
            let rules = ConnectedVoxelRules::from_config(
                &definition.name,
                &definition.connected,
                |name| registry.index_of(name),
            );
            if !rules.is_empty() {
                registry.set_resolver(FIRST_DEFINITION_TYPE + slot as VoxelTypeIndex, Arc::new(rules));
            }
        }

        registry
    }

    /// Registers a definition and returns its index.
    ///
    /// If the name is taken the existing index is returned and the new definition
    /// is ignored.
    pub fn register(&mut self, mut definition: VoxelDefinition) -> VoxelTypeIndex {
        if let Some(index) = self.by_name.get(&definition.name) {
            warn!("Voxel definition '{}' registered twice", definition.name);
            return *index;
        }

        definition.opacity = definition.opacity.min(FULL_OPACITY);
        definition.light_intensity = definition.light_intensity.min(MAX_LIGHT);

        let index = FIRST_DEFINITION_TYPE + self.definitions.len() as VoxelTypeIndex;
        debug!("Registered voxel '{}' as {}", definition.name, index);
        self.by_name.insert(definition.name.clone(), index);
        self.definitions.push(definition);
        self.resolvers.push(None);
        if self.default_voxel == EMPTY_TYPE {
            self.default_voxel = index;
        }
        index
    }

    /// Attaches a placement resolver to a registered type.
    pub fn set_resolver(&mut self, index: VoxelTypeIndex, resolver: Arc<dyn VoxelResolver>) {
        if let Some(slot) = self.slot(index) {
            self.resolvers[slot] = Some(resolver);
        }
    }

    fn slot(&self, index: VoxelTypeIndex) -> Option<usize> {
        let slot = index.checked_sub(FIRST_DEFINITION_TYPE)? as usize;
        (slot < self.definitions.len()).then_some(slot)
    }

    /// Looks up a type index by name.
    pub fn index_of(&self, name: &str) -> Option<VoxelTypeIndex> {
        self.by_name.get(name).copied()
    }

    /// Looks up a type index by name, falling back to the default voxel.
    ///
    /// Unknown names are logged at warn level.
    pub fn resolve_name(&self, name: &str) -> VoxelTypeIndex {
        match self.index_of(name) {
            Some(index) => index,
            None => {
                warn!(
                    "Unknown voxel definition '{}', using default voxel {}",
                    name, self.default_voxel
                );
                self.default_voxel
            }
        }
    }

    /// Same as [`resolve_name`](Self::resolve_name) for optional names.
    pub fn resolve_optional(&self, name: Option<&str>, fallback: VoxelTypeIndex) -> VoxelTypeIndex {
        name.map(|n| self.resolve_name(n)).unwrap_or(fallback)
    }

    /// Returns the definition of a type, if registered.
    pub fn get(&self, index: VoxelTypeIndex) -> Option<&VoxelDefinition> {
        self.slot(index).map(|slot| &self.definitions[slot])
    }

    /// Returns the placement resolver of a type, if any.
    pub fn resolver(&self, index: VoxelTypeIndex) -> Option<&Arc<dyn VoxelResolver>> {
        self.slot(index).and_then(|slot| self.resolvers[slot].as_ref())
    }

    /// Returns the name of a type, if registered.
    pub fn name_of(&self, index: VoxelTypeIndex) -> Option<&str> {
        self.get(index).map(|d| d.name.as_str())
    }

    /// The fallback voxel for unknown names (the first registered definition).
    pub fn default_voxel(&self) -> VoxelTypeIndex {
        self.default_voxel
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Opacity of a type. Empty, hole and unknown types are transparent.
    pub fn opacity_of(&self, index: VoxelTypeIndex) -> u8 {
        self.get(index).map(|d| d.opacity).unwrap_or(0)
    }

    /// Builds an unlit voxel of the given type with its default color.
    ///
    /// Water types are created full. Unknown indices produce an empty voxel.
    pub fn make_voxel(&self, index: VoxelTypeIndex) -> Voxel {
        match self.get(index) {
            Some(definition) => {
                let mut voxel = Voxel::new(index, definition.opacity, definition.color);
                if definition.is_water {
                    voxel.water_level = MAX_WATER_LEVEL;
                }
                voxel
            }
            None => Voxel::EMPTY,
        }
    }
}
