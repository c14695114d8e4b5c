//! # Connected Voxels
//!
//! A voxel definition may carry a placement resolver. When a voxel of that type
//! is placed, the world gathers the 26 surrounding voxels and asks the resolver
//! what to actually place. The rule-based resolver in this module matches a set of
//! neighbour conditions (rotated with the placement) and then replaces, randomizes,
//! cycles or cancels the placement.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use cgmath::Point3;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::WorldRand;

use super::{VoxelTypeIndex, HOLE_TYPE};

/// Number of cells in a 3x3x3 neighbourhood.
pub const NEIGHBOURHOOD_SIZE: usize = 27;
/// Index of the placed voxel inside the neighbourhood.
pub const NEIGHBOURHOOD_CENTER: usize = 13;

/// Horizontal 3x3 layer remapping for each of the four placement rotations.
///
/// Layer slot `i` is `(dz + 1) * 3 + (dx + 1)`; row `r` gives, for each slot of the
/// rule pattern, the slot of the world layer it is compared against.
const LAYER_ROTATIONS: [[usize; 9]; 4] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8],
    [2, 5, 8, 1, 4, 7, 0, 3, 6],
    [8, 7, 6, 5, 4, 3, 2, 1, 0],
    [6, 3, 0, 7, 4, 1, 8, 5, 2],
];

/// Neighbourhood slot of an offset in `-1..=1` on every axis.
pub fn neighbourhood_slot(dx: i32, dy: i32, dz: i32) -> usize {
    ((dy + 1) * 9 + (dz + 1) * 3 + (dx + 1)) as usize
}

/// Everything a resolver may look at.
#[derive(Clone, Debug)]
pub struct ResolveContext {
    /// World position of the placement.
    pub position: Point3<i32>,
    /// Type requested by the caller.
    pub type_index: VoxelTypeIndex,
    /// Requested texture rotation, 0..=3.
    pub rotation: u8,
    /// Type indices around the placement, indexed by [`neighbourhood_slot`].
    /// `None` where the chunk is not resident.
    pub neighbourhood: [Option<VoxelTypeIndex>; NEIGHBOURHOOD_SIZE],
    /// Position-hashed random source of the world.
    pub world_rand: WorldRand,
}

/// Outcome of a placement resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No rule applied; place the requested type.
    Keep,
    /// Do not place anything.
    Cancel,
    /// Place this type instead.
    Replace(VoxelTypeIndex),
}

/// Strategy attached to a voxel definition that decides what a placement becomes.
pub trait VoxelResolver: Send + Sync + fmt::Debug {
    /// Resolves a placement given its neighbourhood.
    fn resolve(&self, context: &ResolveContext) -> Resolution;
}

/// How a neighbour is compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighbourMatch {
    /// Always matches.
    Anything,
    /// Neighbour is the given voxel.
    Equals,
    /// Neighbour is not the given voxel.
    NotEquals,
    /// Neighbour is empty or a hole (or not resident).
    Empty,
    /// Neighbour has content.
    NotEmpty,
}

/// What a matching rule does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    /// Cancel the placement.
    Nothing,
    /// Place the first replacement.
    Replace,
    /// Place a position-hashed pick among the replacements.
    Random,
    /// Place the replacements in turn.
    Cycle,
}

/// A single neighbour condition, as written in the world definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NeighbourCondition {
    /// Offset from the placed voxel, each component in `-1..=1`.
    pub offset: [i32; 3],
    /// Comparison to apply.
    pub matches: NeighbourMatch,
    /// Voxel name for `Equals` / `NotEquals`.
    #[serde(default)]
    pub voxel: Option<String>,
}

/// A connected voxel rule, as written in the world definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectedRuleConfig {
    /// All conditions must hold. Unlisted offsets match anything.
    pub conditions: Vec<NeighbourCondition>,
    /// Action taken when the rule matches.
    pub action: RuleAction,
    /// Voxel names used by `Replace`, `Random` and `Cycle`.
    #[serde(default)]
    pub replacements: Vec<String>,
}

#[derive(Debug)]
struct ResolvedCondition {
    dx: i32,
    dy: i32,
    dz: i32,
    matches: NeighbourMatch,
    voxel: Option<VoxelTypeIndex>,
}

#[derive(Debug)]
struct ResolvedRule {
    conditions: Vec<ResolvedCondition>,
    action: RuleAction,
    replacements: Vec<VoxelTypeIndex>,
}

/// Rule based [`VoxelResolver`]. The first matching rule wins.
#[derive(Debug)]
pub struct ConnectedVoxelRules {
    rules: Vec<ResolvedRule>,
    cycle: AtomicUsize,
}

impl ConnectedVoxelRules {
    /// Resolves the voxel names of the given rules.
    ///
    /// Conditions with an out of range offset or an unknown voxel are dropped
    /// with a warning, as are unknown replacement names.
    ///
    /// # Arguments
    /// * `owner` - Name of the definition the rules belong to, for log messages
    /// * `configs` - The rules as written in the world definition
    /// * `lookup` - Name to type index resolution
    pub fn from_config<F>(owner: &str, configs: &[ConnectedRuleConfig], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<VoxelTypeIndex>,
    {
        let mut rules = Vec::with_capacity(configs.len());
        for config in configs {
            let mut conditions = Vec::with_capacity(config.conditions.len());
            for condition in &config.conditions {
                let [dx, dy, dz] = condition.offset;
                if [dx, dy, dz].iter().any(|c| !(-1..=1).contains(c)) {
                    warn!(
                        "Connected voxel '{}': ignoring condition with offset {:?}",
                        owner, condition.offset
                    );
                    continue;
                }
                let voxel = match (&condition.voxel, condition.matches) {
                    (Some(name), NeighbourMatch::Equals | NeighbourMatch::NotEquals) => {
                        match lookup(name) {
                            Some(index) => Some(index),
                            None => {
                                warn!(
                                    "Connected voxel '{}': unknown neighbour voxel '{}'",
                                    owner, name
                                );
                                continue;
                            }
                        }
                    }
                    _ => None,
                };
                conditions.push(ResolvedCondition {
                    dx,
                    dy,
                    dz,
                    matches: condition.matches,
                    voxel,
                });
            }

            let replacements = config
                .replacements
                .iter()
                .filter_map(|name| {
                    let index = lookup(name);
                    if index.is_none() {
                        warn!(
                            "Connected voxel '{}': unknown replacement voxel '{}'",
                            owner, name
                        );
                    }
                    index
                })
                .collect();

            rules.push(ResolvedRule {
                conditions,
                action: config.action,
                replacements,
            });
        }

        ConnectedVoxelRules {
            rules,
            cycle: AtomicUsize::new(0),
        }
    }

    /// Number of usable rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matches(rule: &ResolvedRule, context: &ResolveContext) -> bool {
        let rotation = (context.rotation & 3) as usize;
        rule.conditions.iter().all(|condition| {
            let layer_slot = ((condition.dz + 1) * 3 + (condition.dx + 1)) as usize;
            let slot = (condition.dy + 1) as usize * 9 + LAYER_ROTATIONS[rotation][layer_slot];
            let neighbour = context.neighbourhood[slot];
            let has_content = neighbour.map(|t| t > HOLE_TYPE).unwrap_or(false);
            match condition.matches {
                NeighbourMatch::Anything => true,
                NeighbourMatch::Equals => neighbour.is_some() && neighbour == condition.voxel,
                NeighbourMatch::NotEquals => neighbour != condition.voxel,
                NeighbourMatch::Empty => !has_content,
                NeighbourMatch::NotEmpty => has_content,
            }
        })
    }
}

impl VoxelResolver for ConnectedVoxelRules {
    fn resolve(&self, context: &ResolveContext) -> Resolution {
        let Some(rule) = self.rules.iter().find(|rule| Self::matches(rule, context)) else {
            return Resolution::Keep;
        };

        if rule.action == RuleAction::Nothing {
            return Resolution::Cancel;
        }
        if rule.replacements.is_empty() {
            return Resolution::Keep;
        }

        let pick = match rule.action {
            RuleAction::Replace | RuleAction::Nothing => 0,
            RuleAction::Random => context.world_rand.range_at(
                0,
                rule.replacements.len() as i32,
                context.position,
            ) as usize,
            RuleAction::Cycle => {
                self.cycle.fetch_add(1, Ordering::Relaxed) % rule.replacements.len()
            }
        };
        Resolution::Replace(rule.replacements[pick])
    }
}
