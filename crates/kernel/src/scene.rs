use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use iconstage_common::{
    Channel, ChannelMask, Color, EntityId, MeshHandle, SpriteHandle, Transform,
};

/// An event record produced by every mutation to the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SceneEvent {
    /// Node was spawned under `parent` (or as a root).
    Spawned {
        id: EntityId,
        parent: Option<EntityId>,
        transform: Transform,
    },
    /// Node was despawned. Carries the transform it had.
    Despawned { id: EntityId, transform: Transform },
    /// Local transform was updated.
    TransformUpdated {
        id: EntityId,
        old: Transform,
        new: Transform,
    },
    /// Node moved to another visibility channel.
    ChannelChanged {
        id: EntityId,
        old: Channel,
        new: Channel,
    },
    /// Drawable component was attached, replaced or removed.
    DrawableChanged { id: EntityId },
}

/// What a drawable puts on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Mesh(MeshHandle),
    Sprite(SpriteHandle),
    /// Occupies a slot in draw ordering but has no geometry.
    Empty,
}

/// Drawable capability of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drawable {
    pub shape: Shape,
    /// Base color for meshes, tint for sprites.
    pub color: Color,
    /// Lower orders are drawn first.
    pub sort_order: i32,
    pub enabled: bool,
}

impl Drawable {
    pub fn mesh(mesh: MeshHandle, color: Color) -> Self {
        Self {
            shape: Shape::Mesh(mesh),
            color,
            sort_order: 0,
            enabled: true,
        }
    }

    pub fn sprite(sprite: SpriteHandle, tint: Color, sort_order: i32) -> Self {
        Self {
            shape: Shape::Sprite(sprite),
            color: tint,
            sort_order,
            enabled: true,
        }
    }

    /// A disabled, geometry-less drawable that only pins a sort key.
    pub fn placeholder(sort_order: i32) -> Self {
        Self {
            shape: Shape::Empty,
            color: Color::WHITE,
            sort_order,
            enabled: false,
        }
    }

    /// Whether this drawable contributes geometry (enabled or not).
    pub fn has_geometry(&self) -> bool {
        !matches!(self.shape, Shape::Empty)
    }
}

/// Per-node data stored in the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub parent: Option<EntityId>,
    children: Vec<EntityId>,
    /// Transform relative to the parent.
    pub transform: Transform,
    pub channel: Channel,
    pub drawable: Option<Drawable>,
}

impl Node {
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }
}

/// Errors from scene operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("node {0:?} not found")]
    NodeNotFound(EntityId),
}

/// The authoritative node hierarchy.
///
/// Nodes live in a BTreeMap keyed by id; hierarchy order (roots, children) is
/// kept separately in insertion order so traversal does not depend on the
/// random ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    nodes: BTreeMap<EntityId, Node>,
    roots: Vec<EntityId>,
    /// Append-only event log of all mutations.
    #[serde(skip)]
    event_log: Vec<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the scene.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Ids of every node, in canonical order.
    pub fn node_ids(&self) -> BTreeSet<EntityId> {
        self.nodes.keys().copied().collect()
    }

    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node(&self, id: EntityId) -> Result<&Node, SceneError> {
        self.nodes.get(&id).ok_or(SceneError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: EntityId) -> Result<&mut Node, SceneError> {
        self.nodes.get_mut(&id).ok_or(SceneError::NodeNotFound(id))
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    /// Forget every event after the first `len`, returning how many were
    /// dropped. Used to erase the record of edits that have been undone.
    pub fn truncate_events(&mut self, len: usize) -> usize {
        let dropped = self.event_log.len().saturating_sub(len);
        self.event_log.truncate(len);
        dropped
    }

    /// Spawn a root node on the default channel.
    pub fn spawn(&mut self, name: impl Into<String>, transform: Transform) -> EntityId {
        let id = EntityId::new();
        self.attach(id, None, name.into(), transform, Channel::DEFAULT, None);
        id
    }

    /// Spawn a node under `parent`, inheriting the parent's channel.
    pub fn spawn_child(
        &mut self,
        parent: EntityId,
        name: impl Into<String>,
        transform: Transform,
    ) -> Result<EntityId, SceneError> {
        let channel = self.node(parent)?.channel;
        let id = EntityId::new();
        self.attach(id, Some(parent), name.into(), transform, channel, None);
        Ok(id)
    }

    fn attach(
        &mut self,
        id: EntityId,
        parent: Option<EntityId>,
        name: String,
        transform: Transform,
        channel: Channel,
        drawable: Option<Drawable>,
    ) {
        self.nodes.insert(
            id,
            Node {
                name,
                parent,
                children: Vec::new(),
                transform,
                channel,
                drawable,
            },
        );
        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(p) => p.children.push(id),
            None => self.roots.push(id),
        }
        self.event_log.push(SceneEvent::Spawned {
            id,
            parent,
            transform,
        });
    }

    /// Attach, replace or remove a node's drawable.
    pub fn set_drawable(
        &mut self,
        id: EntityId,
        drawable: Option<Drawable>,
    ) -> Result<(), SceneError> {
        self.node_mut(id)?.drawable = drawable;
        self.event_log.push(SceneEvent::DrawableChanged { id });
        Ok(())
    }

    /// Update a node's local transform and log the change.
    pub fn set_transform(&mut self, id: EntityId, new: Transform) -> Result<(), SceneError> {
        let node = self.node_mut(id)?;
        let old = node.transform;
        node.transform = new;
        self.event_log
            .push(SceneEvent::TransformUpdated { id, old, new });
        Ok(())
    }

    /// Move a node to another channel. Returns the channel it had.
    pub fn set_channel(&mut self, id: EntityId, new: Channel) -> Result<Channel, SceneError> {
        let node = self.node_mut(id)?;
        let old = node.channel;
        node.channel = new;
        if old != new {
            self.event_log
                .push(SceneEvent::ChannelChanged { id, old, new });
        }
        Ok(old)
    }

    /// Local-to-world matrix, composed up the parent chain.
    pub fn world_matrix(&self, id: EntityId) -> Result<Mat4, SceneError> {
        let mut node = self.node(id)?;
        let mut matrix = node.transform.matrix();
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            matrix = node.transform.matrix() * matrix;
        }
        Ok(matrix)
    }

    pub fn world_position(&self, id: EntityId) -> Result<Vec3, SceneError> {
        Ok(self.world_matrix(id)?.transform_point3(Vec3::ZERO))
    }

    /// The node and all of its descendants, pre-order, children in insertion order.
    pub fn descendants(&self, id: EntityId) -> Result<Vec<EntityId>, SceneError> {
        self.node(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev());
            }
        }
        Ok(out)
    }

    /// Every node in hierarchy order: roots in spawn order, each followed by its subtree.
    pub fn traverse(&self) -> Vec<EntityId> {
        self.roots
            .iter()
            .flat_map(|&root| self.descendants(root).unwrap_or_default())
            .collect()
    }

    /// Deep-copy the subtree rooted at `source` under `parent` (or as a root).
    ///
    /// The copy gets fresh ids; the source subtree is left untouched.
    /// Returns the id of the copied root.
    pub fn instantiate(
        &mut self,
        source: EntityId,
        parent: Option<EntityId>,
    ) -> Result<EntityId, SceneError> {
        self.node(source)?;
        if let Some(p) = parent {
            self.node(p)?;
        }

        let root = EntityId::new();
        let mut queue = VecDeque::from([(source, root, parent)]);
        while let Some((src_id, new_id, new_parent)) = queue.pop_front() {
            let src = self.node(src_id)?.clone();
            self.attach(
                new_id,
                new_parent,
                src.name,
                src.transform,
                src.channel,
                src.drawable,
            );
            for child in src.children {
                queue.push_back((child, EntityId::new(), Some(new_id)));
            }
        }
        tracing::debug!(?source, copy = ?root, "instantiated subtree");
        Ok(root)
    }

    /// Remove a node and its whole subtree. Returns how many nodes were removed.
    pub fn despawn_recursive(&mut self, id: EntityId) -> Result<usize, SceneError> {
        let doomed = self.descendants(id)?;
        let parent = self.node(id)?.parent;
        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(p) => p.children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }
        for node_id in doomed.iter().rev() {
            if let Some(node) = self.nodes.remove(node_id) {
                self.event_log.push(SceneEvent::Despawned {
                    id: *node_id,
                    transform: node.transform,
                });
            }
        }
        Ok(doomed.len())
    }

    /// Channels currently occupied by at least one node.
    pub fn channels_in_use(&self) -> ChannelMask {
        self.nodes
            .values()
            .fold(ChannelMask::NONE, |mask, n| mask.with(n.channel))
    }

    /// Highest channel no node is on, if any.
    pub fn free_channel(&self) -> Option<Channel> {
        let used = self.channels_in_use();
        (0..Channel::COUNT)
            .rev()
            .filter_map(|i| Channel::new(i).ok())
            .find(|c| !used.contains(*c))
    }

    /// Deterministic hash of the scene state (ids, hierarchy, transforms,
    /// channels, drawables). The event log is not part of the state.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325; // FNV offset basis
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        let mix_f32s = |h: &mut u64, values: &[f32]| {
            for v in values {
                mix(h, &v.to_le_bytes());
            }
        };
        for root in &self.roots {
            mix(&mut h, root.0.as_bytes());
        }
        for (id, node) in &self.nodes {
            mix(&mut h, id.0.as_bytes());
            mix(&mut h, node.name.as_bytes());
            if let Some(parent) = node.parent {
                mix(&mut h, parent.0.as_bytes());
            }
            for child in &node.children {
                mix(&mut h, child.0.as_bytes());
            }
            let t = &node.transform;
            mix_f32s(&mut h, &t.position.to_array());
            mix_f32s(&mut h, &t.rotation.to_array());
            mix_f32s(&mut h, &t.scale.to_array());
            mix(&mut h, &[node.channel.index()]);
            if let Some(d) = &node.drawable {
                match d.shape {
                    Shape::Mesh(m) => {
                        mix(&mut h, &[1]);
                        mix(&mut h, &m.0.to_le_bytes());
                    }
                    Shape::Sprite(s) => {
                        mix(&mut h, &[2]);
                        mix(&mut h, &s.0.to_le_bytes());
                    }
                    Shape::Empty => mix(&mut h, &[3]),
                }
                mix_f32s(&mut h, &[d.color.r, d.color.g, d.color.b, d.color.a]);
                mix(&mut h, &d.sort_order.to_le_bytes());
                mix(&mut h, &[d.enabled as u8]);
            }
        }
        h
    }
}
