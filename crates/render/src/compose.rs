//! Builds the transient render group around an instanced subject.

use glam::{Vec2, Vec3};
use std::collections::BTreeMap;
use iconstage_assets::AssetStore;
use iconstage_common::{Channel, ChannelMask, EntityId, Transform};
use iconstage_kernel::{Drawable, Scene, SceneError};

use crate::bounds::subject_bounds;
use crate::camera::CameraPose;
use crate::error::RenderError;
use crate::settings::{Decoration, RenderSettings};

/// Distance from the camera to the group root along the view direction.
pub const STANDOFF_DISTANCE: f32 = 5.0;
pub const BACKGROUND_ORDER: i32 = -100;
pub const ANCHOR_ORDER: i32 = 0;
pub const FRAME_ORDER: i32 = 100;

/// A visibility channel reserved for one render operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationToken {
    channel: Channel,
}

impl IsolationToken {
    /// Wrap a channel the caller has already checked is free.
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Reserve the highest channel no node of `scene` is on.
    pub fn allocate(scene: &Scene) -> Option<Self> {
        scene.free_channel().map(Self::new)
    }

    /// The reserved channel.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Culling mask that selects only the reserved channel.
    pub fn mask(&self) -> ChannelMask {
        ChannelMask::only(self.channel)
    }
}

/// Original channel of every node moved onto the isolation channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityAssignment {
    original: BTreeMap<EntityId, Channel>,
}

impl VisibilityAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `channel` as the original for `id`. The first record wins;
    /// returns false if `id` was already recorded.
    pub fn record(&mut self, id: EntityId, channel: Channel) -> bool {
        if self.original.contains_key(&id) {
            return false;
        }
        self.original.insert(id, channel);
        true
    }

    /// Original channel recorded for `id`.
    pub fn get(&self, id: EntityId) -> Option<Channel> {
        self.original.get(&id).copied()
    }

    /// Number of nodes recorded.
    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Put every recorded node back on its original channel.
    /// Nodes that no longer exist are skipped. Returns how many were restored.
    pub fn restore(&self, scene: &mut Scene) -> usize {
        self.original
            .iter()
            .filter(|(id, channel)| scene.set_channel(**id, **channel).is_ok())
            .count()
    }
}

/// Nodes created for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderGroup {
    pub root: EntityId,
    pub background: Option<EntityId>,
    /// Instanced copy of the subject.
    pub subject: EntityId,
    pub sorting_anchor: EntityId,
    pub frame: Option<EntityId>,
}

/// Build the render group in front of the camera and isolate it on `token`.
///
/// The group root is unrotated and unscaled, so positions below are computed
/// as world offsets from the anchor. On failure every node created so far is
/// removed again.
pub fn compose(
    scene: &mut Scene,
    assets: &AssetStore,
    settings: &RenderSettings,
    pose: &CameraPose,
    token: &IsolationToken,
) -> Result<(RenderGroup, VisibilityAssignment), RenderError> {
    let subject = settings.subject.ok_or(RenderError::SubjectNotSet)?;
    if !scene.contains(subject) {
        return Err(RenderError::SubjectMissing(subject));
    }

    let anchor = pose.position + pose.forward * STANDOFF_DISTANCE;
    let root = scene.spawn("RenderGroup", Transform::from_position(anchor));
    match build(scene, assets, settings, pose, token, root, subject) {
        Ok(built) => Ok(built),
        Err(e) => {
            if let Err(cleanup) = scene.despawn_recursive(root) {
                tracing::debug!(error = %cleanup, "could not remove partial render group");
            }
            Err(e)
        }
    }
}

fn build(
    scene: &mut Scene,
    assets: &AssetStore,
    settings: &RenderSettings,
    pose: &CameraPose,
    token: &IsolationToken,
    root: EntityId,
    subject: EntityId,
) -> Result<(RenderGroup, VisibilityAssignment), RenderError> {
    let background = settings
        .background
        .as_ref()
        .map(|d| spawn_decoration(scene, root, "Background", d, pose, BACKGROUND_ORDER))
        .transpose()?;

    let instance = scene.instantiate(subject, Some(root))?;
    let mut placed = Transform {
        position: Vec3::ZERO,
        rotation: settings.rotation_quat(),
        scale: Vec3::splat(settings.subject_scale),
    };
    scene.set_transform(instance, placed)?;
    let bounds = subject_bounds(scene, assets, instance)?;
    let root_world = scene.world_position(root)?;
    let position = (root_world - bounds.center) + along(pose, settings.subject_offset);
    placed.position = position;
    scene.set_transform(instance, placed)?;
    tracing::debug!(center = ?bounds.center, extents = ?bounds.extents, ?position, "centered subject");

    let sorting_anchor = scene.spawn_child(root, "SortingAnchor", Transform::from_position(position))?;
    scene.set_drawable(sorting_anchor, Some(Drawable::placeholder(ANCHOR_ORDER)))?;

    let frame = settings
        .frame
        .as_ref()
        .map(|d| spawn_decoration(scene, root, "Frame", d, pose, FRAME_ORDER))
        .transpose()?;

    let mut assignment = VisibilityAssignment::new();
    for id in scene.descendants(root)? {
        let old = scene.set_channel(id, token.channel())?;
        assignment.record(id, old);
    }

    let group = RenderGroup {
        root,
        background,
        subject: instance,
        sorting_anchor,
        frame,
    };
    tracing::debug!(nodes = assignment.len(), channel = token.channel().index(), "composed render group");
    Ok((group, assignment))
}

/// Offset along the camera's right and up axes.
fn along(pose: &CameraPose, offset: Vec2) -> Vec3 {
    pose.right * offset.x + pose.up * offset.y
}

fn spawn_decoration(
    scene: &mut Scene,
    root: EntityId,
    name: &str,
    decoration: &Decoration,
    pose: &CameraPose,
    sort_order: i32,
) -> Result<EntityId, SceneError> {
    let transform = Transform {
        position: along(pose, decoration.offset),
        scale: Vec3::splat(decoration.zoom),
        ..Transform::default()
    };
    let id = scene.spawn_child(root, name, transform)?;
    scene.set_drawable(
        id,
        Some(Drawable::sprite(decoration.sprite, decoration.effective_tint(), sort_order)),
    )?;
    Ok(id)
}
