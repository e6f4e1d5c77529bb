//! Scope guard that removes everything a render created.

use iconstage_common::EntityId;

use crate::compose::{RenderGroup, VisibilityAssignment};
use crate::device::TargetId;
use crate::host::RenderHost;

/// What one teardown actually undid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub target_released: bool,
    pub camera_nodes_removed: usize,
    pub channels_restored: usize,
    pub group_nodes_removed: usize,
    /// Scene events recorded while the scope was open, now erased.
    pub events_discarded: usize,
}

/// Exclusive borrow of a [`RenderHost`] for one render.
///
/// Resources are tracked as they are created. When the scope is closed or
/// dropped, including during unwinding, it releases the target, removes the
/// camera node, restores visibility channels and removes the render group,
/// in that order. Each step runs at most once and a failing step does not
/// stop the ones after it. Finally the scene's event log is cut back to its
/// length at [`RenderScope::open`], so the render leaves no trace there.
pub struct RenderScope<'a> {
    host: &'a mut RenderHost,
    events_at_open: usize,
    target: Option<TargetId>,
    camera: Option<EntityId>,
    group: Option<RenderGroup>,
    assignment: VisibilityAssignment,
}

impl<'a> RenderScope<'a> {
    pub fn open(host: &'a mut RenderHost) -> Self {
        Self {
            events_at_open: host.scene.events().len(),
            host,
            target: None,
            camera: None,
            group: None,
            assignment: VisibilityAssignment::new(),
        }
    }

    pub fn host(&mut self) -> &mut RenderHost {
        self.host
    }

    /// Release `target` on teardown.
    pub fn track_target(&mut self, target: TargetId) {
        self.target = Some(target);
    }

    /// Remove the camera node on teardown.
    pub fn track_camera(&mut self, camera: EntityId) {
        self.camera = Some(camera);
    }

    /// Restore `assignment`, then remove the group, on teardown.
    pub fn track_group(&mut self, group: RenderGroup, assignment: VisibilityAssignment) {
        self.group = Some(group);
        self.assignment = assignment;
    }

    /// Tear down now and report what was undone.
    pub fn close(mut self) -> TeardownReport {
        self.teardown()
    }

    fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        if let Some(target) = self.target.take() {
            report.target_released = self.host.device.release_target(target);
            if !report.target_released {
                tracing::debug!(?target, "offscreen target already released");
            }
        }

        if let Some(camera) = self.camera.take() {
            match self.host.scene.despawn_recursive(camera) {
                Ok(n) => report.camera_nodes_removed = n,
                Err(e) => tracing::debug!(error = %e, "skipped camera removal"),
            }
        }

        let assignment = std::mem::take(&mut self.assignment);
        report.channels_restored = assignment.restore(&mut self.host.scene);
        if report.channels_restored < assignment.len() {
            tracing::debug!(
                skipped = assignment.len() - report.channels_restored,
                "visibility entries for missing nodes skipped"
            );
        }

        if let Some(group) = self.group.take() {
            match self.host.scene.despawn_recursive(group.root) {
                Ok(n) => report.group_nodes_removed = n,
                Err(e) => tracing::debug!(error = %e, "skipped render group removal"),
            }
        }

        report.events_discarded = self.host.scene.truncate_events(self.events_at_open);

        tracing::debug!(?report, "render scope closed");
        report
    }
}

impl Drop for RenderScope<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}
