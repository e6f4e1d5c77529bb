//! Public render entry points.
//!
//! Every operation runs inside a [`RenderScope`], so the scene, the device
//! and the visibility channels look exactly as before once it returns,
//! whether it succeeded, failed or panicked.

use image::RgbaImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use iconstage_common::{EntityId, Transform};

use crate::camera::{configure_camera, CameraPose};
use crate::compose::{compose, IsolationToken};
use crate::error::{RenderError, RenderResult};
use crate::executor::execute;
use crate::host::RenderHost;
use crate::persist::{icon_file_stem, write_icon, AssetIndex, NoIndex, SidecarImporter, TextureImporter};
use crate::settings::RenderSettings;
use crate::teardown::RenderScope;

/// Render the configured subject into a bitmap.
pub fn render_to_memory(host: &mut RenderHost, settings: &RenderSettings) -> RenderResult {
    guarded(|| render_bitmap(host, settings)).into()
}

/// Render the configured subject and save it as `{folder}/{name}.png`.
pub fn render_and_persist(
    host: &mut RenderHost,
    settings: &RenderSettings,
    importer: &mut dyn TextureImporter,
    index: &mut dyn AssetIndex,
) -> RenderResult {
    guarded(|| {
        let bitmap = render_bitmap(host, settings)?;
        let subject_name = settings
            .subject
            .and_then(|id| host.scene.get(id))
            .map(|node| node.name.as_str())
            .unwrap_or_default();
        let stem = icon_file_stem(&settings.file_name, subject_name);
        write_icon(&bitmap, &settings.folder, &stem, importer, index)
    })
    .into()
}

/// Run `op`, turning a panic into a render failure.
fn guarded<T>(op: impl FnOnce() -> Result<T, RenderError>) -> Result<T, RenderError> {
    let outcome = catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        Err(RenderError::render(format!("panicked: {msg}")))
    });
    if let Err(e) = &outcome {
        tracing::warn!(error = %e, "icon render failed");
    }
    outcome
}

/// Checks that must pass before anything in the scene is touched.
fn preflight(host: &RenderHost, settings: &RenderSettings) -> Result<IsolationToken, RenderError> {
    let subject = settings.subject.ok_or(RenderError::SubjectNotSet)?;
    if !host.scene.contains(subject) {
        return Err(RenderError::SubjectMissing(subject));
    }
    settings.validate()?;
    IsolationToken::allocate(&host.scene)
        .ok_or_else(|| RenderError::render("every visibility channel is in use"))
}

fn render_bitmap(host: &mut RenderHost, settings: &RenderSettings) -> Result<RgbaImage, RenderError> {
    let token = preflight(host, settings)?;
    let resolution = settings.effective_resolution();

    let mut scope = RenderScope::open(host);
    let target = scope
        .host()
        .device
        .create_target(resolution, resolution, settings.msaa_samples);
    scope.track_target(target);
    let samples = scope.host().device.target(target).map_or(1, |t| t.samples());
    let camera_node = scope.host().scene.spawn("IconCamera", Transform::default());
    scope.track_camera(camera_node);

    let host = scope.host();
    let camera = configure_camera(&mut host.scene, camera_node, settings, &token, target)?;
    let (group, assignment) = compose(
        &mut host.scene,
        &host.assets,
        settings,
        &CameraPose::fixed(),
        &token,
    )?;
    scope.track_group(group, assignment);

    let host = scope.host();
    let bitmap = execute(&mut host.device, &host.scene, &host.assets, &camera, camera_node)?;
    scope.close();
    tracing::info!(resolution, samples, "rendered icon");
    Ok(bitmap)
}

/// Holds a settings snapshot and the import collaborators.
///
/// The one-call overrides render from a modified copy; the held settings are
/// never changed by a render.
pub struct IconRenderer {
    settings: RenderSettings,
    importer: Box<dyn TextureImporter>,
    index: Box<dyn AssetIndex>,
}

impl IconRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self::with_collaborators(settings, Box::new(SidecarImporter), Box::new(NoIndex))
    }

    pub fn with_collaborators(
        settings: RenderSettings,
        importer: Box<dyn TextureImporter>,
        index: Box<dyn AssetIndex>,
    ) -> Self {
        Self {
            settings,
            importer,
            index,
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
    }

    pub fn render_to_memory(&self, host: &mut RenderHost) -> RenderResult {
        render_to_memory(host, &self.settings)
    }

    pub fn render_and_persist(&mut self, host: &mut RenderHost) -> RenderResult {
        render_and_persist(host, &self.settings, self.importer.as_mut(), self.index.as_mut())
    }

    pub fn render_subject_to_memory(&self, host: &mut RenderHost, subject: EntityId) -> RenderResult {
        render_to_memory(host, &self.settings.clone().with_subject(subject))
    }

    /// Render `subject` with optional name and folder overrides.
    /// Blank overrides are ignored.
    pub fn render_subject_and_persist(
        &mut self,
        host: &mut RenderHost,
        subject: EntityId,
        file_name: Option<&str>,
        folder: Option<&Path>,
    ) -> RenderResult {
        let mut settings = self.settings.clone().with_subject(subject);
        if let Some(name) = file_name.filter(|n| !n.trim().is_empty()) {
            settings.file_name = name.trim().to_string();
        }
        if let Some(folder) = folder.filter(|f| !f.to_string_lossy().trim().is_empty()) {
            settings.folder = PathBuf::from(folder);
        }
        render_and_persist(host, &settings, self.importer.as_mut(), self.index.as_mut())
    }
}
