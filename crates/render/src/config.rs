//! Render profiles: [`RenderSettings`] minus the subject, stored as YAML or JSON.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use iconstage_assets::{AssetError, AssetStore, DEFAULT_PIXELS_PER_UNIT};
use iconstage_common::Color;

use crate::settings::{Decoration, RenderSettings};

/// Errors from loading or resolving a profile.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported profile format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("sprite {path}: {source}")]
    Sprite {
        path: PathBuf,
        #[source]
        source: AssetError,
    },
}

/// A sprite layer as written in a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecorationProfile {
    /// Image file; relative paths are taken from the profile's directory.
    pub sprite: PathBuf,
    #[serde(default = "default_ppu")]
    pub pixels_per_unit: f32,
    #[serde(default = "default_zoom")]
    pub zoom: f32,
    #[serde(default)]
    pub offset: Vec2,
    /// Tint color; tinting is off when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint: Option<Color>,
}

fn default_ppu() -> f32 {
    DEFAULT_PIXELS_PER_UNIT
}

fn default_zoom() -> f32 {
    1.0
}

impl DecorationProfile {
    fn resolve(&self, assets: &mut AssetStore) -> Result<Decoration, ConfigError> {
        let sprite = assets
            .import_sprite(&self.sprite, self.pixels_per_unit)
            .map_err(|source| ConfigError::Sprite {
                path: self.sprite.clone(),
                source,
            })?;
        Ok(Decoration {
            sprite,
            zoom: self.zoom,
            offset: self.offset,
            tint_enabled: self.tint.is_some(),
            tint_color: self.tint.unwrap_or(Color::WHITE),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconProfile {
    pub resolution: u32,
    pub transparent_background: bool,
    pub background_color: Color,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub camera_zoom: f32,
    pub subject_scale: f32,
    pub subject_offset: Vec2,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<DecorationProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<DecorationProfile>,
    pub file_name: String,
    pub folder: PathBuf,
    pub msaa_samples: u32,
}

impl Default for IconProfile {
    fn default() -> Self {
        let s = RenderSettings::default();
        Self {
            resolution: s.resolution,
            transparent_background: s.transparent_background,
            background_color: s.background_color,
            rotation: s.rotation,
            camera_zoom: s.camera_zoom,
            subject_scale: s.subject_scale,
            subject_offset: s.subject_offset,
            background: None,
            frame: None,
            file_name: s.file_name,
            folder: s.folder,
            msaa_samples: s.msaa_samples,
        }
    }
}

enum Format {
    Yaml,
    Json,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

impl IconProfile {
    /// Load a profile, picking the format from the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = format_of(path)?;
        let text = std::fs::read_to_string(path)?;
        let mut profile: Self = match format {
            Format::Yaml => serde_yaml::from_str(&text)?,
            Format::Json => serde_json::from_str(&text)?,
        };
        if let Some(base) = path.parent() {
            for deco in [&mut profile.background, &mut profile.frame].into_iter().flatten() {
                if deco.sprite.is_relative() {
                    deco.sprite = base.join(&deco.sprite);
                }
            }
        }
        tracing::debug!(path = %path.display(), "loaded icon profile");
        Ok(profile)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)?;
        match format_of(path)? {
            Format::Yaml => serde_yaml::to_writer(file, self)?,
            Format::Json => serde_json::to_writer_pretty(file, self)?,
        }
        Ok(())
    }

    /// Turn the profile into render settings, importing decoration sprites.
    /// The subject is left unset.
    pub fn resolve(&self, assets: &mut AssetStore) -> Result<RenderSettings, ConfigError> {
        Ok(RenderSettings {
            subject: None,
            resolution: self.resolution,
            transparent_background: self.transparent_background,
            background_color: self.background_color,
            rotation: self.rotation,
            camera_zoom: self.camera_zoom,
            subject_scale: self.subject_scale,
            subject_offset: self.subject_offset,
            background: self.background.as_ref().map(|d| d.resolve(assets)).transpose()?,
            frame: self.frame.as_ref().map(|d| d.resolve(assets)).transpose()?,
            file_name: self.file_name.clone(),
            folder: self.folder.clone(),
            msaa_samples: self.msaa_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn empty_yaml_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.yaml");
        std::fs::write(&path, "{}\n").unwrap();
        let profile = IconProfile::load(&path).unwrap();
        assert_eq!(profile, IconProfile::default());
        let settings = profile.resolve(&mut AssetStore::new()).unwrap();
        assert_eq!(settings, RenderSettings::default());
    }

    #[test]
    fn yaml_fields_and_relative_sprites() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(20, 10, image::Rgba([255, 0, 0, 255]))
            .save(dir.path().join("frame.png"))
            .unwrap();
        let path = dir.path().join("profile.yml");
        std::fs::write(
            &path,
            "resolution: 256\n\
             transparent_background: false\n\
             rotation: [10.0, 20.0, 0.0]\n\
             camera_zoom: 3.0\n\
             file_name: Sword\n\
             msaa_samples: 8\n\
             frame:\n  sprite: frame.png\n  zoom: 2.0\n  tint: { r: 0.0, g: 1.0, b: 0.0, a: 1.0 }\n",
        )
        .unwrap();

        let profile = IconProfile::load(&path).unwrap();
        assert_eq!(profile.frame.as_ref().unwrap().sprite, dir.path().join("frame.png"));

        let mut assets = AssetStore::new();
        let settings = profile.resolve(&mut assets).unwrap();
        assert_eq!(settings.resolution, 256);
        assert!(!settings.transparent_background);
        assert_eq!(settings.rotation, Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(settings.file_name, "Sword");
        assert_eq!(settings.msaa_samples, 8);
        let frame = settings.frame.unwrap();
        assert_eq!(frame.zoom, 2.0);
        assert!(frame.tint_enabled);
        assert_eq!(frame.tint_color, Color::rgb(0.0, 1.0, 0.0));
        assert_eq!(assets.sprite(frame.sprite).unwrap().image.dimensions(), (20, 10));
        assert!(settings.background.is_none());
    }

    #[test]
    fn json_round_trips_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let profile = IconProfile {
            resolution: 128,
            subject_offset: Vec2::new(0.5, 0.0),
            ..IconProfile::default()
        };
        profile.save(&path).unwrap();
        assert_eq!(IconProfile::load(&path).unwrap(), profile);
    }

    #[test]
    fn unknown_extension_rejected() {
        let err = IconProfile::load("profile.toml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_sprite_reports_path() {
        let profile = IconProfile {
            background: Some(DecorationProfile {
                sprite: PathBuf::from("/nonexistent/bg.png"),
                pixels_per_unit: 100.0,
                zoom: 1.0,
                offset: Vec2::ZERO,
                tint: None,
            }),
            ..IconProfile::default()
        };
        let err = profile.resolve(&mut AssetStore::new()).unwrap_err();
        assert!(err.to_string().contains("bg.png"));
    }
}
