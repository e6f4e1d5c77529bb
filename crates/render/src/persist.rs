//! Writing rendered icons to disk and handing them to the asset pipeline.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::RenderError;

/// Suffix appended to the subject's name when no file name is given.
pub const ICON_SUFFIX: &str = "_Icon";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureType {
    Default,
    Sprite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteMode {
    Single,
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Point,
    Bilinear,
    Trilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Uncompressed,
    Compressed,
}

/// Import metadata applied to every saved icon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpriteImportSettings {
    pub texture_type: TextureType,
    pub sprite_mode: SpriteMode,
    pub alpha_is_transparency: bool,
    pub generate_mipmaps: bool,
    pub filter_mode: FilterMode,
    pub compression: Compression,
    pub pixels_per_unit: f32,
}

impl Default for SpriteImportSettings {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Sprite,
            sprite_mode: SpriteMode::Single,
            alpha_is_transparency: true,
            generate_mipmaps: false,
            filter_mode: FilterMode::Bilinear,
            compression: Compression::Uncompressed,
            pixels_per_unit: iconstage_assets::DEFAULT_PIXELS_PER_UNIT,
        }
    }
}

/// Applies import metadata to a freshly written texture.
pub trait TextureImporter {
    fn configure(&mut self, path: &Path, settings: &SpriteImportSettings) -> std::io::Result<()>;
}

/// Gets told when new files appear so it can pick them up.
pub trait AssetIndex {
    fn refresh(&mut self);
}

/// Writes import metadata as JSON next to the texture: `icon.png.import.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarImporter;

impl SidecarImporter {
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".import.json");
        PathBuf::from(name)
    }
}

impl TextureImporter for SidecarImporter {
    fn configure(&mut self, path: &Path, settings: &SpriteImportSettings) -> std::io::Result<()> {
        let file = std::fs::File::create(Self::sidecar_path(path))?;
        serde_json::to_writer_pretty(file, settings)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndex;

impl AssetIndex for NoIndex {
    fn refresh(&mut self) {}
}

/// File stem for an icon: the explicit name if non-blank, else `{subject}_Icon`.
pub fn icon_file_stem(file_name: &str, subject_name: &str) -> String {
    let name = file_name.trim();
    let name = name.strip_suffix(".png").unwrap_or(name);
    if name.is_empty() {
        format!("{subject_name}{ICON_SUFFIX}")
    } else {
        name.to_string()
    }
}

/// Write `bitmap` as `{folder}/{stem}.png`, refresh the index and apply
/// import metadata. Nothing is rolled back if a later step fails.
pub fn write_icon(
    bitmap: &RgbaImage,
    folder: &Path,
    stem: &str,
    importer: &mut dyn TextureImporter,
    index: &mut dyn AssetIndex,
) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(folder)
        .map_err(|e| RenderError::persist(format!("creating {}: {e}", folder.display())))?;
    let path = folder.join(format!("{stem}.png"));
    image::save_buffer_with_format(
        &path,
        bitmap.as_raw(),
        bitmap.width(),
        bitmap.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|e| RenderError::persist(format!("writing {}: {e}", path.display())))?;
    index.refresh();
    importer
        .configure(&path, &SpriteImportSettings::default())
        .map_err(|e| RenderError::persist(format!("import settings for {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "saved icon");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingIndex(usize);

    impl AssetIndex for CountingIndex {
        fn refresh(&mut self) {
            self.0 += 1;
        }
    }

    struct FailingImporter;

    impl TextureImporter for FailingImporter {
        fn configure(&mut self, _: &Path, _: &SpriteImportSettings) -> std::io::Result<()> {
            Err(std::io::Error::other("importer offline"))
        }
    }

    #[test]
    fn stem_falls_back_to_subject_name() {
        assert_eq!(icon_file_stem("", "Cube"), "Cube_Icon");
        assert_eq!(icon_file_stem("   ", "Cube"), "Cube_Icon");
        assert_eq!(icon_file_stem("Sword", "Cube"), "Sword");
        assert_eq!(icon_file_stem("Sword.png", "Cube"), "Sword");
    }

    #[test]
    fn writes_png_and_sidecar_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("out").join("icons");
        let bitmap = RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 4]));
        let mut index = CountingIndex::default();

        let path = write_icon(&bitmap, &folder, "CubeIcon", &mut SidecarImporter, &mut index).unwrap();
        assert_eq!(path, folder.join("CubeIcon.png"));
        assert_eq!(index.0, 1);

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded, bitmap);

        let sidecar = std::fs::read_to_string(SidecarImporter::sidecar_path(&path)).unwrap();
        let meta: SpriteImportSettings = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(meta, SpriteImportSettings::default());
        assert!(sidecar.contains("\"sprite_mode\": \"single\""));
    }

    #[test]
    fn importer_failure_keeps_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let bitmap = RgbaImage::new(2, 2);
        let err = write_icon(&bitmap, dir.path(), "x", &mut FailingImporter, &mut NoIndex).unwrap_err();
        assert!(matches!(err, RenderError::Persist(_)));
        assert!(dir.path().join("x.png").exists());
    }

    #[test]
    fn unwritable_folder_is_persist_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let err = write_icon(
            &RgbaImage::new(2, 2),
            &blocker.join("sub"),
            "x",
            &mut SidecarImporter,
            &mut NoIndex,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("persist failed"));
    }
}
