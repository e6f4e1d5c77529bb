use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec3;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use iconstage_assets::{AssetStore, DEFAULT_PIXELS_PER_UNIT, Mesh};
use iconstage_common::{Color, EntityId, Transform};
use iconstage_kernel::{Drawable, Scene};
use iconstage_render::{
    Decoration, GpuContext, IconProfile, IconRenderer, Preferences, RenderHost, RenderSettings,
};

#[derive(Parser)]
#[command(name = "iconstage-cli", about = "Render icons of 3D subjects into PNG files")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Render one icon per subject
    Render(RenderArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Subjects to render, in order
    #[arg(required = true, value_enum)]
    subjects: Vec<Primitive>,
    /// Render profile (.yaml, .yml or .json)
    #[arg(short, long)]
    profile: Option<PathBuf>,
    /// Preferences file supplying the default name and folder
    #[arg(long, default_value = "iconstage.prefs.json")]
    prefs: PathBuf,
    /// Output file name without extension
    #[arg(short, long)]
    name: Option<String>,
    /// Output folder
    #[arg(short, long)]
    folder: Option<PathBuf>,
    /// Output size in pixels (clamped to 128..=1024)
    #[arg(short, long)]
    resolution: Option<u32>,
    /// Multisample count per pixel; 1 turns antialiasing off
    #[arg(long)]
    msaa: Option<u32>,
    /// Orthographic half-height
    #[arg(short, long)]
    zoom: Option<f32>,
    /// Euler rotation in degrees: X Y Z
    #[arg(long, num_args = 3, allow_negative_numbers = true)]
    rotation: Option<Vec<f32>>,
    /// Sprite drawn behind the subject
    #[arg(long)]
    background: Option<PathBuf>,
    /// Sprite drawn in front of the subject
    #[arg(long)]
    frame: Option<PathBuf>,
    /// Fill with the profile's background color instead of transparency
    #[arg(long)]
    opaque: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum Primitive {
    /// Unit cube
    Cube,
    /// Square pyramid
    Pyramid,
    /// Cube whose mesh sits away from its node's origin
    OffsetCube,
}

impl Primitive {
    fn name(self) -> &'static str {
        match self {
            Self::Cube => "Cube",
            Self::Pyramid => "Pyramid",
            Self::OffsetCube => "OffsetCube",
        }
    }

    /// Add this primitive to `scene` as a root node and return it.
    fn spawn(self, scene: &mut Scene, assets: &mut AssetStore) -> anyhow::Result<EntityId> {
        let root = scene.spawn(self.name(), Transform::default());
        match self {
            Self::Cube => {
                let mesh = assets.register_mesh(Mesh::cube());
                scene.set_drawable(root, Some(Drawable::mesh(mesh, Color::rgb(0.85, 0.55, 0.25))))?;
            }
            Self::Pyramid => {
                let mesh = assets.register_mesh(Mesh::pyramid());
                scene.set_drawable(root, Some(Drawable::mesh(mesh, Color::rgb(0.3, 0.6, 0.9))))?;
            }
            Self::OffsetCube => {
                let mesh = assets.register_mesh(Mesh::cube());
                let part = scene.spawn_child(root, "Body", Transform::from_position(Vec3::new(1.5, 0.75, 0.0)))?;
                scene.set_drawable(part, Some(Drawable::mesh(mesh, Color::rgb(0.4, 0.8, 0.4))))?;
            }
        }
        Ok(root)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("iconstage-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("kernel: nodes={}", Scene::new().node_count());
            println!("assets: {}", iconstage_assets::crate_info());
            println!("render: {}", iconstage_render::crate_info());
            match GpuContext::headless() {
                Ok(gpu) => println!("gpu: {} (max msaa {})", gpu.adapter_name(), gpu.sample_count(u32::MAX)),
                Err(e) => println!("gpu: unavailable ({e})"),
            }
        }
        Commands::Render(args) => run_render(&args)?,
    }

    Ok(())
}

fn run_render(args: &RenderArgs) -> anyhow::Result<()> {
    let prefs = Preferences::load_or_default(&args.prefs)
        .with_context(|| format!("reading preferences '{}'", args.prefs.display()))?;

    let mut host = RenderHost::headless().context("opening a headless GPU device")?;
    let settings = build_settings(args, &prefs, &mut host.assets)?;
    tracing::debug!(subjects = args.subjects.len(), folder = %settings.folder.display(), "starting renders");
    let mut renderer = IconRenderer::new(settings);

    let mut subjects = Vec::with_capacity(args.subjects.len());
    for primitive in &args.subjects {
        subjects.push((*primitive, primitive.spawn(&mut host.scene, &mut host.assets)?));
    }

    let (mut saved, mut failed) = (0usize, 0usize);
    for (primitive, id) in subjects {
        let name = file_name_for(args, primitive);
        let result = renderer.render_subject_and_persist(&mut host, id, name.as_deref(), None);
        match (result.saved_path(), result.error_message()) {
            (Some(path), _) => {
                saved += 1;
                println!("saved: {}", path.display());
            }
            (None, message) => {
                failed += 1;
                println!("failed: {}", message.unwrap_or_default());
            }
        }
    }

    println!("rendered {} icon(s), {} failed", saved, failed);
    if failed > 0 {
        anyhow::bail!("{failed} of {} render(s) failed", saved + failed);
    }
    Ok(())
}

/// Settings from the profile (or defaults), then preferences, then flags.
fn build_settings(
    args: &RenderArgs,
    prefs: &Preferences,
    assets: &mut AssetStore,
) -> anyhow::Result<RenderSettings> {
    let mut settings = match &args.profile {
        Some(path) => IconProfile::load(path)
            .with_context(|| format!("loading profile '{}'", path.display()))?
            .resolve(assets)?,
        None => {
            let mut settings = IconProfile::default().resolve(assets)?;
            settings.file_name = prefs.default_file_name.clone();
            settings.folder = prefs.default_folder.clone();
            settings
        }
    };

    if let Some(folder) = &args.folder {
        settings.folder = folder.clone();
    }
    if let Some(resolution) = args.resolution {
        settings.resolution = resolution;
    }
    if let Some(samples) = args.msaa {
        settings.msaa_samples = samples;
    }
    if let Some(zoom) = args.zoom {
        settings.camera_zoom = zoom;
    }
    if let Some([x, y, z]) = args.rotation.as_deref().and_then(|r| <[f32; 3]>::try_from(r).ok()) {
        settings.rotation = Vec3::new(x, y, z);
    }
    if args.opaque {
        settings.transparent_background = false;
    }
    if let Some(path) = &args.background {
        settings.background = Some(sprite_decoration(path, assets)?);
    }
    if let Some(path) = &args.frame {
        settings.frame = Some(sprite_decoration(path, assets)?);
    }
    Ok(settings)
}

fn sprite_decoration(path: &Path, assets: &mut AssetStore) -> anyhow::Result<Decoration> {
    let sprite = assets
        .import_sprite(path, DEFAULT_PIXELS_PER_UNIT)
        .with_context(|| format!("importing sprite '{}'", path.display()))?;
    Ok(Decoration::new(sprite))
}

/// One explicit name for a single subject; with several subjects the name
/// becomes a prefix so files do not overwrite each other. `None` keeps the
/// held settings' name.
fn file_name_for(args: &RenderArgs, primitive: Primitive) -> Option<String> {
    match (&args.name, args.subjects.len()) {
        (Some(name), 1) => Some(name.clone()),
        (Some(name), _) => Some(format!("{name}_{}", primitive.name())),
        (None, 1) => None,
        (None, _) => Some(format!("{}_Icon", primitive.name())),
    }
}
