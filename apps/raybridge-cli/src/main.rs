use anyhow::Context;
use clap::{Parser, Subcommand};
use raybridge_common::SceneDescription;
use raybridge_interop::{Bridge, DebugEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "raybridge", about = "Render scene descriptions through the ray tracing engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the native camera layout
    Info,
    /// Render a scene description (or the demo scene) and save the image
    Render {
        /// Scene description (.yaml, .yml or .json); the demo scene if omitted
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Output image path
        #[arg(short, long, default_value = "image.png")]
        output: PathBuf,
        /// Override the camera's image width
        #[arg(short, long)]
        width: Option<u32>,
        /// Override the camera's samples per pixel
        #[arg(long)]
        samples: Option<u32>,
        /// Use the linked engine library instead of the debug engine
        #[arg(long)]
        native: bool,
    },
    /// Parse and validate a scene description without rendering
    Check {
        #[arg(short, long)]
        scene: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("raybridge v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", raybridge_common::crate_info());
            println!("sys: {}", raybridge_sys::crate_info());
            println!("interop: {}", raybridge_interop::crate_info());
            println!(
                "native engine: {}",
                if cfg!(feature = "native") { "linked" } else { "not built" }
            );
            println!(
                "camera struct: {} bytes, align {}",
                size_of::<raybridge_sys::CameraConfig>(),
                align_of::<raybridge_sys::CameraConfig>()
            );
        }
        Commands::Render {
            scene,
            output,
            width,
            samples,
            native,
        } => {
            let mut description = load(scene.as_deref())?;
            if let Some(width) = width {
                description.camera.image_width = width;
            }
            if let Some(samples) = samples {
                description.camera.samples_per_pixel = samples;
            }
            description.validate().context("invalid scene description")?;
            render(&bridge(native)?, &description, &output)?;
        }
        Commands::Check { scene } => {
            let description = load(Some(scene.as_path()))?;
            description
                .validate()
                .with_context(|| format!("{} is not a valid scene", scene.display()))?;
            let camera = &description.camera;
            println!(
                "{}: ok, {} materials, {} spheres, {}x{} at {} samples",
                scene.display(),
                description.materials.len(),
                description.spheres.len(),
                camera.image_width,
                camera.image_height(),
                camera.samples_per_pixel
            );
        }
    }

    Ok(())
}

fn load(path: Option<&Path>) -> anyhow::Result<SceneDescription> {
    match path {
        Some(path) => SceneDescription::from_path(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => {
            tracing::info!("no scene given, using the demo scene");
            Ok(SceneDescription::demo())
        }
    }
}

fn bridge(native: bool) -> anyhow::Result<Bridge> {
    if !native {
        return Ok(Bridge::new(Arc::new(DebugEngine::new())));
    }
    #[cfg(feature = "native")]
    return Ok(Bridge::native());
    #[cfg(not(feature = "native"))]
    anyhow::bail!("--native requires building raybridge-cli with the `native` feature");
}

fn render(bridge: &Bridge, description: &SceneDescription, output: &Path) -> anyhow::Result<()> {
    let camera = &description.camera;
    tracing::info!(
        engine = bridge.engine_name(),
        width = camera.image_width,
        height = camera.image_height(),
        samples = camera.samples_per_pixel,
        "rendering"
    );

    let library = bridge
        .create_materials(description)
        .context("failed to create materials")?;
    let mut scene = bridge.create_scene().context("failed to create scene")?;
    scene
        .populate(&description.spheres, &library)
        .context("failed to populate scene")?;

    let mut last = None;
    let image = bridge
        .render_with_progress(&scene, camera, |progress| {
            // Engines may repeat a count; only report changes.
            if last == Some(progress.samples_completed) {
                return;
            }
            last = Some(progress.samples_completed);
            tracing::info!(
                "samples {}/{} ({:.0}%)",
                progress.samples_completed,
                progress.samples_per_pixel,
                progress.fraction() * 100.0
            );
        })
        .context("render failed")?;

    bridge
        .save_buffer(output, &image)
        .with_context(|| format!("failed to save {}", output.display()))?;
    println!(
        "Wrote {}x{} image to {}",
        image.width(),
        image.height(),
        output.display()
    );
    Ok(())
}
