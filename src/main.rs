//! Three-colour e-paper renderer for Raspberry Pi
//!
//! Draws an image on a 4.2" black/white/red ER-EPM042A1-1R panel:
//! - Decodes the image file (PNG, JPEG, BMP)
//! - Rotates, shrinks and letterboxes it to 400x300
//! - Dithers it to black/white/red and splits it into the two RAM planes
//! - Drives the panel over SPI, then puts it into deep sleep

mod config;
mod display;
mod image_proc;

use clap::Parser;
use config::Config;
use image::DynamicImage;
use display::{CancelFlag, GEOMETRY, RpiTransport, with_session};
use image_proc::{Frame, ImageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "epd4in2r-display")]
#[command(about = "Show an image on a 4.2\" black/white/red e-paper panel")]
#[command(version)]
struct Args {
    /// Image file to display
    #[arg(required_unless_present = "clear")]
    image: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Clear display and exit
    #[arg(long, conflicts_with = "image")]
    clear: bool,

    /// Write the dithered three-colour image to this PNG file
    #[arg(long, value_name = "PATH", requires = "image")]
    preview: Option<PathBuf>,

    /// Prepare the image (and preview) without touching the display
    #[arg(long)]
    dry_run: bool,
}

/// Using current_thread runtime; the display work itself runs on a
/// blocking worker so signal handling stays responsive
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loaded = Config::load(&args.config);

    // Initialize logging
    init_logging(args.verbose || loaded.as_ref().is_ok_and(|c| c.verbose));

    tracing::info!("Starting e-paper renderer");

    // Load configuration
    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {}: {}", args.config, e);
        tracing::info!("Using default configuration");
        Config::default()
    });

    let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
    let worker_cancel = Arc::clone(&cancel);
    let mut worker = tokio::task::spawn_blocking(move || run(&args, &config, worker_cancel));

    let result = tokio::select! {
        result = &mut worker => result,
        signal = wait_for_shutdown() => {
            match signal {
                Ok(()) => {
                    tracing::warn!("Shutdown signal received, stopping after current row");
                    cancel.store(true, Ordering::Relaxed);
                }
                Err(e) => tracing::warn!("Signal handling unavailable: {}", e),
            }
            worker.await
        }
    };

    result??;
    tracing::info!("Done");
    Ok(())
}

/// Decode, prepare and display according to the arguments
///
/// A plain render hands the decoded image to the session. With `--preview` or
/// `--dry-run` the frame is prepared up front so it can be inspected before
/// the panel is touched.
fn run(args: &Args, config: &Config, cancel: CancelFlag) -> anyhow::Result<()> {
    let mut image = match &args.image {
        Some(path) => Some(image_proc::load_image(path)?),
        None => None,
    };

    let frame = if args.preview.is_some() || args.dry_run {
        image
            .take()
            .map(|img| prepare_frame(img, args.preview.as_deref()))
            .transpose()?
    } else {
        None
    };

    if args.dry_run {
        tracing::info!("Dry run, display untouched");
        return Ok(());
    }

    let transport = RpiTransport::open(&config.hardware())?;

    with_session(transport, config.timing(), Some(cancel), |session| {
        if args.clear || config.clear_before_render {
            session.clear()?;
        }
        if let Some(frame) = &frame {
            session.show(frame)?;
        } else if let Some(img) = image {
            session.render(img)?;
        }
        Ok(())
    })?;

    Ok(())
}

fn prepare_frame(img: DynamicImage, preview: Option<&Path>) -> Result<Frame, ImageError> {
    let frame = image_proc::prepare(img, GEOMETRY)?;

    if let Some(preview) = preview {
        frame
            .tricolor
            .to_rgb_image()
            .save(preview)
            .map_err(ImageError::Save)?;
        tracing::info!("Preview written to {}", preview.display());
    }

    Ok(frame)
}

/// Initialize tracing/logging
///
/// Default level is "warn"; --verbose (or "verbose" in the config) raises
/// it to "debug". RUST_LOG overrides both.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("epd4in2r_display={}", level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_argument_is_required() {
        assert!(Args::try_parse_from(["epd4in2r-display"]).is_err());
    }

    #[test]
    fn clear_needs_no_image() {
        let args = Args::try_parse_from(["epd4in2r-display", "--clear"]).unwrap();
        assert!(args.clear);
        assert!(args.image.is_none());
        assert_eq!(args.config, config::DEFAULT_CONFIG_PATH);
    }

    #[test]
    fn preview_requires_image() {
        assert!(Args::try_parse_from(["epd4in2r-display", "--clear", "--preview", "out.png"]).is_err());
    }

    #[test]
    fn dry_run_rejects_unreadable_image() {
        let args = Args::try_parse_from([
            "epd4in2r-display",
            "/nonexistent/epd4in2r.png",
            "--dry-run",
        ])
        .unwrap();
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        assert!(run(&args, &Config::default(), cancel).is_err());
    }

    #[test]
    fn parses_image_and_preview() {
        let args = Args::try_parse_from([
            "epd4in2r-display",
            "photo.jpg",
            "--preview",
            "out.png",
            "--dry-run",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.image, Some(PathBuf::from("photo.jpg")));
        assert_eq!(args.preview, Some(PathBuf::from("out.png")));
        assert!(args.dry_run && args.verbose);
    }

    #[test]
    fn dry_run_writes_preview() {
        let dir = std::env::temp_dir();
        let input = dir.join(format!("epd4in2r-main-{}-in.png", std::process::id()));
        let preview = dir.join(format!("epd4in2r-main-{}-preview.png", std::process::id()));
        image::RgbImage::from_pixel(50, 80, image::Rgb([255, 0, 0]))
            .save(&input)
            .unwrap();

        let argv: Vec<std::ffi::OsString> = vec![
            "epd4in2r-display".into(),
            input.clone().into(),
            "--preview".into(),
            preview.clone().into(),
            "--dry-run".into(),
        ];
        let args = Args::try_parse_from(argv).unwrap();
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        let result = run(&args, &Config::default(), cancel);

        let written = image::open(&preview).map(|img| img.to_rgb8());
        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&preview);

        result.unwrap();
        let written = written.unwrap();
        assert_eq!(written.dimensions(), (400, 300));
        assert_eq!(*written.get_pixel(200, 150), image::Rgb([255, 0, 0]));
        assert_eq!(*written.get_pixel(5, 5), image::Rgb([255, 255, 255]));
    }
}
