use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use tracing::{debug, info, warn};

use crate::error::{EditError, Result};

/// Largest result the crop tool may hand back.
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    #[default]
    Free,
    Square,
    FourThree,
    SixteenNine,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 4] = [
        AspectRatio::Free,
        AspectRatio::Square,
        AspectRatio::FourThree,
        AspectRatio::SixteenNine,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Free => "Free",
            AspectRatio::Square => "1:1 (Square)",
            AspectRatio::FourThree => "4:3",
            AspectRatio::SixteenNine => "16:9",
        }
    }

    /// Width:height, or `None` when unconstrained.
    pub fn ratio(self) -> Option<(u32, u32)> {
        match self {
            AspectRatio::Free => None,
            AspectRatio::Square => Some((1, 1)),
            AspectRatio::FourThree => Some((4, 3)),
            AspectRatio::SixteenNine => Some((16, 9)),
        }
    }

    fn arg(self) -> String {
        match self.ratio() {
            Some((w, h)) => format!("{}:{}", w, h),
            None => "free".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Presentation hints forwarded to the crop tool.
pub struct CropOptions {
    pub title: String,
    pub free_style: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropRequest {
    pub ticket: u64,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub aspect: AspectRatio,
    pub max_width: u32,
    pub max_height: u32,
    pub options: CropOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CropOutcome {
    Cropped(PathBuf),
    Cancelled,
    Failed(String),
}

/// An external cropper: reads `request.source`, writes `request.destination`.
///
/// Implementations block; [`spawn_crop`] moves them off the UI thread.
pub trait CropTool: Send + Sync {
    fn crop(&self, request: &CropRequest) -> CropOutcome;
}

/// Runs `tool` on a worker thread and hands the outcome to `done`.
pub fn spawn_crop<F>(tool: Arc<dyn CropTool>, request: CropRequest, done: F)
where
    F: FnOnce(u64, CropOutcome) + Send + 'static,
{
    std::thread::spawn(move || {
        let outcome = tool.crop(&request);
        done(request.ticket, outcome);
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropState {
    Idle,
    Exporting,
    AwaitingExternalResult,
    Applying,
    Failed,
}

struct Pending {
    ticket: u64,
    source: PathBuf,
    destination: PathBuf,
}

/// Hands the working image to a [`CropTool`] and decodes what comes back.
pub struct CropAdapter {
    state: CropState,
    work_dir: PathBuf,
    max_width: u32,
    max_height: u32,
    next_ticket: u64,
    pending: Option<Pending>,
}

impl CropAdapter {
    pub fn new(work_dir: PathBuf, max_width: u32, max_height: u32) -> Self {
        Self {
            state: CropState::Idle,
            work_dir,
            max_width: max_width.max(1),
            max_height: max_height.max(1),
            next_ticket: 1,
            pending: None,
        }
    }

    pub fn state(&self) -> CropState {
        self.state
    }

    /// True from export until the result has been applied or dropped.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            CropState::Exporting | CropState::AwaitingExternalResult | CropState::Applying
        )
    }

    /// Writes `working` to a transient file and builds the tool request.
    pub fn prepare(&mut self, working: &RgbaImage, aspect: AspectRatio) -> Result<CropRequest> {
        if self.is_active() {
            return Err(EditError::Busy);
        }
        self.state = CropState::Exporting;

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let source = self.work_dir.join(format!("crop-{}-source.png", ticket));
        let destination = self.work_dir.join(format!("crop-{}-result.jpg", ticket));

        if let Err(err) = export(working, &self.work_dir, &source) {
            warn!("crop export failed: {:#}", err);
            remove_quietly(&source);
            self.state = CropState::Failed;
            self.finish();
            return Err(EditError::CropPrepare(format!("{:#}", err)));
        }

        debug!(ticket, source = %source.display(), "crop source exported");
        self.pending = Some(Pending {
            ticket,
            source: source.clone(),
            destination: destination.clone(),
        });
        self.state = CropState::AwaitingExternalResult;

        Ok(CropRequest {
            ticket,
            source,
            destination,
            aspect,
            max_width: self.max_width,
            max_height: self.max_height,
            options: CropOptions {
                title: "Crop Image".to_string(),
                free_style: aspect == AspectRatio::Free,
            },
        })
    }

    /// Consumes the tool's outcome for `ticket`.
    ///
    /// Returns the decoded crop on success, `None` on cancel or for a ticket
    /// that is no longer pending.
    pub fn resolve(&mut self, ticket: u64, outcome: CropOutcome) -> Result<Option<RgbaImage>> {
        let Some(pending) = self.pending.take_if(|p| p.ticket == ticket) else {
            debug!(ticket, "ignoring stale crop result");
            return Ok(None);
        };
        remove_quietly(&pending.source);

        match outcome {
            CropOutcome::Cancelled => {
                info!(ticket, "crop cancelled");
                remove_quietly(&pending.destination);
                self.state = CropState::Idle;
                Ok(None)
            }
            CropOutcome::Failed(message) => {
                warn!(ticket, "crop tool failed: {}", message);
                remove_quietly(&pending.destination);
                self.state = CropState::Idle;
                Err(EditError::CropExternal(message))
            }
            CropOutcome::Cropped(path) => {
                self.state = CropState::Applying;
                let decoded = decode_rgba(&path);
                remove_quietly(&pending.destination);
                match decoded {
                    Ok(img) => Ok(Some(img)),
                    Err(err) => {
                        self.state = CropState::Idle;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Settles an applied or failed crop back to `Idle`.
    pub fn finish(&mut self) {
        if matches!(self.state, CropState::Applying | CropState::Failed) {
            self.state = CropState::Idle;
        }
    }
}

impl Drop for CropAdapter {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(ticket = pending.ticket, "dropping pending crop");
            remove_quietly(&pending.source);
            remove_quietly(&pending.destination);
        }
    }
}

fn export(img: &RgbaImage, dir: &Path, path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn decode_rgba(path: &Path) -> Result<RgbaImage> {
    let decoded = ImageReader::open(path)
        .map_err(|e| EditError::InvalidImage(format!("{}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| EditError::InvalidImage(format!("{}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| EditError::InvalidImage(format!("{}: {}", path.display(), e)))?;
    let rgba = decoded.into_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(EditError::InvalidImage(format!(
            "{} decoded to an empty image",
            path.display()
        )));
    }
    Ok(rgba)
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            debug!("could not remove {}: {}", path.display(), err);
        }
    }
}

/// Largest rectangle of `aspect` centered in a `width`x`height` image,
/// as `(x, y, w, h)`.
pub fn centered_rect(width: u32, height: u32, aspect: AspectRatio) -> (u32, u32, u32, u32) {
    let Some((rw, rh)) = aspect.ratio() else {
        return (0, 0, width, height);
    };
    let (w, h) = (width as u64, height as u64);
    let (rw, rh) = (rw as u64, rh as u64);
    let (cw, ch) = if w * rh > h * rw {
        (h * rw / rh, h)
    } else {
        (w, w * rh / rw)
    };
    let cw = cw.clamp(1, w.max(1)) as u32;
    let ch = ch.clamp(1, h.max(1)) as u32;
    ((width - cw) / 2, (height - ch) / 2, cw, ch)
}

/// Built-in cropper: keeps the largest centered region of the requested
/// aspect and downsizes it to fit the request's bounds.
pub struct CenterCropTool;

impl CropTool for CenterCropTool {
    fn crop(&self, request: &CropRequest) -> CropOutcome {
        match center_crop(request) {
            Ok(()) => CropOutcome::Cropped(request.destination.clone()),
            Err(err) => CropOutcome::Failed(format!("{:#}", err)),
        }
    }
}

fn center_crop(request: &CropRequest) -> anyhow::Result<()> {
    let img = image::open(&request.source)
        .with_context(|| format!("open {}", request.source.display()))?;
    let (x, y, w, h) = centered_rect(img.width(), img.height(), request.aspect);
    let mut out = img.crop_imm(x, y, w, h);
    if out.width() > request.max_width || out.height() > request.max_height {
        out = out.resize(request.max_width, request.max_height, FilterType::Lanczos3);
    }

    let file = std::fs::File::create(&request.destination)
        .with_context(|| format!("create {}", request.destination.display()))?;
    let encoder = JpegEncoder::new_with_quality(std::io::BufWriter::new(file), 100);
    DynamicImage::ImageRgb8(out.to_rgb8()).write_with_encoder(encoder)?;
    Ok(())
}

/// Runs a user-configured program as the cropper.
///
/// Arguments may contain `{source}`, `{destination}`, `{aspect}`,
/// `{max_width}` and `{max_height}`. Exit status 0 with a written destination
/// means cropped, exit status 1 without output means cancelled, anything else
/// is a failure.
pub struct CommandCropTool {
    program: String,
    args: Vec<String>,
}

impl CommandCropTool {
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn expand_args(&self, request: &CropRequest) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &request.source.to_string_lossy())
                    .replace("{destination}", &request.destination.to_string_lossy())
                    .replace("{aspect}", &request.aspect.arg())
                    .replace("{max_width}", &request.max_width.to_string())
                    .replace("{max_height}", &request.max_height.to_string())
            })
            .collect()
    }
}

impl CropTool for CommandCropTool {
    fn crop(&self, request: &CropRequest) -> CropOutcome {
        let output = match Command::new(&self.program)
            .args(self.expand_args(request))
            .output()
        {
            Ok(output) => output,
            Err(err) => return CropOutcome::Failed(format!("could not start {}: {}", self.program, err)),
        };

        let produced = request.destination.exists();
        match output.status.code() {
            Some(0) if produced => CropOutcome::Cropped(request.destination.clone()),
            Some(0) => CropOutcome::Failed(format!("{} produced no output", self.program)),
            Some(1) if !produced => CropOutcome::Cancelled,
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if stderr.is_empty() {
                    CropOutcome::Failed(format!("{} exited with {}", self.program, output.status))
                } else {
                    CropOutcome::Failed(stderr)
                }
            }
        }
    }
}
