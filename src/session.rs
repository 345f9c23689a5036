use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use tracing::{debug, info};

use crate::crop::{AspectRatio, CropAdapter, CropOutcome, CropRequest};
use crate::error::{EditError, Result};
use crate::history::UndoHistory;
use crate::processing::transform;
use crate::state::AdjustmentState;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Rendering { ticket: u64 },
}

/// A render detached from the session so it can run on a worker thread.
pub struct RenderJob {
    session: u64,
    ticket: u64,
    base: Arc<RgbaImage>,
    adjustment: AdjustmentState,
}

impl RenderJob {
    pub fn run(self) -> RenderOutput {
        let result = transform::render(&self.base, &self.adjustment);
        RenderOutput {
            session: self.session,
            ticket: self.ticket,
            adjustment: self.adjustment,
            result,
        }
    }
}

pub struct RenderOutput {
    session: u64,
    ticket: u64,
    adjustment: AdjustmentState,
    result: Result<RgbaImage>,
}

impl RenderOutput {
    pub fn session(&self) -> u64 {
        self.session
    }
}

/// Owns the rasters of one open image: the untouched original, the post-crop
/// base, the rendered working image, and the undo history.
///
/// `working` always equals `render(base, adjustment)` while the session is
/// idle. Every mutating call is all-or-nothing and is refused with
/// [`EditError::Busy`] while a render or crop is in flight.
pub struct EditSession {
    id: u64,
    original: RgbaImage,
    base: Arc<RgbaImage>,
    working: RgbaImage,
    adjustment: AdjustmentState,
    history: UndoHistory,
    // Adjustment that produced each history entry, same length as `history`.
    trail: Vec<AdjustmentState>,
    phase: Phase,
    next_ticket: u64,
    crop: CropAdapter,
}

impl EditSession {
    /// Starts a session on `buffer`. Replacing an existing session with the
    /// result drops every raster it held.
    pub fn load(buffer: RgbaImage, crop: CropAdapter) -> Result<Self> {
        ensure_not_empty(&buffer)?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            session = id,
            width = buffer.width(),
            height = buffer.height(),
            "edit session loaded"
        );

        let base = Arc::new(buffer.clone());
        let working = buffer.clone();
        let history = UndoHistory::new(working.clone());
        Ok(Self {
            id,
            original: buffer,
            base,
            working,
            adjustment: AdjustmentState::NEUTRAL,
            history,
            trail: vec![AdjustmentState::NEUTRAL],
            phase: Phase::Idle,
            next_ticket: 1,
            crop,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn original(&self) -> &RgbaImage {
        &self.original
    }

    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    /// The live working image. Only valid until the next mutating call.
    pub fn current_working(&self) -> &RgbaImage {
        &self.working
    }

    pub fn adjustment(&self) -> AdjustmentState {
        self.adjustment
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle || self.crop.is_active()
    }

    pub fn crop_adapter(&self) -> &CropAdapter {
        &self.crop
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_busy() {
            Err(EditError::Busy)
        } else {
            Ok(())
        }
    }

    /// Installs a new base (the effect of a completed crop) and resets the
    /// adjustment and history around it.
    pub fn replace_base(&mut self, new_base: RgbaImage) -> Result<()> {
        self.ensure_idle()?;
        ensure_not_empty(&new_base)?;
        self.install_base(new_base);
        Ok(())
    }

    /// Drops the crop and every adjustment, going back to the loaded image.
    pub fn reset_to_original(&mut self) -> Result<()> {
        self.replace_base(self.original.clone())
    }

    fn install_base(&mut self, new_base: RgbaImage) {
        debug!(
            session = self.id,
            width = new_base.width(),
            height = new_base.height(),
            "replacing base"
        );
        self.working = new_base.clone();
        self.history.reset(new_base.clone());
        self.base = Arc::new(new_base);
        self.adjustment = AdjustmentState::NEUTRAL;
        self.trail.clear();
        self.trail.push(AdjustmentState::NEUTRAL);
    }

    /// Renders `adj` on the calling thread and installs the result.
    pub fn apply_adjustment(&mut self, adj: AdjustmentState) -> Result<()> {
        self.ensure_idle()?;
        let rendered = transform::render(&self.base, &adj)?;
        self.install_working(rendered, adj);
        Ok(())
    }

    /// Turns the image a further quarter turn clockwise.
    pub fn rotate_clockwise(&mut self) -> Result<()> {
        let mut adj = self.adjustment;
        adj.rotation = adj.rotation.rotated_cw();
        self.apply_adjustment(adj)
    }

    /// Reserves the session for an off-thread render of `adj`.
    pub fn begin_render(&mut self, adj: AdjustmentState) -> Result<RenderJob> {
        self.ensure_idle()?;
        adj.validate()?;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.phase = Phase::Rendering { ticket };
        Ok(RenderJob {
            session: self.id,
            ticket,
            base: Arc::clone(&self.base),
            adjustment: adj,
        })
    }

    /// Installs a finished render. Returns `Ok(false)` for output that does
    /// not belong to the render currently in flight.
    pub fn complete_render(&mut self, output: RenderOutput) -> Result<bool> {
        if output.session != self.id || self.phase != (Phase::Rendering { ticket: output.ticket }) {
            debug!(session = self.id, ticket = output.ticket, "ignoring stale render");
            return Ok(false);
        }
        self.phase = Phase::Idle;
        let rendered = output.result?;
        self.install_working(rendered, output.adjustment);
        Ok(true)
    }

    fn install_working(&mut self, rendered: RgbaImage, adj: AdjustmentState) {
        if self.history.push_if_changed(&rendered) {
            self.trail.push(adj);
        }
        self.working = rendered;
        self.adjustment = adj;
    }

    /// Restores the previous snapshot together with the adjustment that
    /// produced it. Returns `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        if !self.history.can_undo() {
            return Ok(false);
        }
        self.working = self.history.undo();
        self.trail.pop();
        self.adjustment = self
            .trail
            .last()
            .copied()
            .unwrap_or(AdjustmentState::NEUTRAL);
        debug!(session = self.id, depth = self.history.len(), "undo");
        Ok(true)
    }

    /// Exports the working image for the crop tool. The session stays locked
    /// until [`EditSession::complete_crop`] resolves the request.
    pub fn begin_crop(&mut self, aspect: AspectRatio) -> Result<CropRequest> {
        self.ensure_idle()?;
        self.crop.prepare(&self.working, aspect)
    }

    /// Applies the crop tool's outcome. Returns whether the base changed.
    pub fn complete_crop(&mut self, ticket: u64, outcome: CropOutcome) -> Result<bool> {
        let Some(cropped) = self.crop.resolve(ticket, outcome)? else {
            return Ok(false);
        };
        self.install_base(cropped);
        self.crop.finish();
        info!(
            session = self.id,
            width = self.working.width(),
            height = self.working.height(),
            "crop applied"
        );
        Ok(true)
    }
}

fn ensure_not_empty(img: &RgbaImage) -> Result<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(EditError::InvalidImage(format!(
            "image has no pixels ({}x{})",
            img.width(),
            img.height()
        )));
    }
    Ok(())
}
