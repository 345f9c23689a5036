use std::{
    path::PathBuf,
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};

use image::RgbaImage;
use tracing::{debug, warn};

use crate::crop::{AspectRatio, CropAdapter, CropOutcome, CropTool, spawn_crop};
use crate::error::EditError;
use crate::gallery::GalleryWriter;
use crate::session::{EditSession, RenderOutput};
use crate::source::ImageSource;
use crate::state::{AdjustmentState, BRIGHTNESS_RANGE, CONTRAST_RANGE, SATURATION_RANGE};

const DEBOUNCE: Duration = Duration::from_millis(150);
const SAVE_NAME_HINT: &str = "Retouch";

enum BgResult {
    Loaded { path: PathBuf, img: RgbaImage },
    LoadFailed { path: PathBuf, error: EditError },
    Rendered(RenderOutput),
    Cropped { session: u64, ticket: u64, outcome: CropOutcome },
    Saved(Result<PathBuf, EditError>),
}

/// Collaborators the editor hands work to.
pub struct EditorServices {
    pub source: Arc<dyn ImageSource>,
    pub crop_tool: Arc<dyn CropTool>,
    pub gallery: Arc<dyn GalleryWriter>,
    pub crop_work_dir: PathBuf,
    pub crop_max: (u32, u32),
}

pub struct Editor {
    services: EditorServices,
    current_path: Option<PathBuf>,
    /// Path being decoded; becomes `current_path` only once it loads.
    loading_path: Option<PathBuf>,
    session: Option<EditSession>,
    /// Slider values; rendered into the session once it is free.
    pending: AdjustmentState,
    needs_render: bool,
    last_slider_change: Option<Instant>,
    texture: Option<egui::TextureHandle>,
    texture_dirty: bool,
    saving: bool,
    crop_aspect: AspectRatio,
    status: String,
    tx: mpsc::SyncSender<BgResult>,
    rx: mpsc::Receiver<BgResult>,
}

impl Editor {
    pub fn new(services: EditorServices) -> Self {
        let (tx, rx) = mpsc::sync_channel(8);
        Self {
            services,
            current_path: None,
            loading_path: None,
            session: None,
            pending: AdjustmentState::NEUTRAL,
            needs_render: false,
            last_slider_change: None,
            texture: None,
            texture_dirty: false,
            saving: false,
            crop_aspect: AspectRatio::Free,
            status: String::new(),
            tx,
            rx,
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.current_path.as_ref()
    }

    pub fn filename(&self) -> String {
        self.current_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "No image".to_string())
    }

    /// Decodes `path` in the background. The current session stays open
    /// until the new image is ready.
    pub fn open(&mut self, path: PathBuf, ctx: &egui::Context) {
        self.loading_path = Some(path.clone());
        self.status = format!("Loading {}", path.display());

        let tx = self.tx.clone();
        let source = Arc::clone(&self.services.source);
        let ctx2 = ctx.clone();
        std::thread::spawn(move || {
            let msg = match source.open(&path) {
                Ok(img) => BgResult::Loaded { path, img },
                Err(error) => BgResult::LoadFailed { path, error },
            };
            let _ = tx.send(msg);
            ctx2.request_repaint();
        });
    }

    /// Tears the session down. Late render or crop results are dropped.
    pub fn close(&mut self) {
        self.session = None;
        self.current_path = None;
        self.loading_path = None;
        self.texture = None;
        self.pending = AdjustmentState::NEUTRAL;
        self.needs_render = false;
        self.status.clear();
    }

    fn trigger_render(&mut self, ctx: &egui::Context) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_busy() {
            return;
        }
        self.needs_render = false;
        self.last_slider_change = None;
        if session.adjustment() == self.pending {
            return;
        }

        let job = match session.begin_render(self.pending) {
            Ok(job) => job,
            Err(err) => {
                self.report(&err);
                return;
            }
        };
        let tx = self.tx.clone();
        let ctx2 = ctx.clone();
        std::thread::spawn(move || {
            let _ = tx.send(BgResult::Rendered(job.run()));
            ctx2.request_repaint();
        });
    }

    fn report(&mut self, err: &EditError) {
        warn!("{}: {}", err.kind(), err);
        self.status = err.to_string();
    }

    pub fn drain(&mut self, ctx: &egui::Context) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                BgResult::Loaded { path, img } => {
                    if self.loading_path.as_ref() != Some(&path) {
                        continue;
                    }
                    self.loading_path = None;
                    let (max_w, max_h) = self.services.crop_max;
                    let adapter =
                        CropAdapter::new(self.services.crop_work_dir.clone(), max_w, max_h);
                    match EditSession::load(img, adapter) {
                        Ok(session) => {
                            self.status = format!(
                                "{}x{}",
                                session.current_working().width(),
                                session.current_working().height()
                            );
                            self.session = Some(session);
                            self.current_path = Some(path);
                            self.pending = AdjustmentState::NEUTRAL;
                            self.needs_render = false;
                            self.texture_dirty = true;
                        }
                        Err(err) => self.report(&err),
                    }
                }
                BgResult::LoadFailed { path, error } => {
                    if self.loading_path.as_ref() == Some(&path) {
                        self.loading_path = None;
                        self.report(&error);
                    }
                }
                BgResult::Rendered(output) => {
                    let Some(session) = self.session.as_mut() else {
                        continue;
                    };
                    if output.session() != session.id() {
                        continue;
                    }
                    match session.complete_render(output) {
                        Ok(true) => self.texture_dirty = true,
                        Ok(false) => {}
                        Err(err) => self.report(&err),
                    }
                    if self
                        .session
                        .as_ref()
                        .is_some_and(|s| s.adjustment() != self.pending)
                    {
                        self.needs_render = true;
                    }
                }
                BgResult::Cropped {
                    session: id,
                    ticket,
                    outcome,
                } => {
                    let Some(session) = self.session.as_mut() else {
                        debug!(session = id, "crop finished after editor closed");
                        continue;
                    };
                    if session.id() != id {
                        continue;
                    }
                    match session.complete_crop(ticket, outcome) {
                        Ok(true) => {
                            let working = session.current_working();
                            self.status =
                                format!("Cropped to {}x{}", working.width(), working.height());
                            self.pending = AdjustmentState::NEUTRAL;
                            self.needs_render = false;
                            self.texture_dirty = true;
                        }
                        Ok(false) => self.status = "Crop cancelled".to_string(),
                        Err(err) => self.report(&err),
                    }
                }
                BgResult::Saved(result) => {
                    self.saving = false;
                    match result {
                        Ok(path) => self.status = format!("Saved to {}", path.display()),
                        Err(err) => self.report(&err),
                    }
                }
            }
        }

        if self.texture_dirty {
            self.texture_dirty = false;
            self.texture = self.session.as_ref().map(|s| {
                let working = s.current_working();
                let img = egui::ColorImage::from_rgba_unmultiplied(
                    [working.width() as usize, working.height() as usize],
                    working.as_raw(),
                );
                ctx.load_texture("editor_tex", img, egui::TextureOptions::LINEAR)
            });
        }
    }

    /// Drains background results and kicks off a render once sliders settle.
    pub fn poll(&mut self, ctx: &egui::Context) {
        self.drain(ctx);

        let idle = self.session.as_ref().is_some_and(|s| !s.is_busy());
        if self.needs_render && idle {
            let debounce_done = self
                .last_slider_change
                .map(|t| t.elapsed() >= DEBOUNCE)
                .unwrap_or(true);
            if debounce_done {
                self.trigger_render(ctx);
            } else {
                ctx.request_repaint_after(DEBOUNCE);
            }
        }
    }

    fn start_crop(&mut self, ctx: &egui::Context) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let request = match session.begin_crop(self.crop_aspect) {
            Ok(request) => request,
            Err(err) => {
                self.report(&err);
                return;
            }
        };
        let id = session.id();
        let tx = self.tx.clone();
        let ctx2 = ctx.clone();
        self.status = "Cropping...".to_string();
        spawn_crop(
            Arc::clone(&self.services.crop_tool),
            request,
            move |ticket, outcome| {
                let _ = tx.send(BgResult::Cropped {
                    session: id,
                    ticket,
                    outcome,
                });
                ctx2.request_repaint();
            },
        );
    }

    fn start_save(&mut self, ctx: &egui::Context) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let snapshot = session.current_working().clone();
        let gallery = Arc::clone(&self.services.gallery);
        let tx = self.tx.clone();
        let ctx2 = ctx.clone();
        self.saving = true;
        self.status = "Saving...".to_string();
        std::thread::spawn(move || {
            let _ = tx.send(BgResult::Saved(gallery.save(&snapshot, SAVE_NAME_HINT)));
            ctx2.request_repaint();
        });
    }

    fn undo(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.undo() {
            Ok(true) => {
                self.pending = session.adjustment();
                self.needs_render = false;
                self.texture_dirty = true;
            }
            Ok(false) => {}
            Err(err) => self.report(&err),
        }
    }

    fn reset(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.reset_to_original() {
            Ok(()) => {
                self.pending = AdjustmentState::NEUTRAL;
                self.needs_render = false;
                self.texture_dirty = true;
                self.status = "Reset to original".to_string();
            }
            Err(err) => self.report(&err),
        }
    }

    pub fn show_image(&mut self, ui: &mut egui::Ui) {
        let avail = ui.available_size();
        let busy = self.session.as_ref().is_some_and(|s| s.is_busy());

        if self.loading_path.is_some() && self.texture.is_none() {
            ui.allocate_ui(avail, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.spinner();
                });
            });
        } else if let Some(ref tex) = self.texture {
            let tex_size = tex.size_vec2();
            let scale = (avail.x / tex_size.x).min(avail.y / tex_size.y).min(1.0);
            let display = tex_size * scale;
            let (img_rect, _) = ui.allocate_exact_size(display, egui::Sense::hover());
            ui.painter().image(
                tex.id(),
                img_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
            if busy || self.loading_path.is_some() {
                ui.painter()
                    .rect_filled(img_rect, 0.0, egui::Color32::from_black_alpha(80));
            }
        } else {
            ui.centered_and_justified(|ui| {
                ui.label("Open an image to start editing");
            });
        }
    }

    pub fn show_controls(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let has_session = self.session.is_some();
        let busy = self.session.as_ref().is_some_and(|s| s.is_busy());
        let can_undo = self.session.as_ref().is_some_and(|s| s.can_undo());
        let settled = !self.needs_render;

        ui.label(egui::RichText::new("Adjust").strong());
        ui.add_space(4.0);
        ui.add_enabled_ui(has_session, |ui| {
            let mut changed = false;
            changed |= slider_row(ui, "Brightness", &mut self.pending.brightness, BRIGHTNESS_RANGE);
            changed |= slider_row(ui, "Contrast", &mut self.pending.contrast, CONTRAST_RANGE);
            changed |= slider_row(ui, "Saturation", &mut self.pending.saturation, SATURATION_RANGE);
            if changed {
                self.needs_render = true;
                self.last_slider_change = Some(Instant::now());
            }

            ui.horizontal(|ui| {
                ui.label("Rotate");
                if ui.button("90° ▶").clicked() {
                    self.pending.rotation = self.pending.rotation.rotated_cw();
                    self.needs_render = true;
                    self.last_slider_change = None;
                }
                if self.pending.rotation.degrees() != 0 {
                    ui.weak(format!("({}°)", self.pending.rotation.degrees()));
                }
            });
        });

        ui.separator();
        ui.label(egui::RichText::new("Crop").strong());
        ui.horizontal(|ui| {
            egui::ComboBox::from_id_salt("crop_aspect")
                .selected_text(self.crop_aspect.label())
                .show_ui(ui, |ui| {
                    for aspect in AspectRatio::ALL {
                        ui.selectable_value(&mut self.crop_aspect, aspect, aspect.label());
                    }
                });
            if ui
                .add_enabled(has_session && !busy && settled, egui::Button::new("Crop"))
                .clicked()
            {
                self.start_crop(&ctx);
            }
        });

        ui.separator();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(can_undo && !busy, egui::Button::new("Undo"))
                .clicked()
            {
                self.undo();
            }
            if ui
                .add_enabled(has_session && !busy, egui::Button::new("Reset"))
                .clicked()
            {
                self.reset();
            }
            let save_label = if self.saving { "Saving..." } else { "Save" };
            if ui
                .add_enabled(
                    has_session && !busy && settled && !self.saving,
                    egui::Button::new(save_label),
                )
                .clicked()
            {
                self.start_save(&ctx);
            }
        });

        if !self.status.is_empty() {
            ui.add_space(8.0);
            ui.separator();
            ui.label(&self.status);
        }
    }
}

fn slider_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut f32,
    range: std::ops::RangeInclusive<f32>,
) -> bool {
    ui.horizontal(|ui| {
        ui.label(label);
        ui.add(
            egui::Slider::new(value, range)
                .fixed_decimals(2)
                .clamping(egui::SliderClamping::Always),
        )
        .changed()
    })
    .inner
}
