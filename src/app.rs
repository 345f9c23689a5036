use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use crate::chat::{ChatClient, ChatError, ChatTranscript, Speaker};
use crate::config::AppConfig;
use crate::editor::Editor;

/// Prompt box and transcript for the language-model assistant.
struct ChatWindow {
    client: Option<Arc<dyn ChatClient>>,
    transcript: ChatTranscript,
    input: String,
    waiting: bool,
    tx: mpsc::Sender<Result<String, ChatError>>,
    rx: mpsc::Receiver<Result<String, ChatError>>,
}

impl ChatWindow {
    fn new(client: Option<Arc<dyn ChatClient>>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            client,
            transcript: ChatTranscript::default(),
            input: String::new(),
            waiting: false,
            tx,
            rx,
        }
    }

    fn poll(&mut self) {
        while let Ok(reply) = self.rx.try_recv() {
            self.waiting = false;
            self.transcript.push_reply(reply);
        }
    }

    fn send(&mut self, ctx: &egui::Context) {
        let Some(prompt) = self.transcript.push_prompt(&self.input) else {
            return;
        };
        self.input.clear();

        let Some(client) = self.client.clone() else {
            self.transcript.push_reply(Err(ChatError::MissingApiKey));
            return;
        };
        self.waiting = true;
        let tx = self.tx.clone();
        let ctx2 = ctx.clone();
        std::thread::spawn(move || {
            let _ = tx.send(client.generate(&prompt));
            ctx2.request_repaint();
        });
    }

    fn show(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        egui::ScrollArea::vertical()
            .id_salt("chat_scroll")
            .auto_shrink([false, false])
            .max_height((ui.available_height() - 40.0).max(80.0))
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for message in self.transcript.messages() {
                    let color = match message.speaker {
                        Speaker::User => ui.visuals().text_color(),
                        Speaker::Assistant => egui::Color32::LIGHT_BLUE,
                        Speaker::Error => egui::Color32::LIGHT_RED,
                    };
                    ui.label(egui::RichText::new(&message.text).color(color).size(15.0));
                    ui.add_space(6.0);
                }
                if self.waiting {
                    ui.spinner();
                }
            });

        ui.separator();
        ui.horizontal(|ui| {
            let resp = ui.add(
                egui::TextEdit::singleline(&mut self.input)
                    .hint_text("Ask something")
                    .desired_width(ui.available_width() - 60.0),
            );
            let submitted = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if (ui.button("Send").clicked() || submitted) && !self.waiting {
                self.send(&ctx);
                resp.request_focus();
            }
        });
    }
}

pub struct RetouchApp {
    editor: Editor,
    chat: ChatWindow,
    open_path: String,
    show_chat: bool,
    config: AppConfig,
}

impl RetouchApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: AppConfig,
        mut editor: Editor,
        chat_client: Option<Arc<dyn ChatClient>>,
        initial: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = initial.clone() {
            editor.open(path, &cc.egui_ctx);
        }
        Self {
            editor,
            chat: ChatWindow::new(chat_client),
            open_path: initial
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            show_chat: false,
            config,
        }
    }

    fn open_from_field(&mut self, ctx: &egui::Context) {
        let trimmed = self.open_path.trim();
        if trimmed.is_empty() {
            return;
        }
        let path = expand_home_prefix(trimmed);
        if !crate::source::is_supported_image(&path) {
            tracing::warn!("unsupported image extension: {}", path.display());
        }
        self.editor.open(path, ctx);
    }
}

fn expand_home_prefix(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

impl eframe::App for RetouchApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let viewport_rect = ctx.input(|i| i.viewport().inner_rect);

        // Track window size for saving on exit
        if let Some(rect) = viewport_rect {
            self.config.window_width = Some(rect.width());
            self.config.window_height = Some(rect.height());
        }

        self.editor.poll(ctx);
        self.chat.poll();

        egui::TopBottomPanel::top("main_menu").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Image");
                let resp = ui.add(
                    egui::TextEdit::singleline(&mut self.open_path)
                        .hint_text("/path/to/photo.jpg")
                        .desired_width(ui.available_width() - 220.0)
                        .font(egui::TextStyle::Monospace),
                );
                let submitted = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Open").clicked() || submitted {
                    self.open_from_field(ctx);
                }
                if ui
                    .add_enabled(self.editor.path().is_some(), egui::Button::new("Close"))
                    .clicked()
                {
                    self.editor.close();
                }
                ui.toggle_value(&mut self.show_chat, "AI Chat");
            });
        });

        egui::SidePanel::right("tools_panel")
            .resizable(false)
            .exact_width(300.0)
            .show(ctx, |ui| {
                ui.heading(self.editor.filename());
                ui.separator();
                self.editor.show_controls(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.editor.show_image(ui);
        });

        egui::Window::new("AI Chat")
            .open(&mut self.show_chat)
            .default_size([420.0, 520.0])
            .default_pos([40.0, 80.0])
            .show(ctx, |ui| {
                self.chat.show(ui);
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.config.last_image = self.editor.path().cloned();
        self.config.save();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::expand_home_prefix;

    #[test]
    fn plain_paths_are_left_alone() {
        assert_eq!(expand_home_prefix("/tmp/a.jpg"), PathBuf::from("/tmp/a.jpg"));
    }

    #[test]
    fn tilde_prefix_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home_prefix("~/a.jpg"), home.join("a.jpg"));
        }
    }
}
