use std::path::PathBuf;
use std::sync::Arc;

use retouch::app::RetouchApp;
use retouch::chat::{ChatClient, GeminiClient};
use retouch::config::{self, AppConfig};
use retouch::crop::{CenterCropTool, CommandCropTool, CropTool};
use retouch::editor::{Editor, EditorServices};
use retouch::gallery::DirectoryGallery;
use retouch::source::FileImageSource;

fn build_crop_tool(config: &AppConfig) -> Arc<dyn CropTool> {
    match config
        .crop_command
        .as_deref()
        .and_then(CommandCropTool::from_command_line)
    {
        Some(tool) => {
            tracing::info!("using external crop command");
            Arc::new(tool)
        }
        None => Arc::new(CenterCropTool),
    }
}

fn build_chat_client(config: &AppConfig) -> Option<Arc<dyn ChatClient>> {
    let key = config.chat.api_key()?;
    match GeminiClient::new(
        config.chat.endpoint(),
        config.chat.model(),
        &key,
        config.chat.generation(),
    ) {
        Ok(client) => Some(Arc::new(client)),
        Err(err) => {
            tracing::warn!("chat disabled: {}", err);
            None
        }
    }
}

fn initial_image(config: &AppConfig) -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.last_image.clone().filter(|p| p.exists()))
}

fn main() -> eframe::Result {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load();
    let services = EditorServices {
        source: Arc::new(FileImageSource {
            max_edge: config.load_max_edge,
        }),
        crop_tool: build_crop_tool(&config),
        gallery: Arc::new(DirectoryGallery::new(
            config.gallery_dir(),
            config.jpeg_quality(),
        )),
        crop_work_dir: AppConfig::crop_work_dir(),
        crop_max: config.crop_max_size(),
    };
    let chat_client = build_chat_client(&config);
    if chat_client.is_none() {
        eprintln!(
            "retouch: AI chat disabled; set {} to enable it",
            config::API_KEY_ENV
        );
    }
    let initial = initial_image(&config);

    let width = config.window_width.unwrap_or(1200.0);
    let height = config.window_height.unwrap_or(800.0);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Retouch")
            .with_app_id("retouch")
            .with_inner_size([width, height]),
        ..Default::default()
    };

    eframe::run_native(
        "retouch",
        native_options,
        Box::new(move |cc| {
            let editor = Editor::new(services);
            Ok(Box::new(RetouchApp::new(
                cc,
                config,
                editor,
                chat_client,
                initial,
            )))
        }),
    )
}
