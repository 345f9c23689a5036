//! Photo editing pipeline: load an image, crop it through an external tool,
//! adjust brightness/contrast/saturation and rotation, undo, and save.

pub mod app;
pub mod chat;
pub mod config;
pub mod crop;
pub mod editor;
pub mod error;
pub mod gallery;
pub mod history;
pub mod processing;
pub mod session;
pub mod source;
pub mod state;
