use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditError>;

/// Recoverable failures reported by the edit pipeline and its collaborators.
///
/// No session operation partially applies before returning one of these.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("invalid adjustment: {0}")]
    InvalidAdjustment(String),

    #[error("could not prepare image for cropping: {0}")]
    CropPrepare(String),

    #[error("crop failed: {0}")]
    CropExternal(String),

    #[error("could not save image: {0}")]
    Save(String),

    #[error("another edit is still in progress")]
    Busy,
}

impl EditError {
    /// Short label for status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EditError::InvalidImage(_) => "invalid image",
            EditError::InvalidAdjustment(_) => "invalid adjustment",
            EditError::CropPrepare(_) => "crop prepare",
            EditError::CropExternal(_) => "crop",
            EditError::Save(_) => "save",
            EditError::Busy => "busy",
        }
    }
}
