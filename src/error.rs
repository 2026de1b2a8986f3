use thiserror::Error;

/// Errors surfaced while loading documents or assembling a model. None of
/// these corrupt a previously assembled hierarchy; the caller decides whether
/// to keep rendering the old model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The geometry or animation document failed structural validation.
    #[error("malformed description: {0}")]
    MalformedDescription(#[from] serde_json::Error),

    /// A bone references a parent that does not exist in the same geometry.
    #[error("bone `{bone}` references unresolved parent `{parent}`")]
    UnresolvedParent { bone: String, parent: String },

    /// Two bones in the same geometry share a name.
    #[error("duplicate bone name `{0}`")]
    DuplicateBoneName(String),

    /// The geometry document contains no geometry with this identifier.
    #[error("unknown geometry identifier `{0}`")]
    UnknownGeometry(String),

    /// The bound texture image could not be decoded.
    #[error("texture decode error: {0}")]
    TextureDecode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
