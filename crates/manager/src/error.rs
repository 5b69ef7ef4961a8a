use formats::{ManifestError, PayloadError, SettingsError};
use layers::BindingError;
use surface::SurfaceError;

#[derive(Debug, Clone, PartialEq)]
pub enum LayerError {
    Payload(PayloadError),
    Manifest(ManifestError),
    Settings(SettingsError),
    Surface(SurfaceError),
    Binding(BindingError),
    UnknownCategory(String),
    UnknownLayer(String),
    MissingBinding(String),
    /// Neither the payload nor the call id named a category or layer.
    Unresolved,
    NotReady,
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::Payload(err) => write!(f, "{err}"),
            LayerError::Manifest(err) => write!(f, "{err}"),
            LayerError::Settings(err) => write!(f, "{err}"),
            LayerError::Surface(err) => write!(f, "{err}"),
            LayerError::Binding(err) => write!(f, "{err}"),
            LayerError::UnknownCategory(id) => write!(f, "unknown category: {id}"),
            LayerError::UnknownLayer(id) => write!(f, "unknown layer: {id}"),
            LayerError::MissingBinding(id) => write!(f, "category {id} has no layers on the surface"),
            LayerError::Unresolved => write!(f, "feature could not be routed to a category or layer"),
            LayerError::NotReady => write!(f, "no render surface attached"),
        }
    }
}

impl std::error::Error for LayerError {}

impl From<PayloadError> for LayerError {
    fn from(err: PayloadError) -> Self {
        LayerError::Payload(err)
    }
}

impl From<ManifestError> for LayerError {
    fn from(err: ManifestError) -> Self {
        LayerError::Manifest(err)
    }
}

impl From<SettingsError> for LayerError {
    fn from(err: SettingsError) -> Self {
        LayerError::Settings(err)
    }
}

impl From<SurfaceError> for LayerError {
    fn from(err: SurfaceError) -> Self {
        LayerError::Surface(err)
    }
}

impl From<BindingError> for LayerError {
    fn from(err: BindingError) -> Self {
        LayerError::Binding(err)
    }
}
