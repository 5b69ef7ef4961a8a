pub mod geojson;
pub mod manifest;
pub mod settings;

pub use geojson::*;
pub use manifest::*;
pub use settings::*;
