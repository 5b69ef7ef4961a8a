pub mod binding;
pub mod category;
pub mod filter;
pub mod labels;
pub mod symbology;
pub mod visibility;

pub use binding::*;
pub use category::*;
pub use labels::*;
pub use visibility::*;
