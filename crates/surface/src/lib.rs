pub mod expr;
pub mod layer;
pub mod memory;
pub mod surface;

pub use layer::*;
pub use memory::*;
pub use surface::*;
