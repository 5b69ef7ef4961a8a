pub mod batch;
pub mod merge;
pub mod resolve;

pub use batch::*;
pub use merge::*;
pub use resolve::*;
