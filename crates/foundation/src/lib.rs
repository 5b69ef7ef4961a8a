pub mod ids;
pub mod time;

// Foundation crate: naming and time primitives shared by every other crate.
pub use ids::*;
pub use time::*;
