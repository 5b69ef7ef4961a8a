pub mod clock;
pub mod debounce;
pub mod deferred;
pub mod event_bus;

pub use clock::*;
pub use debounce::*;
pub use deferred::*;
pub use event_bus::*;
