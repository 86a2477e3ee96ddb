// Playback core: prefetch window, buffer health and the session controller.

pub mod checkpoint;
pub mod health;
pub mod prefetch;
pub mod segments;
pub mod session;
pub mod stats;
pub mod transport;
