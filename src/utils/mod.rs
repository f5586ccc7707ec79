pub mod blocking;
pub mod clock;
pub mod dir;
pub mod logging;
pub mod percentage;
pub mod runtime;
pub mod time;
