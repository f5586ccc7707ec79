//! Turns focused work into points and spends them on entertainment.
//!
//! A background daemon polls the foreground window, classifies it as productive, entertainment
//! or neutral, and keeps a point ledger. When the balance runs out, entertainment apps get
//! warned, minimized, hidden or closed. The `backtowork` cli manages the daemon and its files.

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod utils;
pub mod window_api;
