//! Storage is organized as a handful of JSON documents inside the application directory.
//!  - Every document is read through [documents::JsonDocument], which heals empty or
//!    corrupted files by reinitializing them with their default content.
//!  - Every write replaces the whole document atomically.
//!  - [documents::DataFiles] is the single place that knows the file names.

pub mod documents;
pub mod entities;
