//! Source tarballs.
//!
//! Downloads land in a shared cache folder keyed by file name, and are
//! decompressed into each module's private build folder.

pub mod archive;
pub mod download;

pub use download::Downloader;
