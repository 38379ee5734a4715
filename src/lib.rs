pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod instruments;
pub mod motif;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod stages;
pub mod symbolic;

/// MIDI file extensions picked up when building a catalog
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mid", "midi"];

/// Application name for XDG paths
pub const APP_NAME: &str = "midicaps";
