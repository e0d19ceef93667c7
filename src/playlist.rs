//! Loading the ordered list of audio references.

use crate::startup::{StartupError, StreamConfig};
use std::path::Path;

/// Ordered, non-empty list of opaque audio references.
///
/// File order is playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    references: Vec<String>,
}

impl Playlist {
    /// Build a playlist, returning `None` when there is nothing to play.
    pub fn from_references(references: Vec<String>) -> Option<Self> {
        (!references.is_empty()).then_some(Self { references })
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.references.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Split playlist text into references: one per non-blank line, trimmed.
pub fn parse(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate the stream assets and load the playlist file.
///
/// The looping video is checked before the playlist so a misconfigured
/// deployment reports the missing asset first.
pub fn load(config: &StreamConfig) -> Result<Playlist, StartupError> {
    if !config.video_path.exists() {
        return Err(StartupError::MissingVideo(config.video_path.clone()));
    }

    load_file(&config.playlist_path)
}

/// Load and parse a playlist file.
pub fn load_file(path: &Path) -> Result<Playlist, StartupError> {
    if !path.exists() {
        return Err(StartupError::MissingPlaylist(path.to_path_buf()));
    }

    let content =
        std::fs::read_to_string(path).map_err(|source| StartupError::UnreadablePlaylist {
            path: path.to_path_buf(),
            source,
        })?;

    let playlist = Playlist::from_references(parse(&content))
        .ok_or_else(|| StartupError::EmptyPlaylist(path.to_path_buf()))?;

    tracing::info!("Loaded {} audio references from {:?}", playlist.len(), path);
    Ok(playlist)
}
