// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Name ↔ id registry and file extension table.
//!
//! Every [`Core`](crate::core::Core) owns one registry, so ids are only
//! meaningful within that core. Registration is idempotent: registering a
//! known name returns its existing id.

use crate::error::{Result, TuneKitError};
use crate::media::{
    MEDIA_TYPE_ID_AUDIO_PCM, MEDIA_TYPE_ID_UNKNOWN, MEDIA_TYPE_ID_VIDEO_RAW, MIME_AUDIO_PCM,
    MIME_VIDEO_RAW,
};
use indexmap::IndexMap;
use std::collections::HashMap;

/// A namespace of registered names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryCategory {
    /// MIME type → media type id.
    MediaTypeIds,
    Custom(String),
}

#[derive(Debug, Default)]
struct CategoryTable {
    by_name: IndexMap<String, u32>,
    by_id: HashMap<u32, String>,
    next_id: u32,
}

impl CategoryTable {
    fn with_first_id(next_id: u32) -> Self {
        Self { next_id, ..Self::default() }
    }

    fn insert(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        id
    }
}

#[derive(Debug)]
pub struct Registry {
    categories: HashMap<RegistryCategory, CategoryTable>,
    extensions: IndexMap<String, String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim();
    let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);
    format!(".{}", bare.to_ascii_lowercase())
}

impl Registry {
    /// A registry with `audio/pcm` and `video/raw` pre-registered.
    pub fn new() -> Self {
        let mut media_types = CategoryTable::with_first_id(MEDIA_TYPE_ID_AUDIO_PCM);
        let pcm = media_types.insert(MIME_AUDIO_PCM);
        let raw = media_types.insert(MIME_VIDEO_RAW);
        debug_assert_eq!(pcm, MEDIA_TYPE_ID_AUDIO_PCM);
        debug_assert_eq!(raw, MEDIA_TYPE_ID_VIDEO_RAW);

        let mut categories = HashMap::new();
        categories.insert(RegistryCategory::MediaTypeIds, media_types);
        Self { categories, extensions: IndexMap::new() }
    }

    /// Registers `name` in `category` and returns its id.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for an empty name.
    pub fn register_name(&mut self, category: &RegistryCategory, name: &str) -> Result<u32> {
        if name.is_empty() {
            return Err(TuneKitError::InvalidParameters("cannot register an empty name".into()));
        }
        let table = self
            .categories
            .entry(category.clone())
            .or_insert_with(|| CategoryTable::with_first_id(MEDIA_TYPE_ID_UNKNOWN + 1));
        let id = table.insert(name);
        tracing::trace!(?category, name, id, "registered name");
        Ok(id)
    }

    /// # Errors
    ///
    /// `NoSuchName` if `name` was never registered in `category`.
    pub fn id_for_name(&self, category: &RegistryCategory, name: &str) -> Result<u32> {
        self.categories
            .get(category)
            .and_then(|table| table.by_name.get(name).copied())
            .ok_or_else(|| TuneKitError::NoSuchName(name.to_string()))
    }

    /// # Errors
    ///
    /// `NoSuchItem` if no name has `id` in `category`.
    pub fn name_for_id(&self, category: &RegistryCategory, id: u32) -> Result<&str> {
        self.categories
            .get(category)
            .and_then(|table| table.by_id.get(&id))
            .map(String::as_str)
            .ok_or(TuneKitError::NoSuchItem)
    }

    /// Shorthand for registering a MIME type as a media type id.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for an empty MIME type.
    pub fn register_media_type(&mut self, mime: &str) -> Result<u32> {
        self.register_name(&RegistryCategory::MediaTypeIds, mime)
    }

    /// Maps a file extension (with or without its leading dot) to a MIME type.
    /// A later registration of the same extension replaces the earlier one.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for an empty extension or MIME type.
    pub fn register_extension(&mut self, extension: &str, mime: &str) -> Result<()> {
        let key = normalize_extension(extension);
        if key.len() < 2 || mime.is_empty() {
            return Err(TuneKitError::InvalidParameters(format!(
                "invalid extension mapping '{extension}' -> '{mime}'"
            )));
        }
        self.extensions.insert(key, mime.to_string());
        Ok(())
    }

    pub fn mime_for_extension(&self, extension: &str) -> Option<&str> {
        self.extensions.get(&normalize_extension(extension)).map(String::as_str)
    }

    /// Media type id for the file extension of `path` (`"song.WAV"` → id of `audio/wav`).
    ///
    /// # Errors
    ///
    /// `NoSuchName` if the path has no extension, or it is not mapped to a registered type.
    pub fn media_type_id_for_path(&self, path: &str) -> Result<u32> {
        let extension = path
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.contains(['/', '\\']))
            .ok_or_else(|| TuneKitError::NoSuchName(path.to_string()))?;
        let mime = self
            .mime_for_extension(extension)
            .ok_or_else(|| TuneKitError::NoSuchName(format!(".{extension}")))?;
        self.id_for_name(&RegistryCategory::MediaTypeIds, mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_media_types() {
        let registry = Registry::new();
        let category = RegistryCategory::MediaTypeIds;
        assert_eq!(
            registry.id_for_name(&category, MIME_AUDIO_PCM).unwrap(),
            MEDIA_TYPE_ID_AUDIO_PCM
        );
        assert_eq!(
            registry.name_for_id(&category, MEDIA_TYPE_ID_VIDEO_RAW).unwrap(),
            MIME_VIDEO_RAW
        );
    }

    #[test]
    fn test_register_name_is_idempotent() {
        let mut registry = Registry::new();
        let first = registry.register_media_type("audio/wav").unwrap();
        let second = registry.register_media_type("audio/wav").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, MEDIA_TYPE_ID_VIDEO_RAW + 1);
        assert_ne!(registry.register_media_type("audio/mpeg").unwrap(), first);
        assert!(matches!(registry.register_media_type(""), Err(TuneKitError::InvalidParameters(_))));
    }

    #[test]
    fn test_custom_category_and_missing_names() {
        let mut registry = Registry::new();
        let category = RegistryCategory::Custom("Codecs".to_string());
        let id = registry.register_name(&category, "flac").unwrap();
        assert_eq!(registry.name_for_id(&category, id).unwrap(), "flac");
        assert!(matches!(
            registry.id_for_name(&category, "vorbis"),
            Err(TuneKitError::NoSuchName(_))
        ));
        assert!(matches!(registry.name_for_id(&category, 999), Err(TuneKitError::NoSuchItem)));
    }

    #[test]
    fn test_extensions() {
        let mut registry = Registry::new();
        let wav = registry.register_media_type("audio/wav").unwrap();
        registry.register_extension(".wav", "audio/wav").unwrap();
        assert_eq!(registry.mime_for_extension("WAV"), Some("audio/wav"));
        assert_eq!(registry.media_type_id_for_path("/tmp/Song.Wav").unwrap(), wav);
        assert!(registry.media_type_id_for_path("/tmp.dir/noext").is_err());
        assert!(registry.media_type_id_for_path("track.mp3").is_err());
        assert!(registry.register_extension(".", "audio/wav").is_err());
    }
}
