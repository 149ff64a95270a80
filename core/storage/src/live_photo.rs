//! Live Photo pairing.
//!
//! A Live Photo is a still image stored next to a short video clip with the
//! same directory and base name, e.g. `2024/IMG_0001.HEIC` and
//! `2024/IMG_0001.MOV`.

use std::collections::HashMap;

use gallerystore_common::types;

use crate::provider::{is_image_key, StorageObject};

/// Extensions of motion counterparts.
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];

fn is_video_key(key: &str) -> bool {
    types::extension(key)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Pair each image with the video sharing its base key.
///
/// Matching on the base key is case-insensitive. When several videos share
/// a base key the first one in listing order wins.
pub fn pair_live_photos(objects: &[StorageObject]) -> HashMap<String, StorageObject> {
    let mut videos: HashMap<String, &StorageObject> = HashMap::new();
    for object in objects.iter().filter(|o| is_video_key(&o.key)) {
        videos
            .entry(types::base_key(&object.key).to_lowercase())
            .or_insert(object);
    }

    let mut pairs = HashMap::new();
    if videos.is_empty() {
        return pairs;
    }

    for image in objects.iter().filter(|o| is_image_key(&o.key)) {
        let base = types::base_key(&image.key).to_lowercase();
        if let Some(video) = videos.get(&base) {
            pairs.insert(image.key.clone(), (*video).clone());
        }
    }

    pairs
}
