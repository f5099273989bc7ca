//! Client-facing folder structure of an event's photos.
//!
//! Folders are not stored anywhere: the second segment of a photo's object
//! key (`{event_id}/{folder}/{file}`) is the folder name.

use crate::models::Photo;
use serde::Serialize;
use std::collections::HashMap;

/// Default folder label in the admin console
pub const ADMIN_DEFAULT_FOLDER: &str = "uncategorized";

/// Default folder label in the public gallery
pub const PUBLIC_DEFAULT_FOLDER: &str = "Uncategorized";

/// Photos sharing one folder, in upload order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderGroup<T = Photo> {
    pub folder: String,
    pub photos: Vec<T>,
}

impl<T> FolderGroup<T> {
    /// Convert every photo in the group, keeping order
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> FolderGroup<U> {
        FolderGroup {
            folder: self.folder,
            photos: self.photos.into_iter().map(f).collect(),
        }
    }
}

/// Folder segment of an object key, if it has one.
///
/// The segment after the event ID counts as a folder only when a file name
/// follows it, so `5/a.jpg` has no folder.
pub fn folder_of(file_path: &str) -> Option<&str> {
    let mut segments = file_path.split('/');
    let folder = segments.nth(1)?;
    segments.next()?;
    Some(folder).filter(|f| !f.is_empty())
}

/// Partition photos into folders.
///
/// Groups appear in order of first occurrence and each group keeps the
/// input order. Photos whose key lacks a folder segment land in
/// `default_label`.
pub fn group_by_folder(
    photos: impl IntoIterator<Item = Photo>,
    default_label: &str,
) -> Vec<FolderGroup> {
    let mut groups: Vec<FolderGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for photo in photos {
        let folder = folder_of(&photo.file_path)
            .unwrap_or(default_label)
            .to_string();
        match index.get(&folder) {
            Some(&i) => groups[i].photos.push(photo),
            None => {
                index.insert(folder.clone(), groups.len());
                groups.push(FolderGroup {
                    folder,
                    photos: vec![photo],
                });
            }
        }
    }

    groups
}

/// Distinct folder names in first-occurrence order, admin labelling
pub fn existing_folders(photos: &[Photo]) -> Vec<String> {
    let mut folders: Vec<String> = Vec::new();
    for photo in photos {
        let folder = folder_of(&photo.file_path).unwrap_or(ADMIN_DEFAULT_FOLDER);
        if !folders.iter().any(|f| f == folder) {
            folders.push(folder.to_string());
        }
    }
    folders
}
