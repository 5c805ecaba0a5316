//! On-disk profile tree.
//!
//! Each profile lives in a directory `<id>.profile` below the root, where a
//! `-` in the id becomes a path separator: `base-web` is stored in
//! `base/web.profile`. Every file inside the directory is one file
//! configuration, keyed by its `/` separated path relative to that directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use provision_core::error::{ProvisionError, ProvisionResult};

use crate::builder::ProfileBuilder;
use crate::profile::Profile;

/// Directory suffix marking a profile
pub const PROFILE_FOLDER_SUFFIX: &str = ".profile";

/// Directory of profile `id` below `root`
pub fn profile_path(root: &Path, id: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    let segments: Vec<&str> = id.split('-').collect();
    if let Some((last, dirs)) = segments.split_last() {
        path.extend(dirs);
        path.push(format!("{}{}", last, PROFILE_FOLDER_SUFFIX));
    }
    path
}

fn walk_error(err: walkdir::Error) -> ProvisionError {
    ProvisionError::Io(err.to_string())
}

fn relative_key(base: &Path, path: &Path) -> ProvisionResult<Vec<String>> {
    let relative = path
        .strip_prefix(base)
        .map_err(|e| ProvisionError::Io(format!("Failed to strip prefix of {}: {}", path.display(), e)))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect())
}

/// Load every profile below `root`. A missing root holds no profiles.
pub fn load_profiles(root: &Path) -> ProvisionResult<BTreeMap<String, Profile>> {
    let mut profiles = BTreeMap::new();
    if !root.exists() {
        return Ok(profiles);
    }

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(PROFILE_FOLDER_SUFFIX) {
            continue;
        }
        walker.skip_current_dir();

        let segments = relative_key(root, entry.path())?;
        let id = segments.join("-");
        let id = id.strip_suffix(PROFILE_FOLDER_SUFFIX).unwrap_or(&id).to_string();
        let profile = load_profile(entry.path(), &id)?;
        debug!(profile = %id, files = profile.file_configurations().len(), "loaded profile");
        profiles.insert(id, profile);
    }
    Ok(profiles)
}

fn load_profile(dir: &Path, id: &str) -> ProvisionResult<Profile> {
    let mut builder = ProfileBuilder::new(id);
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = relative_key(dir, entry.path())?.join("/");
        let data = fs::read(entry.path())?;
        builder = builder.add_file_configuration(key, data);
    }
    builder.build()
}

/// Write `profile` below `root`, replacing files of the same name
pub fn write_profile(root: &Path, profile: &Profile) -> ProvisionResult<()> {
    let dir = profile_path(root, profile.id());
    fs::create_dir_all(&dir)?;
    for (name, data) in profile.file_configurations() {
        let path = name.split('/').fold(dir.clone(), |path, segment| path.join(segment));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
    }
    debug!(profile = profile.id(), path = %dir.display(), "wrote profile");
    Ok(())
}

/// Remove the directory of profile `id`; a missing profile is not an error
pub fn delete_profile(root: &Path, id: &str) -> ProvisionResult<()> {
    let dir = profile_path(root, id);
    if dir.is_dir() {
        fs::remove_dir_all(&dir)?;
        debug!(profile = id, path = %dir.display(), "deleted profile");
    }
    Ok(())
}
