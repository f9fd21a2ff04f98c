// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

/// Picks one mount point out of several.
///
/// UDisks2 may report redundant bind-mount paths for one filesystem
/// (https://bugs.debian.org/762950); the shortest one wins, first seen on ties.
pub fn shortest_mount_point(mount_points: &[String]) -> Option<String> {
    let mut shortest: Option<&String> = None;
    for current in mount_points {
        match shortest {
            Some(s) if s.len() <= current.len() => {}
            _ => shortest = Some(current),
        }
    }
    shortest.cloned()
}

/// Whether `path` lies under a user-media root or the home directory.
pub fn is_in_user_path(path: &str, media_roots: &[String], home_dir: Option<&Path>) -> bool {
    if media_roots
        .iter()
        .any(|root| !root.is_empty() && path.starts_with(root.as_str()))
    {
        return true;
    }

    match home_dir.and_then(Path::to_str) {
        Some(home) if !home.is_empty() => path.starts_with(home),
        _ => false,
    }
}
