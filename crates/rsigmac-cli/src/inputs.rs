//! Input discovery.

use std::path::PathBuf;

use walkdir::{DirEntry, WalkDir};

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Expand the command line inputs into the files to process, in order.
///
/// Without `recursive` every path is passed through untouched, even if it
/// does not exist. With it, each path is walked depth first; entries whose
/// name starts with `.` are skipped together with everything below them.
/// The roots themselves are never filtered.
pub fn locate(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    if !recursive {
        return paths.to_vec();
    }

    let mut files = Vec::new();
    for root in paths {
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
        for entry in walker {
            match entry {
                Ok(e) if !e.file_type().is_dir() => files.push(e.into_path()),
                Ok(_) => {}
                Err(e) => log::warn!("skipping {}: {e}", root.display()),
            }
        }
    }
    files
}
