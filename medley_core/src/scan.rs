use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::MedleyError;

/// File extensions picked up from the source directory, compared case-insensitively.
pub const EXTENSIONS: [&str; 3] = ["wav", "wave", "bwf"];

pub fn is_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// List the audio files directly inside `dir`, in directory order.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, MedleyError> {
    let unreadable = |source| MedleyError::SourceDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let metadata = fs::metadata(dir).map_err(unreadable)?;
    if !metadata.is_dir() {
        return Err(unreadable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }

    let mut candidates = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(unreadable(err.into())),
            Err(err) => {
                warn!("skipping unreadable directory entry: {err}");
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_file() && !is_hidden(path) && is_candidate(path) {
            candidates.push(entry.into_path());
        } else {
            debug!("ignoring '{}'", path.display());
        }
    }

    Ok(candidates)
}
