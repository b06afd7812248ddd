use std::fs;
use std::path::{Component, Path};
use walkdir::WalkDir;

use crate::config::CopySpec;
use crate::error::{BurrowError, ErrorCode, Result};

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| BurrowError::io("create directory", parent, e))?;
    }
    fs::copy(from, to).map_err(|e| BurrowError::io("copy", from, e))?;
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            BurrowError::other(format!("failed to walk {}: {e}", from.display()))
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| BurrowError::io("create directory", &target, e))?;
        } else {
            copy_file(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn stays_inside(relative: &Path) -> bool {
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Copy every file matching `specs` from `source` into `dest`, keeping
/// paths relative to `source`. Returns the number of files copied.
pub fn copy_specs(source: &Path, dest: &Path, specs: &[CopySpec]) -> Result<usize> {
    let mut copied = 0;
    let base = glob::Pattern::escape(&source.to_string_lossy());

    for spec in specs {
        let relative_pattern = spec.pattern().trim_start_matches('/');
        if !stays_inside(Path::new(relative_pattern)) {
            return Err(BurrowError::config_with_code(
                ErrorCode::CONFIG_INVALID_PATTERN,
                format!("copy pattern `{}` leaves the source directory", spec.pattern()),
            ));
        }
        let pattern = format!("{base}/{relative_pattern}");
        let entries = glob::glob(&pattern).map_err(|e| {
            BurrowError::config_with_code(
                ErrorCode::CONFIG_INVALID_PATTERN,
                format!("invalid copy pattern `{}`: {e}", spec.pattern()),
            )
        })?;

        let mut matched = false;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Skipping unreadable copy source: {}", e);
                    continue;
                }
            };
            let relative = match path.strip_prefix(source) {
                Ok(relative) if stays_inside(relative) => relative,
                _ => {
                    tracing::warn!("Copy source {} escapes {}", path.display(), source.display());
                    continue;
                }
            };
            matched = true;

            let target = dest.join(relative);
            if path.is_dir() {
                copied += copy_tree(&path, &target)?;
            } else {
                copy_file(&path, &target)?;
                copied += 1;
            }
        }

        if !matched {
            tracing::debug!("Copy pattern `{}` matched nothing in {}", spec.pattern(), source.display());
        }
    }

    Ok(copied)
}
