//! Template set instantiation.
//!
//! A template set is a directory under the templates root. Instantiating it
//! copies the whole tree into the component directory and renders the
//! top-level files with `tera`, except toolchain scaffolding which must be
//! copied byte for byte.

use std::fs;
use std::path::{Path, PathBuf};

use tera::{Context, Tera};
use walkdir::WalkDir;

use crate::error::GeneratorError;

/// Files copied verbatim, never rendered.
pub const VERBATIM_FILES: &[&str] = &[
    "Dockerfile",
    "go.mod",
    "go.sum",
    "tools.go",
    "bindings.wadge.go",
];

/// A resolved template set on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    /// Template set name, e.g. `processor_nats`.
    pub name: String,
    /// Directory holding the template files.
    pub dir: PathBuf,
}

impl TemplateSet {
    /// Resolves a template set by name under `templates_dir`.
    pub fn resolve(templates_dir: &Path, name: &str) -> Result<Self, GeneratorError> {
        let dir = templates_dir.join(name);
        if !dir.is_dir() {
            return Err(GeneratorError::TemplateSetNotFound(
                dir.display().to_string(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    /// Copies the template set into `dest` and renders it against `context`.
    pub fn instantiate(&self, dest: &Path, context: &Context) -> Result<(), GeneratorError> {
        copy_tree(&self.dir, dest)?;
        render_in_place(dest, context)
    }
}

/// Recursively copies `src` into `dest`, creating `dest` if needed.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<(), GeneratorError> {
    fs::create_dir_all(dest)?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| GeneratorError::CopyFailed {
                from: entry.path().display().to_string(),
                to: dest.display().to_string(),
                reason: e.to_string(),
            })?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| GeneratorError::CopyFailed {
                from: entry.path().display().to_string(),
                to: target.display().to_string(),
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Renders every top-level regular file of `dir` in place.
///
/// Subdirectories and `VERBATIM_FILES` are left untouched.
pub fn render_in_place(dir: &Path, context: &Context) -> Result<(), GeneratorError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if VERBATIM_FILES.contains(&file_name.as_str()) {
            continue;
        }

        let source = fs::read_to_string(&path)?;
        let rendered =
            Tera::one_off(&source, context, false).map_err(|e| GeneratorError::Render {
                file: file_name.clone(),
                source: e,
            })?;
        fs::write(&path, rendered)?;
    }

    Ok(())
}
