//! Untyped parsing of manifest files with `import_from` support.
//!
//! Manifests are authored as YAML or JSON. Any dictionary may carry an
//! `import_from: <path>` key whose target file is parsed recursively and
//! merged underneath the enclosing map: keys already present win over
//! imported keys, and `import_from` itself is removed after the merge.
//! Import paths are resolved relative to the file that declares them.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ManifestError;

const IMPORT_KEY: &str = "import_from";

/// Parse a YAML or JSON manifest file into an untyped value, expanding
/// every `import_from` key it contains.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Value, ManifestError> {
    let mut chain = Vec::new();
    parse_file_inner(path.as_ref(), &mut chain)
}

fn parse_file_inner(path: &Path, chain: &mut Vec<PathBuf>) -> Result<Value, ManifestError> {
    let path = absolute(path)?;
    if chain.contains(&path) {
        return Err(ManifestError::ImportCycle { path });
    }

    let raw = fs_err::read_to_string(&path).map_err(|err| ManifestError::io(&path, err))?;
    let mut value = parse_str(&raw, &path)?;

    let folder = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    chain.push(path);
    let result = expand_imports(&mut value, &folder, chain);
    chain.pop();
    result?;

    Ok(value)
}

/// Parse a string as JSON or YAML, selected by the file extension.
fn parse_str(raw: &str, path: &Path) -> Result<Value, ManifestError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => serde_json::from_str(raw).map_err(|err| ManifestError::ParseFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(raw).map_err(|err| ManifestError::ParseFile {
                path: path.to_path_buf(),
                message: err.to_string(),
            })
        }
        _ => Err(ManifestError::UnsupportedExtension {
            path: path.to_path_buf(),
        }),
    }
}

fn expand_imports(
    value: &mut Value,
    folder: &Path,
    chain: &mut Vec<PathBuf>,
) -> Result<(), ManifestError> {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if key != IMPORT_KEY {
                    expand_imports(nested, folder, chain)?;
                }
            }

            let Some(Value::String(target)) = map.get(IMPORT_KEY) else {
                return Ok(());
            };
            let mut target_path = PathBuf::from(target);
            if target_path.is_relative() {
                target_path = folder.join(target_path);
            }

            let imported = parse_file_inner(&target_path, chain)?;
            map.remove(IMPORT_KEY);
            if let Value::Object(imported) = imported {
                // Keys already present in the enclosing map take precedence.
                for (key, nested) in imported {
                    map.entry(key).or_insert(nested);
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                expand_imports(item, folder, chain)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ManifestError> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(|err| ManifestError::io(path, err))?;
    Ok(normalize(&cwd.join(path)))
}

/// Lexically remove `.` and `..` components so cycle detection compares
/// like with like without requiring the file to resolve symlinks.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
