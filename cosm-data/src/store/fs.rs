//! Capability-based directory creation for database files.

use std::io;
use std::path::Component;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};

/// Ensure the parent directory of `path` exists.
pub(crate) fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() {
        return Ok(());
    }
    let (base, relative) = split_root(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?.create_dir_all(&relative)
}

// cap-std refuses absolute paths, so open the root and create relative to it.
fn split_root(parent: &Utf8Path) -> io::Result<(Utf8PathBuf, Utf8PathBuf)> {
    match parent.as_std_path().components().next() {
        Some(Component::RootDir | Component::Prefix(_)) => {
            let mut components = parent.components();
            let mut base = Utf8PathBuf::new();
            for component in components.by_ref() {
                base.push(component);
                if matches!(component, camino::Utf8Component::RootDir) {
                    break;
                }
            }
            Ok((base, components.as_path().to_path_buf()))
        }
        _ => Ok((Utf8PathBuf::from("."), parent.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn creates_nested_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        let target = root.join("a/b/replica.db");
        ensure_parent_dir(&target).expect("parent created");
        assert!(root.join("a/b").is_dir());
    }

    #[rstest]
    fn bare_file_names_need_no_directory() {
        ensure_parent_dir(Utf8Path::new("replica.db")).expect("nothing to create");
    }
}
