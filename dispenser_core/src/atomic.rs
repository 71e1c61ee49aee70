use std::{ffi::OsString, fs, io::Write, path::Path, path::PathBuf};

/// Sibling temp path: the target's file name with `.tmp` appended.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("state"), OsString::from);
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `bytes` so readers see either the old or the new file.
///
/// Writes `<name>.tmp` next to the target, fsyncs it, then renames over the
/// target. Parent directories are created as needed; the temp file is removed
/// on failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = temp_path(path);
    let res = (|| {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_name_never_equals_the_target() {
        for p in ["state.json", "state.new", "state.tmp", "/var/lib/d/state"] {
            let p = Path::new(p);
            assert_ne!(temp_path(p), p);
            assert_eq!(temp_path(p).parent(), p.parent());
        }
    }
}
