// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The outer `ar` container of a `.deb` file. */

use {
    crate::error::{AssemblerError, Result},
    std::{
        io::{BufWriter, Write},
        path::{Path, PathBuf},
    },
};

/// Content of the `debian-binary` member: the binary package format version.
pub const DEBIAN_BINARY: &[u8] = b"2.0\n";

/// Largest member size representable in the 10-decimal-digit size field.
const MAX_MEMBER_SIZE: u64 = 9_999_999_999;

fn append_member<W: Write>(
    builder: &mut ar::Builder<W>,
    name: &[u8],
    data: &[u8],
    mtime: u64,
) -> Result<()> {
    if data.len() as u64 > MAX_MEMBER_SIZE {
        return Err(AssemblerError::EntryTooLarge {
            path: String::from_utf8_lossy(name).into_owned(),
            size: data.len() as u64,
        });
    }

    let mut header = ar::Header::new(name.to_vec(), data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    builder.append(&header, data)?;

    Ok(())
}

/// Write a complete `.deb` archive to a writer.
///
/// The three members appear in the fixed order required by package
/// tooling: `debian-binary`, `control.tar.gz`, `data.tar.gz`.
pub fn write_deb<W: Write>(
    writer: W,
    control_tar_gz: &[u8],
    data_tar_gz: &[u8],
    mtime: u64,
) -> Result<()> {
    let mut builder = ar::Builder::new(writer);

    append_member(&mut builder, b"debian-binary", DEBIAN_BINARY, mtime)?;
    append_member(&mut builder, b"control.tar.gz", control_tar_gz, mtime)?;
    append_member(&mut builder, b"data.tar.gz", data_tar_gz, mtime)?;

    Ok(())
}

/// Write a complete `.deb` archive to a file path.
///
/// I/O failures are enriched with the output path. Removal of a partial
/// file on failure is the caller's responsibility via [OutputGuard],
/// which also covers failures occurring after the write (such as policy
/// validation).
pub fn write_deb_file(
    path: &Path,
    control_tar_gz: &[u8],
    data_tar_gz: &[u8],
    mtime: u64,
) -> Result<()> {
    let enrich = |e: std::io::Error| AssemblerError::OutputIo {
        path: path.display().to_string(),
        source: e,
    };

    let file = std::fs::File::create(path).map_err(enrich)?;
    let mut writer = BufWriter::new(file);

    write_deb(&mut writer, control_tar_gz, data_tar_gz, mtime).map_err(|e| match e {
        AssemblerError::Io(source) => enrich(source),
        other => other,
    })?;

    writer.flush().map_err(enrich)?;

    Ok(())
}

/// Removes the output file on drop unless the write was committed.
///
/// Guards the window between output file creation and successful
/// validation so no partial or rejected artifact survives at the target
/// path, including on panic.
#[derive(Debug)]
pub struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Commit the output: the file is kept.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Cursor};

    #[test]
    fn members_in_fixed_order() -> Result<()> {
        let mut buffer = Vec::new();
        write_deb(&mut buffer, b"control payload", b"data payload", 0)?;

        let mut archive = ar::Archive::new(Cursor::new(buffer));

        let expected: [(&[u8], u64); 3] = [
            (b"debian-binary", 4),
            (b"control.tar.gz", 15),
            (b"data.tar.gz", 12),
        ];

        for (name, size) in expected {
            let entry = archive.next_entry().unwrap().unwrap();
            assert_eq!(entry.header().identifier(), name);
            assert_eq!(entry.header().size(), size);
            assert_eq!(entry.header().mtime(), 0);
            assert_eq!(entry.header().uid(), 0);
            assert_eq!(entry.header().mode(), 0o644);
        }

        assert!(archive.next_entry().is_none());

        Ok(())
    }

    #[test]
    fn debian_binary_content() -> Result<()> {
        let mut buffer = Vec::new();
        write_deb(&mut buffer, b"c", b"d", 0)?;

        let mut archive = ar::Archive::new(Cursor::new(buffer));
        let mut entry = archive.next_entry().unwrap().unwrap();
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut content)?;
        assert_eq!(content, b"2.0\n");

        Ok(())
    }

    #[test]
    fn guard_removes_file_unless_disarmed() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let kept = dir.path().join("kept.deb");
        let guard = OutputGuard::new(&kept);
        std::fs::write(&kept, b"artifact")?;
        guard.disarm();
        assert!(kept.exists());

        let removed = dir.path().join("removed.deb");
        {
            let _guard = OutputGuard::new(&removed);
            std::fs::write(&removed, b"partial")?;
        }
        assert!(!removed.exists());

        Ok(())
    }
}
