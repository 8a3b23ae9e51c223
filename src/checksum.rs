// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Content digests for installed files.

Debian packages index their installed files with MD5 digests in the
`md5sums` control member. File-backed content is streamed in fixed-size
reads so arbitrarily large inputs never have to fit in memory.
*/

use {
    crate::{
        error::{AssemblerError, Result},
        spec::FileData,
        stage::StagedTree,
    },
    digest::Digest,
    md5::Md5,
    serde::Serialize,
    std::io::Read,
};

/// A digest record for one regular file in the data tree.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChecksumRecord {
    /// Path relative to the package root.
    pub path: String,
    /// Lowercase hex MD5 of the file content.
    pub digest: String,
}

/// Compute the hex MD5 digest of a content source.
pub fn digest_hex(data: &FileData) -> Result<String> {
    match data {
        FileData::Memory(bytes) => Ok(hex::encode(Md5::digest(bytes))),
        FileData::Path(path) => {
            let mut file =
                std::fs::File::open(path).map_err(|e| AssemblerError::FileRead {
                    path: path.display().to_string(),
                    source: e,
                })?;

            let mut context = Md5::new();
            let mut buffer = [0u8; 32768];

            loop {
                let read = file
                    .read(&mut buffer)
                    .map_err(|e| AssemblerError::FileRead {
                        path: path.display().to_string(),
                        source: e,
                    })?;
                if read == 0 {
                    break;
                }

                context.update(&buffer[0..read]);
            }

            Ok(hex::encode(context.finalize()))
        }
    }
}

/// Compute checksum records for every regular file in a data tree.
///
/// Directories and symlinks carry no content and are skipped. The
/// records inherit the tree's path-sorted order.
pub fn compute_checksums(tree: &StagedTree) -> Result<Vec<ChecksumRecord>> {
    tree.iter_files()
        .map(|(path, data, _)| {
            Ok(ChecksumRecord {
                path: path.to_string(),
                digest: digest_hex(data)?,
            })
        })
        .collect()
}

/// Serialize checksum records as the `md5sums` control member.
pub fn write_md5sums(records: &[ChecksumRecord]) -> String {
    let mut out = String::new();

    for record in records {
        out.push_str(&record.digest);
        out.push_str("  ");
        out.push_str(&record.path);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{spec::PackageSpec, stage::stage_data_tree},
        std::io::Write,
    };

    const MD5_EMPTY: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const MD5_DATA: &str = "8d777f385d3dfec8815d20f7496026dc";

    #[test]
    fn digest_memory_content() -> Result<()> {
        assert_eq!(digest_hex(&FileData::from(&b""[..]))?, MD5_EMPTY);
        assert_eq!(digest_hex(&FileData::from(&b"data"[..]))?, MD5_DATA);

        Ok(())
    }

    #[test]
    fn digest_streams_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("payload.bin");

        // Larger than one read buffer so the loop iterates.
        let content = vec![0x42u8; 100_000];
        let mut file = std::fs::File::create(&path)?;
        file.write_all(&content)?;
        drop(file);

        assert_eq!(
            digest_hex(&FileData::from(path.as_path()))?,
            digest_hex(&FileData::from(content))?
        );

        Ok(())
    }

    #[test]
    fn digest_missing_file_is_file_read_error() {
        let res = digest_hex(&FileData::Path("/nonexistent/for/sure".into()));
        assert!(matches!(res, Err(AssemblerError::FileRead { .. })));
    }

    #[test]
    fn records_cover_exactly_the_regular_files() -> Result<()> {
        let spec = PackageSpec::builder("sample", "1.0.0", "all")
            .maintainer("someone")
            .description("sample")
            .install_file("usr/bin/b", "data", 0o755)
            .install_file("usr/bin/a", &b""[..], 0o644)
            .install_symlink("usr/bin/c", "b")
            .finish()
            .unwrap();

        let tree = stage_data_tree(&spec)?;
        let records = compute_checksums(&tree)?;

        assert_eq!(
            records,
            vec![
                ChecksumRecord {
                    path: "usr/bin/a".to_string(),
                    digest: MD5_EMPTY.to_string(),
                },
                ChecksumRecord {
                    path: "usr/bin/b".to_string(),
                    digest: MD5_DATA.to_string(),
                },
            ]
        );

        assert_eq!(
            write_md5sums(&records),
            format!(
                "{}  usr/bin/a\n{}  usr/bin/b\n",
                MD5_EMPTY, MD5_DATA
            )
        );

        Ok(())
    }
}
