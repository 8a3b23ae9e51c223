// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Tar serialization of staged trees. */

use {
    crate::{
        error::{AssemblerError, Result},
        spec::FileData,
        stage::{StagedKind, StagedTree},
    },
    std::io::{Read, Write},
};

/// Largest content size representable in the 11-octal-digit size field.
const MAX_ENTRY_SIZE: u64 = 0o77_777_777_777;

/// Longest entry name accepted, matching PATH_MAX on the installed system.
const MAX_NAME_BYTES: usize = 4096;

fn new_tar_header(mtime: u64, mode: u32) -> Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime);
    header.set_mode(mode);

    Ok(header)
}

fn set_entry_name(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    path: &str,
    is_directory: bool,
) -> Result<()> {
    // Debian archives in the wild have filenames beginning with `./` and
    // directory names ending with `/`. `header.set_path()` normalizes the
    // `./` away for anything but the root directory, so the header name
    // field is written directly.

    // Only GNU headers are produced here.
    assert!(header.as_ustar().is_none());

    let value = format!("./{}{}", path, if is_directory { "/" } else { "" });
    let value_bytes = value.as_bytes();

    if value_bytes.len() > MAX_NAME_BYTES {
        return Err(AssemblerError::PathTooLong(path.to_string()));
    }

    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        // Names wider than the header field require a GNU long-name entry
        // holding the full name, followed by the truncated header.
        let mut long_header = tar::Header::new_gnu();
        let name = b"././@LongLink";
        long_header.as_gnu_mut().unwrap().name[..name.len()].clone_from_slice(&name[..]);
        long_header.set_mode(0o644);
        long_header.set_uid(0);
        long_header.set_gid(0);
        long_header.set_mtime(0);
        long_header.set_size(value_bytes.len() as u64 + 1);
        long_header.set_entry_type(tar::EntryType::new(b'L'));
        long_header.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&long_header, &mut data)?;

        let truncated_bytes = &value_bytes[0..name_buffer.len()];
        name_buffer[0..truncated_bytes.len()].copy_from_slice(truncated_bytes);
    }

    Ok(())
}

/// Write a staged tree as an uncompressed tar stream.
///
/// Entries are emitted in the tree's order behind a leading `./` root
/// directory entry. All entries carry root:root ownership and the given
/// modification time.
pub fn write_tree<W: Write>(writer: W, tree: &StagedTree, mtime: u64) -> Result<W> {
    let mut builder = tar::Builder::new(writer);

    let mut header = new_tar_header(mtime, 0o755)?;
    header.set_path("./")?;
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_cksum();
    builder.append(&header, std::io::empty())?;

    for entry in tree.entries() {
        let mut header = new_tar_header(mtime, entry.mode)?;

        match &entry.kind {
            StagedKind::Directory => {
                set_entry_name(&mut builder, &mut header, &entry.path, true)?;
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_cksum();
                builder.append(&header, std::io::empty())?;
            }
            StagedKind::File(data) => {
                let size = data.size()?;
                if size > MAX_ENTRY_SIZE {
                    return Err(AssemblerError::EntryTooLarge {
                        path: entry.path.clone(),
                        size,
                    });
                }

                set_entry_name(&mut builder, &mut header, &entry.path, false)?;
                header.set_size(size);
                header.set_cksum();

                match data {
                    FileData::Memory(bytes) => builder.append(&header, &bytes[..])?,
                    FileData::Path(path) => {
                        let file = std::fs::File::open(path).map_err(|e| {
                            AssemblerError::FileRead {
                                path: path.display().to_string(),
                                source: e,
                            }
                        })?;
                        builder.append(&header, file)?;
                    }
                }
            }
            StagedKind::Symlink(target) => {
                set_entry_name(&mut builder, &mut header, &entry.path, false)?;
                header.set_entry_type(tar::EntryType::Symlink);
                header
                    .set_link_name(target)
                    .map_err(|_| AssemblerError::PathTooLong(target.clone()))?;
                header.set_size(0);
                header.set_cksum();
                builder.append(&header, std::io::empty())?;
            }
        }
    }

    Ok(builder.into_inner()?)
}

/// Write a staged tree as a gzip-compressed tar stream.
pub fn write_tree_gz(tree: &StagedTree, mtime: u64) -> Result<Vec<u8>> {
    let encoder = libflate::gzip::Encoder::new(Vec::new())?;
    let encoder = write_tree(encoder, tree, mtime)?;

    Ok(encoder.finish().into_result()?)
}
