// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Archive staging.

Builds the two payload trees of a binary package. The data tree holds
the installed files at their destination paths with synthesized parent
directories; the control tree holds the fixed set of metadata members.
Entries are kept in a deterministic order (sorted by path for the data
tree, the fixed member order for the control tree) so repeated builds
from identical inputs serialize identically.
*/

use {
    crate::{
        error::{AssemblerError, Result},
        spec::{FileData, FileSource, PackageSpec},
    },
    serde::Serialize,
    std::collections::{BTreeMap, BTreeSet},
};

/// What a staged entry materializes as inside the archive.
#[derive(Clone, Debug, Serialize)]
pub enum StagedKind {
    Directory,
    File(FileData),
    Symlink(String),
}

/// A single archive entry. Ownership is always root:root.
#[derive(Clone, Debug, Serialize)]
pub struct StagedEntry {
    /// Path relative to the tree root, normalized, no leading slash.
    pub path: String,
    /// Permission bits.
    pub mode: u32,
    pub kind: StagedKind,
}

/// An ordered sequence of archive entries.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StagedTree {
    entries: Vec<StagedEntry>,
}

impl StagedTree {
    pub fn entries(&self) -> &[StagedEntry] {
        &self.entries
    }

    /// Obtain the entry at a given path.
    pub fn get(&self, path: &str) -> Option<&StagedEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Iterate over regular file entries only.
    pub fn iter_files(&self) -> impl Iterator<Item = (&str, &FileData, u32)> {
        self.entries.iter().filter_map(|e| match &e.kind {
            StagedKind::File(data) => Some((e.path.as_str(), data, e.mode)),
            _ => None,
        })
    }
}

/// Normalize a destination path to be relative to the package root.
///
/// Leading slashes are stripped and `.`/empty segments are dropped. A path
/// that is empty after normalization or tries to escape the root via `..`
/// is rejected.
pub fn normalize_destination(destination: &str) -> Result<String> {
    let mut parts = Vec::new();

    for component in destination.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                return Err(AssemblerError::InvalidDestinationPath(
                    destination.to_string(),
                ))
            }
            component => parts.push(component),
        }
    }

    if parts.is_empty() {
        return Err(AssemblerError::InvalidDestinationPath(
            destination.to_string(),
        ));
    }

    Ok(parts.join("/"))
}

/// The normalized set of conffile paths for a spec.
///
/// This is the union of the explicit conffiles list and file entries
/// flagged as conffiles.
pub fn normalized_conffiles(spec: &PackageSpec) -> Result<BTreeSet<String>> {
    let mut paths = BTreeSet::new();

    for path in spec.conffiles() {
        paths.insert(normalize_destination(path)?);
    }

    for entry in spec.files() {
        if entry.is_conffile {
            paths.insert(normalize_destination(&entry.destination)?);
        }
    }

    Ok(paths)
}

/// Build the data tree for a spec.
///
/// Destinations are normalized and deduplicated (a collision is fatal,
/// never a silent overwrite), parent directories are synthesized with
/// mode `0755` and emitted before their children, and every declared
/// conffile must resolve to a staged file.
pub fn stage_data_tree(spec: &PackageSpec) -> Result<StagedTree> {
    let mut files: BTreeMap<String, (u32, StagedKind)> = BTreeMap::new();

    for entry in spec.files() {
        let destination = normalize_destination(&entry.destination)?;

        let kind = match &entry.source {
            FileSource::Content(data) => StagedKind::File(data.clone()),
            FileSource::Symlink(target) => StagedKind::Symlink(target.clone()),
        };

        if files
            .insert(destination.clone(), (entry.mode, kind))
            .is_some()
        {
            return Err(AssemblerError::DuplicateDestination(destination));
        }
    }

    for conffile in normalized_conffiles(spec)? {
        if !files.contains_key(&conffile) {
            return Err(AssemblerError::UnknownConffile(format!("/{}", conffile)));
        }
    }

    let mut directories = BTreeSet::new();
    for path in files.keys() {
        let components = path.split('/').collect::<Vec<_>>();
        for depth in 1..components.len() {
            directories.insert(components[..depth].join("/"));
        }
    }

    for directory in &directories {
        if files.contains_key(directory) {
            return Err(AssemblerError::DuplicateDestination(directory.clone()));
        }
    }

    // A BTreeMap over full paths puts every directory before its children,
    // since a directory path is a strict prefix of theirs.
    let mut all: BTreeMap<String, StagedEntry> = BTreeMap::new();

    for directory in directories {
        all.insert(
            directory.clone(),
            StagedEntry {
                path: directory,
                mode: 0o755,
                kind: StagedKind::Directory,
            },
        );
    }

    for (path, (mode, kind)) in files {
        all.insert(
            path.clone(),
            StagedEntry { path, mode, kind },
        );
    }

    Ok(StagedTree {
        entries: all.into_values().collect(),
    })
}

/// Build the control tree for a spec.
///
/// Members appear in a fixed order: `control`, `md5sums`, `conffiles`
/// when any conffile is declared, then the present maintainer scripts.
pub fn stage_control_tree(
    spec: &PackageSpec,
    control_text: &str,
    md5sums_text: &str,
) -> Result<StagedTree> {
    let mut entries = vec![
        StagedEntry {
            path: "control".to_string(),
            mode: 0o644,
            kind: StagedKind::File(FileData::from(control_text)),
        },
        StagedEntry {
            path: "md5sums".to_string(),
            mode: 0o644,
            kind: StagedKind::File(FileData::from(md5sums_text)),
        },
    ];

    let conffiles = normalized_conffiles(spec)?;
    if !conffiles.is_empty() {
        let content = conffiles
            .iter()
            .map(|path| format!("/{}\n", path))
            .collect::<String>();

        entries.push(StagedEntry {
            path: "conffiles".to_string(),
            mode: 0o644,
            kind: StagedKind::File(FileData::from(content.into_bytes())),
        });
    }

    for (kind, script) in spec.maintainer_scripts().iter() {
        entries.push(StagedEntry {
            path: kind.file_name().to_string(),
            mode: script.mode,
            kind: StagedKind::File(script.data.clone()),
        });
    }

    Ok(StagedTree { entries })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::spec::{MaintainerScriptKind, PackageSpec},
    };

    fn builder() -> crate::spec::PackageSpecBuilder {
        PackageSpec::builder("sample", "1.0.0", "all")
            .maintainer("Build Robot <build@example.com>")
            .description("a sample package")
    }

    #[test]
    fn normalize_destination_handles_slashes() -> Result<()> {
        assert_eq!(normalize_destination("/usr/bin/app")?, "usr/bin/app");
        assert_eq!(normalize_destination("usr//bin/./app")?, "usr/bin/app");

        assert!(matches!(
            normalize_destination("usr/../../etc/passwd"),
            Err(AssemblerError::InvalidDestinationPath(_))
        ));
        assert!(matches!(
            normalize_destination("/"),
            Err(AssemblerError::InvalidDestinationPath(_))
        ));

        Ok(())
    }

    #[test]
    fn data_tree_orders_directories_before_children() -> Result<()> {
        let spec = builder()
            .install_file("usr/bin/app", "content", 0o755)
            .install_file("etc/sample/app.conf", "key=value\n", 0o644)
            .install_symlink("usr/bin/app-link", "app")
            .finish()?;

        let tree = stage_data_tree(&spec)?;
        let paths = tree
            .entries()
            .iter()
            .map(|e| e.path.as_str())
            .collect::<Vec<_>>();

        assert_eq!(
            paths,
            vec![
                "etc",
                "etc/sample",
                "etc/sample/app.conf",
                "usr",
                "usr/bin",
                "usr/bin/app",
                "usr/bin/app-link",
            ]
        );

        let dir = tree.get("usr/bin").unwrap();
        assert!(matches!(dir.kind, StagedKind::Directory));
        assert_eq!(dir.mode, 0o755);

        assert!(matches!(
            tree.get("usr/bin/app-link").unwrap().kind,
            StagedKind::Symlink(ref target) if target == "app"
        ));

        Ok(())
    }

    #[test]
    fn duplicate_destination_is_fatal() -> Result<()> {
        let spec = builder()
            .install_file("usr/bin/app", "one", 0o755)
            .install_file("/usr/bin/app", "two", 0o755)
            .finish()?;

        assert!(matches!(
            stage_data_tree(&spec),
            Err(AssemblerError::DuplicateDestination(path)) if path == "usr/bin/app"
        ));

        Ok(())
    }

    #[test]
    fn file_shadowing_a_directory_is_fatal() -> Result<()> {
        let spec = builder()
            .install_file("usr/bin", "not a directory", 0o644)
            .install_file("usr/bin/app", "content", 0o755)
            .finish()?;

        assert!(matches!(
            stage_data_tree(&spec),
            Err(AssemblerError::DuplicateDestination(path)) if path == "usr/bin"
        ));

        Ok(())
    }

    #[test]
    fn unknown_conffile_is_fatal() -> Result<()> {
        let spec = builder()
            .install_file("usr/bin/app", "content", 0o755)
            .conffile("/etc/sample/app.conf")
            .finish()?;

        assert!(matches!(
            stage_data_tree(&spec),
            Err(AssemblerError::UnknownConffile(path)) if path == "/etc/sample/app.conf"
        ));

        Ok(())
    }

    #[test]
    fn control_tree_member_order() -> Result<()> {
        let spec = builder()
            .install_file("etc/sample/app.conf", "key=value\n", 0o644)
            .conffile("/etc/sample/app.conf")
            .maintainer_script(MaintainerScriptKind::Postrm, "#!/bin/sh\n", 0o755)
            .maintainer_script(MaintainerScriptKind::Preinst, "#!/bin/sh\n", 0o755)
            .finish()?;

        let tree = stage_control_tree(&spec, "Package: sample\n", "")?;
        let paths = tree
            .entries()
            .iter()
            .map(|e| e.path.as_str())
            .collect::<Vec<_>>();

        assert_eq!(
            paths,
            vec!["control", "md5sums", "conffiles", "preinst", "postrm"]
        );

        let conffiles = tree.get("conffiles").unwrap();
        match &conffiles.kind {
            StagedKind::File(data) => {
                assert_eq!(data.resolve()?, b"/etc/sample/app.conf\n");
            }
            _ => panic!("conffiles member should be a file"),
        }

        Ok(())
    }

    #[test]
    fn conffile_flag_implies_membership() -> Result<()> {
        let spec = builder()
            .install_entry(crate::spec::FileEntry {
                destination: "etc/sample/app.conf".to_string(),
                mode: 0o644,
                is_conffile: true,
                source: crate::spec::FileSource::Content(FileData::from("key=value\n")),
            })
            .finish()?;

        // The flagged entry is always present, so staging succeeds and the
        // conffiles member lists it.
        stage_data_tree(&spec)?;
        let tree = stage_control_tree(&spec, "Package: sample\n", "")?;
        assert!(tree.get("conffiles").is_some());

        Ok(())
    }
}
