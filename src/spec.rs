// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package specification model.

[PackageSpec] is the fully resolved description of a package build:
metadata fields, the files to install, maintainer scripts, conffiles,
template variables, and suppressed policy checks. Instances are built via
[PackageSpecBuilder] and immutable afterwards; any lazily configured
values belong to the calling layer and must be resolved before
[PackageSpecBuilder::finish] runs.
*/

use {
    crate::{
        error::{AssemblerError, Result},
        package_version::PackageVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    serde::Serialize,
    std::{
        collections::{BTreeMap, BTreeSet},
        path::{Path, PathBuf},
        time::SystemTime,
    },
};

static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9.+-]+$").expect("package name pattern"));

static ARCHITECTURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("architecture pattern"));

/// Whether filesystem metadata describes an executable file.
#[cfg(unix)]
pub fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
pub fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// Represents an abstract location for binary data.
///
/// Data can be backed by the filesystem or in memory.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum FileData {
    Path(PathBuf),
    Memory(Vec<u8>),
}

impl FileData {
    /// Resolve the data for this instance.
    ///
    /// If backed by a file, the file will be read.
    pub fn resolve(&self) -> Result<Vec<u8>> {
        match self {
            Self::Path(p) => std::fs::read(p).map_err(|e| AssemblerError::FileRead {
                path: p.display().to_string(),
                source: e,
            }),
            Self::Memory(data) => Ok(data.clone()),
        }
    }

    /// The content size in bytes, without reading file-backed data.
    pub fn size(&self) -> Result<u64> {
        match self {
            Self::Path(p) => Ok(std::fs::metadata(p)
                .map_err(|e| AssemblerError::FileRead {
                    path: p.display().to_string(),
                    source: e,
                })?
                .len()),
            Self::Memory(data) => Ok(data.len() as u64),
        }
    }
}

impl From<&Path> for FileData {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for FileData {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<u8>> for FileData {
    fn from(data: Vec<u8>) -> Self {
        Self::Memory(data)
    }
}

impl From<&[u8]> for FileData {
    fn from(data: &[u8]) -> Self {
        Self::Memory(data.into())
    }
}

impl From<&str> for FileData {
    fn from(data: &str) -> Self {
        Self::Memory(data.as_bytes().into())
    }
}

/// What a file entry places at its destination.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum FileSource {
    /// Regular file content.
    Content(FileData),
    /// A symbolic link to the given target.
    Symlink(String),
}

/// A file to install as part of the package.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileEntry {
    /// Destination path, absolute from the package root (`usr/bin/app`).
    pub destination: String,
    /// Permission bits for the installed file.
    pub mode: u32,
    /// Whether installer tooling should treat the file as user configuration.
    pub is_conffile: bool,
    /// Content or symlink target.
    pub source: FileSource,
}

/// The four maintainer script hook points.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum MaintainerScriptKind {
    Preinst,
    Postinst,
    Prerm,
    Postrm,
}

impl MaintainerScriptKind {
    /// The control tree member name for this script.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Preinst => "preinst",
            Self::Postinst => "postinst",
            Self::Prerm => "prerm",
            Self::Postrm => "postrm",
        }
    }
}

/// A maintainer script with the permission bits it will be staged with.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MaintainerScript {
    pub data: FileData,
    pub mode: u32,
}

/// The optional maintainer scripts of a package.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MaintainerScripts {
    pub preinst: Option<MaintainerScript>,
    pub postinst: Option<MaintainerScript>,
    pub prerm: Option<MaintainerScript>,
    pub postrm: Option<MaintainerScript>,
}

impl MaintainerScripts {
    /// Iterate over present scripts in control tree order.
    pub fn iter(&self) -> impl Iterator<Item = (MaintainerScriptKind, &MaintainerScript)> {
        [
            (MaintainerScriptKind::Preinst, &self.preinst),
            (MaintainerScriptKind::Postinst, &self.postinst),
            (MaintainerScriptKind::Prerm, &self.prerm),
            (MaintainerScriptKind::Postrm, &self.postrm),
        ]
        .into_iter()
        .filter_map(|(kind, script)| script.as_ref().map(|s| (kind, s)))
    }

    fn slot(&mut self, kind: MaintainerScriptKind) -> &mut Option<MaintainerScript> {
        match kind {
            MaintainerScriptKind::Preinst => &mut self.preinst,
            MaintainerScriptKind::Postinst => &mut self.postinst,
            MaintainerScriptKind::Prerm => &mut self.prerm,
            MaintainerScriptKind::Postrm => &mut self.postrm,
        }
    }
}

/// Timestamp policy for archive members.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum Timestamps {
    /// All entries are stamped with the fixed epoch `0` so repeated builds
    /// from identical inputs are byte identical.
    #[default]
    Epoch,
    /// Entries are stamped with the build wall-clock time.
    Real,
}

impl Timestamps {
    /// The mtime value to stamp on archive members.
    pub fn mtime(&self) -> u64 {
        match self {
            Self::Epoch => 0,
            Self::Real => SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// A fully resolved, immutable package description.
#[derive(Clone, Debug, Serialize)]
pub struct PackageSpec {
    name: String,
    version: String,
    architecture: String,
    maintainer: String,
    description: String,
    section: Option<String>,
    priority: Option<String>,
    homepage: Option<String>,
    depends: Option<String>,
    pre_depends: Option<String>,
    recommends: Option<String>,
    suggests: Option<String>,
    files: Vec<FileEntry>,
    maintainer_scripts: MaintainerScripts,
    conffiles: Vec<String>,
    variables: BTreeMap<String, String>,
    control_template: Option<FileData>,
    suppressed_checks: BTreeSet<String>,
    timestamps: Timestamps,
}

impl PackageSpec {
    /// Start building a spec from the three mandatory identity fields.
    pub fn builder(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
    ) -> PackageSpecBuilder {
        PackageSpecBuilder::new(name, version, architecture)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn maintainer(&self) -> &str {
        &self.maintainer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }

    pub fn homepage(&self) -> Option<&str> {
        self.homepage.as_deref()
    }

    pub fn depends(&self) -> Option<&str> {
        self.depends.as_deref()
    }

    pub fn pre_depends(&self) -> Option<&str> {
        self.pre_depends.as_deref()
    }

    pub fn recommends(&self) -> Option<&str> {
        self.recommends.as_deref()
    }

    pub fn suggests(&self) -> Option<&str> {
        self.suggests.as_deref()
    }

    /// Files to install, in the order they were declared.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn maintainer_scripts(&self) -> &MaintainerScripts {
        &self.maintainer_scripts
    }

    /// Explicitly declared conffile paths.
    pub fn conffiles(&self) -> &[String] {
        &self.conffiles
    }

    /// User supplied template variables.
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// The control file template, if one was supplied.
    pub fn control_template(&self) -> Option<&FileData> {
        self.control_template.as_ref()
    }

    /// Identifiers of policy checks whose findings should not fail the build.
    pub fn suppressed_checks(&self) -> &BTreeSet<String> {
        &self.suppressed_checks
    }

    pub fn timestamps(&self) -> Timestamps {
        self.timestamps
    }

    /// The conventional artifact file name, `{name}_{version}_{arch}.deb`.
    pub fn package_filename(&self) -> String {
        format!("{}_{}_{}.deb", self.name, self.version, self.architecture)
    }

    /// Total content size of installed files, in KiB rounded up.
    ///
    /// This is the value of the `Installed-Size` control field. Symlinks
    /// contribute no content.
    pub fn installed_size_kib(&self) -> Result<u64> {
        let mut total = 0u64;

        for entry in &self.files {
            if let FileSource::Content(data) = &entry.source {
                total += data.size()?;
            }
        }

        Ok((total + 1023) / 1024)
    }
}

/// Builder for [PackageSpec].
///
/// This is the boundary where any lazily configured values from the
/// calling build system must be resolved; [Self::finish] validates the
/// identity fields and produces the immutable spec.
#[derive(Clone, Debug)]
pub struct PackageSpecBuilder {
    spec: PackageSpec,
}

impl PackageSpecBuilder {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            spec: PackageSpec {
                name: name.into(),
                version: version.into(),
                architecture: architecture.into(),
                maintainer: String::new(),
                description: String::new(),
                section: None,
                priority: None,
                homepage: None,
                depends: None,
                pre_depends: None,
                recommends: None,
                suggests: None,
                files: vec![],
                maintainer_scripts: MaintainerScripts::default(),
                conffiles: vec![],
                variables: BTreeMap::new(),
                control_template: None,
                suppressed_checks: BTreeSet::new(),
                timestamps: Timestamps::default(),
            },
        }
    }

    pub fn maintainer(mut self, value: impl Into<String>) -> Self {
        self.spec.maintainer = value.into();
        self
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.spec.description = value.into();
        self
    }

    pub fn section(mut self, value: impl Into<String>) -> Self {
        self.spec.section = Some(value.into());
        self
    }

    pub fn priority(mut self, value: impl Into<String>) -> Self {
        self.spec.priority = Some(value.into());
        self
    }

    pub fn homepage(mut self, value: impl Into<String>) -> Self {
        self.spec.homepage = Some(value.into());
        self
    }

    pub fn depends(mut self, value: impl Into<String>) -> Self {
        self.spec.depends = Some(value.into());
        self
    }

    pub fn pre_depends(mut self, value: impl Into<String>) -> Self {
        self.spec.pre_depends = Some(value.into());
        self
    }

    pub fn recommends(mut self, value: impl Into<String>) -> Self {
        self.spec.recommends = Some(value.into());
        self
    }

    pub fn suggests(mut self, value: impl Into<String>) -> Self {
        self.spec.suggests = Some(value.into());
        self
    }

    /// Register a regular file to install.
    pub fn install_file(
        mut self,
        destination: impl Into<String>,
        data: impl Into<FileData>,
        mode: u32,
    ) -> Self {
        self.spec.files.push(FileEntry {
            destination: destination.into(),
            mode,
            is_conffile: false,
            source: FileSource::Content(data.into()),
        });
        self
    }

    /// Register a pre-constructed file entry.
    pub fn install_entry(mut self, entry: FileEntry) -> Self {
        self.spec.files.push(entry);
        self
    }

    /// Register a symlink to install.
    pub fn install_symlink(
        mut self,
        destination: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.spec.files.push(FileEntry {
            destination: destination.into(),
            mode: 0o777,
            is_conffile: false,
            source: FileSource::Symlink(target.into()),
        });
        self
    }

    /// Set a maintainer script from in-memory data with an explicit mode.
    pub fn maintainer_script(
        mut self,
        kind: MaintainerScriptKind,
        data: impl Into<FileData>,
        mode: u32,
    ) -> Self {
        *self.spec.maintainer_scripts.slot(kind) = Some(MaintainerScript {
            data: data.into(),
            mode,
        });
        self
    }

    /// Set a maintainer script from a filesystem path.
    ///
    /// The staged mode is taken from the file's permission bits, so a
    /// source script without the executable bit surfaces as a policy
    /// violation later.
    pub fn maintainer_script_path(
        mut self,
        kind: MaintainerScriptKind,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| AssemblerError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        let mode = if is_executable(&metadata) { 0o755 } else { 0o644 };

        *self.spec.maintainer_scripts.slot(kind) = Some(MaintainerScript {
            data: FileData::from(path),
            mode,
        });

        Ok(self)
    }

    /// Declare a conffile by destination path.
    pub fn conffile(mut self, path: impl Into<String>) -> Self {
        self.spec.conffiles.push(path.into());
        self
    }

    /// Define a template variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.variables.insert(name.into(), value.into());
        self
    }

    /// Use a control file template instead of metadata-derived fields.
    pub fn control_template(mut self, template: impl Into<FileData>) -> Self {
        self.spec.control_template = Some(template.into());
        self
    }

    /// Suppress a policy check by identifier.
    pub fn suppress_check(mut self, check_id: impl Into<String>) -> Self {
        self.spec.suppressed_checks.insert(check_id.into());
        self
    }

    pub fn timestamps(mut self, timestamps: Timestamps) -> Self {
        self.spec.timestamps = timestamps;
        self
    }

    /// Validate the identity fields and produce the immutable spec.
    pub fn finish(self) -> Result<PackageSpec> {
        let spec = self.spec;

        if !PACKAGE_NAME_RE.is_match(&spec.name) {
            return Err(AssemblerError::PackageNameInvalid(spec.name));
        }

        PackageVersion::parse(&spec.version)?;

        if !ARCHITECTURE_RE.is_match(&spec.architecture) {
            return Err(AssemblerError::ArchitectureInvalid(spec.architecture));
        }

        Ok(spec)
    }
}
