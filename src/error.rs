// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    crate::{package_version::VersionError, policy::Violation},
    thiserror::Error,
};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("version string error: {0}")]
    Version(#[from] VersionError),

    #[error("failed to read {path}: {source:?}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write output file {path}: {source:?}")]
    OutputIo {
        path: String,
        source: std::io::Error,
    },

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("control file template is not valid UTF-8")]
    TemplateNotUtf8,

    #[error("control file field missing or empty after rendering: {0}")]
    IncompleteControlFile(&'static str),

    #[error("control file template references undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("variable conflicts with a reserved computed variable: {0}")]
    ReservedVariableConflict(String),

    #[error("package name does not satisfy Debian naming rules: {0}")]
    PackageNameInvalid(String),

    #[error("architecture does not satisfy Debian naming rules: {0}")]
    ArchitectureInvalid(String),

    #[error("multiple file entries map to destination: {0}")]
    DuplicateDestination(String),

    #[error("destination path escapes the package root or is empty: {0}")]
    InvalidDestinationPath(String),

    #[error("conffile does not match any file entry: {0}")]
    UnknownConffile(String),

    #[error("entry {path} is too large for the archive format ({size} bytes)")]
    EntryTooLarge { path: String, size: u64 },

    #[error("entry path exceeds the archive format limits: {0}")]
    PathTooLong(String),

    #[error(
        "{} unsuppressed policy violation(s): {}",
        .0.len(),
        format_violations(.0)
    )]
    PolicyViolation(Vec<Violation>),

    #[error("publish to {destination} failed: {message}")]
    Publish {
        destination: String,
        message: String,
    },

    #[error("unsupported upload scheme: {0}")]
    UnsupportedUploadScheme(String),
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, AssemblerError>;
