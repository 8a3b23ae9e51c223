// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian binary package assembly.

This crate builds `.deb` files from a declarative description of package
metadata, control scripts, and a tree of files to install. It is a
library for build tooling: the caller resolves all inputs up front into
an immutable [spec::PackageSpec] and the crate turns it into a valid,
installable artifact.

# Goals

## Determinism and Reproducibility

Given identical inputs, assembly produces byte-for-byte identical
output. Archive entries are emitted in sorted order, ownership is fixed
to root:root, and timestamps are pinned to a fixed epoch unless real
timestamps are explicitly requested.

## Structural Validation

A small catalog of lintian-style checks ([policy]) runs against every
staged package. Error findings fail the build unless their check id is
suppressed in the spec; all findings are reported to the caller as
structured data either way.

# A Tour of Functionality

[spec::PackageSpec] describes a package build and is created through
[spec::PackageSpecBuilder]. [assembler::Assembler] runs the pipeline:
[template] renders the control file, [stage] lays out the control and
data trees, [checksum] produces the `md5sums` records, [deb::tar]
serializes the gzip-compressed tar members, and [deb::ar] writes the
outer `ar` container. [assembler::AssemblyReport] carries the policy
findings and the outcome of the optional [publish] step.

[control] provides the control file primitives (fields, paragraphs,
parsing and serialization) and [package_version] validates Debian
version strings.

# Crate Features

The optional and enabled-by-default `http` feature enables uploading
finished artifacts to `http(s)://` destinations.
*/

pub mod assembler;
pub mod checksum;
pub mod control;
pub mod deb;
pub mod error;
pub mod package_version;
pub mod policy;
pub mod publish;
pub mod spec;
pub mod stage;
pub mod template;

pub use {
    assembler::{Assembler, AssemblyReport, AssemblyState, PublishOutcome},
    error::{AssemblerError, Result},
    policy::{CheckId, Severity, ValidationReport, Violation},
    spec::{
        FileData, FileEntry, FileSource, MaintainerScript, MaintainerScriptKind, PackageSpec,
        PackageSpecBuilder, Timestamps,
    },
};
