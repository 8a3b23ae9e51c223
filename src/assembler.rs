// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package assembly orchestration.

[Assembler] sequences the build pipeline over a [PackageSpec]: render
the control file, stage the trees, checksum the data tree, serialize the
compressed tar members, write the outer archive, validate, optionally
publish. The pipeline is a linear state machine; the first fatal error
short-circuits to [AssemblyState::Failed] and removes anything written
at the output path.
*/

use {
    crate::{
        checksum,
        deb::{
            ar::{write_deb_file, OutputGuard},
            tar::write_tree_gz,
        },
        error::Result,
        policy::{self, Violation},
        publish,
        spec::PackageSpec,
        stage, template,
    },
    serde::Serialize,
    std::path::{Path, PathBuf},
};

/// Where the pipeline currently stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum AssemblyState {
    Init,
    Rendered,
    Staged,
    Checksummed,
    Compressed,
    Written,
    Validated,
    Published,
    Done,
    Failed,
}

/// Outcome of the optional publish step, distinct from build success.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum PublishOutcome {
    /// No upload destination was configured.
    NotRequested,
    /// The artifact was uploaded to the destination.
    Published(String),
    /// Upload failed; the local artifact remains valid.
    Failed(String),
}

/// The result of a successful assembly.
#[derive(Clone, Debug, Serialize)]
pub struct AssemblyReport {
    /// Path of the written `.deb` file.
    pub artifact: PathBuf,
    /// Warning and suppressed policy findings.
    pub violations: Vec<Violation>,
    pub publish: PublishOutcome,
}

/// Builds a `.deb` file from a [PackageSpec].
#[derive(Debug)]
pub struct Assembler {
    spec: PackageSpec,
    output_path: PathBuf,
    destination: Option<String>,
    state: AssemblyState,
}

impl Assembler {
    pub fn new(spec: PackageSpec, output_path: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            output_path: output_path.into(),
            destination: None,
            state: AssemblyState::Init,
        }
    }

    /// Also upload the finished artifact to a destination URI.
    pub fn publish_to(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn enter(&mut self, state: AssemblyState) {
        log::debug!("assembly state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run the pipeline to completion.
    ///
    /// On error, nothing is left at the output path. A publish failure is
    /// not an error; it is reported in the returned
    /// [AssemblyReport::publish] outcome.
    pub fn run(&mut self) -> Result<AssemblyReport> {
        self.state = AssemblyState::Init;

        match self.execute() {
            Ok(report) => Ok(report),
            Err(e) => {
                self.enter(AssemblyState::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<AssemblyReport> {
        // Reject a bad upload destination before any work happens.
        if let Some(destination) = &self.destination {
            publish::validate_destination(destination)?;
        }

        let control_text = template::render_control(&self.spec)?;
        self.enter(AssemblyState::Rendered);

        let data_tree = stage::stage_data_tree(&self.spec)?;
        self.enter(AssemblyState::Staged);

        let records = checksum::compute_checksums(&data_tree)?;
        let md5sums = checksum::write_md5sums(&records);
        self.enter(AssemblyState::Checksummed);

        let control_tree = stage::stage_control_tree(&self.spec, &control_text, &md5sums)?;

        let mtime = self.spec.timestamps().mtime();
        let control_tar_gz = write_tree_gz(&control_tree, mtime)?;
        let data_tar_gz = write_tree_gz(&data_tree, mtime)?;
        self.enter(AssemblyState::Compressed);

        let guard = OutputGuard::new(&self.output_path);
        write_deb_file(&self.output_path, &control_tar_gz, &data_tar_gz, mtime)?;
        self.enter(AssemblyState::Written);

        let report =
            policy::validate(&self.spec, &control_text, &control_tree, &data_tree)?;
        self.enter(AssemblyState::Validated);
        guard.disarm();

        log::info!(
            "assembled {} ({} file(s))",
            self.output_path.display(),
            records.len()
        );

        let publish = match self.destination.clone() {
            None => PublishOutcome::NotRequested,
            Some(destination) => match publish::publish(&self.output_path, &destination) {
                Ok(()) => {
                    self.enter(AssemblyState::Published);
                    PublishOutcome::Published(destination)
                }
                Err(e) => {
                    log::warn!("publish failed: {}", e);
                    PublishOutcome::Failed(e.to_string())
                }
            },
        };

        if self.state != AssemblyState::Published {
            self.enter(AssemblyState::Done);
        }

        Ok(AssemblyReport {
            artifact: self.output_path.clone(),
            violations: report.violations,
            publish,
        })
    }
}
