// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Structural policy checks.

A small, fixed catalog of lintian-style checks runs against the staged
trees and the rendered control file. Each check is one variant of
[CheckId] so adding or removing a check is a closed, reviewable change
rather than scattered conditionals.

A finding can be suppressed by its check identifier. Suppressed findings
are still reported; unsuppressed error-severity findings fail the build.
*/

use {
    crate::{
        control::{ControlFile, ControlParagraph},
        error::{AssemblerError, Result},
        spec::PackageSpec,
        stage::{self, StagedTree},
    },
    serde::Serialize,
    std::{fmt, str::FromStr},
    strum::{Display, EnumIter, EnumString, IntoEnumIterator},
};

/// Interpreters accepted without comment in maintainer script shebangs.
const KNOWN_INTERPRETERS: &[&str] = &[
    "/bin/sh",
    "/bin/bash",
    "/bin/dash",
    "/usr/bin/perl",
    "/usr/bin/python3",
    "/usr/bin/env",
];

/// How severe a violation is.
#[derive(Clone, Copy, Debug, Display, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Identifier of a policy check. One variant per catalog entry.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(into = "String")]
#[strum(serialize_all = "kebab-case")]
pub enum CheckId {
    MaintainerScriptNotExecutable,
    MaintainerScriptMissingInterpreter,
    UnknownScriptInterpreter,
    ConffileOutsideEtc,
    PythonDependencyWithoutPythonFiles,
    BinaryWithoutManpage,
    UnknownSuppressionTag,
}

impl From<CheckId> for String {
    fn from(check: CheckId) -> Self {
        check.to_string()
    }
}

impl CheckId {
    /// The severity of findings produced by this check.
    pub fn severity(&self) -> Severity {
        match self {
            Self::MaintainerScriptNotExecutable => Severity::Error,
            Self::MaintainerScriptMissingInterpreter => Severity::Error,
            Self::UnknownScriptInterpreter => Severity::Warning,
            Self::ConffileOutsideEtc => Severity::Error,
            Self::PythonDependencyWithoutPythonFiles => Severity::Warning,
            Self::BinaryWithoutManpage => Severity::Warning,
            Self::UnknownSuppressionTag => Severity::Warning,
        }
    }

    fn violation(&self, message: String, path: Option<String>) -> Violation {
        Violation {
            check: *self,
            severity: self.severity(),
            message,
            path,
            suppressed: false,
        }
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Violation>> {
        match self {
            Self::MaintainerScriptNotExecutable => ctx.script_modes(),
            Self::MaintainerScriptMissingInterpreter => ctx.script_shebangs_present(),
            Self::UnknownScriptInterpreter => ctx.script_interpreters_known(),
            Self::ConffileOutsideEtc => ctx.conffiles_under_etc(),
            Self::PythonDependencyWithoutPythonFiles => ctx.python_dependency(),
            Self::BinaryWithoutManpage => ctx.binaries_have_manpages(),
            Self::UnknownSuppressionTag => ctx.suppression_tags_known(),
        }
    }
}

/// A single policy finding.
#[derive(Clone, Debug, Serialize)]
pub struct Violation {
    pub check: CheckId,
    pub severity: Severity,
    pub message: String,
    pub path: Option<String>,
    /// Whether the spec's suppression set silenced this finding.
    pub suppressed: bool,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.check, self.severity, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " [{}]", path)?;
        }

        Ok(())
    }
}

/// The outcome of a validation run that did not fail the build.
///
/// Contains warning findings and suppressed findings; unsuppressed
/// error findings abort validation instead.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

struct CheckContext<'a> {
    spec: &'a PackageSpec,
    control: &'a ControlParagraph,
    control_tree: &'a StagedTree,
    data_tree: &'a StagedTree,
}

impl CheckContext<'_> {
    fn maintainer_scripts(&self) -> Vec<(&str, u32, &crate::spec::FileData)> {
        self.control_tree
            .iter_files()
            .filter(|(path, _, _)| {
                matches!(*path, "preinst" | "postinst" | "prerm" | "postrm")
            })
            .map(|(path, data, mode)| (path, mode, data))
            .collect()
    }

    fn script_modes(&self) -> Result<Vec<Violation>> {
        Ok(self
            .maintainer_scripts()
            .into_iter()
            .filter(|(_, mode, _)| *mode != 0o755)
            .map(|(path, mode, _)| {
                CheckId::MaintainerScriptNotExecutable.violation(
                    format!("maintainer script has mode {:04o}, expected 0755", mode),
                    Some(path.to_string()),
                )
            })
            .collect())
    }

    fn script_shebangs_present(&self) -> Result<Vec<Violation>> {
        let mut violations = vec![];

        for (path, _, data) in self.maintainer_scripts() {
            let content = data.resolve()?;
            if !content.starts_with(b"#!") {
                violations.push(CheckId::MaintainerScriptMissingInterpreter.violation(
                    "maintainer script does not start with #!".to_string(),
                    Some(path.to_string()),
                ));
            }
        }

        Ok(violations)
    }

    fn script_interpreters_known(&self) -> Result<Vec<Violation>> {
        let mut violations = vec![];

        for (path, _, data) in self.maintainer_scripts() {
            let content = data.resolve()?;
            let Some(rest) = content.strip_prefix(b"#!") else {
                // The missing-shebang check reports this one.
                continue;
            };

            let first_line = rest.split(|b| *b == b'\n').next().unwrap_or_default();
            let first_line = String::from_utf8_lossy(first_line);
            let interpreter = first_line.split_whitespace().next().unwrap_or("");

            if !KNOWN_INTERPRETERS.contains(&interpreter) {
                violations.push(CheckId::UnknownScriptInterpreter.violation(
                    format!("script interpreter {} is not a known interpreter", interpreter),
                    Some(path.to_string()),
                ));
            }
        }

        Ok(violations)
    }

    fn conffiles_under_etc(&self) -> Result<Vec<Violation>> {
        Ok(stage::normalized_conffiles(self.spec)?
            .into_iter()
            .filter(|path| path != "etc" && !path.starts_with("etc/"))
            .map(|path| {
                CheckId::ConffileOutsideEtc.violation(
                    "conffile is not below /etc".to_string(),
                    Some(format!("/{}", path)),
                )
            })
            .collect())
    }

    fn python_dependency(&self) -> Result<Vec<Violation>> {
        let depends = self.control.field_str("Depends").unwrap_or_default();

        let wants_python = depends
            .split(',')
            .any(|clause| clause.trim().starts_with("python"));
        if !wants_python {
            return Ok(vec![]);
        }

        let ships_python = self.data_tree.entries().iter().any(|entry| {
            entry.path.ends_with(".py") || entry.path.starts_with("usr/lib/python")
        });

        Ok(if ships_python {
            vec![]
        } else {
            vec![CheckId::PythonDependencyWithoutPythonFiles.violation(
                "package depends on python but installs no Python files".to_string(),
                None,
            )]
        })
    }

    fn binaries_have_manpages(&self) -> Result<Vec<Violation>> {
        let mut violations = vec![];

        for (path, _, mode) in self.data_tree.iter_files() {
            let in_bin_dir =
                path.starts_with("usr/bin/") || path.starts_with("usr/sbin/");
            if !in_bin_dir || mode & 0o111 == 0 {
                continue;
            }

            let name = path.rsplit('/').next().unwrap_or(path);
            let has_manpage = self.data_tree.entries().iter().any(|entry| {
                entry.path.starts_with("usr/share/man/")
                    && entry
                        .path
                        .rsplit('/')
                        .next()
                        .map(|file| file.starts_with(&format!("{}.", name)))
                        .unwrap_or(false)
            });

            if !has_manpage {
                violations.push(CheckId::BinaryWithoutManpage.violation(
                    format!("executable {} ships without a man page", name),
                    Some(path.to_string()),
                ));
            }
        }

        Ok(violations)
    }

    fn suppression_tags_known(&self) -> Result<Vec<Violation>> {
        Ok(self
            .spec
            .suppressed_checks()
            .iter()
            .filter(|tag| CheckId::from_str(tag).is_err())
            .map(|tag| {
                CheckId::UnknownSuppressionTag.violation(
                    format!("suppressing a check that does not exist: {}", tag),
                    None,
                )
            })
            .collect())
    }
}

/// Run the full check catalog against a staged package.
///
/// Returns the report of warning and suppressed findings, or
/// [AssemblerError::PolicyViolation] carrying every unsuppressed
/// error-severity finding.
pub fn validate(
    spec: &PackageSpec,
    control_text: &str,
    control_tree: &StagedTree,
    data_tree: &StagedTree,
) -> Result<ValidationReport> {
    let control = ControlFile::parse_str(control_text)?.into_binary_paragraph()?;

    let ctx = CheckContext {
        spec,
        control: &control,
        control_tree,
        data_tree,
    };

    let mut open_errors = vec![];
    let mut reported = vec![];

    for check in CheckId::iter() {
        for mut violation in check.run(&ctx)? {
            if spec.suppressed_checks().contains(&violation.check.to_string()) {
                violation.suppressed = true;
                reported.push(violation);
            } else if violation.severity == Severity::Error {
                open_errors.push(violation);
            } else {
                log::warn!("{}", violation);
                reported.push(violation);
            }
        }
    }

    if !open_errors.is_empty() {
        return Err(AssemblerError::PolicyViolation(open_errors));
    }

    Ok(ValidationReport {
        violations: reported,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            spec::{MaintainerScriptKind, PackageSpec, PackageSpecBuilder},
            stage::{stage_control_tree, stage_data_tree},
            template::render_control,
        },
    };

    fn builder() -> PackageSpecBuilder {
        PackageSpec::builder("sample", "1.0.0", "all")
            .maintainer("Build Robot <build@example.com>")
            .description("a sample package")
    }

    fn run_validation(spec: &PackageSpec) -> Result<ValidationReport> {
        let control_text = render_control(spec)?;
        let data_tree = stage_data_tree(spec)?;
        let control_tree = stage_control_tree(spec, &control_text, "")?;

        validate(spec, &control_text, &control_tree, &data_tree)
    }

    #[test]
    fn check_ids_round_trip_as_strings() {
        assert_eq!(
            CheckId::MaintainerScriptNotExecutable.to_string(),
            "maintainer-script-not-executable"
        );
        assert_eq!(
            CheckId::from_str("conffile-outside-etc").unwrap(),
            CheckId::ConffileOutsideEtc
        );
        assert!(CheckId::from_str("no-such-check").is_err());
    }

    #[test]
    fn non_executable_script_fails_the_build() -> Result<()> {
        let spec = builder()
            .maintainer_script(MaintainerScriptKind::Postinst, "#!/bin/sh\nexit 0\n", 0o644)
            .finish()?;

        let res = run_validation(&spec);
        match res {
            Err(AssemblerError::PolicyViolation(violations)) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].check, CheckId::MaintainerScriptNotExecutable);
                assert_eq!(violations[0].path.as_deref(), Some("postinst"));
            }
            other => panic!("expected policy violation, got {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn suppressed_script_check_reports_without_failing() -> Result<()> {
        let spec = builder()
            .maintainer_script(MaintainerScriptKind::Postinst, "#!/bin/sh\nexit 0\n", 0o644)
            .suppress_check("maintainer-script-not-executable")
            .finish()?;

        let report = run_validation(&spec)?;
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].suppressed);
        assert_eq!(
            report.violations[0].check,
            CheckId::MaintainerScriptNotExecutable
        );

        Ok(())
    }

    #[test]
    fn missing_shebang_and_odd_interpreter() -> Result<()> {
        let spec = builder()
            .maintainer_script(MaintainerScriptKind::Preinst, "echo no shebang\n", 0o755)
            .finish()?;

        match run_validation(&spec) {
            Err(AssemblerError::PolicyViolation(violations)) => {
                assert!(violations
                    .iter()
                    .any(|v| v.check == CheckId::MaintainerScriptMissingInterpreter));
            }
            other => panic!("expected policy violation, got {:?}", other),
        }

        let spec = builder()
            .maintainer_script(
                MaintainerScriptKind::Preinst,
                "#!/opt/custom/interp\nexit 0\n",
                0o755,
            )
            .finish()?;

        let report = run_validation(&spec)?;
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].check, CheckId::UnknownScriptInterpreter);
        assert_eq!(report.violations[0].severity, Severity::Warning);

        Ok(())
    }

    #[test]
    fn conffile_outside_etc_is_an_error() -> Result<()> {
        let spec = builder()
            .install_file("usr/share/sample/app.conf", "key=value\n", 0o644)
            .conffile("/usr/share/sample/app.conf")
            .finish()?;

        match run_validation(&spec) {
            Err(AssemblerError::PolicyViolation(violations)) => {
                assert_eq!(violations[0].check, CheckId::ConffileOutsideEtc);
                assert_eq!(
                    violations[0].path.as_deref(),
                    Some("/usr/share/sample/app.conf")
                );
            }
            other => panic!("expected policy violation, got {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn python_dependency_heuristic() -> Result<()> {
        let spec = builder()
            .depends("python3 (>= 3.9)")
            .install_file("usr/bin/tool", "#!/bin/sh\n", 0o644)
            .finish()?;

        let report = run_validation(&spec)?;
        assert!(report
            .violations
            .iter()
            .any(|v| v.check == CheckId::PythonDependencyWithoutPythonFiles));

        // Shipping a Python file satisfies the heuristic.
        let spec = builder()
            .depends("python3 (>= 3.9)")
            .install_file("usr/lib/python3/dist-packages/tool.py", "pass\n", 0o644)
            .finish()?;

        let report = run_validation(&spec)?;
        assert!(report.violations.is_empty());

        Ok(())
    }

    #[test]
    fn binary_without_manpage_warns() -> Result<()> {
        let spec = builder()
            .install_file("usr/bin/tool", "#!/bin/sh\n", 0o755)
            .finish()?;

        let report = run_validation(&spec)?;
        assert!(report
            .violations
            .iter()
            .any(|v| v.check == CheckId::BinaryWithoutManpage));

        let spec = builder()
            .install_file("usr/bin/tool", "#!/bin/sh\n", 0o755)
            .install_file("usr/share/man/man1/tool.1.gz", "troff", 0o644)
            .finish()?;

        let report = run_validation(&spec)?;
        assert!(report.violations.is_empty());

        Ok(())
    }

    #[test]
    fn unknown_suppression_tag_warns() -> Result<()> {
        let spec = builder().suppress_check("does-not-exist").finish()?;

        let report = run_validation(&spec)?;
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].check, CheckId::UnknownSuppressionTag);
        assert_eq!(report.violations[0].severity, Severity::Warning);

        Ok(())
    }
}
