// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Control file rendering.

A control file template is plain text with `${name}` placeholders.
The variable mapping is the union of user supplied variables and computed
variables derived from the spec (package identity and installed size).
Computed variable names are reserved and cannot be shadowed.

When no template is supplied the control paragraph is derived directly
from the spec's metadata fields.
*/

use {
    crate::{
        control::{self, ControlParagraph},
        error::{AssemblerError, Result},
        spec::PackageSpec,
    },
    once_cell::sync::Lazy,
    regex::{Captures, Regex},
    std::collections::BTreeMap,
};

/// Variable names injected by the renderer. User variables cannot use these.
pub const RESERVED_VARIABLES: &[&str] = &[
    "package",
    "version",
    "architecture",
    "maintainer",
    "installed_size",
];

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern"));

/// Substitute `${name}` placeholders in a template.
///
/// Every placeholder must have a binding; the first unresolved name fails
/// the render. The output is normalized to end with exactly one newline.
pub fn render(template: &str, variables: &BTreeMap<String, String>) -> Result<String> {
    let mut missing: Option<String> = None;

    let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(AssemblerError::UndefinedVariable(name));
    }

    let mut text = rendered.into_owned();
    while text.ends_with('\n') {
        text.pop();
    }
    text.push('\n');

    Ok(text)
}

/// The variable mapping used to render a spec's control template.
///
/// Computed variables are injected last; a user variable with a reserved
/// name is a hard failure rather than a silent override.
pub fn build_variables(spec: &PackageSpec) -> Result<BTreeMap<String, String>> {
    let mut variables = spec.variables().clone();

    for reserved in RESERVED_VARIABLES {
        if variables.contains_key(*reserved) {
            return Err(AssemblerError::ReservedVariableConflict(
                (*reserved).to_string(),
            ));
        }
    }

    variables.insert("package".to_string(), spec.name().to_string());
    variables.insert("version".to_string(), spec.version().to_string());
    variables.insert("architecture".to_string(), spec.architecture().to_string());
    variables.insert("maintainer".to_string(), spec.maintainer().to_string());
    variables.insert(
        "installed_size".to_string(),
        spec.installed_size_kib()?.to_string(),
    );

    Ok(variables)
}

/// Build the control paragraph directly from spec metadata.
fn metadata_paragraph(spec: &PackageSpec) -> Result<ControlParagraph> {
    let mut paragraph = ControlParagraph::default();

    paragraph.set("Package", spec.name());
    paragraph.set("Version", spec.version());
    paragraph.set("Architecture", spec.architecture());
    paragraph.set("Maintainer", spec.maintainer());
    paragraph.set("Installed-Size", spec.installed_size_kib()?.to_string());

    if let Some(section) = spec.section() {
        paragraph.set("Section", section);
    }
    if let Some(priority) = spec.priority() {
        paragraph.set("Priority", priority);
    }
    if let Some(homepage) = spec.homepage() {
        paragraph.set("Homepage", homepage);
    }
    if let Some(depends) = spec.depends() {
        paragraph.set("Depends", depends);
    }
    if let Some(pre_depends) = spec.pre_depends() {
        paragraph.set("Pre-Depends", pre_depends);
    }
    if let Some(recommends) = spec.recommends() {
        paragraph.set("Recommends", recommends);
    }
    if let Some(suggests) = spec.suggests() {
        paragraph.set("Suggests", suggests);
    }

    paragraph.set("Description", control::format_multiline(spec.description()));

    Ok(paragraph)
}

/// Produce the final control file text for a spec.
///
/// Renders the spec's template when one is present, otherwise derives the
/// paragraph from metadata. The result is parsed back and the required
/// binary package fields are verified before it is accepted.
pub fn render_control(spec: &PackageSpec) -> Result<String> {
    let text = match spec.control_template() {
        Some(template) => {
            let raw = template.resolve()?;
            let template = String::from_utf8(raw).map_err(|_| AssemblerError::TemplateNotUtf8)?;
            let variables = build_variables(spec)?;
            render(&template, &variables)?
        }
        None => {
            let paragraph = metadata_paragraph(spec)?;
            let mut buffer = Vec::new();
            paragraph.write(&mut buffer)?;
            String::from_utf8(buffer).map_err(|_| AssemblerError::TemplateNotUtf8)?
        }
    };

    let paragraph = crate::control::ControlFile::parse_str(&text)?.into_binary_paragraph()?;
    control::ensure_required_fields(&paragraph)?;

    Ok(text)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::spec::PackageSpec, indoc::indoc};

    fn sample_spec() -> PackageSpec {
        PackageSpec::builder("sample", "1.0.0", "all")
            .maintainer("Build Robot <build@example.com>")
            .description("a sample package")
            .install_file("usr/bin/sample", "#!/bin/sh\nexit 0\n", 0o755)
            .finish()
            .unwrap()
    }

    #[test]
    fn render_substitutes_and_normalizes_newlines() -> Result<()> {
        let mut variables = BTreeMap::new();
        variables.insert("greeting".to_string(), "hello".to_string());

        let text = render("${greeting} world\n\n\n", &variables)?;
        assert_eq!(text, "hello world\n");

        let text = render("no trailing newline", &BTreeMap::new())?;
        assert_eq!(text, "no trailing newline\n");

        Ok(())
    }

    #[test]
    fn render_fails_on_undefined_variable() {
        let res = render("Package: ${nope}", &BTreeMap::new());
        assert!(
            matches!(res, Err(AssemblerError::UndefinedVariable(name)) if name == "nope")
        );
    }

    #[test]
    fn reserved_variable_collision_is_fatal() {
        let spec = PackageSpec::builder("sample", "1.0.0", "all")
            .maintainer("someone")
            .description("sample")
            .variable("installed_size", "9999")
            .finish()
            .unwrap();

        assert!(matches!(
            build_variables(&spec),
            Err(AssemblerError::ReservedVariableConflict(name)) if name == "installed_size"
        ));
    }

    #[test]
    fn template_render_uses_computed_variables() -> Result<()> {
        let template = indoc! {"
            Package: ${package}
            Version: ${version}
            Architecture: ${architecture}
            Maintainer: ${maintainer}
            Installed-Size: ${installed_size}
            Description: ${summary}
        "};

        let spec = PackageSpec::builder("sample", "1.0.0", "all")
            .maintainer("Build Robot <build@example.com>")
            .description("ignored when a template is present")
            .variable("summary", "a sample package")
            .control_template(template)
            .finish()
            .unwrap();

        let text = render_control(&spec)?;
        assert!(text.contains("Package: sample\n"));
        assert!(text.contains("Version: 1.0.0\n"));
        assert!(text.contains("Installed-Size: 0\n"));
        assert!(text.ends_with("Description: a sample package\n"));

        Ok(())
    }

    #[test]
    fn metadata_control_has_required_fields() -> Result<()> {
        let text = render_control(&sample_spec())?;

        let paragraph =
            crate::control::ControlFile::parse_str(&text)?.into_binary_paragraph()?;
        assert_eq!(paragraph.field_str("Package"), Some("sample"));
        assert_eq!(paragraph.field_str("Architecture"), Some("all"));
        assert_eq!(paragraph.field_str("Installed-Size"), Some("1"));

        Ok(())
    }

    #[test]
    fn missing_required_field_is_incomplete() {
        let spec = PackageSpec::builder("sample", "1.0.0", "all")
            .maintainer("someone")
            .description("sample")
            .control_template("Package: ${package}\nVersion: ${version}\n")
            .finish()
            .unwrap();

        assert!(matches!(
            render_control(&spec),
            Err(AssemblerError::IncompleteControlFile("Architecture"))
        ));
    }
}
