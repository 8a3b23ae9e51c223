// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Control file primitives.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

A binary package control file is a single paragraph of `Name: value`
fields. Multi-line values are folded onto continuation lines that begin
with a single space, with ` .` marking a blank line. Field values are
stored here in their folded on-disk representation so serialization is a
plain dump; [ControlField::iter_lines] recovers the logical lines.
*/

use {
    crate::error::{AssemblerError, Result},
    std::{
        fmt,
        io::{BufRead, Write},
    },
};

/// Control file fields that every binary package must carry, with content.
pub const REQUIRED_FIELDS: &[&str] = &[
    "Package",
    "Version",
    "Architecture",
    "Maintainer",
    "Description",
];

/// A field in a control file.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ControlField {
    name: String,
    value: String,
}

impl ControlField {
    /// Construct an instance from a field name and value.
    ///
    /// The value is the folded representation: continuation lines carry a
    /// leading space, blank lines are ` .`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The folded value, as it appears after the colon.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Iterate over the logical lines of the value.
    ///
    /// Continuation-line whitespace is stripped and ` .` markers become
    /// empty lines.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.lines().map(|line| {
            let line = line.trim_start();
            if line == "." {
                ""
            } else {
                line
            }
        })
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

impl fmt::Display for ControlField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\n", self.name, self.value)
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields. Field names are case
/// insensitive on read and case preserving on set, and a paragraph can only
/// contain a single occurrence of a field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlParagraph {
    fields: Vec<ControlField>,
}

impl ControlParagraph {
    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// An existing field with the same name (case insensitive) is replaced.
    pub fn set_field(&mut self, field: ControlField) {
        self.fields
            .retain(|cf| !cf.name.eq_ignore_ascii_case(&field.name));
        self.fields.push(field);
    }

    /// Set the value of a field defined via strings.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&ControlField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value())
    }

    /// Iterate over fields in this paragraph, in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField> {
        self.fields.iter()
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl fmt::Display for ControlParagraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            field.fmt(f)?;
        }

        Ok(())
    }
}

/// Holds parsing state for Debian control files.
///
/// Instances are fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph is
    /// returned. Otherwise `Ok(None)` is returned.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph>> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');

        // Comment lines are ignored wherever they occur.
        if line.starts_with('#') {
            return Ok(None);
        }

        // Empty lines signify the end of a paragraph. Flush any state.
        if line.trim().is_empty() {
            if let Some(field) = self.field.take() {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        let is_continuation = line.starts_with(' ') || line.starts_with('\t');

        match (self.field.take(), is_continuation) {
            // A continuation line extends the field being accumulated.
            (Some(field), true) => {
                self.field = Some(field + "\n" + line);
                Ok(None)
            }
            // An unindented line begins a new field.
            (Some(field), false) => {
                self.flush_field(field)?;
                self.field = Some(line.to_string());
                Ok(None)
            }
            (None, false) => {
                self.field = Some(line.to_string());
                Ok(None)
            }
            (None, true) => Err(AssemblerError::ControlParse(format!(
                "continuation line without a field: {}",
                line
            ))),
        }
    }

    /// Finish parsing, consuming self.
    pub fn finish(mut self) -> Result<Option<ControlParagraph>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, raw: String) -> Result<()> {
        let (first, rest) = match raw.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (raw.as_str(), None),
        };

        let (name, value) = first.split_once(':').ok_or_else(|| {
            AssemblerError::ControlParse(format!("line missing colon delimiter: {}", first))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(AssemblerError::ControlParse(format!(
                "field with empty name: {}",
                first
            )));
        }

        let mut value = value.trim().to_string();
        if let Some(rest) = rest {
            value.push('\n');
            value.push_str(rest);
        }

        self.paragraph.set(name, value);

        Ok(())
    }
}

/// A Debian control file: an ordered series of paragraphs.
#[derive(Clone, Debug, Default)]
pub struct ControlFile {
    paragraphs: Vec<ControlParagraph>,
}

impl ControlFile {
    /// Construct a new instance by parsing data from a reader.
    pub fn parse_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut paragraphs = Vec::new();
        let mut parser = ControlFileParser::default();

        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;

            if bytes_read == 0 {
                break;
            }

            if let Some(paragraph) = parser.write_line(&line)? {
                paragraphs.push(paragraph);
            }
        }

        if let Some(paragraph) = parser.finish()? {
            paragraphs.push(paragraph);
        }

        Ok(Self { paragraphs })
    }

    /// Parse a control file from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut reader = std::io::BufReader::new(s.as_bytes());
        Self::parse_reader(&mut reader)
    }

    /// Add a paragraph to this control file.
    pub fn add_paragraph(&mut self, p: ControlParagraph) {
        self.paragraphs.push(p);
    }

    /// Obtain paragraphs in this control file.
    pub fn paragraphs(&self) -> impl Iterator<Item = &ControlParagraph> {
        self.paragraphs.iter()
    }

    /// Obtain the sole paragraph of a binary package control file.
    pub fn into_binary_paragraph(mut self) -> Result<ControlParagraph> {
        if self.paragraphs.is_empty() {
            return Err(AssemblerError::ControlParse(
                "control file lacks a paragraph".to_string(),
            ));
        }

        Ok(self.paragraphs.remove(0))
    }

    /// Serialize the control file to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for p in &self.paragraphs {
            p.write(writer)?;
            writer.write_all(b"\n")?;
        }

        Ok(())
    }
}

/// Fold a multi-line string into a control field value.
///
/// The first line is the synopsis. Subsequent lines become continuation
/// lines with a one-space indent, blank lines becoming ` .`.
pub fn format_multiline(text: &str) -> String {
    let mut lines = text.lines();
    let mut out = lines.next().unwrap_or("").trim().to_string();

    for line in lines {
        out.push('\n');
        if line.trim().is_empty() {
            out.push_str(" .");
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }

    out
}

/// Verify that every required binary package field is present and non-empty.
pub fn ensure_required_fields(paragraph: &ControlParagraph) -> Result<()> {
    for name in REQUIRED_FIELDS {
        match paragraph.field_str(name) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(AssemblerError::IncompleteControlFile(name)),
        }
    }

    Ok(())
}
