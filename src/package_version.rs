// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling. */

use {
    std::{
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error)]
pub enum VersionError {
    #[error("error parsing string to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A validated Debian package version.
///
/// The format is `[epoch:]upstream_version[-debian_revision]` and each
/// component has rules about what characters are allowed. See
/// <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.
///
/// Package assembly only needs to know a version string is well formed and
/// how to write it back out, so ordering semantics are intentionally not
/// implemented here.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        // Epoch is the part before a colon, if present. upstream_version and
        // debian_revision are discovered by splitting on the last hyphen.
        let (epoch, remainder) = if let Some(pos) = s.find(':') {
            (Some(&s[0..pos]), &s[pos + 1..])
        } else {
            (None, s)
        };

        let (upstream, debian) = if let Some(pos) = remainder.rfind('-') {
            (&remainder[0..pos], Some(&remainder[pos + 1..]))
        } else {
            (remainder, None)
        };

        let epoch = if let Some(epoch) = epoch {
            if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::EpochNonNumeric(s.to_string()));
            }

            Some(u32::from_str(epoch)?)
        } else {
            None
        };

        // The upstream_version allows alphanumerics and . + ~, plus hyphens
        // when a debian_revision is present.
        if upstream.is_empty()
            || !upstream.chars().all(|c| match c {
                c if c.is_ascii_alphanumeric() => true,
                '.' | '+' | '~' => true,
                '-' => debian.is_some(),
                _ => false,
            })
        {
            return Err(VersionError::UpstreamVersionIllegalChar(s.to_string()));
        }

        let debian_revision = if let Some(debian) = debian {
            // Alphanumerics and + . ~ only.
            if debian.is_empty()
                || !debian.chars().all(|c| match c {
                    c if c.is_ascii_alphanumeric() => true,
                    '+' | '.' | '~' => true,
                    _ => false,
                })
            {
                return Err(VersionError::DebianRevisionIllegalChar(s.to_string()));
            }

            Some(debian.to_string())
        } else {
            None
        };

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision,
        })
    }

    /// The `epoch` component, if explicitly present.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// The `upstream_version` component.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// The `debian_revision` component, if present.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        write!(f, "{}", self.upstream_version)?;

        if let Some(revision) = &self.debian_revision {
            write!(f, "-{}", revision)?;
        }

        Ok(())
    }
}
