// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Publishing finished artifacts.

The upload sink is deliberately thin: the artifact is copied into a
`file://` directory or PUT to an `http(s)://` location under its own
file name. Anything richer (repository indexing, signing) belongs to the
destination, not to this crate.
*/

use {
    crate::error::{AssemblerError, Result},
    std::path::Path,
    url::Url,
};

fn publish_error(destination: &str, message: impl Into<String>) -> AssemblerError {
    AssemblerError::Publish {
        destination: destination.to_string(),
        message: message.into(),
    }
}

/// Parse and vet a destination URI before any build work happens.
///
/// Only `file://` and `http(s)://` destinations are supported; with the
/// `http` feature disabled, HTTP destinations are rejected here as well.
pub fn validate_destination(destination: &str) -> Result<Url> {
    let url = Url::parse(destination)?;

    match url.scheme() {
        "file" => Ok(url),
        "http" | "https" => {
            if cfg!(feature = "http") {
                Ok(url)
            } else {
                Err(AssemblerError::UnsupportedUploadScheme(
                    url.scheme().to_string(),
                ))
            }
        }
        other => Err(AssemblerError::UnsupportedUploadScheme(other.to_string())),
    }
}

fn artifact_file_name(artifact: &Path, destination: &str) -> Result<String> {
    artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| publish_error(destination, "artifact path has no file name"))
}

/// Upload an artifact to a destination URI.
///
/// The artifact keeps its file name at the destination. Failures do not
/// affect the already-written local artifact.
pub fn publish(artifact: &Path, destination: &str) -> Result<()> {
    let url = validate_destination(destination)?;

    match url.scheme() {
        "file" => publish_filesystem(artifact, &url, destination),
        _ => publish_http(artifact, &url, destination),
    }
}

fn publish_filesystem(artifact: &Path, url: &Url, destination: &str) -> Result<()> {
    let directory = url
        .to_file_path()
        .map_err(|_| publish_error(destination, "not a valid file URL"))?;

    std::fs::create_dir_all(&directory)
        .map_err(|e| publish_error(destination, e.to_string()))?;

    let target = directory.join(artifact_file_name(artifact, destination)?);
    std::fs::copy(artifact, &target)
        .map_err(|e| publish_error(destination, e.to_string()))?;

    log::info!("published {} to {}", artifact.display(), target.display());

    Ok(())
}

#[cfg(feature = "http")]
fn publish_http(artifact: &Path, url: &Url, destination: &str) -> Result<()> {
    let file_name = artifact_file_name(artifact, destination)?;

    let mut target = url.clone();
    target
        .path_segments_mut()
        .map_err(|_| publish_error(destination, "URL cannot be a base"))?
        .pop_if_empty()
        .push(&file_name);

    let file = std::fs::File::open(artifact).map_err(|e| AssemblerError::FileRead {
        path: artifact.display().to_string(),
        source: e,
    })?;

    let response = reqwest::blocking::Client::new()
        .put(target.clone())
        .body(file)
        .send()
        .map_err(|e| publish_error(destination, e.to_string()))?;

    if !response.status().is_success() {
        return Err(publish_error(
            destination,
            format!("HTTP status {}", response.status()),
        ));
    }

    log::info!("published {} to {}", artifact.display(), target);

    Ok(())
}

#[cfg(not(feature = "http"))]
fn publish_http(_artifact: &Path, url: &Url, _destination: &str) -> Result<()> {
    Err(AssemblerError::UnsupportedUploadScheme(
        url.scheme().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(matches!(
            validate_destination("s3://bucket/prefix"),
            Err(AssemblerError::UnsupportedUploadScheme(scheme)) if scheme == "s3"
        ));

        assert!(matches!(
            validate_destination("not a url at all"),
            Err(AssemblerError::Url(_))
        ));
    }

    #[test]
    fn filesystem_publish_copies_under_artifact_name() -> Result<()> {
        let source_dir = tempfile::tempdir()?;
        let artifact = source_dir.path().join("sample_1.0.0_all.deb");
        std::fs::write(&artifact, b"artifact bytes")?;

        let dest_dir = tempfile::tempdir()?;
        let destination = format!(
            "file://{}",
            dest_dir.path().join("pool").display()
        );

        publish(&artifact, &destination)?;

        let uploaded = dest_dir.path().join("pool/sample_1.0.0_all.deb");
        assert_eq!(std::fs::read(uploaded)?, b"artifact bytes");

        Ok(())
    }

    #[test]
    fn filesystem_publish_failure_is_publish_error() {
        let res = publish(Path::new("/nonexistent/sample.deb"), "file:///proc/version/nope");
        assert!(matches!(res, Err(AssemblerError::Publish { .. })));
    }
}
