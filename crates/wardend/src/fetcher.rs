//! Artifact download.
//!
//! Streams the authority's download endpoint (no filename parameter;
//! the server serves whatever it currently considers latest) into
//! `<target>.partial` in the managed directory, verifies the byte count
//! against Content-Length when the server sent one, then renames into
//! place. The final filename is never occupied by a truncated artifact;
//! a failed attempt removes the partial file and reports a typed error.

use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use warden_common::AgentError;

pub struct ArtifactFetcher {
    client: reqwest::Client,
    url: String,
    dir: std::path::PathBuf,
}

impl ArtifactFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration, dir: std::path::PathBuf) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(format!("wardend/{}", env!("CARGO_PKG_VERSION")))
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            url: url.into(),
            dir,
        }
    }

    /// Download the currently published artifact as `target_filename`.
    pub async fn download(&self, target_filename: &str) -> Result<(), AgentError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(AgentError::network)?;

        if !resp.status().is_success() {
            return Err(AgentError::Network(format!(
                "download endpoint returned {}",
                resp.status()
            )));
        }

        let expected = resp.content_length();
        let partial = self.dir.join(format!("{target_filename}.partial"));
        let target = self.dir.join(target_filename);

        let written = match stream_to_file(resp, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Some(expected) = expected {
            if written != expected {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(AgentError::Network(format!(
                    "truncated download: got {} of {} bytes",
                    written, expected
                )));
            }
        }

        tokio::fs::rename(&partial, &target).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).await?;
        }

        info!("downloaded {} ({} bytes)", target_filename, written);
        Ok(())
    }
}

async fn stream_to_file(mut resp: reqwest::Response, path: &Path) -> Result<u64, AgentError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = resp.chunk().await.map_err(AgentError::network)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    debug!("wrote {} bytes to {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn download_lands_bytes_under_target_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"artifact payload".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArtifactFetcher::new(
            format!("{}/download", server.uri()),
            Duration::from_secs(5),
            dir.path().to_path_buf(),
        );

        fetcher.download("tracker_v1.5.exe").await.unwrap();
        let bytes = std::fs::read(dir.path().join("tracker_v1.5.exe")).unwrap();
        assert_eq!(bytes, b"artifact payload");
        assert!(!dir.path().join("tracker_v1.5.exe.partial").exists());
    }

    #[tokio::test]
    async fn non_200_aborts_without_touching_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArtifactFetcher::new(
            format!("{}/download", server.uri()),
            Duration::from_secs(5),
            dir.path().to_path_buf(),
        );

        let err = fetcher.download("tracker_v1.5.exe").await.unwrap_err();
        assert!(matches!(err, AgentError::Network(_)));
        assert!(!dir.path().join("tracker_v1.5.exe").exists());
        assert!(!dir.path().join("tracker_v1.5.exe.partial").exists());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let dir = tempfile::tempdir().unwrap();
        // Port 1 is never listening.
        let fetcher = ArtifactFetcher::new(
            "http://127.0.0.1:1/download",
            Duration::from_secs(1),
            dir.path().to_path_buf(),
        );
        let err = fetcher.download("tracker_v1.5.exe").await.unwrap_err();
        assert!(matches!(err, AgentError::Network(_)));
    }
}
