//! Endpoint list loading and writing.

use log::{debug, info, warn};
use shared::{parse_endpoints, Endpoint};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("endpoint source {path} unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write endpoint list {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads and deduplicates the endpoint list at `path`.
///
/// Malformed lines are logged and skipped. Only an unreadable source is an
/// error.
pub async fn load_endpoints(path: &Path) -> Result<Vec<Endpoint>, RegistryError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RegistryError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

    let parsed = parse_endpoints(&text);
    for (line, reason) in &parsed.malformed {
        warn!("{}:{}: skipping entry: {}", path.display(), line, reason);
    }
    if parsed.duplicates > 0 {
        debug!(
            "{}: dropped {} duplicate endpoints",
            path.display(),
            parsed.duplicates
        );
    }

    info!(
        "Loaded {} endpoints from {}",
        parsed.endpoints.len(),
        path.display()
    );
    Ok(parsed.endpoints)
}

/// Writes endpoints back in list form, one per line.
pub async fn write_endpoints(path: &Path, endpoints: &[Endpoint]) -> Result<(), RegistryError> {
    let mut text = String::new();
    for endpoint in endpoints {
        text.push_str(&endpoint.to_line());
        text.push('\n');
    }

    tokio::fs::write(path, text)
        .await
        .map_err(|source| RegistryError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Wrote {} endpoints to {}", endpoints.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ProtocolKind;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_load_skips_malformed_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.txt");
        std::fs::write(
            &path,
            "QW,US,One,10.0.0.1:27500\n\
             too,few\n\
             Q3,SE,Two,[2001:db8::1]:27960\n\
             QW,US,Dup,10.0.0.1:27500\n\
             CS,IN,Three,43.205.69.43:27215\n",
        )
        .unwrap();

        let endpoints = assert_ok!(load_endpoints(&path).await);
        let titles: Vec<&str> = endpoints.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(endpoints[1].protocol, ProtocolKind::StructuredStatus);
        assert_eq!(endpoints[2].protocol, ProtocolKind::BinaryQuery);
    }

    #[tokio::test]
    async fn test_missing_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_endpoints(&dir.path().join("absent.txt")).await;
        assert!(matches!(
            result,
            Err(RegistryError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_then_load_sanitized_list() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("servers.txt");
        let output = dir.path().join("sanitized_servers.txt");
        std::fs::write(
            &input,
            "QW,US,One,10.0.0.1:27500\nQW,US,Again,10.0.0.1:27500\nQ2,DE,Two,q2.example.org\n",
        )
        .unwrap();

        let endpoints = load_endpoints(&input).await.unwrap();
        assert_ok!(write_endpoints(&output, &endpoints).await);

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            written,
            "QW,US,One,10.0.0.1:27500\nQ2,DE,Two,q2.example.org:27015\n"
        );
        assert_eq!(load_endpoints(&output).await.unwrap(), endpoints);
    }
}
