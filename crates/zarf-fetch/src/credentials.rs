//! Docker credential resolution
//!
//! Reads the local `~/.docker/config.json` (the same format kubernetes uses
//! for `dockerconfigjson` secrets) and resolves per-registry auth for both
//! image pulls and package pushes. Docker Hub's well-known alias is
//! rewritten to the real registry host.

use base64::{engine::general_purpose, Engine as _};
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{FetchError, Result};

/// Docker Hub alias users write in references
pub const DOCKER_IO: &str = "docker.io";

/// The registry host Docker Hub actually serves from
pub const DOCKER_REGISTRY: &str = "registry-1.docker.io";

/// Replace the docker.io alias with the real registry host
pub fn resolve_registry_host(host: &str) -> &str {
    if host == DOCKER_IO {
        DOCKER_REGISTRY
    } else {
        host
    }
}

/// Contents of a docker config file's auth section
#[derive(Clone, Default, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerCredentials>,
}

#[derive(Clone, Deserialize)]
#[serde(untagged)]
enum DockerCredentials {
    Split { username: String, password: String },
    Composite { auth: String },
}

impl DockerConfig {
    /// Load the user's docker config, empty when none exists
    pub fn load_default() -> Result<Self> {
        let path = default_config_path();
        match std::fs::read(&path) {
            Ok(data) => Self::from_slice(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Resolve auth for a registry host; anonymous when unconfigured.
    ///
    /// Both the alias and the real Docker Hub host are consulted so a login
    /// recorded against either form works.
    pub fn auth_for(&self, registry: &str) -> Result<RegistryAuth> {
        let candidates = [
            registry,
            resolve_registry_host(registry),
            if registry == DOCKER_REGISTRY {
                DOCKER_IO
            } else {
                registry
            },
            // Old docker logins record the full index URL.
            "https://index.docker.io/v1/",
        ];

        for candidate in candidates {
            if candidate == "https://index.docker.io/v1/"
                && registry != DOCKER_IO
                && registry != DOCKER_REGISTRY
            {
                continue;
            }
            if let Some(credentials) = self.auths.get(candidate) {
                let (username, password) = credentials.unpack()?;
                return Ok(RegistryAuth::Basic(username, password));
            }
        }

        Ok(RegistryAuth::Anonymous)
    }

    /// Basic username/password for a registry, if configured
    pub fn basic_for(&self, registry: &str) -> Result<Option<(String, String)>> {
        match self.auth_for(registry)? {
            RegistryAuth::Basic(u, p) => Ok(Some((u, p))),
            _ => Ok(None),
        }
    }
}

impl DockerCredentials {
    fn unpack(&self) -> Result<(String, String)> {
        match self.clone() {
            DockerCredentials::Split { username, password } => Ok((username, password)),
            DockerCredentials::Composite { auth } => {
                let decoded = general_purpose::STANDARD.decode(auth).map_err(|e| {
                    FetchError::fetch("docker config", format!("invalid base64 auth: {e}"))
                })?;
                let text = String::from_utf8(decoded).map_err(|e| {
                    FetchError::fetch("docker config", format!("invalid utf-8 auth: {e}"))
                })?;
                text.split_once(':')
                    .map(|(u, p)| (u.to_string(), p.to_string()))
                    .ok_or_else(|| {
                        FetchError::fetch("docker config", "auth field is missing a colon")
                    })
            }
        }
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        return PathBuf::from(dir).join("config.json");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docker")
        .join("config.json")
}

impl std::fmt::Debug for DockerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerConfig")
            .field("auths", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_io_is_rewritten() {
        assert_eq!(resolve_registry_host("docker.io"), "registry-1.docker.io");
        assert_eq!(resolve_registry_host("ghcr.io"), "ghcr.io");
    }

    #[test]
    fn split_credentials() {
        let config = DockerConfig::from_slice(
            br#"{"auths":{"ghcr.io":{"username":"foo","password":"hunter12"}}}"#,
        )
        .unwrap();

        match config.auth_for("ghcr.io").unwrap() {
            RegistryAuth::Basic(u, p) => {
                assert_eq!(u, "foo");
                assert_eq!(p, "hunter12");
            }
            other => panic!("expected basic auth, got {other:?}"),
        }

        assert!(matches!(
            config.auth_for("registry.k8s.io").unwrap(),
            RegistryAuth::Anonymous
        ));
    }

    #[test]
    fn composite_credentials() {
        // base64("foo:hunter12")
        let config = DockerConfig::from_slice(
            br#"{"auths":{"ghcr.io":{"auth":"Zm9vOmh1bnRlcjEy"}}}"#,
        )
        .unwrap();

        let basic = config.basic_for("ghcr.io").unwrap().unwrap();
        assert_eq!(basic, ("foo".to_string(), "hunter12".to_string()));
    }

    #[test]
    fn docker_hub_aliases_resolve() {
        let config = DockerConfig::from_slice(
            br#"{"auths":{"https://index.docker.io/v1/":{"auth":"Zm9vOmh1bnRlcjEy"}}}"#,
        )
        .unwrap();

        assert!(config.basic_for("docker.io").unwrap().is_some());
        assert!(config.basic_for("ghcr.io").unwrap().is_none());
    }

    #[test]
    fn malformed_auth_is_an_error() {
        // base64("foo") - no colon
        let config =
            DockerConfig::from_slice(br#"{"auths":{"ghcr.io":{"auth":"Zm9v"}}}"#).unwrap();
        assert!(config.auth_for("ghcr.io").is_err());
    }
}
