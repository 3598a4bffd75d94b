//! Reference transforms
//!
//! Pure rewriting of container image references and git URLs to their
//! in-cluster equivalents. Each rewritten reference carries a crc32
//! fingerprint of the original so two different sources that resolve to the
//! same short name cannot collide. Rewriting the same input twice always
//! yields the same output.

use crate::error::{CoreError, Result};

/// A parsed container image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry host (docker.io when the reference carries none)
    pub host: String,
    /// Repository path without the registry host
    pub path: String,
    /// Tag portion; "latest" when neither tag nor digest is present
    pub tag: String,
    /// `sha256:<hex>` digest when the reference is digest-pinned
    pub digest: String,
}

impl ImageRef {
    /// Parse an image reference into host, path, tag and digest.
    ///
    /// Bare Docker Hub names gain the implicit `library/` prefix so the
    /// rewritten path matches what the registry actually serves.
    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() || reference.contains(char::is_whitespace) {
            return Err(CoreError::InvalidRef {
                reference: reference.to_string(),
                message: "reference is empty or contains whitespace".to_string(),
            });
        }

        let (remainder, digest) = match reference.split_once('@') {
            Some((r, d)) => {
                if !d.starts_with("sha256:") || d.len() != 7 + 64 {
                    return Err(CoreError::InvalidRef {
                        reference: reference.to_string(),
                        message: format!("invalid digest {d:?}"),
                    });
                }
                (r, d.to_string())
            }
            None => (reference, String::new()),
        };

        // A tag colon must come after the final path separator, otherwise it
        // belongs to a registry port.
        let last_slash = remainder.rfind('/');
        let (remainder, tag) = match remainder.rfind(':') {
            Some(idx) if last_slash.map_or(true, |s| idx > s) => (
                &remainder[..idx],
                remainder[idx + 1..].to_string(),
            ),
            _ => (remainder, String::new()),
        };

        let tag = if tag.is_empty() && digest.is_empty() {
            "latest".to_string()
        } else {
            tag
        };

        // The first segment is a registry host only if it looks like one.
        let (host, path) = match remainder.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => ("docker.io".to_string(), remainder.to_string()),
        };

        if path.is_empty() {
            return Err(CoreError::InvalidRef {
                reference: reference.to_string(),
                message: "reference has no repository path".to_string(),
            });
        }

        let path = if host == "docker.io" && !path.contains('/') {
            format!("library/{path}")
        } else {
            path
        };

        Ok(ImageRef {
            host,
            path,
            tag,
            digest,
        })
    }
}

/// crc32 (IEEE) of a reference string, the collision-avoidance fingerprint
pub fn crc_fingerprint(input: &str) -> u32 {
    crc32fast::hash(input.as_bytes())
}

/// Rewrite an image reference to point at the in-cluster registry.
///
/// Tagged input yields `<host>/<path>:<tag>-zarf-<crc32(orig)>`; digest-pinned
/// input yields `<host>/<path>@sha256-<hex>-zarf-<crc32(orig)>` so the
/// original pin stays recoverable from the rewritten name.
pub fn image_transform_host(target_host: &str, src_reference: &str) -> Result<String> {
    let image = ImageRef::parse(src_reference)?;
    let crc = crc_fingerprint(src_reference);

    if image.digest.is_empty() {
        Ok(format!(
            "{target_host}/{}:{}-zarf-{crc}",
            image.path, image.tag
        ))
    } else {
        let hex = image.digest.trim_start_matches("sha256:");
        Ok(format!(
            "{target_host}/{}@sha256-{hex}-zarf-{crc}",
            image.path
        ))
    }
}

/// Rewrite an image reference without the crc suffix.
///
/// Used when the caller needs the plain in-cluster name, e.g. for a registry
/// that was seeded out-of-band with unmodified tags.
pub fn image_transform_host_without_checksum(
    target_host: &str,
    src_reference: &str,
) -> Result<String> {
    let image = ImageRef::parse(src_reference)?;
    if image.digest.is_empty() {
        Ok(format!("{target_host}/{}:{}", image.path, image.tag))
    } else {
        Ok(format!("{target_host}/{}@{}", image.path, image.digest))
    }
}

/// A parsed git URL, scheme plus host/path with optional `@ref` suffix split off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    /// URL without the `@ref` suffix
    pub url: String,
    /// Ref requested with `url@ref`, empty when absent
    pub ref_name: String,
}

impl GitRef {
    /// Split an optional `@<ref>` suffix off a git URL.
    ///
    /// The `@` of `user@host` URLs is not a ref separator; only an `@` after
    /// the final path segment counts.
    pub fn parse(raw: &str) -> Result<Self> {
        let scheme_end = raw.find("://").ok_or_else(|| CoreError::InvalidRef {
            reference: raw.to_string(),
            message: "git URL must carry a scheme".to_string(),
        })?;

        let after_scheme = &raw[scheme_end + 3..];
        let last_slash = after_scheme.rfind('/').unwrap_or(0);
        match after_scheme[last_slash..].find('@') {
            Some(at) => {
                let split = scheme_end + 3 + last_slash + at;
                Ok(GitRef {
                    url: raw[..split].to_string(),
                    ref_name: raw[split + 1..].to_string(),
                })
            }
            None => Ok(GitRef {
                url: raw.to_string(),
                ref_name: String::new(),
            }),
        }
    }
}

/// The unique folder name a repository is mirrored into: the last path
/// segment plus the crc32 of the scheme-less, `.git`-less URL.
pub fn repo_folder_name(src_url: &str) -> Result<String> {
    let git = GitRef::parse(src_url)?;
    let (name, crc) = repo_name_and_fingerprint(&git.url)?;
    Ok(format!("{name}-{crc}"))
}

/// Rewrite a git URL to point at the in-cluster git server:
/// `<git-host>/<pushUser>/<lastPathSegment>-<crc32>.git`.
pub fn git_transform_url(target_base_url: &str, source_url: &str, push_user: &str) -> Result<String> {
    let git = GitRef::parse(source_url)?;
    let (name, crc) = repo_name_and_fingerprint(&git.url)?;
    Ok(format!(
        "{}/{push_user}/{name}-{crc}.git",
        target_base_url.trim_end_matches('/')
    ))
}

fn repo_name_and_fingerprint(url: &str) -> Result<(String, u32)> {
    let scheme_end = url.find("://").ok_or_else(|| CoreError::InvalidRef {
        reference: url.to_string(),
        message: "git URL must carry a scheme".to_string(),
    })?;

    let host_path = url[scheme_end + 3..]
        .trim_end_matches('/')
        .trim_end_matches(".git");

    let name = host_path
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty() && *n != host_path)
        .ok_or_else(|| CoreError::InvalidRef {
            reference: url.to_string(),
            message: "git URL has no repository path".to_string(),
        })?;

    Ok((name.to_string(), crc_fingerprint(host_path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_docker_hub_image() {
        let image = ImageRef::parse("nginx:1.25").unwrap();
        assert_eq!(image.host, "docker.io");
        assert_eq!(image.path, "library/nginx");
        assert_eq!(image.tag, "1.25");
        assert!(image.digest.is_empty());
    }

    #[test]
    fn parses_registry_with_port() {
        let image = ImageRef::parse("localhost:5000/team/app").unwrap();
        assert_eq!(image.host, "localhost:5000");
        assert_eq!(image.path, "team/app");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn parses_digest_reference() {
        let digest = "sha256:c8d5e67f3a0c67a4eab5c2c4dd1b7e4cdb98cbbcc87b6a70671054e31ab5dd37";
        let image = ImageRef::parse(&format!("nginx@{digest}")).unwrap();
        assert_eq!(image.path, "library/nginx");
        assert_eq!(image.digest, digest);
        assert!(image.tag.is_empty());
    }

    #[test]
    fn rejects_malformed_digest() {
        assert!(ImageRef::parse("nginx@sha256:short").is_err());
    }

    #[test]
    fn image_transform_matches_expected_format() {
        // crc32("nginx:1.25") == 3454826247
        let out = image_transform_host("127.0.0.1:31999", "nginx:1.25").unwrap();
        assert_eq!(out, "127.0.0.1:31999/library/nginx:1.25-zarf-3454826247");

        // crc32("ghcr.io/stefanprodan/podinfo:6.4.0") == 3927434043
        let out =
            image_transform_host("127.0.0.1:31999", "ghcr.io/stefanprodan/podinfo:6.4.0").unwrap();
        assert_eq!(
            out,
            "127.0.0.1:31999/stefanprodan/podinfo:6.4.0-zarf-3927434043"
        );
    }

    #[test]
    fn image_transform_is_deterministic() {
        let a = image_transform_host("127.0.0.1:31999", "registry.example.com/team/app:2.0.1")
            .unwrap();
        let b = image_transform_host("127.0.0.1:31999", "registry.example.com/team/app:2.0.1")
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "127.0.0.1:31999/team/app:2.0.1-zarf-3388322799");
    }

    #[test]
    fn image_transform_digest_pinned() {
        let digest = "sha256:c8d5e67f3a0c67a4eab5c2c4dd1b7e4cdb98cbbcc87b6a70671054e31ab5dd37";
        let src = format!("nginx@{digest}");
        let out = image_transform_host("127.0.0.1:31999", &src).unwrap();
        assert_eq!(
            out,
            "127.0.0.1:31999/library/nginx@sha256-c8d5e67f3a0c67a4eab5c2c4dd1b7e4cdb98cbbcc87b6a70671054e31ab5dd37-zarf-1260415738"
        );
    }

    #[test]
    fn image_transform_without_checksum() {
        let out =
            image_transform_host_without_checksum("127.0.0.1:31999", "nginx:1.25").unwrap();
        assert_eq!(out, "127.0.0.1:31999/library/nginx:1.25");
    }

    #[test]
    fn git_transform_matches_expected_format() {
        // crc32("github.com/stefanprodan/podinfo") == 1646971829
        let out = git_transform_url(
            "https://git-server.com",
            "https://github.com/stefanprodan/podinfo.git",
            "a-push-user",
        )
        .unwrap();
        assert_eq!(
            out,
            "https://git-server.com/a-push-user/podinfo-1646971829.git"
        );
    }

    #[test]
    fn git_transform_is_stable_with_and_without_dot_git() {
        let a = git_transform_url(
            "https://git-server.com",
            "https://github.com/other/podinfo.git",
            "user",
        )
        .unwrap();
        let b = git_transform_url(
            "https://git-server.com",
            "https://github.com/other/podinfo",
            "user",
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "https://git-server.com/user/podinfo-2495948831.git");
    }

    #[test]
    fn git_transform_rejects_schemeless_url() {
        assert!(git_transform_url("https://git-server.com", "not-a-git-url", "user").is_err());
    }

    #[test]
    fn git_ref_suffix_is_split() {
        let git = GitRef::parse("https://github.com/org/repo.git@v1.2.3").unwrap();
        assert_eq!(git.url, "https://github.com/org/repo.git");
        assert_eq!(git.ref_name, "v1.2.3");

        let plain = GitRef::parse("https://github.com/org/repo.git").unwrap();
        assert!(plain.ref_name.is_empty());
    }

    #[test]
    fn repo_folder_name_includes_fingerprint() {
        let name = repo_folder_name("https://gitea.com/org/repo.git@main").unwrap();
        // crc32("gitea.com/org/repo") == 3992747315
        assert_eq!(name, "repo-3992747315");
    }
}
