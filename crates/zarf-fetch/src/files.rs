//! File and data-injection fetchers
//!
//! Files materialize into the component staging tree by positional index so
//! duplicate basenames cannot clash. Data injection sources are tarred at
//! create time; the actual injection happens during deploy.

use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use zarf_core::schema::{DataInjection, File};

use crate::error::{FetchError, Result};
use crate::http;

/// Materialize one file declaration into the staging tree.
///
/// `index` is the file's position in the component, used as its on-disk
/// name. A declared shasum is verified after materialization and a mismatch
/// is fatal.
pub async fn fetch_file(
    client: &reqwest::Client,
    base_dir: &Path,
    staging_dir: &Path,
    index: usize,
    file: &File,
) -> Result<PathBuf> {
    std::fs::create_dir_all(staging_dir)?;
    let dest = staging_dir.join(index.to_string());

    if http::is_url(&file.source) {
        http::download_file(client, &file.source, &dest, None).await?;
    } else {
        let src = base_dir.join(&file.source);
        if !src.is_file() {
            return Err(FetchError::not_found(
                &file.source,
                "local file does not exist",
            ));
        }
        std::fs::copy(&src, &dest)?;
    }

    if !file.shasum.is_empty() {
        http::verify_file_shasum(&dest, &file.shasum)?;
    }

    set_file_mode(&dest, file.executable)?;
    Ok(dest)
}

/// Executables get 0700, everything else 0600
#[cfg(unix)]
fn set_file_mode(path: &Path, executable: bool) -> Result<()> {
    let mode = if executable { 0o700 } else { 0o600 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

/// Archive a data injection source into `staging_dir/<index>.tar`
pub fn stage_data_injection(
    base_dir: &Path,
    staging_dir: &Path,
    index: usize,
    injection: &DataInjection,
) -> Result<PathBuf> {
    std::fs::create_dir_all(staging_dir)?;
    let dest = staging_dir.join(format!("{index}.tar"));
    let src = base_dir.join(&injection.source);

    if src.is_dir() {
        zarf_core::archive::tar_directory(&src, &dest)?;
    } else if src.is_file() {
        let file = std::fs::File::create(&dest)?;
        let mut builder = tar::Builder::new(file);
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "data".to_string());
        builder.append_path_with_name(&src, name)?;
        builder.finish()?;
    } else {
        return Err(FetchError::not_found(
            &injection.source,
            "data injection source does not exist",
        ));
    }

    Ok(dest)
}

/// Place a staged file at its deploy target, applying symlinks
pub fn place_file(staged: &Path, file: &File, target_base: Option<&Path>) -> Result<PathBuf> {
    let target = match target_base {
        Some(base) => base.join(file.target.trim_start_matches('/')),
        None => PathBuf::from(&file.target),
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(staged, &target)?;
    set_file_mode(&target, file.executable)?;

    for link in &file.symlinks {
        let link_path = match target_base {
            Some(base) => base.join(link.trim_start_matches('/')),
            None => PathBuf::from(link),
        };
        if let Some(parent) = link_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if link_path.exists() || link_path.is_symlink() {
            std::fs::remove_file(&link_path)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link_path)?;
        #[cfg(not(unix))]
        std::fs::copy(&target, &link_path)?;
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_decl(source: &str, target: &str) -> File {
        File {
            source: source.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn local_file_is_copied_by_index() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("hello.txt"), "hi\n").unwrap();

        let staging = temp.path().join("staging/files");
        let client = reqwest::Client::new();
        let dest = fetch_file(
            &client,
            temp.path(),
            &staging,
            0,
            &file_decl("hello.txt", "/tmp/hello.txt"),
        )
        .await
        .unwrap();

        assert_eq!(dest, staging.join("0"));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hi\n");
    }

    #[tokio::test]
    async fn shasum_mismatch_is_fatal() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("hello.txt"), "hi\n").unwrap();

        let mut decl = file_decl("hello.txt", "/tmp/hello.txt");
        decl.shasum = "0".repeat(64);

        let client = reqwest::Client::new();
        let err = fetch_file(
            &client,
            temp.path(),
            &temp.path().join("staging"),
            0,
            &decl,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::ShasumMismatch { .. }));
    }

    #[tokio::test]
    async fn matching_shasum_passes() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("hello.txt"), "hi\n").unwrap();

        let mut decl = file_decl("hello.txt", "/tmp/hello.txt");
        // sha256("hi\n")
        decl.shasum =
            "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4".to_string();

        let client = reqwest::Client::new();
        fetch_file(
            &client,
            temp.path(),
            &temp.path().join("staging"),
            0,
            &decl,
        )
        .await
        .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn executable_files_get_exec_bits() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("tool.sh"), "#!/bin/sh\n").unwrap();

        let mut decl = file_decl("tool.sh", "/tmp/tool.sh");
        decl.executable = true;

        let client = reqwest::Client::new();
        let dest = fetch_file(
            &client,
            temp.path(),
            &temp.path().join("staging"),
            0,
            &decl,
        )
        .await
        .unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn data_injection_directory_is_tarred() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("payload");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("data.txt"), "payload").unwrap();

        let injection = DataInjection {
            source: "payload".to_string(),
            ..Default::default()
        };

        let tar_path =
            stage_data_injection(temp.path(), &temp.path().join("staging/data"), 0, &injection)
                .unwrap();
        assert!(tar_path.is_file());
        assert!(tar_path.to_string_lossy().ends_with("0.tar"));
    }

    #[test]
    fn place_file_applies_symlinks() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("staged");
        std::fs::write(&staged, "content").unwrap();

        let mut decl = file_decl("unused", "/opt/app/file.txt");
        decl.symlinks = vec!["/opt/app/link.txt".to_string()];

        let root = temp.path().join("root");
        let target = place_file(&staged, &decl, Some(&root)).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "content");

        let link = root.join("opt/app/link.txt");
        assert_eq!(std::fs::read_to_string(link).unwrap(), "content");
    }
}
