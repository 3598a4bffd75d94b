//! Git repository mirroring
//!
//! Clones each declared repository into the component staging tree under a
//! collision-proof `<name>-<crc32(url)>` folder. A `url@ref` declaration
//! fetches just that ref and records it on a synthetic branch so the
//! deploy-side push can find it without the original remote.

use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::{Cred, FetchOptions, PushOptions, RemoteCallbacks, Repository};

use zarf_core::state::GitServerInfo;
use zarf_core::transform::{git_transform_url, repo_folder_name, GitRef};

use crate::error::{FetchError, Result};

/// Remote name used for the upstream source during create
const ONLINE_REMOTE: &str = "online-upstream";

/// Remote name used for the in-cluster server during deploy
const OFFLINE_REMOTE: &str = "offline-downstream";

/// Prefix of the synthetic branch recording a `url@ref` checkout
pub const REF_BRANCH_PREFIX: &str = "zarf-ref-";

/// Clone a repository into `dest_parent/<name>-<crc32(url)>`.
///
/// Returns the clone directory. Already-cloned repositories are fetched
/// again rather than re-cloned, keeping the fetcher idempotent against the
/// staging tree.
pub fn mirror(src_url: &str, dest_parent: &Path) -> Result<PathBuf> {
    let git_ref = GitRef::parse(src_url)?;
    let folder = repo_folder_name(src_url)?;
    let dest = dest_parent.join(&folder);

    tracing::info!(url = %git_ref.url, dest = %dest.display(), "mirroring repository");

    let repo = if dest.join(".git").exists() {
        Repository::open(&dest)?
    } else {
        std::fs::create_dir_all(dest_parent)?;
        RepoBuilder::new()
            .clone(&git_ref.url, &dest)
            .map_err(|e| FetchError::fetch(&git_ref.url, e.to_string()))?
    };

    {
        let mut remote = match repo.find_remote(ONLINE_REMOTE) {
            Ok(r) => r,
            Err(_) => repo.remote(ONLINE_REMOTE, &git_ref.url)?,
        };

        if git_ref.ref_name.is_empty() {
            // Full mirror: bring over every branch and tag.
            remote.fetch(
                &["refs/heads/*:refs/heads/*", "refs/tags/*:refs/tags/*"],
                Some(FetchOptions::new().prune(git2::FetchPrune::On)),
                None,
            )?;
        } else {
            fetch_single_ref(&repo, &mut remote, &git_ref.ref_name)?;
        }
    }

    Ok(dest)
}

/// Fetch one ref and pin it on a `zarf-ref-<ref>` branch
fn fetch_single_ref(
    repo: &Repository,
    remote: &mut git2::Remote<'_>,
    ref_name: &str,
) -> Result<()> {
    // Try the ref as a tag first, then as a branch head.
    let candidates = [
        format!("refs/tags/{ref_name}:refs/tags/{ref_name}"),
        format!("refs/heads/{ref_name}:refs/heads/{ref_name}"),
    ];

    let mut fetched = false;
    for refspec in &candidates {
        if remote
            .fetch(&[refspec.as_str()], Some(&mut FetchOptions::new()), None)
            .is_ok()
        {
            fetched = true;
            break;
        }
    }
    if !fetched {
        return Err(FetchError::not_found(
            ref_name,
            "ref exists neither as a tag nor as a branch",
        ));
    }

    let commit = repo
        .revparse_single(ref_name)
        .map_err(|e| FetchError::not_found(ref_name, e.to_string()))?
        .peel_to_commit()
        .map_err(|e| FetchError::fetch(ref_name, e.to_string()))?;

    let branch_name = format!("{REF_BRANCH_PREFIX}{ref_name}");
    repo.branch(&branch_name, &commit, true)?;
    repo.set_head(&format!("refs/heads/{branch_name}"))?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;

    Ok(())
}

/// Push a mirrored repository to the in-cluster git server.
///
/// The target repository name is the mirror folder name, so the fingerprint
/// computed at create time survives into the in-cluster URL.
pub fn push(repo_path: &Path, original_url: &str, server: &GitServerInfo) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    let target_url = git_transform_url(&server.address, original_url, &server.push_username)?;

    tracing::info!(target = %target_url, "pushing repository");

    let mut remote = match repo.find_remote(OFFLINE_REMOTE) {
        Ok(existing) => {
            if existing.url() != Some(target_url.as_str()) {
                repo.remote_set_url(OFFLINE_REMOTE, &target_url)?;
            }
            repo.find_remote(OFFLINE_REMOTE)?
        }
        Err(_) => repo.remote(OFFLINE_REMOTE, &target_url)?,
    };

    let mut callbacks = RemoteCallbacks::new();
    let username = server.push_username.clone();
    let password = server.push_password.clone();
    callbacks.credentials(move |_url, _user, _allowed| {
        Cred::userpass_plaintext(&username, &password)
    });

    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);

    let mut refspecs: Vec<String> = Vec::new();
    for branch in repo.branches(Some(git2::BranchType::Local))? {
        let (branch, _) = branch?;
        if let Some(name) = branch.get().name() {
            refspecs.push(format!("+{name}:{name}"));
        }
    }
    repo.tag_foreach(|_, name| {
        if let Ok(name) = std::str::from_utf8(name) {
            refspecs.push(format!("+{name}:{name}"));
        }
        true
    })?;

    remote
        .push(
            &refspecs.iter().map(String::as_str).collect::<Vec<_>>(),
            Some(&mut options),
        )
        .map_err(|e| FetchError::fetch(&target_url, e.to_string()))?;

    Ok(target_url)
}
