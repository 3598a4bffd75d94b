//! Package definition signing
//!
//! Signs `zarf.yaml` with a minisign secret key, producing the detached
//! `zarf.yaml.sig`. Verification only needs the public counterpart, so
//! air-gapped consumers can validate without any key exchange ceremony.

use std::io::Cursor;
use std::path::Path;

use minisign::{PublicKeyBox, SecretKey, SecretKeyBox, SignatureBox};

use crate::error::{CoreError, Result};
use crate::layout::PackagePaths;

/// Load a minisign secret key, trying the empty password first so
/// unencrypted keys never prompt.
pub fn load_secret_key(key_path: &Path, password: Option<String>) -> Result<SecretKey> {
    let content = std::fs::read_to_string(key_path)?;
    let sk_box = SecretKeyBox::from_string(&content)
        .map_err(|e| CoreError::Signing(format!("failed to parse secret key: {e}")))?;

    let password = password.or_else(|| Some(String::new()));
    sk_box
        .into_secret_key(password)
        .map_err(|e| CoreError::Signing(format!("failed to decrypt secret key: {e}")))
}

/// Sign the package definition and write the signature next to it
pub fn sign_package(paths: &PackagePaths, secret_key: &SecretKey) -> Result<()> {
    let data = std::fs::read(paths.zarf_yaml())?;

    let signature = minisign::sign(None, secret_key, Cursor::new(&data), None, None)
        .map_err(|e| CoreError::Signing(format!("failed to sign package definition: {e}")))?;

    std::fs::write(paths.signature(), signature.to_string())?;
    Ok(())
}

/// Verify `zarf.yaml.sig` against the given public key
pub fn verify_package(paths: &PackagePaths, public_key_path: &Path) -> Result<()> {
    let pk_content = std::fs::read_to_string(public_key_path)?;
    let pk = PublicKeyBox::from_string(&pk_content)
        .and_then(|b| b.into_public_key())
        .map_err(|e| CoreError::Signing(format!("failed to parse public key: {e}")))?;

    let sig_path = paths.signature();
    if !sig_path.is_file() {
        return Err(CoreError::integrity(
            sig_path.to_string_lossy(),
            "package is not signed",
        ));
    }

    let sig_content = std::fs::read_to_string(&sig_path)?;
    let signature = SignatureBox::from_string(&sig_content)
        .map_err(|e| CoreError::Signing(format!("failed to parse signature: {e}")))?;

    let data = std::fs::read(paths.zarf_yaml())?;
    minisign::verify(&pk, &signature, Cursor::new(&data), true, false, false).map_err(|_| {
        CoreError::integrity(
            paths.zarf_yaml().to_string_lossy(),
            "signature verification failed",
        )
    })
}
