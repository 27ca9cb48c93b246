//! Key loading and fingerprinting.
//!
//! A control connection authenticates with an ed25519 or RSA key pair
//! exactly as an interactive SSH client would. Selection precedence for
//! the signing key is: an explicit path, else `~/.ssh/id_ed25519`, else
//! `~/.ssh/id_rsa`, else the process's own host key under
//! `~/.unn/host_key`, generated on first run if none of the above exist.

use std::path::{Path, PathBuf};

use base64::Engine;
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::{Algorithm, PrivateKey, PublicKey};
use sha2::{Digest, Sha256};

use crate::error::UnnError;

/// `SHA256:<base64, no padding>` of a key's wire encoding, matching the
/// convention `ssh-keygen -lf` prints for a public key.
pub fn fingerprint(key: &PublicKey) -> String {
    let encoded = key.to_bytes().unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    let b64 = base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest);
    format!("SHA256:{b64}")
}

/// Load the signing key for a control connection, following the
/// precedence above. `explicit` is the `--identity` CLI flag, if given.
pub fn load_identity(explicit: Option<&Path>) -> Result<PrivateKey, UnnError> {
    if let Some(path) = explicit {
        return read_private_key(path);
    }

    let home = home_dir()?;
    let ed25519 = home.join(".ssh").join("id_ed25519");
    if ed25519.exists() {
        return read_private_key(&ed25519);
    }

    let rsa = home.join(".ssh").join("id_rsa");
    if rsa.exists() {
        return read_private_key(&rsa);
    }

    load_or_generate_host_key(&home.join(".unn").join("host_key"))
}

fn read_private_key(path: &Path) -> Result<PrivateKey, UnnError> {
    let pem = std::fs::read_to_string(path).map_err(|e| {
        UnnError::Configuration(format!("failed to read key {}: {e}", path.display()))
    })?;
    PrivateKey::from_openssh(&pem)
        .map_err(|e| UnnError::Configuration(format!("failed to parse key {}: {e}", path.display())))
}

/// Load the process's own host key, generating and persisting a fresh
/// ed25519 key on first run.
fn load_or_generate_host_key(path: &Path) -> Result<PrivateKey, UnnError> {
    if path.exists() {
        return read_private_key(path);
    }

    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .map_err(|e| UnnError::Configuration(format!("failed to generate host key: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| UnnError::Configuration(format!("failed to create {}: {e}", parent.display())))?;
    }

    let pem = key
        .to_openssh(russh::keys::ssh_key::LineEnding::LF)
        .map_err(|e| UnnError::Configuration(format!("failed to serialize host key: {e}")))?;

    write_private(path, pem.as_bytes())?;

    Ok(key)
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), UnnError> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .and_then(|mut f| {
            use std::io::Write;
            f.write_all(bytes)
        })
        .map_err(|e| UnnError::Configuration(format!("failed to write {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), UnnError> {
    std::fs::write(path, bytes)
        .map_err(|e| UnnError::Configuration(format!("failed to write {}: {e}", path.display())))
}

fn home_dir() -> Result<PathBuf, UnnError> {
    directories::UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or_else(|| UnnError::Configuration("could not determine home directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_key() {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let public = key.public_key();
        assert_eq!(fingerprint(public), fingerprint(public));
        assert!(fingerprint(public).starts_with("SHA256:"));
    }

    #[test]
    fn distinct_keys_fingerprint_differently() {
        let a = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let b = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        assert_ne!(fingerprint(a.public_key()), fingerprint(b.public_key()));
    }

    #[test]
    fn generates_and_persists_host_key() {
        let dir = std::env::temp_dir().join(format!("unn-identity-test-{}", std::process::id()));
        let path = dir.join("host_key");
        let first = load_or_generate_host_key(&path).unwrap();
        let second = load_or_generate_host_key(&path).unwrap();
        assert_eq!(fingerprint(first.public_key()), fingerprint(second.public_key()));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
