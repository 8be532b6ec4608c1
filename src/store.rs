//! Loading, creating and persisting the CA identity.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use time::OffsetDateTime;
use tracing::{info, warn};
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use crate::codec;
use crate::error::{CaError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyAlgorithm, KeyPair};

/// The CA's private key together with its self-signed root certificate.
///
/// Constructed only through [`load_ca`] or [`CaIdentity::generate`], both of
/// which guarantee the key matches the certificate.
#[derive(Clone)]
pub struct CaIdentity {
    key: KeyPair,
    cert: Certificate,
}

impl CaIdentity {
    /// Generates a fresh self-signed root for `subject`.
    pub fn generate(
        subject: &DistinguishedName,
        algorithm: KeyAlgorithm,
        validity: Validity,
    ) -> Result<Self> {
        let key = KeyPair::generate(algorithm)?;
        let info = CertificationRequestInfo::builder()
            .subject(subject.to_x509_name()?)
            .subject_public_key(key.public_key())
            .is_ca(true)
            .build();
        let cert = Certificate::new_self_signed(&info, &key, validity)?;
        info!(%subject, %algorithm, serial = %cert.serial_hex(), "generated CA root");
        Ok(Self { key, cert })
    }

    /// Pairs an existing key and root certificate.
    ///
    /// Fails with [`CaError::CaMismatch`] if the certificate does not carry the
    /// key's public half, and with [`CaError::CaCorrupt`] if the root's
    /// self-signature does not verify.
    pub fn from_parts(key: KeyPair, cert: Certificate) -> Result<Self> {
        let cert_key = cert
            .public_key()
            .map_err(|e| CaError::CaCorrupt(format!("CA certificate public key: {e}")))?;
        if cert_key != key.public_key() {
            return Err(CaError::CaMismatch(
                "CA private key does not match the CA certificate".to_string(),
            ));
        }
        cert.verify_signature(&cert_key)
            .map_err(|e| CaError::CaCorrupt(format!("CA certificate is not a valid root: {e}")))?;
        Ok(Self { key, cert })
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    pub fn subject(&self) -> &Name {
        self.cert.subject()
    }

    /// Writes the key and certificate as PEM files.
    ///
    /// Existing files are left alone unless `force` is set. On Unix the key
    /// file is created with mode 0600.
    pub fn save(&self, key_path: &Path, cert_path: &Path, force: bool) -> Result<()> {
        if !force {
            for path in [key_path, cert_path] {
                if path.exists() {
                    return Err(CaError::InvalidInput(format!(
                        "{} already exists",
                        path.display()
                    )));
                }
            }
        }

        write_pem_file(key_path, &codec::encode_key(&self.key)?, true)?;
        write_pem_file(cert_path, &self.cert.to_pem()?, false)?;
        info!(
            key = %key_path.display(),
            cert = %cert_path.display(),
            "saved CA identity"
        );
        Ok(())
    }
}

impl Issuer for CaIdentity {
    fn issuer_name(&self) -> Name {
        self.cert.subject().clone()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}

impl fmt::Debug for CaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaIdentity")
            .field("subject", &self.cert.subject_dn().to_string())
            .field("algorithm", &self.key.algorithm())
            .field("serial", &self.cert.serial_hex())
            .finish_non_exhaustive()
    }
}

/// Writes a PEM document, replacing any existing file. Private files get mode
/// 0600 on Unix.
pub fn write_pem_file(path: &Path, contents: &str, private: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options
        .open(path)
        .map_err(|e| CaError::InvalidInput(format!("{}: {e}", path.display())))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| CaError::InvalidInput(format!("{}: {e}", path.display())))?;
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| CaError::CaNotFound(format!("{}: {e}", path.display())))
}

/// Loads the CA key and root certificate from PEM files.
///
/// # Errors
/// * [`CaError::CaNotFound`] if either file is missing or unreadable.
/// * [`CaError::CaCorrupt`] if either file does not decode or the root's self-signature does not verify.
/// * [`CaError::CaMismatch`] if the key does not belong to the certificate.
pub fn load_ca(key_path: impl AsRef<Path>, cert_path: impl AsRef<Path>) -> Result<CaIdentity> {
    let key_path = key_path.as_ref();
    let cert_path = cert_path.as_ref();

    let key_pem = read_file(key_path)?;
    let cert_pem = read_file(cert_path)?;

    let key = codec::decode_key(&key_pem)
        .map_err(|e| CaError::CaCorrupt(format!("{}: {e}", key_path.display())))?;
    let cert = codec::decode_cert(&cert_pem)
        .map_err(|e| CaError::CaCorrupt(format!("{}: {e}", cert_path.display())))?;

    let identity = CaIdentity::from_parts(key, cert)?;

    match identity.cert.validity() {
        Ok(validity) if !validity.contains(OffsetDateTime::now_utc()) => warn!(
            not_before = %validity.not_before,
            not_after = %validity.not_after,
            "CA certificate is outside its validity period"
        ),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "CA certificate validity could not be read"),
    }
    if !identity.cert.is_ca() {
        warn!("CA certificate lacks a CA basic constraint");
    }

    info!(
        subject = %identity.cert.subject_dn(),
        algorithm = %identity.key.algorithm(),
        "loaded CA"
    );
    Ok(identity)
}
