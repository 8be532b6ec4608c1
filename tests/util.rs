#![allow(dead_code)]

use std::path::PathBuf;

use certkit_ca::cert::params::{DistinguishedName, Validity};
use certkit_ca::key::KeyAlgorithm;
use certkit_ca::store::CaIdentity;
use tempfile::TempDir;

pub fn ca_subject() -> DistinguishedName {
    DistinguishedName::builder()
        .country("US")
        .organization("Example")
        .common_name("myca.local")
        .build()
}

pub fn generate_ca() -> CaIdentity {
    generate_ca_with(KeyAlgorithm::EcdsaP256)
}

pub fn generate_ca_with(algorithm: KeyAlgorithm) -> CaIdentity {
    CaIdentity::generate(&ca_subject(), algorithm, Validity::for_days(365).unwrap()).unwrap()
}

/// A CA written to `ca.key` and `ca.crt` in a temporary directory.
pub struct CaFiles {
    pub ca: CaIdentity,
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    // Removed on drop.
    pub dir: TempDir,
}

pub fn write_ca_files() -> CaFiles {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("ca.key");
    let cert_path = dir.path().join("ca.crt");
    let ca = generate_ca();
    ca.save(&key_path, &cert_path, false).unwrap();
    CaFiles {
        ca,
        key_path,
        cert_path,
        dir,
    }
}

pub fn subject(common_name: &str) -> DistinguishedName {
    DistinguishedName::builder()
        .organization("Example")
        .common_name(common_name)
        .build()
}
