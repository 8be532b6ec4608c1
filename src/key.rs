use std::fmt;
use std::str::FromStr;

use der::{Decode, Encode};
use ecdsa::signature::{Signer, Verifier};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey, pkcs1::DecodeRsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::error::{CaError, Result};

/// Smallest RSA modulus accepted for generated keys.
pub const MIN_RSA_BITS: usize = 2048;

/// Key algorithm and strength used when generating a fresh key pair.
///
/// Parses from and prints as `rsa-<bits>`, `p256`, `p384` or `ed25519`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    EcdsaP256,
    EcdsaP384,
    Ed25519,
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        KeyAlgorithm::Rsa { bits: 4096 }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "rsa-{bits}"),
            KeyAlgorithm::EcdsaP256 => f.write_str("p256"),
            KeyAlgorithm::EcdsaP384 => f.write_str("p384"),
            KeyAlgorithm::Ed25519 => f.write_str("ed25519"),
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyAlgorithm::default()),
            "p256" | "ecdsa-p256" => Ok(KeyAlgorithm::EcdsaP256),
            "p384" | "ecdsa-p384" => Ok(KeyAlgorithm::EcdsaP384),
            "ed25519" => Ok(KeyAlgorithm::Ed25519),
            other => {
                let bits = other
                    .strip_prefix("rsa-")
                    .and_then(|bits| bits.parse::<usize>().ok())
                    .ok_or_else(|| {
                        CaError::InvalidInput(format!("Unknown key algorithm: {other}"))
                    })?;
                if bits < MIN_RSA_BITS {
                    return Err(CaError::InvalidInput(format!(
                        "RSA keys must be at least {MIN_RSA_BITS} bits, got {bits}"
                    )));
                }
                Ok(KeyAlgorithm::Rsa { bits })
            }
        }
    }
}

impl TryFrom<String> for KeyAlgorithm {
    type Error = CaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<KeyAlgorithm> for String {
    fn from(value: KeyAlgorithm) -> Self {
        value.to_string()
    }
}

/// Supported key types for certificate operations.
#[derive(Clone, Debug)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
    Ed25519 {
        signing_key: Ed25519SigningKey,
    },
}

impl KeyPair {
    /// Generate a key pair for the given algorithm.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Rsa { bits } => Self::generate_rsa(bits),
            KeyAlgorithm::EcdsaP256 => Ok(Self::generate_ecdsa_p256()),
            KeyAlgorithm::EcdsaP384 => Ok(Self::generate_ecdsa_p384()),
            KeyAlgorithm::Ed25519 => Ok(Self::generate_ed25519()),
        }
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        if bits < MIN_RSA_BITS {
            return Err(CaError::KeyGenerationError(format!(
                "RSA keys must be at least {MIN_RSA_BITS} bits, got {bits}"
            )));
        }
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P256SigningKey::random(&mut rng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P384SigningKey::random(&mut rng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key: Ed25519SigningKey = Ed25519SigningKey::generate(&mut rng);
        KeyPair::Ed25519 { signing_key }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { public, .. } => KeyAlgorithm::Rsa {
                bits: rsa::traits::PublicKeyParts::size(public) * 8,
            },
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::EcdsaP256,
            KeyPair::EcdsaP384 { .. } => KeyAlgorithm::EcdsaP384,
            KeyPair::Ed25519 { .. } => KeyAlgorithm::Ed25519,
        }
    }

    /// The signature algorithm this key signs certificates and requests with.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } => SignatureAlgorithm::Sha256WithECDSA,
            KeyPair::EcdsaP384 { .. } => SignatureAlgorithm::Sha384WithECDSA,
            KeyPair::Ed25519 { .. } => SignatureAlgorithm::Ed25519,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_key_pair(self)
    }

    /// Signs `data` with [`KeyPair::signature_algorithm`].
    ///
    /// ECDSA signatures are returned DER encoded, as X.509 and PKCS#10 carry them.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_error = |e: ecdsa::signature::Error| CaError::SigningError(e.to_string());
        match self {
            KeyPair::Rsa { private, .. } => {
                let signing_key =
                    rsa::pkcs1v15::SigningKey::<Sha256>::new(private.as_ref().clone());
                let signature: rsa::pkcs1v15::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(ecdsa::signature::SignatureEncoding::to_vec(&signature))
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: p256::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                let signature: p384::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::Ed25519 { signing_key } => {
                let signature = signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    /// Encodes the private key as PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der(),
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der(),
            KeyPair::EcdsaP384 { signing_key, .. } => signing_key.to_pkcs8_der(),
            KeyPair::Ed25519 { signing_key } => signing_key.to_pkcs8_der(),
        }
        .map_err(|e| CaError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Decodes a PKCS#8 DER private key, selecting the key type from its algorithm identifier.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)
            .map_err(|e| CaError::MalformedPem(format!("invalid PKCS#8 structure: {e}")))?;
        let malformed = |e: pkcs8::Error| CaError::MalformedPem(e.to_string());

        match info.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der).map_err(malformed)?;
                Ok(Self::from_rsa_private(private))
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                if let Ok(signing_key) = P256SigningKey::from_pkcs8_der(der) {
                    let verifying_key = *signing_key.verifying_key();
                    return Ok(KeyPair::EcdsaP256 {
                        signing_key,
                        verifying_key,
                    });
                }
                let signing_key = P384SigningKey::from_pkcs8_der(der).map_err(|_| {
                    CaError::MalformedPem("unsupported or invalid EC private key".to_string())
                })?;
                let verifying_key = *signing_key.verifying_key();
                Ok(KeyPair::EcdsaP384 {
                    signing_key,
                    verifying_key,
                })
            }
            const_oid::db::rfc8410::ID_ED_25519 => {
                let signing_key = Ed25519SigningKey::from_pkcs8_der(der).map_err(malformed)?;
                Ok(KeyPair::Ed25519 { signing_key })
            }
            oid => Err(CaError::MalformedPem(format!(
                "unsupported private key algorithm {oid}"
            ))),
        }
    }

    /// Decodes a PKCS#1 `RSAPrivateKey` structure.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| CaError::MalformedPem(format!("invalid PKCS#1 RSA key: {e}")))?;
        Ok(Self::from_rsa_private(private))
    }

    fn from_rsa_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair::Rsa {
            private: Box::new(private),
            public,
        }
    }
}

/// The public half of a [`KeyPair`], as carried in certificates and requests.
#[derive(Clone, Debug)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
            KeyPair::Ed25519 { signing_key } => PublicKey::Ed25519(signing_key.verifying_key()),
        }
    }

    /// DER encoded `SubjectPublicKeyInfo`.
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            PublicKey::Rsa(key) => key.to_public_key_der(),
            PublicKey::EcdsaP256(key) => key.to_public_key_der(),
            PublicKey::EcdsaP384(key) => key.to_public_key_der(),
            PublicKey::Ed25519(key) => key.to_public_key_der(),
        }
        .map_err(|e| CaError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    pub fn to_x509spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let der = self.to_spki_der()?;
        SubjectPublicKeyInfoOwned::from_der(&der).map_err(|e| CaError::EncodingError(e.to_string()))
    }

    /// Reads a public key from a `SubjectPublicKeyInfo`.
    ///
    /// Fails with [`CaError::InvalidInput`] for algorithms this crate cannot verify with.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki
            .to_der()
            .map_err(|e| CaError::InvalidInput(e.to_string()))?;
        let invalid = |e: pkcs8::spki::Error| CaError::InvalidInput(e.to_string());

        match spki.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => Ok(PublicKey::Rsa(
                RsaPublicKey::from_public_key_der(&der).map_err(invalid)?,
            )),
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                if let Ok(key) = P256VerifyingKey::from_public_key_der(&der) {
                    return Ok(PublicKey::EcdsaP256(key));
                }
                P384VerifyingKey::from_public_key_der(&der)
                    .map(PublicKey::EcdsaP384)
                    .map_err(invalid)
            }
            const_oid::db::rfc8410::ID_ED_25519 => Ok(PublicKey::Ed25519(
                Ed25519VerifyingKey::from_public_key_der(&der).map_err(invalid)?,
            )),
            oid => Err(CaError::InvalidInput(format!(
                "unsupported public key algorithm {oid}"
            ))),
        }
    }

    /// Verifies `signature` over `data`.
    ///
    /// The algorithm must be one this key type can produce; weak digests are never accepted.
    pub fn verify(
        &self,
        algorithm: &SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> std::result::Result<(), String> {
        match (self, algorithm) {
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha256WithRSA) => {
                verify_rsa::<Sha256>(key, data, signature)
            }
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha384WithRSA) => {
                verify_rsa::<Sha384>(key, data, signature)
            }
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha512WithRSA) => {
                verify_rsa::<Sha512>(key, data, signature)
            }
            (PublicKey::EcdsaP256(key), SignatureAlgorithm::Sha256WithECDSA) => {
                let signature =
                    p256::ecdsa::Signature::from_der(signature).map_err(|e| e.to_string())?;
                key.verify(data, &signature).map_err(|e| e.to_string())
            }
            (PublicKey::EcdsaP384(key), SignatureAlgorithm::Sha384WithECDSA) => {
                let signature =
                    p384::ecdsa::Signature::from_der(signature).map_err(|e| e.to_string())?;
                key.verify(data, &signature).map_err(|e| e.to_string())
            }
            (PublicKey::Ed25519(key), SignatureAlgorithm::Ed25519) => {
                let signature =
                    ed25519_dalek::Signature::from_slice(signature).map_err(|e| e.to_string())?;
                key.verify(data, &signature).map_err(|e| e.to_string())
            }
            (_, algorithm) => Err(format!(
                "signature algorithm {algorithm:?} does not match the public key type"
            )),
        }
    }

    /// RFC 5280 key identifier: SHA-1 of the subject public key bits.
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_x509spki()?;
        let key_id = <Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes());
        Ok(key_id.to_vec())
    }
}

fn verify_rsa<D>(key: &RsaPublicKey, data: &[u8], signature: &[u8]) -> std::result::Result<(), String>
where
    D: sha2::Digest + const_oid::AssociatedOid,
{
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<D>::new(key.clone());
    let signature = rsa::pkcs1v15::Signature::try_from(signature).map_err(|e| e.to_string())?;
    verifying_key
        .verify(data, &signature)
        .map_err(|e| e.to_string())
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_spki_der(), other.to_spki_der()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PublicKey {}
