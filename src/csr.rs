//! PKCS#10 certificate signing requests.

use der::{Decode, Encode};
use tracing::debug;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::cert::SignatureAlgorithm;
use crate::cert::params::DistinguishedName;
use crate::error::{CaError, Result};
use crate::key::{KeyAlgorithm, KeyPair, PublicKey};

/// A PKCS#10 certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSigningRequest {
    pub inner: CertReq,
}

impl CertificateSigningRequest {
    /// Builds a request for `subject` and signs it with `key`.
    pub fn new(subject: &DistinguishedName, key: &KeyPair) -> Result<Self> {
        let info = CertReqInfo {
            version: Version::V1,
            subject: subject.to_x509_name()?,
            public_key: key.public_key().to_x509spki()?,
            attributes: Default::default(),
        };
        let info_der = info
            .to_der()
            .map_err(|e| CaError::EncodingError(e.to_string()))?;
        let signature = key.sign_data(&info_der)?;

        Ok(Self {
            inner: CertReq {
                info,
                algorithm: key.signature_algorithm().into(),
                signature: der::asn1::BitString::from_bytes(&signature)
                    .map_err(|e| CaError::SigningError(e.to_string()))?,
            },
        })
    }

    /// Decodes a DER request. Trailing bytes are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)
            .map_err(|e| CaError::MalformedPem(format!("invalid certificate request: {e}")))?;
        Ok(Self { inner })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| CaError::EncodingError(e.to_string()))
    }

    pub fn to_pem(&self) -> Result<String> {
        crate::codec::encode_csr(self)
    }

    pub fn subject(&self) -> &Name {
        &self.inner.info.subject
    }

    pub fn subject_dn(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.subject())
    }

    /// The requested public key.
    ///
    /// Fails with [`CaError::InvalidCsr`] for key types the CA cannot handle.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.info.public_key)
            .map_err(|e| CaError::InvalidCsr(format!("unusable public key: {e}")))
    }

    /// Checks the proof of possession: the self-signature must verify under the embedded key.
    pub fn verify(&self) -> Result<()> {
        let algorithm = SignatureAlgorithm::from_algorithm_identifier(&self.inner.algorithm)
            .ok_or_else(|| {
                CaError::InvalidCsr(format!(
                    "unsupported signature algorithm {}",
                    self.inner.algorithm.oid
                ))
            })?;
        let public_key = self.public_key()?;
        let info_der = self
            .inner
            .info
            .to_der()
            .map_err(|e| CaError::InvalidCsr(e.to_string()))?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CaError::InvalidCsr("signature is not octet aligned".to_string())
        })?;

        public_key
            .verify(&algorithm, &info_der, signature)
            .map_err(|e| CaError::InvalidCsr(format!("self-signature does not verify: {e}")))
    }
}

/// Generates a fresh key pair and a request for `subject` signed with it.
///
/// Either both are returned or neither.
pub fn generate_csr(
    subject: &DistinguishedName,
    algorithm: KeyAlgorithm,
) -> Result<(KeyPair, CertificateSigningRequest)> {
    let key = KeyPair::generate(algorithm)?;
    let csr = CertificateSigningRequest::new(subject, &key)?;
    debug!(%subject, %algorithm, "generated certificate signing request");
    Ok((key, csr))
}
