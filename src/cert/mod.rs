pub mod extensions;
pub mod params;

use der::{Decode, Encode};
use extensions::ToAndFromX509Extension;
use params::{DistinguishedName, ExtensionParam, Validity};
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{CaError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};

/// Represents the supported signature algorithms for certificates and requests.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
/// MD5 and SHA-1 based algorithms are deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
    /// SHA-384 with RSA encryption (PKCS#1 v1.5).
    Sha384WithRSA,
    /// SHA-512 with RSA encryption (PKCS#1 v1.5).
    Sha512WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// Pure EdDSA over Ed25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// Maps an algorithm identifier back to a supported algorithm.
    ///
    /// Returns `None` for anything unsupported, including weak digests. RSA
    /// identifiers may carry a NULL parameter or none; every other parameter
    /// is refused.
    pub fn from_algorithm_identifier(id: &AlgorithmIdentifierOwned) -> Option<Self> {
        let (algorithm, rsa) = match id.oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => (Self::Sha256WithRSA, true),
            const_oid::db::rfc5912::SHA_384_WITH_RSA_ENCRYPTION => (Self::Sha384WithRSA, true),
            const_oid::db::rfc5912::SHA_512_WITH_RSA_ENCRYPTION => (Self::Sha512WithRSA, true),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => (Self::Sha256WithECDSA, false),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_384 => (Self::Sha384WithECDSA, false),
            const_oid::db::rfc8410::ID_ED_25519 => (Self::Ed25519, false),
            _ => return None,
        };
        match &id.parameters {
            None => Some(algorithm),
            Some(params) if rsa && *params == der::Any::null() => Some(algorithm),
            Some(_) => None,
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA algorithms carry an explicit NULL parameter (RFC 4055); ECDSA and EdDSA carry none.
    fn from(value: SignatureAlgorithm) -> Self {
        let (oid, parameters) = match value {
            SignatureAlgorithm::Sha256WithRSA => (
                const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                Some(der::Any::null()),
            ),
            SignatureAlgorithm::Sha384WithRSA => (
                const_oid::db::rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
                Some(der::Any::null()),
            ),
            SignatureAlgorithm::Sha512WithRSA => (
                const_oid::db::rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
                Some(der::Any::null()),
            ),
            SignatureAlgorithm::Sha256WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_256, None),
            SignatureAlgorithm::Sha384WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_384, None),
            SignatureAlgorithm::Ed25519 => (const_oid::db::rfc8410::ID_ED_25519, None),
        };
        AlgorithmIdentifierOwned { oid, parameters }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides accessors for the fields the issuance service cares about
/// and verification against an issuer's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| CaError::EncodingError(e.to_string()))
    }

    /// Decodes a DER certificate. Trailing bytes are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)
            .map_err(|e| CaError::MalformedPem(format!("invalid certificate: {e}")))?;
        Ok(Self { inner })
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        crate::codec::encode_cert(self)
    }

    pub fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    /// The subject's known attributes.
    pub fn subject_dn(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.subject())
    }

    /// Big-endian serial number bytes, without sign padding.
    pub fn serial_number(&self) -> Vec<u8> {
        let bytes = self.inner.tbs_certificate.serial_number.as_bytes();
        let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        bytes[first_nonzero..].to_vec()
    }

    /// Serial number as lowercase hex, for logging.
    pub fn serial_hex(&self) -> String {
        self.serial_number()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    pub fn validity(&self) -> Result<Validity> {
        let validity = &self.inner.tbs_certificate.validity;
        Ok(Validity {
            not_before: to_offset_date_time(&validity.not_before)?,
            not_after: to_offset_date_time(&validity.not_after)?,
        })
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn extensions(&self) -> Vec<ExtensionParam> {
        self.inner
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .map(|ext| ExtensionParam {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.as_bytes().to_vec(),
            })
            .collect()
    }

    /// Decodes the first extension of type `E`, if present.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.extensions()
            .iter()
            .find(|ext| ext.oid == E::OID)
            .map(|ext| ext.to_extension())
            .transpose()
    }

    /// Whether the certificate carries a CA basic constraint.
    pub fn is_ca(&self) -> bool {
        matches!(
            self.extension::<extensions::BasicConstraints>(),
            Ok(Some(bc)) if bc.is_ca
        )
    }

    /// Verifies the certificate's signature with `issuer_key`.
    ///
    /// Fails with [`CaError::InvalidInput`] if the signature does not verify.
    pub fn verify_signature(&self, issuer_key: &PublicKey) -> Result<()> {
        let algorithm = SignatureAlgorithm::from_algorithm_identifier(&self.inner.signature_algorithm)
            .ok_or_else(|| {
                CaError::InvalidInput(format!(
                    "unsupported signature algorithm {}",
                    self.inner.signature_algorithm.oid
                ))
            })?;
        let tbs = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| CaError::EncodingError(e.to_string()))?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CaError::InvalidInput("signature is not octet aligned".to_string())
        })?;
        issuer_key
            .verify(&algorithm, &tbs, signature)
            .map_err(|e| CaError::InvalidInput(format!("certificate signature: {e}")))
    }

    /// Creates a new self-signed certificate.
    ///
    /// # Arguments
    /// * `cert_info` - The certification request information.
    /// * `key` - The key pair used to sign the certificate.
    /// * `validity` - The validity period of the certificate.
    pub fn new_self_signed(
        cert_info: &params::CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
    ) -> Result<Self> {
        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer {
            name: cert_info.subject.clone(),
            key,
        };
        self_issuer.issue(cert_info, validity)
    }
}

fn to_offset_date_time(time: &x509_cert::time::Time) -> Result<time::OffsetDateTime> {
    let unix = time.to_unix_duration();
    let seconds = i64::try_from(unix.as_secs())
        .map_err(|_| CaError::InvalidInput("certificate time out of range".to_string()))?;
    time::OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| CaError::InvalidInput(e.to_string()))
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::BasicConstraints;
    use crate::cert::params::CertificationRequestInfo;

    fn self_signed(key: &KeyPair, is_ca: bool) -> Certificate {
        let subject = DistinguishedName::builder()
            .common_name("myca.local")
            .organization("Crab widgits SE")
            .build();
        let info = CertificationRequestInfo::builder()
            .subject(subject.to_x509_name().unwrap())
            .subject_public_key(key.public_key())
            .is_ca(is_ca)
            .build();
        Certificate::new_self_signed(&info, key, Validity::for_days(30).unwrap()).unwrap()
    }

    #[test]
    fn test_self_signed_verifies_with_own_key() {
        let key = KeyPair::generate_ecdsa_p256();
        let cert = self_signed(&key, true);
        assert_eq!(cert.subject(), cert.issuer());
        cert.verify_signature(&key.public_key()).unwrap();
        assert!(
            cert.verify_signature(&KeyPair::generate_ecdsa_p256().public_key())
                .is_err()
        );
        assert!(cert.is_ca());
    }

    #[test]
    fn test_der_round_trip() {
        let key = KeyPair::generate_ed25519();
        let cert = self_signed(&key, false);
        let decoded = Certificate::from_der(&cert.to_der().unwrap()).unwrap();
        assert_eq!(decoded, cert);
        assert_eq!(decoded.subject_dn().common_name, "myca.local");
        assert_eq!(decoded.public_key().unwrap(), key.public_key());
        assert!(!decoded.is_ca());
        assert_eq!(
            decoded.extension::<BasicConstraints>().unwrap(),
            Some(BasicConstraints { is_ca: false })
        );
    }

    #[test]
    fn test_validity_is_preserved() {
        let key = KeyPair::generate_ecdsa_p384();
        let cert = self_signed(&key, true);
        let validity = cert.validity().unwrap();
        assert_eq!(
            validity.not_after - validity.not_before,
            time::Duration::days(30)
        );
    }

    #[test]
    fn test_weak_signature_algorithms_are_unknown() {
        let sha1_rsa = AlgorithmIdentifierOwned {
            // sha1WithRSAEncryption
            oid: const_oid::ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5"),
            parameters: None,
        };
        assert_eq!(SignatureAlgorithm::from_algorithm_identifier(&sha1_rsa), None);
    }

    #[test]
    fn test_unexpected_algorithm_parameters_are_refused() {
        for algorithm in [SignatureAlgorithm::Sha256WithRSA, SignatureAlgorithm::Ed25519] {
            let id = AlgorithmIdentifierOwned::from(algorithm);
            assert_eq!(SignatureAlgorithm::from_algorithm_identifier(&id), Some(algorithm));
        }

        let rsa_without_null = AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: None,
        };
        assert_eq!(
            SignatureAlgorithm::from_algorithm_identifier(&rsa_without_null),
            Some(SignatureAlgorithm::Sha256WithRSA)
        );

        let rsa_with_octets = AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(der::Any::new(der::Tag::OctetString, Vec::<u8>::new()).unwrap()),
        };
        assert_eq!(SignatureAlgorithm::from_algorithm_identifier(&rsa_with_octets), None);

        let ecdsa_with_null = AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
            parameters: Some(der::Any::null()),
        };
        assert_eq!(SignatureAlgorithm::from_algorithm_identifier(&ecdsa_with_null), None);
    }
}
