use der::Encode;
use der::flagset::FlagSet;
use rand::RngCore;
use time::Duration;
use tracing::{debug, info};
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsages, SubjectAltName, SubjectKeyIdentifier,
};
use crate::cert::params::{CertificationRequestInfo, ExtensionParam, Validity};
use crate::csr::CertificateSigningRequest;
use crate::error::{CaError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::store::CaIdentity;

/// Number of random bytes in a serial number; the top bit is cleared, leaving 127 bits of entropy.
pub const SERIAL_NUMBER_LEN: usize = 16;

/// Draws a fresh serial number from the thread-local CSPRNG.
///
/// The result is a positive integer in big-endian form: top bit clear, never zero.
pub fn random_serial_number() -> Vec<u8> {
    let mut rng = rand::rng();
    loop {
        let mut bytes = [0u8; SERIAL_NUMBER_LEN];
        rng.fill_bytes(&mut bytes);
        bytes[0] &= 0x7f;
        if bytes.iter().any(|b| *b != 0) {
            return bytes.to_vec();
        }
    }
}

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the X.509 name written into the issuer field of issued certificates.
    fn issuer_name(&self) -> Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// # Arguments
    /// * `cert_request` - The subject, public key and requested usages of the certificate.
    /// * `validity` - The validity period of the certificate.
    ///
    /// # Returns
    /// The signed certificate. Nothing is returned unless signing succeeded.
    fn issue(&self, cert_request: &CertificationRequestInfo, validity: Validity) -> Result<Certificate> {
        let signing_key = self.signing_key();
        let signature_algo = signing_key.signature_algorithm();
        let subject_key = &cert_request.subject_public_key;

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
        };
        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: signing_key.public_key().key_identifier()?,
        };
        let subject_key_id = SubjectKeyIdentifier(subject_key.key_identifier()?);

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(subject_key_id, false)?,
            ExtensionParam::from_extension(authority_key_id, false)?,
        ];

        let mut key_usage_flags: FlagSet<KeyUsages> = KeyUsages::DigitalSignature.into();

        if cert_request.is_ca {
            key_usage_flags |= KeyUsages::KeyCertSign;
            key_usage_flags |= KeyUsages::CRLSign;
        }

        // Only RSA keys can encipher a key transport secret.
        if !cert_request.usages.is_empty() && matches!(subject_key, PublicKey::Rsa(_)) {
            key_usage_flags |= KeyUsages::KeyEncipherment;
        }

        extensions.push(ExtensionParam::from_extension(KeyUsage(key_usage_flags), true)?);

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        let combined_extensions = cert_request
            .extensions
            .iter()
            .cloned()
            .chain(extensions)
            .collect();

        let tbs_cert = crate::tbs_certificate::TbsCertificate {
            serial_number: random_serial_number(),
            signature_algorithm: signature_algo,
            issuer: self.issuer_name(),
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key_info: subject_key.to_x509spki()?,
            extensions: combined_extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let tbs_der = tbs_cert_inner
            .to_der()
            .map_err(|e| CaError::EncodingError(e.to_string()))?;

        let signature = signing_key.sign_data(&tbs_der)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)
                .map_err(|e| CaError::SigningError(e.to_string()))?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issues a leaf certificate for `csr`, signed by `ca` and valid from now for `lifetime`.
///
/// The request's self-signature is checked first; a request that fails it is
/// rejected with [`CaError::InvalidCsr`]. Subject and public key are copied from
/// the request, the issuer name from the CA certificate's subject.
pub fn issue(
    csr: &CertificateSigningRequest,
    ca: &CaIdentity,
    lifetime: Duration,
) -> Result<Certificate> {
    csr.verify()?;

    let subject = csr.subject();
    if subject.0.is_empty() {
        return Err(CaError::InvalidCsr("request has an empty subject".to_string()));
    }
    let subject_dn = csr.subject_dn();

    let mut extensions = Vec::new();
    if let Some(san) = SubjectAltName::for_dns_name(&subject_dn.common_name) {
        extensions.push(ExtensionParam::from_extension(san, false)?);
    }

    let cert_info = CertificationRequestInfo::builder()
        .subject(subject.clone())
        .subject_public_key(csr.public_key()?)
        .usages(vec![
            ExtendedKeyUsageOption::ServerAuth,
            ExtendedKeyUsageOption::ClientAuth,
        ])
        .extensions(extensions)
        .build();

    debug!(subject = %subject, "issuing certificate");
    let certificate = ca.issue(&cert_info, Validity::for_duration(lifetime)?)?;
    info!(
        subject = %subject,
        serial = %certificate.serial_hex(),
        "issued certificate"
    );
    Ok(certificate)
}
