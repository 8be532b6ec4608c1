mod util;

use std::collections::HashSet;

use certkit_ca::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsages, SubjectAltName, SubjectKeyIdentifier,
};
use certkit_ca::cert::params::MAX_VALIDITY_DAYS;
use certkit_ca::codec;
use certkit_ca::config::ServiceConfig;
use certkit_ca::csr::generate_csr;
use certkit_ca::error::CaError;
use certkit_ca::issuer::issue;
use certkit_ca::key::{KeyAlgorithm, KeyPair};
use certkit_ca::store::load_ca;
use time::{Duration, OffsetDateTime};
use x509_cert::spki::AlgorithmIdentifierOwned;

pub type Result<T> = std::result::Result<T, CaError>;

/// An issued certificate names the CA as issuer, verifies under the CA key and
/// carries the requested subject and public key.
#[test]
fn issued_certificate_matches_request() -> Result<()> {
    let ca = util::generate_ca();
    for algorithm in [
        KeyAlgorithm::EcdsaP256,
        KeyAlgorithm::EcdsaP384,
        KeyAlgorithm::Ed25519,
        KeyAlgorithm::Rsa { bits: 2048 },
    ] {
        let (key, csr) = generate_csr(&util::subject("test.example.org"), algorithm)?;
        let cert = issue(&csr, &ca, Duration::days(30))?;

        cert.verify_signature(&ca.key().public_key())?;
        assert_eq!(cert.issuer(), ca.subject());
        assert_eq!(cert.subject(), csr.subject());
        assert_eq!(cert.public_key()?, key.public_key());
        assert!(
            cert.verify_signature(&key.public_key()).is_err(),
            "leaf must not be self-signed"
        );
    }
    Ok(())
}

/// Every CA key type can sign.
#[test]
fn every_ca_algorithm_signs() -> Result<()> {
    for algorithm in [
        KeyAlgorithm::EcdsaP256,
        KeyAlgorithm::EcdsaP384,
        KeyAlgorithm::Ed25519,
        KeyAlgorithm::Rsa { bits: 2048 },
    ] {
        let ca = util::generate_ca_with(algorithm);
        let (_, csr) = generate_csr(&util::subject("leaf.example.org"), KeyAlgorithm::EcdsaP256)?;
        let cert = issue(&csr, &ca, Duration::days(1))?;
        cert.verify_signature(&ca.key().public_key())?;
        assert_eq!(
            cert.inner.signature_algorithm,
            AlgorithmIdentifierOwned::from(ca.key().signature_algorithm())
        );
    }
    Ok(())
}

#[test]
fn validity_starts_now_and_spans_lifetime() -> Result<()> {
    let ca = util::generate_ca();
    let (_, csr) = generate_csr(&util::subject("test.example.org"), KeyAlgorithm::EcdsaP256)?;

    let before = OffsetDateTime::now_utc() - Duration::seconds(1);
    let cert = issue(&csr, &ca, Duration::days(90))?;
    let after = OffsetDateTime::now_utc() + Duration::seconds(1);

    let validity = cert.validity()?;
    assert!(validity.not_before >= before && validity.not_before <= after);
    assert_eq!(validity.not_after - validity.not_before, Duration::days(90));
    Ok(())
}

#[test]
fn out_of_range_lifetime_is_refused() -> Result<()> {
    let ca = util::generate_ca();
    let (_, csr) = generate_csr(&util::subject("test.example.org"), KeyAlgorithm::EcdsaP256)?;

    for lifetime in [Duration::days(4_000_000), Duration::MAX, Duration::ZERO, Duration::days(-1)] {
        assert!(
            matches!(issue(&csr, &ca, lifetime), Err(CaError::InvalidInput(_))),
            "{lifetime} accepted"
        );
    }

    let mut config = ServiceConfig::default();
    config.ca.validity_days = 4_000_000;
    assert!(matches!(config.validate(), Err(CaError::ConfigError(_))));

    config.ca.validity_days = MAX_VALIDITY_DAYS;
    config.validate()?;
    issue(&csr, &ca, config.ca.lifetime())?;
    Ok(())
}

#[test]
fn serial_numbers_never_repeat() -> Result<()> {
    let ca = util::generate_ca();
    let (_, csr) = generate_csr(&util::subject("test.example.org"), KeyAlgorithm::Ed25519)?;

    let mut serials = HashSet::new();
    for _ in 0..500 {
        let cert = issue(&csr, &ca, Duration::days(1))?;
        let serial = cert.serial_number();
        assert!(!serial.is_empty() && serial.len() <= 16);
        assert!(serials.insert(serial), "serial repeated");
    }
    Ok(())
}

#[test]
fn leaf_extensions() -> Result<()> {
    let ca = util::generate_ca();

    let (_, csr) = generate_csr(
        &util::subject("Test.Example.org"),
        KeyAlgorithm::Rsa { bits: 2048 },
    )?;
    let cert = issue(&csr, &ca, Duration::days(1))?;

    assert_eq!(
        cert.extension::<BasicConstraints>()?,
        Some(BasicConstraints { is_ca: false })
    );
    assert!(!cert.is_ca());

    let KeyUsage(usages) = cert.extension::<KeyUsage>()?.unwrap();
    assert!(usages.contains(KeyUsages::DigitalSignature));
    assert!(usages.contains(KeyUsages::KeyEncipherment));
    assert!(!usages.contains(KeyUsages::KeyCertSign));

    let eku = cert.extension::<ExtendedKeyUsage>()?.unwrap();
    assert!(eku.usage.contains(&ExtendedKeyUsageOption::ServerAuth));
    assert!(eku.usage.contains(&ExtendedKeyUsageOption::ClientAuth));

    let san = cert.extension::<SubjectAltName>()?.unwrap();
    assert_eq!(san.names, vec!["test.example.org".to_string()]);

    let ca_ski = ca.certificate().extension::<SubjectKeyIdentifier>()?.unwrap();
    let aki = cert.extension::<AuthorityKeyIdentifier>()?.unwrap();
    assert_eq!(aki.key_identifier, ca_ski.0);

    let ski = cert.extension::<SubjectKeyIdentifier>()?.unwrap();
    assert_eq!(ski.0, cert.public_key()?.key_identifier()?);

    let critical: Vec<_> = cert
        .extensions()
        .into_iter()
        .filter(|ext| ext.critical)
        .map(|ext| ext.oid)
        .collect();
    assert_eq!(critical.len(), 2);
    Ok(())
}

#[test]
fn non_hostname_common_name_gets_no_san() -> Result<()> {
    let ca = util::generate_ca();
    let (_, csr) = generate_csr(&util::subject("Jane Doe's laptop"), KeyAlgorithm::EcdsaP256)?;
    let cert = issue(&csr, &ca, Duration::days(1))?;
    assert_eq!(cert.extension::<SubjectAltName>()?, None);

    let KeyUsage(usages) = cert.extension::<KeyUsage>()?.unwrap();
    assert!(!usages.contains(KeyUsages::KeyEncipherment));
    Ok(())
}

#[test]
fn tampered_request_is_refused() -> Result<()> {
    let ca = util::generate_ca();
    let (_, mut csr) = generate_csr(&util::subject("test.example.org"), KeyAlgorithm::EcdsaP256)?;
    csr.inner.info.subject = util::subject("evil.example.org").to_x509_name()?;

    assert!(matches!(
        issue(&csr, &ca, Duration::days(1)),
        Err(CaError::InvalidCsr(_))
    ));
    Ok(())
}

#[test]
fn substituted_public_key_is_refused() -> Result<()> {
    let ca = util::generate_ca();
    let (_, mut csr) = generate_csr(&util::subject("test.example.org"), KeyAlgorithm::Ed25519)?;
    csr.inner.info.public_key = KeyPair::generate_ed25519().public_key().to_x509spki()?;

    assert!(matches!(
        issue(&csr, &ca, Duration::days(1)),
        Err(CaError::InvalidCsr(_))
    ));
    Ok(())
}

#[test]
fn ca_files_round_trip() -> Result<()> {
    let files = util::write_ca_files();
    let loaded = load_ca(&files.key_path, &files.cert_path)?;
    assert_eq!(loaded.certificate(), files.ca.certificate());

    let cert_pem = codec::encode_cert(files.ca.certificate())?;
    assert_eq!(&codec::decode_cert(&cert_pem)?, files.ca.certificate());
    assert_eq!(std::fs::read_to_string(&files.cert_path).unwrap(), cert_pem);

    let key_pem = codec::encode_key(files.ca.key())?;
    assert_eq!(codec::decode_key(&key_pem)?.public_key(), files.ca.key().public_key());
    Ok(())
}

#[test]
fn issued_certificate_pem_round_trip() -> Result<()> {
    let ca = util::generate_ca();
    let (_, csr) = generate_csr(&util::subject("test.example.org"), KeyAlgorithm::EcdsaP384)?;
    let cert = issue(&csr, &ca, Duration::days(1))?;
    let decoded = codec::decode_cert(cert.to_pem()?)?;
    assert_eq!(decoded, cert);
    decoded.verify_signature(&ca.key().public_key())?;
    Ok(())
}
