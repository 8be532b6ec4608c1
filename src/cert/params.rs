use std::fmt;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, SetOfVec};
use der::{Tag, Tagged};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::CaError;
use crate::key::PublicKey;

const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATION_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Parameters for building an X.509 certificate.
///
/// This struct contains the subject, public key, and optional extensions for the certificate.
///
/// # Fields
/// * `subject` - The X.509 name of the certificate subject, carried over verbatim.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `usages` - A list of extended key usage options.
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: Name,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name parameters for building an X.509 name.
///
/// Absent or empty attributes are left out of the encoded name. Attributes are
/// encoded in the order C, ST, L, O, OU, CN.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistinguishedName {
    #[builder(into)]
    pub common_name: String,
    #[builder(into)]
    pub country: Option<String>,
    #[builder(into)]
    pub state: Option<String>,
    #[builder(into)]
    pub locality: Option<String>,
    #[builder(into)]
    pub organization: Option<String>,
    #[builder(into)]
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    fn attributes(&self) -> [(ObjectIdentifier, Option<&str>); 6] {
        [
            (COUNTRY, self.country.as_deref()),
            (STATE, self.state.as_deref()),
            (LOCALITY, self.locality.as_deref()),
            (ORGANIZATION, self.organization.as_deref()),
            (ORGANIZATION_UNIT, self.organization_unit.as_deref()),
            (COMMON_NAME, Some(self.common_name.as_str())),
        ]
    }

    /// Converts the distinguished name to an X.509 name.
    ///
    /// The country is encoded as a PrintableString, every other attribute as a UTF8String.
    pub fn to_x509_name(&self) -> Result<Name, CaError> {
        let mut rdns = Vec::new();
        for (oid, value) in self.attributes() {
            let Some(value) = value.filter(|v| !v.is_empty()) else {
                continue;
            };
            let tag = if oid == COUNTRY {
                der::asn1::PrintableStringRef::new(value).map_err(|e| {
                    CaError::InvalidInput(format!("country {value:?} is not printable: {e}"))
                })?;
                Tag::PrintableString
            } else {
                Tag::Utf8String
            };
            let value =
                Any::new(tag, value.as_bytes()).map_err(|e| CaError::InvalidInput(e.to_string()))?;

            let atv = AttributeTypeAndValue { oid, value };
            let set = SetOfVec::try_from(vec![atv])
                .map_err(|e| CaError::InvalidInput(e.to_string()))?;
            rdns.push(RelativeDistinguishedName(set));
        }
        if rdns.is_empty() {
            return Err(CaError::InvalidInput(
                "distinguished name has no attributes".to_string(),
            ));
        }
        Ok(RdnSequence(rdns))
    }

    /// Reads the known attributes out of an X.509 name.
    ///
    /// Unknown attribute types are ignored; when an attribute repeats, the last one wins.
    pub fn from_x509_name(x509dn: &Name) -> Self {
        let mut dn = DistinguishedName::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(value) = attribute_string(&attr.value) else {
                    continue;
                };
                match attr.oid {
                    COMMON_NAME => dn.common_name = value,
                    COUNTRY => dn.country = Some(value),
                    STATE => dn.state = Some(value),
                    LOCALITY => dn.locality = Some(value),
                    ORGANIZATION => dn.organization = Some(value),
                    ORGANIZATION_UNIT => dn.organization_unit = Some(value),
                    _ => {}
                }
            }
        }
        dn
    }
}

fn attribute_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value()).ok().map(str::to_string)
        }
        _ => None,
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = ["C", "ST", "L", "O", "OU", "CN"];
        let mut first = true;
        for (label, (_, value)) in labels.iter().zip(self.attributes()) {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{label}={value}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Certificate validity period.
///
/// This struct represents the `notBefore` and `notAfter` fields in a certificate.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Longest lifetime accepted for a certificate, in days.
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// `days` must lie in `1..=MAX_VALIDITY_DAYS`.
    pub fn for_days(days: i64) -> Result<Self, CaError> {
        if !(1..=i64::from(MAX_VALIDITY_DAYS)).contains(&days) {
            return Err(CaError::InvalidInput(format!(
                "validity of {days} days is outside 1..={MAX_VALIDITY_DAYS}"
            )));
        }
        Self::for_duration(Duration::days(days))
    }

    /// Creates a validity period starting now and lasting `lifetime`.
    ///
    /// Both ends are truncated to whole seconds, the resolution of X.509 times.
    /// The lifetime must be positive and `notAfter` must not pass the year 9999,
    /// the last year a GeneralizedTime can hold.
    pub fn for_duration(lifetime: Duration) -> Result<Self, CaError> {
        if !lifetime.is_positive() {
            return Err(CaError::InvalidInput(format!(
                "certificate lifetime must be positive, got {lifetime}"
            )));
        }
        let now = OffsetDateTime::now_utc();
        let now = now.replace_nanosecond(0).unwrap_or(now);
        let not_after = now
            .checked_add(lifetime)
            .filter(|t| t.year() <= 9999)
            .ok_or_else(|| {
                CaError::InvalidInput(format!(
                    "certificate lifetime {lifetime} ends after the year 9999"
                ))
            })?;
        Ok(Self {
            not_before: now,
            not_after,
        })
    }

    /// Whether `instant` falls inside the period, bounds included.
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// Represents an X.509 extension.
///
/// This struct contains the OID, criticality, and value of an extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    ///
    /// # Arguments
    /// * `extension` - The extension to encode.
    /// * `critical` - Indicates if the extension is critical.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: E,
        critical: bool,
    ) -> Result<Self, CaError> {
        let value = extension.to_x509_extension_value()?;
        Ok(Self {
            oid: E::OID,
            critical,
            value,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E, CaError> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gvsu() -> DistinguishedName {
        DistinguishedName::builder()
            .country("US")
            .state("MI")
            .locality("")
            .organization("Grand Valley State University")
            .organization_unit("IT")
            .common_name("www.gvsu.edu")
            .build()
    }

    #[test]
    fn test_x509_name_round_trip() {
        let dn = gvsu();
        let name = dn.to_x509_name().unwrap();
        // The empty locality is dropped.
        assert_eq!(name.0.len(), 5);

        let decoded = DistinguishedName::from_x509_name(&name);
        assert_eq!(decoded.common_name, "www.gvsu.edu");
        assert_eq!(decoded.country.as_deref(), Some("US"));
        assert_eq!(decoded.organization_unit.as_deref(), Some("IT"));
        assert_eq!(decoded.locality, None);
    }

    #[test]
    fn test_display_skips_empty_attributes() {
        assert_eq!(
            gvsu().to_string(),
            "C=US, ST=MI, O=Grand Valley State University, OU=IT, CN=www.gvsu.edu"
        );
    }

    #[test]
    fn test_commas_survive_encoding() {
        let dn = DistinguishedName::builder()
            .common_name("host.example.org")
            .organization("Example, Inc.")
            .build();
        let decoded = DistinguishedName::from_x509_name(&dn.to_x509_name().unwrap());
        assert_eq!(decoded.organization.as_deref(), Some("Example, Inc."));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        assert!(DistinguishedName::default().to_x509_name().is_err());
    }

    #[test]
    fn test_unprintable_country_is_rejected() {
        let dn = DistinguishedName::builder()
            .common_name("x")
            .country("U@")
            .build();
        assert!(matches!(dn.to_x509_name(), Err(CaError::InvalidInput(_))));
    }

    #[test]
    fn test_validity_truncates_to_seconds() {
        let validity = Validity::for_days(1).unwrap();
        assert_eq!(validity.not_before.nanosecond(), 0);
        assert_eq!(validity.not_after - validity.not_before, Duration::days(1));
        assert!(validity.contains(validity.not_before));
    }

    #[test]
    fn test_out_of_range_lifetimes_are_rejected() {
        for days in [0, -1, i64::from(MAX_VALIDITY_DAYS) + 1, 4_000_000, i64::MAX] {
            assert!(
                matches!(Validity::for_days(days), Err(CaError::InvalidInput(_))),
                "{days} days accepted"
            );
        }
        assert!(Validity::for_days(i64::from(MAX_VALIDITY_DAYS)).is_ok());

        for lifetime in [
            Duration::ZERO,
            Duration::seconds(-60),
            Duration::days(4_000_000),
            Duration::MAX,
        ] {
            assert!(
                matches!(Validity::for_duration(lifetime), Err(CaError::InvalidInput(_))),
                "{lifetime} accepted"
            );
        }
    }
}
