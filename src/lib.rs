//! # CertKit CA - A Minimal Certificate Issuance Service
//!
//! CertKit CA is a small certificate authority built entirely with rustcrypto libraries.
//! It holds a single root key and certificate, accepts PKCS#10 certificate signing
//! requests over TCP and answers each with a certificate signed by the root.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048 bits and up, signed with SHA-256 (PKCS#1 v1.5)
//! - **ECDSA**: P-256 (SHA-256) and P-384 (SHA-384)
//! - **Ed25519**: Edwards curve digital signature algorithm
//!
//! Requests signed with MD5 or SHA-1 are refused.
//!
//! ## Key Features
//!
//! - **Key and CSR generation**: fresh key pair plus a self-signed request for any subject
//! - **PEM codec**: strict decoding of keys, certificates and requests
//! - **CA store**: load, generate and persist the root identity
//! - **Issuance**: random 127-bit serials, issuer copied from the root's subject,
//!   standard leaf extensions
//! - **TCP service**: length-prefixed frames, keep-alive, bounded concurrency and timeouts
//!
//! ## Quick Start
//!
//! ### Issuing a Certificate In-Process
//!
//! ```rust,no_run
//! use certkit_ca::{
//!     cert::params::{DistinguishedName, Validity},
//!     csr::generate_csr,
//!     issuer::issue,
//!     key::KeyAlgorithm,
//!     store::CaIdentity,
//! };
//!
//! # fn main() -> Result<(), certkit_ca::error::CaError> {
//! let ca_subject = DistinguishedName::builder()
//!     .common_name("Example Root CA")
//!     .organization("Example Corp")
//!     .build();
//! let ca = CaIdentity::generate(&ca_subject, KeyAlgorithm::EcdsaP256, Validity::for_days(3650)?)?;
//!
//! let subject = DistinguishedName::builder()
//!     .common_name("test.example.org")
//!     .build();
//! let (_key, csr) = generate_csr(&subject, KeyAlgorithm::EcdsaP256)?;
//!
//! let cert = issue(&csr, &ca, time::Duration::days(365))?;
//! cert.verify_signature(&ca.key().public_key())?;
//! println!("{}", cert.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Running the Service
//!
//! ```rust,no_run
//! use certkit_ca::{config::ServiceConfig, server::IssuanceServer};
//!
//! # async fn run() -> Result<(), certkit_ca::error::CaError> {
//! let config = ServiceConfig::from_file("certkit-ca.toml")?;
//! let server = IssuanceServer::start(&config).await?;
//! server
//!     .serve_with_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Requesting a Certificate
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use certkit_ca::{client::request_certificate, codec::decode_csr};
//!
//! # async fn run() -> Result<(), certkit_ca::error::CaError> {
//! let csr = decode_csr(std::fs::read("request.csr")?)?;
//! let cert = request_certificate("127.0.0.1:8000", &csr, Duration::from_secs(30)).await?;
//! println!("issued serial {}", cert.serial_hex());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`error::CaError`]:
//!
//! ```rust
//! use certkit_ca::{codec::decode_key, error::CaError};
//!
//! match decode_key("invalid pem data") {
//!     Ok(_) => println!("Key imported successfully"),
//!     Err(CaError::MalformedPem(msg)) => println!("Failed to decode key: {}", msg),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation, import/export, and cryptographic operations
//! - [`csr`]: Certificate signing requests
//! - [`codec`]: PEM encoding and decoding
//! - [`cert`]: Certificate encoding/decoding, accessors and extensions
//! - [`store`]: The CA identity and its files
//! - [`issuer`]: Certificate issuing
//! - [`protocol`], [`server`], [`client`]: The network service
//! - [`config`]: Service configuration
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod cert;
pub mod client;
pub mod codec;
pub mod config;
pub mod csr;
pub mod error;
pub mod issuer;
pub mod key;
pub mod protocol;
pub mod server;
pub mod store;
pub mod tbs_certificate;
