use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use certkit_ca::cert::params::{DistinguishedName, MAX_VALIDITY_DAYS, Validity};
use certkit_ca::client::request_certificate;
use certkit_ca::codec;
use certkit_ca::config::ServiceConfig;
use certkit_ca::csr::generate_csr;
use certkit_ca::key::KeyAlgorithm;
use certkit_ca::server::IssuanceServer;
use certkit_ca::store::{CaIdentity, write_pem_file};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "certkit-ca")]
#[command(about = "Minimal certificate authority: signs PKCS#10 requests over TCP")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the CA and serve issuance requests until Ctrl-C
    Serve {
        /// Address to listen on, e.g. 0.0.0.0:8000
        #[arg(long)]
        listen: Option<String>,

        #[command(flatten)]
        ca: CaPaths,
    },

    /// Generate a self-signed root and write it to the CA key and certificate paths
    InitCa {
        #[command(flatten)]
        ca: CaPaths,

        #[command(flatten)]
        subject: SubjectArgs,

        /// Key algorithm: rsa-<bits>, p256, p384 or ed25519
        #[arg(long, default_value = "p384")]
        algorithm: KeyAlgorithm,

        /// Validity of the root in days
        #[arg(
            long,
            default_value_t = 3650,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_VALIDITY_DAYS))
        )]
        days: u32,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Generate a private key and certificate signing request
    GenCsr {
        /// Where to write the private key
        #[arg(long)]
        key_out: PathBuf,

        /// Where to write the signing request
        #[arg(long)]
        csr_out: PathBuf,

        #[command(flatten)]
        subject: SubjectArgs,

        /// Key algorithm, defaults to the configured one
        #[arg(long)]
        algorithm: Option<KeyAlgorithm>,
    },

    /// Submit a signing request to a running server
    Request {
        /// Server address
        #[arg(long, default_value = "127.0.0.1:8000")]
        server: String,

        /// PEM signing request to submit
        #[arg(long)]
        csr: PathBuf,

        /// Where to write the issued certificate
        #[arg(long)]
        cert_out: PathBuf,

        /// Connect and read timeout in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },
}

#[derive(Args)]
struct CaPaths {
    /// CA private key file
    #[arg(long)]
    ca_key: Option<PathBuf>,

    /// CA certificate file
    #[arg(long)]
    ca_cert: Option<PathBuf>,
}

/// Subject attributes; unset ones fall back to the configured subject.
#[derive(Args)]
struct SubjectArgs {
    /// Common name (CN)
    #[arg(long, alias = "subject-cn")]
    cn: Option<String>,

    /// Country (C)
    #[arg(long)]
    country: Option<String>,

    /// State or province (ST)
    #[arg(long)]
    state: Option<String>,

    /// Locality (L)
    #[arg(long)]
    locality: Option<String>,

    /// Organization (O)
    #[arg(long)]
    organization: Option<String>,

    /// Organizational unit (OU)
    #[arg(long)]
    organization_unit: Option<String>,
}

impl SubjectArgs {
    fn apply(self, base: &DistinguishedName) -> DistinguishedName {
        DistinguishedName {
            common_name: self.cn.unwrap_or_else(|| base.common_name.clone()),
            country: self.country.or_else(|| base.country.clone()),
            state: self.state.or_else(|| base.state.clone()),
            locality: self.locality.or_else(|| base.locality.clone()),
            organization: self.organization.or_else(|| base.organization.clone()),
            organization_unit: self
                .organization_unit
                .or_else(|| base.organization_unit.clone()),
        }
    }
}

impl CaPaths {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(key_path) = self.ca_key {
            config.ca.key_path = key_path;
        }
        if let Some(cert_path) = self.ca_cert {
            config.ca.cert_path = cert_path;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    match cli.command {
        Commands::Serve { listen, ca } => {
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            ca.apply(&mut config);

            let server = IssuanceServer::start(&config)
                .await
                .context("starting issuance server")?;
            server
                .serve_with_shutdown(async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("received Ctrl-C, shutting down");
                    }
                })
                .await?;
        }
        Commands::InitCa {
            ca,
            subject,
            algorithm,
            days,
            force,
        } => {
            ca.apply(&mut config);
            if subject.cn.is_none() {
                bail!("--cn is required for the root certificate");
            }
            let subject = subject.apply(&DistinguishedName::default());
            let validity = Validity::for_days(i64::from(days))?;
            let identity = CaIdentity::generate(&subject, algorithm, validity)?;
            identity.save(&config.ca.key_path, &config.ca.cert_path, force)?;
            println!(
                "wrote {} and {}",
                config.ca.key_path.display(),
                config.ca.cert_path.display()
            );
        }
        Commands::GenCsr {
            key_out,
            csr_out,
            subject,
            algorithm,
        } => {
            let subject = subject.apply(&config.request.subject);
            let algorithm = algorithm.unwrap_or(config.request.key_algorithm);
            let (key, csr) = generate_csr(&subject, algorithm)?;
            write_pem_file(&key_out, &codec::encode_key(&key)?, true)?;
            write_pem_file(&csr_out, &csr.to_pem()?, false)?;
            println!("wrote {} and {}", key_out.display(), csr_out.display());
        }
        Commands::Request {
            server,
            csr,
            cert_out,
            timeout_ms,
        } => {
            let pem = read(&csr)?;
            let request = codec::decode_csr(pem)?;
            let cert =
                request_certificate(server.as_str(), &request, Duration::from_millis(timeout_ms))
                    .await?;
            write_pem_file(&cert_out, &cert.to_pem()?, false)?;
            println!(
                "wrote {} (serial {})",
                cert_out.display(),
                cert.serial_hex()
            );
        }
    }

    Ok(())
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}
