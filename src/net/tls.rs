//! TLS configuration
//!
//! Client contexts are used by [`super::TcpTransport`] when a request asks
//! for a secure connection. Server contexts exist so TLS paths can be
//! exercised against a local listener with a throwaway self-signed
//! certificate.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::{X509NameBuilder, X509};
use std::net::{IpAddr, TcpStream};

/// TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    fn to_openssl_version(self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    ctx: SslContext,
    is_server: bool,
    verify_peer: bool,
    servername: Option<String>,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("is_server", &self.is_server)
            .field("verify_peer", &self.verify_peer)
            .field("servername", &self.servername)
            .finish()
    }
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Server configuration with a freshly generated self-signed certificate
    pub fn server_self_signed(common_name: &str) -> Result<Self, TlsError> {
        let rsa = Rsa::generate(2048)?;
        let key = PKey::from_rsa(rsa)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
        let name = name.build();

        let mut serial = BigNum::new()?;
        serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
        let serial = serial.to_asn1_integer()?;

        let mut cert = X509::builder()?;
        cert.set_version(2)?;
        cert.set_serial_number(&serial)?;
        cert.set_subject_name(&name)?;
        cert.set_issuer_name(&name)?;
        cert.set_pubkey(&key)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(30)?;
        cert.set_not_before(&not_before)?;
        cert.set_not_after(&not_after)?;
        cert.sign(&key, MessageDigest::sha256())?;
        let cert = cert.build();

        let mut ctx = SslContextBuilder::new(SslMethod::tls_server())?;
        ctx.set_certificate(&cert)
            .map_err(|e| TlsError::Certificate(format!("Failed to install certificate: {}", e)))?;
        ctx.set_private_key(&key)
            .map_err(|e| TlsError::Certificate(format!("Failed to install private key: {}", e)))?;
        ctx.check_private_key()?;

        Ok(TlsConfig {
            ctx: ctx.build(),
            is_server: true,
            verify_peer: false,
            servername: None,
        })
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Perform a client handshake over `stream`
    ///
    /// `host` supplies SNI and, with peer verification on, the name checked
    /// against the certificate. A configured servername overrides it.
    pub fn connect(
        &self,
        stream: TcpStream,
        host: Option<&str>,
    ) -> Result<SslStream<TcpStream>, TlsError> {
        if self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use server config for client connection".to_string(),
            ));
        }

        let mut ssl = Ssl::new(&self.ctx)?;
        let name = self.servername.as_deref().or(host);
        if let Some(name) = name.filter(|n| n.parse::<IpAddr>().is_err()) {
            ssl.set_hostname(name)?;
            if self.verify_peer {
                ssl.param_mut().set_host(name)?;
            }
        }

        ssl.connect(stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))
    }

    /// Perform a server handshake over `stream`
    pub fn accept(&self, stream: TcpStream) -> Result<SslStream<TcpStream>, TlsError> {
        if !self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use client config for server accept".to_string(),
            ));
        }

        let ssl = Ssl::new(&self.ctx)?;
        ssl.accept(stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Accept failed: {}", e)))
    }
}

/// Client configuration builder
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    servername: Option<String>,
    verify_peer: bool,
}

impl ClientConfigBuilder {
    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set SNI servername, overriding the connection's host name
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Enable/disable peer certificate verification against system roots
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min > max {
                return Err(TlsError::InvalidConfig(format!(
                    "minimum version {} is above maximum {}",
                    min.as_str(),
                    max.as_str()
                )));
            }
        }

        let mut ctx = SslContextBuilder::new(SslMethod::tls_client())?;
        ctx.set_min_proto_version(self.min_version.map(TlsVersion::to_openssl_version))?;
        ctx.set_max_proto_version(self.max_version.map(TlsVersion::to_openssl_version))?;

        if self.verify_peer {
            ctx.set_default_verify_paths()?;
            ctx.set_verify(SslVerifyMode::PEER);
        } else {
            ctx.set_verify(SslVerifyMode::NONE);
        }

        Ok(TlsConfig {
            ctx: ctx.build(),
            is_server: false,
            verify_peer: self.verify_peer,
            servername: self.servername,
        })
    }
}
