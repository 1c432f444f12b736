//! Throwaway PKI for TLS tests: one CA, a `localhost` server leaf and a client leaf.

use std::path::Path;
use std::sync::Arc;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;

use restlink::server::TlsFiles;

pub struct Pki {
    ca: CertificateDer<'static>,
    ca_pem: String,
    server_pem: String,
    server_key_pem: String,
    client: CertificateDer<'static>,
    client_key: Vec<u8>,
}

impl Pki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.distinguished_name.push(DnType::CommonName, "restlink test CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca = ca_params.self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(ca_params, ca_key);

        let server_key = KeyPair::generate().unwrap();
        let mut server_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server = server_params.signed_by(&server_key, &issuer).unwrap();

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        client_params.distinguished_name.push(DnType::CommonName, "restlink test client");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client = client_params.signed_by(&client_key, &issuer).unwrap();

        Self {
            ca: ca.der().clone(),
            ca_pem: ca.pem(),
            server_pem: server.pem(),
            server_key_pem: server_key.serialize_pem(),
            client: client.der().clone(),
            client_key: client_key.serialize_der(),
        }
    }

    /// Write the server certificate, its key and the CA bundle into `dir`.
    pub fn write(&self, dir: &Path) -> TlsFiles {
        let files = TlsFiles {
            cert_path: dir.join("server.pem"),
            key_path: dir.join("server.key"),
            ca_path: Some(dir.join("ca.pem")),
        };
        std::fs::write(&files.cert_path, &self.server_pem).unwrap();
        std::fs::write(&files.key_path, &self.server_key_pem).unwrap();
        std::fs::write(dir.join("ca.pem"), &self.ca_pem).unwrap();
        files
    }

    /// Client TLS configuration trusting the test CA, optionally presenting the client leaf.
    pub fn client_config(&self, with_certificate: bool) -> Arc<rustls::ClientConfig> {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca.clone()).unwrap();

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let builder = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots);
        let mut config = if with_certificate {
            let key = PrivatePkcs8KeyDer::from(self.client_key.clone());
            builder
                .with_client_auth_cert(vec![self.client.clone()], key.into())
                .unwrap()
        } else {
            builder.with_no_client_auth()
        };
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Arc::new(config)
    }
}
