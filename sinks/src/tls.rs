// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! `tcp+tls://` sink: the same one-connection-plus-reconnect discipline
//! as [`crate::tcp::TcpSink`], wrapped in a `rustls` client session.
//! `verify=false` swaps in a verifier that accepts any certificate;
//! `cert=path` appends one PEM trust anchor to the default root store.

use std::{fs::File, io::BufReader, sync::Arc, time::Duration};

use log::warn;
use rustls::{
    client::{ServerCertVerified, ServerCertVerifier},
    Certificate, ClientConfig, RootCertStore, ServerName,
};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::{Mutex, Semaphore},
    time::timeout,
};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::error::{Error, Result};

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_CAP: usize = 20;

struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

pub struct TlsSink {
    addr: String,
    host: String,
    connector: TlsConnector,
    conn: Mutex<Option<TlsStream<TcpStream>>>,
    reconnects: Semaphore,
}

impl TlsSink {
    pub async fn connect(addr: String, host: String, verify: bool, cert_path: Option<&str>) -> Result<Self> {
        let connector = build_connector(&addr, verify, cert_path)?;
        let stream = dial(&addr, &host, &connector).await?;
        Ok(Self {
            addr,
            host,
            connector,
            conn: Mutex::new(Some(stream)),
            reconnects: Semaphore::new(RECONNECT_CAP),
        })
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        {
            let mut guard = self.conn.lock().await;
            if let Some(stream) = guard.as_mut() {
                if stream.write_all(buf).await.is_ok() {
                    return Ok(buf.len());
                }
            }
        }

        // See `tcp::TcpSink::write`: the semaphore gates entry to the
        // reconnect path before the mutex, so callers beyond the cap fail
        // fast instead of queueing unboundedly on `conn`.
        let _permit = self
            .reconnects
            .try_acquire()
            .map_err(|_| Error::ReconnectBusy {
                addr: self.addr.clone(),
                backtrace: snafu::Backtrace::generate(),
            })?;

        let mut guard = self.conn.lock().await;
        if let Some(stream) = guard.as_mut() {
            if stream.write_all(buf).await.is_ok() {
                return Ok(buf.len());
            }
        }

        warn!("tls sink '{}' reconnecting after a failed write", self.addr);
        let mut stream = dial(&self.addr, &self.host, &self.connector).await?;
        stream
            .write_all(buf)
            .await
            .map_err(|source| Error::Write {
                addr: self.addr.clone(),
                source,
                backtrace: snafu::Backtrace::generate(),
            })?;
        *guard = Some(stream);
        Ok(buf.len())
    }

    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        guard.take();
    }
}

fn build_connector(addr: &str, verify: bool, cert_path: Option<&str>) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(ta.subject, ta.spki, ta.name_constraints)
    }));

    if let Some(path) = cert_path {
        let file = File::open(path).map_err(|source| Error::Tls {
            addr: addr.to_string(),
            source,
            backtrace: snafu::Backtrace::generate(),
        })?;
        let mut reader = BufReader::new(file);
        for cert in rustls_pemfile::certs(&mut reader).map_err(|source| Error::Tls {
            addr: addr.to_string(),
            source,
            backtrace: snafu::Backtrace::generate(),
        })? {
            let _ = roots.add(&Certificate(cert));
        }
    }

    let config_builder = ClientConfig::builder().with_safe_defaults();
    let config = if verify {
        config_builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        let mut config = config_builder.with_root_certificates(roots).with_no_client_auth();
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCert));
        config
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

async fn dial(addr: &str, host: &str, connector: &TlsConnector) -> Result<TlsStream<TcpStream>> {
    let tcp = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::ConnectTimeout {
            addr: addr.to_string(),
            backtrace: snafu::Backtrace::generate(),
        })?
        .map_err(|source| Error::Connect {
            addr: addr.to_string(),
            source,
            backtrace: snafu::Backtrace::generate(),
        })?;

    let server_name = ServerName::try_from(host).map_err(|_| Error::Tls {
        addr: addr.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid server name"),
        backtrace: snafu::Backtrace::generate(),
    })?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|source| Error::Tls {
            addr: addr.to_string(),
            source,
            backtrace: snafu::Backtrace::generate(),
        })
}
