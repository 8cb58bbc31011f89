pub mod bridge;
pub mod fingerprint;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use fingerprint::RTCDtlsFingerprint;

/// DtlsRole indicates the role of the DTLS transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtlsRole {
    #[default]
    Unspecified = 0,

    /// The DTLS role is determined based on the resolved ICE role: the ICE
    /// controlled role acts as the DTLS client and the ICE controlling role
    /// acts as the DTLS server.
    #[serde(rename = "auto")]
    Auto = 1,

    /// DTLS client role.
    #[serde(rename = "client")]
    Client = 2,

    /// DTLS server role.
    #[serde(rename = "server")]
    Server = 3,
}

const DTLS_ROLE_AUTO_STR: &str = "auto";
const DTLS_ROLE_CLIENT_STR: &str = "client";
const DTLS_ROLE_SERVER_STR: &str = "server";

/// `a=setup` values, <https://tools.ietf.org/html/rfc4145#section-4>.
pub const CONNECTION_ROLE_ACTPASS: &str = "actpass";
pub const CONNECTION_ROLE_ACTIVE: &str = "active";
pub const CONNECTION_ROLE_PASSIVE: &str = "passive";

impl fmt::Display for DtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DtlsRole::Auto => write!(f, "{DTLS_ROLE_AUTO_STR}"),
            DtlsRole::Client => write!(f, "{DTLS_ROLE_CLIENT_STR}"),
            DtlsRole::Server => write!(f, "{DTLS_ROLE_SERVER_STR}"),
            DtlsRole::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl From<&str> for DtlsRole {
    fn from(raw: &str) -> Self {
        match raw {
            DTLS_ROLE_AUTO_STR => DtlsRole::Auto,
            DTLS_ROLE_CLIENT_STR => DtlsRole::Client,
            DTLS_ROLE_SERVER_STR => DtlsRole::Server,
            _ => DtlsRole::Unspecified,
        }
    }
}

impl DtlsRole {
    /// Connection role advertised in signaling. An endpoint that has not
    /// committed to a side offers both.
    ///
    /// The endpoint that is the offerer MUST use the setup attribute value of
    /// setup:actpass and be prepared to receive a client_hello before it
    /// receives the answer.
    pub fn connection_role(&self) -> &'static str {
        match *self {
            DtlsRole::Client => CONNECTION_ROLE_ACTIVE,
            DtlsRole::Server => CONNECTION_ROLE_PASSIVE,
            DtlsRole::Auto | DtlsRole::Unspecified => CONNECTION_ROLE_ACTPASS,
        }
    }
}

/// Blocking duplex datagram transport the handshake engine runs over.
///
/// Each `receive` yields at most one datagram. Implementations return
/// [`Error::ErrTimeout`](crate::error::Error::ErrTimeout) when nothing
/// arrives within `timeout`, and
/// [`Error::ErrUseClosedNetworkConn`](crate::error::Error::ErrUseClosedNetworkConn)
/// once the transport is shutting down so a blocked handshake can unwind.
pub trait HandshakeTransport: Send {
    /// Copies the next datagram into `buf`, truncating it to `buf.len()`,
    /// and returns the number of bytes written.
    fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Sends `buf` as one datagram.
    fn send(&self, buf: &[u8]) -> Result<()>;

    /// Largest datagram `receive` can return.
    fn receive_limit(&self) -> usize;

    /// Largest datagram `send` accepts.
    fn send_limit(&self) -> usize;
}

/// The security handshake engine, consumed as a black box.
pub trait DtlsEngine: Send {
    /// Fingerprint of the certificate this engine presents.
    fn local_fingerprint(&self) -> RTCDtlsFingerprint;

    /// Remote certificate fingerprints keyed by lowercased hash algorithm.
    /// The handshake must reject a peer certificate matching none of them.
    fn set_remote_fingerprints(&mut self, fingerprints: HashMap<String, String>) -> Result<()>;

    /// Runs the handshake to completion over `transport`, blocking the
    /// calling thread.
    fn handshake(
        &mut self,
        role: DtlsRole,
        transport: Box<dyn HandshakeTransport>,
    ) -> Result<Arc<dyn SecureTransport>>;
}

/// Outcome of a completed handshake, kept for the media stage that keys
/// SRTP from it.
pub trait SecureTransport: Send + Sync {
    fn role(&self) -> DtlsRole;

    /// RFC 5705 keying material exporter.
    fn export_keying_material(&self, label: &str, context: &[u8], length: usize)
        -> Result<Vec<u8>>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dtls_role_string() {
        let tests = vec![
            (DtlsRole::Unspecified, "Unspecified", CONNECTION_ROLE_ACTPASS),
            (DtlsRole::Auto, "auto", CONNECTION_ROLE_ACTPASS),
            (DtlsRole::Client, "client", CONNECTION_ROLE_ACTIVE),
            (DtlsRole::Server, "server", CONNECTION_ROLE_PASSIVE),
        ];

        for (role, expected_string, expected_setup) in tests {
            assert_eq!(role.to_string(), expected_string);
            assert_eq!(DtlsRole::from(expected_string), role);
            assert_eq!(role.connection_role(), expected_setup);
        }
    }
}
