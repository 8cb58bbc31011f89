use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::dtls::DtlsRole;
use crate::error::{Error, Result};

/// Largest datagram the transport reads or forwards, the usual path MTU.
pub const RECEIVE_MTU: usize = 1500;

/// Datagrams buffered for the handshake engine before the oldest is dropped.
pub(crate) const DEFAULT_RECEIVE_QUEUE_CAPACITY: usize = 64;

/// How long a socket read blocks before the receive loop re-checks shutdown.
pub(crate) const DEFAULT_SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Inclusive range of local UDP ports the transport may bind.
/// `0..=0` lets the operating system pick an ephemeral port.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self> {
        let range = PortRange { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max < self.min {
            return Err(Error::ErrEndPortLessThanStart);
        }
        if self.min == 0 && self.max != 0 {
            return Err(Error::ErrInvalidPortNumber);
        }
        Ok(())
    }

    pub fn is_ephemeral(&self) -> bool {
        self.min == 0 && self.max == 0
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.max - self.min) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }
}

/// Collects the arguments to `TransportManager` construction into a single
/// structure. Unset fields fall back to the `DEFAULT_*` values.
#[derive(Default, Debug, Clone)]
pub struct TransportConfig {
    /// Local address the UDP socket binds to. Defaults to `0.0.0.0`.
    pub local_ip: Option<IpAddr>,

    pub port_range: PortRange,

    /// Capacity of the handshake receive queue, in datagrams.
    pub receive_queue_capacity: Option<usize>,

    /// Read timeout of the receive loop. Bounds how long teardown waits for it.
    pub socket_read_timeout: Option<Duration>,

    /// Role used for the DTLS handshake. `Unspecified` behaves as `Client`,
    /// `Auto` resolves from the ICE role.
    pub dtls_role: DtlsRole,
}

impl TransportConfig {
    pub(crate) fn local_ip(&self) -> IpAddr {
        self.local_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub(crate) fn receive_queue_capacity(&self) -> usize {
        match self.receive_queue_capacity {
            Some(capacity) if capacity > 0 => capacity,
            _ => DEFAULT_RECEIVE_QUEUE_CAPACITY,
        }
    }

    pub(crate) fn socket_read_timeout(&self) -> Duration {
        match self.socket_read_timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_SOCKET_READ_TIMEOUT,
        }
    }

    /// Resolves the handshake role. The ICE controlled side acts as the DTLS
    /// client and the controlling side as the DTLS server.
    pub(crate) fn resolve_dtls_role(&self, ice_controlling: bool) -> DtlsRole {
        match self.dtls_role {
            DtlsRole::Auto => {
                if ice_controlling {
                    DtlsRole::Server
                } else {
                    DtlsRole::Client
                }
            }
            DtlsRole::Server => DtlsRole::Server,
            DtlsRole::Client | DtlsRole::Unspecified => DtlsRole::Client,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_port_range_validate() {
        let tests = vec![
            (0, 0, Ok(())),
            (5000, 5000, Ok(())),
            (5000, 5100, Ok(())),
            (5100, 5000, Err(Error::ErrEndPortLessThanStart)),
            (0, 5000, Err(Error::ErrInvalidPortNumber)),
        ];

        for (min, max, expected) in tests {
            assert_eq!(PortRange { min, max }.validate(), expected, "{min}..={max}");
        }

        assert_eq!(PortRange::new(5000, 5100).map(|r| r.len()), Ok(101));
        assert!(PortRange::default().is_ephemeral());
    }

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig {
            receive_queue_capacity: Some(0),
            socket_read_timeout: Some(Duration::ZERO),
            ..Default::default()
        };

        assert_eq!(config.local_ip(), IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        assert_eq!(
            config.receive_queue_capacity(),
            DEFAULT_RECEIVE_QUEUE_CAPACITY
        );
        assert_eq!(config.socket_read_timeout(), DEFAULT_SOCKET_READ_TIMEOUT);
    }

    #[test]
    fn test_resolve_dtls_role() {
        let tests = vec![
            (DtlsRole::Unspecified, true, DtlsRole::Client),
            (DtlsRole::Client, true, DtlsRole::Client),
            (DtlsRole::Server, false, DtlsRole::Server),
            (DtlsRole::Auto, true, DtlsRole::Server),
            (DtlsRole::Auto, false, DtlsRole::Client),
        ];

        for (role, controlling, expected) in tests {
            let config = TransportConfig {
                dtls_role: role,
                ..Default::default()
            };
            assert_eq!(
                config.resolve_dtls_role(controlling),
                expected,
                "{role} controlling={controlling}"
            );
        }
    }
}
