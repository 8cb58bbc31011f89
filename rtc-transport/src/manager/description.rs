use serde::{Deserialize, Serialize};

use crate::dtls::fingerprint::RTCDtlsFingerprint;
use crate::error::{Error, Result};
use crate::ice::candidate::{RTCIceCandidate, RTCIceParameters};

/// Remote negotiation parameters received through signaling.
///
/// Credentials left as `None` are expected to reach the agent some other way;
/// a credential that is present must not be empty.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTransportParameters {
    pub ufrag: Option<String>,
    pub pwd: Option<String>,
    /// Fingerprints of the certificates the remote may present.
    pub fingerprints: Vec<RTCDtlsFingerprint>,
    pub candidates: Vec<RTCIceCandidate>,
}

impl RemoteTransportParameters {
    pub(crate) fn validate_credentials(&self) -> Result<()> {
        if self.ufrag.as_deref() == Some("") {
            return Err(Error::ErrRemoteUfragEmpty);
        }
        if self.pwd.as_deref() == Some("") {
            return Err(Error::ErrRemotePwdEmpty);
        }
        Ok(())
    }
}

/// Local negotiation and identity parameters for the outbound signaling
/// payload.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCTransportDescription {
    pub ice_parameters: RTCIceParameters,
    pub candidates: Vec<RTCIceCandidate>,
    pub fingerprint: RTCDtlsFingerprint,
    /// Always `actpass`: either side may open the handshake.
    pub setup: String,
    pub rtcp_mux: bool,
}
