use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hash function textual names registered for certificate fingerprints,
/// <https://datatracker.ietf.org/doc/html/rfc4572#section-5>.
const SUPPORTED_HASH_FUNCTIONS: &[&str] =
    &["sha-1", "sha-224", "sha-256", "sha-384", "sha-512", "md5", "md2"];

/// DTLS certificate fingerprint for authentication.
///
/// The fingerprint is a hash of the certificate an endpoint presents during the
/// DTLS handshake. It is exchanged out-of-band through signaling and checked by
/// the handshake engine against the certificate actually received, so a
/// substituted certificate is detected even when signaling is not encrypted.
///
/// The value is a colon-separated sequence of hexadecimal bytes, for example
/// `"AB:CD:EF:01:23:..."`.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCDtlsFingerprint {
    /// Hash function algorithm name, such as `sha-256`.
    pub algorithm: String,

    /// Certificate fingerprint value.
    pub value: String,
}

impl RTCDtlsFingerprint {
    /// Computes the `sha-256` fingerprint of a DER encoded certificate.
    pub fn from_certificate_der(der: &[u8]) -> Self {
        let mut h = Sha256::new();
        h.update(der);
        let hashed = h.finalize();
        let values: Vec<String> = hashed.iter().map(|x| format!("{x:02x}")).collect();

        RTCDtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: values.join(":"),
        }
    }

    /// Checks the algorithm is a registered hash function name and the value
    /// is well formed.
    pub fn validate(&self) -> Result<()> {
        if self.algorithm.is_empty() {
            return Err(Error::ErrFingerprintAlgorithmEmpty);
        }
        let algorithm = self.algorithm.to_ascii_lowercase();
        if !SUPPORTED_HASH_FUNCTIONS.contains(&algorithm.as_str()) {
            return Err(Error::ErrUnsupportedFingerprintAlgorithm(
                self.algorithm.clone(),
            ));
        }

        let well_formed = !self.value.is_empty()
            && self
                .value
                .split(':')
                .all(|byte| byte.len() == 2 && byte.chars().all(|c| c.is_ascii_hexdigit()));
        if !well_formed {
            return Err(Error::ErrInvalidFingerprint(self.value.clone()));
        }

        Ok(())
    }
}

/// Validates remote fingerprints and keys them by lowercased algorithm name.
/// A later fingerprint for the same algorithm replaces an earlier one.
pub fn fingerprints_by_algorithm(
    fingerprints: &[RTCDtlsFingerprint],
) -> Result<HashMap<String, String>> {
    let mut by_algorithm = HashMap::new();
    for fingerprint in fingerprints {
        fingerprint.validate()?;
        by_algorithm.insert(
            fingerprint.algorithm.to_ascii_lowercase(),
            fingerprint.value.clone(),
        );
    }
    Ok(by_algorithm)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fingerprint_from_certificate_der() {
        let fp = RTCDtlsFingerprint::from_certificate_der(b"");

        assert_eq!(fp.algorithm, "sha-256");
        // sha-256 of the empty input
        assert!(fp
            .value
            .starts_with("e3:b0:c4:42:98:fc:1c:14:9a:fb:f4:c8:99:6f:b9:24"));
        assert_eq!(fp.value.len(), 32 * 3 - 1);
        assert!(fp.validate().is_ok());
    }

    #[test]
    fn test_fingerprint_validate() {
        let tests = vec![
            ("sha-256", "AB:CD:EF:01", Ok(())),
            ("SHA-256", "ab:cd", Ok(())),
            ("", "AB:CD", Err(Error::ErrFingerprintAlgorithmEmpty)),
            (
                "sha-3",
                "AB:CD",
                Err(Error::ErrUnsupportedFingerprintAlgorithm("sha-3".to_owned())),
            ),
            (
                "sha-1",
                "",
                Err(Error::ErrInvalidFingerprint(String::new())),
            ),
            (
                "sha-1",
                "ABC:DE",
                Err(Error::ErrInvalidFingerprint("ABC:DE".to_owned())),
            ),
            (
                "sha-1",
                "ZZ:DE",
                Err(Error::ErrInvalidFingerprint("ZZ:DE".to_owned())),
            ),
        ];

        for (algorithm, value, expected) in tests {
            let fp = RTCDtlsFingerprint {
                algorithm: algorithm.to_owned(),
                value: value.to_owned(),
            };
            assert_eq!(fp.validate(), expected, "{algorithm} {value}");
        }
    }

    #[test]
    fn test_fingerprints_by_algorithm() -> Result<()> {
        let fingerprints = vec![
            RTCDtlsFingerprint {
                algorithm: "SHA-256".to_owned(),
                value: "AA:BB".to_owned(),
            },
            RTCDtlsFingerprint {
                algorithm: "sha-1".to_owned(),
                value: "CC:DD".to_owned(),
            },
        ];

        let by_algorithm = fingerprints_by_algorithm(&fingerprints)?;
        assert_eq!(by_algorithm.len(), 2);
        assert_eq!(by_algorithm.get("sha-256").map(String::as_str), Some("AA:BB"));
        assert_eq!(by_algorithm.get("sha-1").map(String::as_str), Some("CC:DD"));

        let invalid = vec![RTCDtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: "nope".to_owned(),
        }];
        assert!(fingerprints_by_algorithm(&invalid).is_err());

        Ok(())
    }
}
