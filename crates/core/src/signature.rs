//! HMAC webhook signature verification.
//!
//! Inbound routes carry their own [`SignatureScheme`] (header name, digest algorithm, encoding and an
//! optional prefix such as `sha256=`). Decoded digests are compared through a [`DigestComparator`] so the
//! constant-time comparison is injectable; a length mismatch is rejected before the comparator runs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::errors::FlowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

impl std::str::FromStr for SignatureAlgorithm {
    type Err = FlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(FlowError::validation(format!(
                "unsupported signature algorithm `{other}` (expected sha1|sha256|sha512)"
            ))),
        }
    }
}

impl std::str::FromStr for SignatureEncoding {
    type Err = FlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            other => Err(FlowError::validation(format!(
                "unsupported signature encoding `{other}` (expected hex|base64)"
            ))),
        }
    }
}

impl SignatureAlgorithm {
    pub fn digest(self, payload: &[u8], secret: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::Sha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(secret).ok()?;
                mac.update(payload);
                Some(mac.finalize().into_bytes().to_vec())
            }
            Self::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(secret).ok()?;
                mac.update(payload);
                Some(mac.finalize().into_bytes().to_vec())
            }
            Self::Sha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(secret).ok()?;
                mac.update(payload);
                Some(mac.finalize().into_bytes().to_vec())
            }
        }
    }
}

impl SignatureEncoding {
    pub fn encode(self, digest: &[u8]) -> String {
        match self {
            Self::Hex => hex::encode(digest),
            Self::Base64 => BASE64.encode(digest),
        }
    }

    pub fn decode(self, raw: &str) -> Option<Vec<u8>> {
        match self {
            Self::Hex => hex::decode(raw).ok(),
            Self::Base64 => BASE64.decode(raw).ok(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureScheme {
    pub header: String,
    pub algorithm: SignatureAlgorithm,
    pub encoding: SignatureEncoding,
    pub prefix: Option<String>,
}

impl Default for SignatureScheme {
    fn default() -> Self {
        Self {
            header: "x-hub-signature-256".to_string(),
            algorithm: SignatureAlgorithm::Sha256,
            encoding: SignatureEncoding::Hex,
            prefix: Some("sha256=".to_string()),
        }
    }
}

pub trait DigestComparator: Send + Sync {
    fn equal(&self, expected: &[u8], provided: &[u8]) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantTimeComparator;

impl DigestComparator for ConstantTimeComparator {
    fn equal(&self, expected: &[u8], provided: &[u8]) -> bool {
        if expected.len() != provided.len() {
            return false;
        }

        let mut result = 0u8;
        for (x, y) in expected.iter().zip(provided.iter()) {
            result |= x ^ y;
        }
        result == 0
    }
}

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], signature: &str, secret: &[u8]) -> bool;
}

pub struct HmacVerifier<C = ConstantTimeComparator> {
    scheme: SignatureScheme,
    comparator: C,
}

impl HmacVerifier<ConstantTimeComparator> {
    pub fn new(scheme: SignatureScheme) -> Self {
        Self { scheme, comparator: ConstantTimeComparator }
    }
}

impl<C: DigestComparator> HmacVerifier<C> {
    pub fn with_comparator(scheme: SignatureScheme, comparator: C) -> Self {
        Self { scheme, comparator }
    }

    pub fn scheme(&self) -> &SignatureScheme {
        &self.scheme
    }

    /// Renders the header value a sender would attach, prefix included.
    pub fn sign(&self, payload: &[u8], secret: &[u8]) -> Option<String> {
        let digest = self.scheme.algorithm.digest(payload, secret)?;
        let encoded = self.scheme.encoding.encode(&digest);
        Some(format!("{}{encoded}", self.scheme.prefix.as_deref().unwrap_or_default()))
    }

    fn strip_prefix<'a>(&self, signature: &'a str) -> &'a str {
        let signature = signature.trim();
        match self.scheme.prefix.as_deref() {
            Some(prefix) => signature.strip_prefix(prefix).unwrap_or(signature),
            None => signature,
        }
    }
}

impl<C: DigestComparator> SignatureVerifier for HmacVerifier<C> {
    fn verify(&self, payload: &[u8], signature: &str, secret: &[u8]) -> bool {
        let Some(provided) = self.scheme.encoding.decode(self.strip_prefix(signature)) else {
            return false;
        };
        let Some(expected) = self.scheme.algorithm.digest(payload, secret) else {
            return false;
        };
        if provided.len() != expected.len() {
            return false;
        }

        self.comparator.equal(&expected, &provided)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{
        ConstantTimeComparator, DigestComparator, HmacVerifier, SignatureAlgorithm,
        SignatureEncoding, SignatureScheme, SignatureVerifier,
    };

    const SECRET: &[u8] = b"whsec_test";
    const PAYLOAD: &[u8] = br#"{"phoneNumberId":"1234","phoneNumber":"5511999990000"}"#;

    #[derive(Clone, Default)]
    struct CountingComparator {
        calls: Arc<AtomicUsize>,
    }

    impl DigestComparator for CountingComparator {
        fn equal(&self, expected: &[u8], provided: &[u8]) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ConstantTimeComparator.equal(expected, provided)
        }
    }

    #[test]
    fn valid_signature_passes() {
        let verifier = HmacVerifier::new(SignatureScheme::default());
        let signature = verifier.sign(PAYLOAD, SECRET).expect("sign");

        assert!(signature.starts_with("sha256="));
        assert!(verifier.verify(PAYLOAD, &signature, SECRET));
    }

    #[test]
    fn tampered_payload_fails() {
        let verifier = HmacVerifier::new(SignatureScheme::default());
        let signature = verifier.sign(PAYLOAD, SECRET).expect("sign");

        let mut tampered = PAYLOAD.to_vec();
        tampered[5] ^= 0x01;

        assert!(!verifier.verify(&tampered, &signature, SECRET));
    }

    #[test]
    fn equal_length_wrong_signature_is_rejected_by_comparator() {
        let comparator = CountingComparator::default();
        let calls = comparator.calls.clone();
        let verifier = HmacVerifier::with_comparator(SignatureScheme::default(), comparator);
        let wrong = format!("sha256={}", "ab".repeat(32));

        assert!(!verifier.verify(PAYLOAD, &wrong, SECRET));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_length_signature_fails_without_comparator() {
        let comparator = CountingComparator::default();
        let calls = comparator.calls.clone();
        let verifier = HmacVerifier::with_comparator(SignatureScheme::default(), comparator);
        let short = format!("sha256={}", "ab".repeat(16));

        assert!(!verifier.verify(PAYLOAD, &short, SECRET));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn undecodable_signature_fails() {
        let verifier = HmacVerifier::new(SignatureScheme::default());

        assert!(!verifier.verify(PAYLOAD, "sha256=not-hex!", SECRET));
        assert!(!verifier.verify(PAYLOAD, "", SECRET));
    }

    #[test]
    fn base64_sha1_scheme_without_prefix() {
        let scheme = SignatureScheme {
            header: "x-signature".to_string(),
            algorithm: SignatureAlgorithm::Sha1,
            encoding: SignatureEncoding::Base64,
            prefix: None,
        };
        let verifier = HmacVerifier::new(scheme);
        let signature = verifier.sign(PAYLOAD, SECRET).expect("sign");

        assert!(verifier.verify(PAYLOAD, &signature, SECRET));
        assert!(!verifier.verify(PAYLOAD, &signature, b"other-secret"));
    }

    #[test]
    fn sha512_digest_has_expected_width() {
        let digest = SignatureAlgorithm::Sha512.digest(PAYLOAD, SECRET).expect("digest");

        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn algorithm_and_encoding_parse_from_config_strings() {
        assert_eq!("SHA-256".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Sha256));
        assert_eq!("base64".parse::<SignatureEncoding>(), Ok(SignatureEncoding::Base64));
        assert!("md5".parse::<SignatureAlgorithm>().is_err());
    }
}
