//! Deterministic in-memory token double.
//!
//! Behaves like a real provider at the trait seams: PIN checking, inventory
//! order, and real PKCS#1 v1.5 signatures over SHA-256, so callers can be
//! exercised end to end without hardware.

use cardsign_core::SignError;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest as _, Sha256};

use crate::provider::{KeyEntry, SlotDescription, TokenProvider, TokenSession};

#[derive(Clone)]
pub struct MockEntry {
    pub alias: String,
    pub certificate: Option<Vec<u8>>,
    pub key: Option<RsaPrivateKey>,
}

pub struct MockToken {
    pin: String,
    entries: Vec<MockEntry>,
    slots: Vec<SlotDescription>,
}

impl MockToken {
    pub fn new(pin: impl Into<String>) -> Self {
        MockToken {
            pin: pin.into(),
            entries: Vec::new(),
            slots: vec![SlotDescription {
                slot: 0,
                label: "MOCK TOKEN".to_string(),
                manufacturer: "cardsign".to_string(),
                model: "mock".to_string(),
                serial: "0000000000000000".to_string(),
            }],
        }
    }

    pub fn with_entry(mut self, entry: MockEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Session without PIN verification, for tests that start past login.
    pub fn open_mock_session(&self) -> Box<dyn TokenSession> {
        Box::new(MockSession {
            entries: self.entries.clone(),
        })
    }
}

impl TokenProvider for MockToken {
    fn list_slots(&self) -> Result<Vec<SlotDescription>, SignError> {
        Ok(self.slots.clone())
    }

    fn open_session(&self, slot: usize, pin: &str) -> Result<Box<dyn TokenSession>, SignError> {
        if slot >= self.slots.len() {
            return Err(SignError::token(format!(
                "slot {slot} has no token present ({} available)",
                self.slots.len()
            )));
        }
        if pin != self.pin {
            return Err(SignError::token("authentication failed"));
        }
        Ok(self.open_mock_session())
    }
}

struct MockSession {
    entries: Vec<MockEntry>,
}

impl MockSession {
    fn entry(&self, alias: &str) -> Result<&MockEntry, SignError> {
        self.entries
            .iter()
            .find(|e| e.alias == alias)
            .ok_or_else(|| SignError::signing(format!("alias {alias:?} not found on token")))
    }
}

impl TokenSession for MockSession {
    fn entries(&self) -> Result<Vec<KeyEntry>, SignError> {
        Ok(self
            .entries
            .iter()
            .map(|e| KeyEntry {
                alias: e.alias.clone(),
                certificate: e.certificate.clone(),
                has_private_key: e.key.is_some(),
            })
            .collect())
    }

    fn sign(&self, alias: &str, data: &[u8]) -> Result<Vec<u8>, SignError> {
        let key = self
            .entry(alias)?
            .key
            .as_ref()
            .ok_or_else(|| SignError::signing(format!("alias {alias:?} has no private key")))?;
        let digest = Sha256::digest(data);
        key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| SignError::signing_with("mock signing failed", e))
    }

    fn certificate_chain(&self, alias: &str) -> Result<Vec<Vec<u8>>, SignError> {
        let leaf = self
            .entry(alias)?
            .certificate
            .clone()
            .ok_or_else(|| SignError::signing(format!("alias {alias:?} has no certificate")))?;
        let pool: Vec<Vec<u8>> = self
            .entries
            .iter()
            .filter_map(|e| e.certificate.clone())
            .collect();
        Ok(crate::select::build_chain(leaf, &pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPublicKey;
    use rsa::traits::PublicKeyParts as _;

    fn token_with_key() -> (MockToken, RsaPrivateKey) {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let token = MockToken::new("1234").with_entry(MockEntry {
            alias: "sig-key".to_string(),
            certificate: Some(vec![0x30, 0x00]),
            key: Some(key.clone()),
        });
        (token, key)
    }

    #[test]
    fn wrong_pin_is_token_error() {
        let (token, _) = token_with_key();
        let Err(err) = token.open_session(0, "9999") else {
            panic!("session opened with the wrong PIN");
        };
        assert!(matches!(err, SignError::Token { .. }));
        assert_eq!(err.kind(), "token_error");
    }

    #[test]
    fn bad_slot_is_token_error() {
        let (token, _) = token_with_key();
        let Err(err) = token.open_session(3, "1234") else {
            panic!("session opened on an absent slot");
        };
        assert!(matches!(err, SignError::Token { .. }));
    }

    #[test]
    fn signatures_verify_against_public_key() {
        let (token, key) = token_with_key();
        let session = token.open_session(0, "1234").unwrap();
        let data = b"covered byte range";
        let signature = session.sign("sig-key", data).unwrap();
        assert_eq!(signature.len(), key.n().bits() / 8);

        let public = RsaPublicKey::from(&key);
        let digest = Sha256::digest(data);
        public
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .unwrap();
    }

    #[test]
    fn unknown_alias_is_signing_error() {
        let (token, _) = token_with_key();
        let session = token.open_session(0, "1234").unwrap();
        let err = session.sign("missing", b"data").unwrap_err();
        assert!(matches!(err, SignError::Signing { .. }));
    }
}
