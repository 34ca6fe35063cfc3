//! CAdES-B detached container assembly.
//!
//! The container is a CMS `SignedData` with external content: signed
//! attributes cover the byte-range digest, the certificate chain travels in
//! the container, and the ESS signing-certificate-v2 attribute binds the
//! signing certificate, which is what lifts a plain CMS signature to CAdES
//! baseline. The private-key operation itself runs on the token.

use bcder::Mode::Der;
use bcder::encode::Values as _;
use bcder::{Captured, OctetString, Oid};
use bytes::Bytes;
use cardsign_core::{SignError, SignatureBuilder};
use cryptographic_message_syntax::{SignedDataBuilder, SignerBuilder};
use sha2::{Digest as _, Sha256};
use x509_certificate::rfc5652::AttributeValue;
use x509_certificate::{
    CapturedX509Certificate, KeyAlgorithm, KeyInfoSigner, Sign, Signature, SignatureAlgorithm,
    X509CertificateError,
};

use crate::provider::TokenSession;

/// Bytes reserved in the document for the DER container. Large enough for a
/// three-certificate chain with headroom.
pub const CONTAINER_RESERVED_LEN: usize = 8192;

// 1.2.840.113549.1.9.16.2.47, id-aa-signingCertificateV2
const SIGNING_CERTIFICATE_V2_OID: &[u8] = &[42, 134, 72, 134, 247, 13, 1, 9, 16, 2, 47];

/// [`SignatureBuilder`] backed by an open token session.
pub struct CadesBuilder<'a> {
    session: &'a dyn TokenSession,
    alias: String,
    chain_der: Vec<Vec<u8>>,
}

impl<'a> CadesBuilder<'a> {
    /// `chain_der` is leaf-first; the leaf is the signing certificate.
    pub fn new(
        session: &'a dyn TokenSession,
        alias: impl Into<String>,
        chain_der: Vec<Vec<u8>>,
    ) -> Result<Self, SignError> {
        if chain_der.is_empty() {
            return Err(SignError::signing("certificate chain is empty"));
        }
        Ok(CadesBuilder {
            session,
            alias: alias.into(),
            chain_der,
        })
    }
}

impl std::fmt::Debug for CadesBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CadesBuilder")
            .field("alias", &self.alias)
            .field("chain_len", &self.chain_der.len())
            .finish_non_exhaustive()
    }
}

impl SignatureBuilder for CadesBuilder<'_> {
    fn reserved_len(&self) -> usize {
        CONTAINER_RESERVED_LEN
    }

    fn build(&self, byte_range_content: &[u8]) -> Result<Vec<u8>, SignError> {
        let chain: Vec<CapturedX509Certificate> = self
            .chain_der
            .iter()
            .map(|der| CapturedX509Certificate::from_der(der.clone()))
            .collect::<Result<_, _>>()
            .map_err(|e| SignError::signing_with("cannot parse certificate chain", e))?;
        let leaf = chain[0].clone();

        let key = TokenKey {
            session: self.session,
            alias: &self.alias,
            public_key: public_key_bits(&self.chain_der[0])?,
        };
        let ess_attribute = signing_certificate_v2(&self.chain_der[0]);
        let signer = SignerBuilder::new(&key, leaf)
            .message_id_content(byte_range_content.to_vec())
            .signed_attribute(
                Oid(Bytes::from_static(SIGNING_CERTIFICATE_V2_OID)),
                vec![AttributeValue::new(ess_attribute)],
            );

        let der = SignedDataBuilder::default()
            .certificates(chain.into_iter())
            .signer(signer)
            .build_der()
            .map_err(|e| SignError::signing_with("cannot assemble CMS container", e))?;
        tracing::debug!(container_len = der.len(), "CAdES container built");
        Ok(der)
    }
}

/// ESS `SigningCertificateV2` value with the hash algorithm left at its
/// SHA-256 default: `SEQUENCE { SEQUENCE { SEQUENCE { OCTET STRING } } }`.
fn signing_certificate_v2(leaf_der: &[u8]) -> Captured {
    let cert_hash = OctetString::new(Bytes::copy_from_slice(&Sha256::digest(leaf_der)));
    let ess_cert_id = bcder::encode::sequence(cert_hash.encode());
    let certs = bcder::encode::sequence(ess_cert_id);
    bcder::encode::sequence(certs).to_captured(Der)
}

/// Raw subject-public-key bits of a DER certificate.
fn public_key_bits(der: &[u8]) -> Result<Bytes, SignError> {
    use x509_parser::prelude::*;
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| SignError::signing_with("cannot parse signing certificate", e))?;
    Ok(Bytes::copy_from_slice(
        &cert.public_key().subject_public_key.data,
    ))
}

/// A signing key that lives on the token. Only the public half is held in
/// process; `sign` round-trips through the session.
struct TokenKey<'a> {
    session: &'a dyn TokenSession,
    alias: &'a str,
    public_key: Bytes,
}

impl signature::Signer<Signature> for TokenKey<'_> {
    fn try_sign(&self, message: &[u8]) -> Result<Signature, signature::Error> {
        self.session
            .sign(self.alias, message)
            .map(Signature::from)
            .map_err(signature::Error::from_source)
    }
}

impl KeyInfoSigner for TokenKey<'_> {}

impl Sign for TokenKey<'_> {
    fn sign(&self, message: &[u8]) -> Result<(Vec<u8>, SignatureAlgorithm), X509CertificateError> {
        match self.session.sign(self.alias, message) {
            Ok(signature) => Ok((signature, SignatureAlgorithm::RsaSha256)),
            Err(e) => {
                tracing::error!(error = %e, "token signing operation failed");
                Err(X509CertificateError::Other(
                    "token signing operation failed".to_string(),
                ))
            }
        }
    }

    fn key_algorithm(&self) -> Option<KeyAlgorithm> {
        Some(KeyAlgorithm::Rsa)
    }

    fn public_key_data(&self) -> Bytes {
        self.public_key.clone()
    }

    fn signature_algorithm(&self) -> Result<SignatureAlgorithm, X509CertificateError> {
        Ok(SignatureAlgorithm::RsaSha256)
    }

    fn private_key_data(&self) -> Option<Vec<u8>> {
        None
    }

    fn rsa_primes(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, X509CertificateError> {
        Ok(None)
    }
}
