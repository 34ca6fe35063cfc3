//! Certificate selection policy and inventory descriptions.

use cardsign_core::SignError;
use serde::Serialize;
use x509_parser::prelude::*;

use crate::provider::KeyEntry;

/// The per-entry facts the selection policy reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub alias: String,
    pub has_private_key: bool,
    pub non_repudiation: bool,
}

/// Picks the signing alias.
///
/// An explicit alias is returned verbatim, without checking it exists (a
/// bad alias fails later at the key operation, with a precise error).
/// Otherwise the first private-key entry whose certificate carries the
/// non-repudiation key-usage bit wins, then the first private-key entry.
pub fn select_alias(entries: &[KeyEntry], explicit: Option<&str>) -> Result<String, SignError> {
    if let Some(alias) = explicit {
        return Ok(alias.to_string());
    }
    select_from_summaries(&summarize(entries))
}

pub fn select_from_summaries(summaries: &[EntrySummary]) -> Result<String, SignError> {
    let mut fallback = None;
    for summary in summaries {
        if !summary.has_private_key {
            continue;
        }
        if summary.non_repudiation {
            tracing::debug!(alias = %summary.alias, "selected non-repudiation certificate");
            return Ok(summary.alias.clone());
        }
        if fallback.is_none() {
            fallback = Some(summary.alias.clone());
        }
    }
    fallback.ok_or(SignError::NoCertificateFound)
}

pub fn summarize(entries: &[KeyEntry]) -> Vec<EntrySummary> {
    entries
        .iter()
        .map(|entry| {
            let (_, non_repudiation) = entry
                .certificate
                .as_deref()
                .map(key_usage_flags)
                .unwrap_or((false, false));
            EntrySummary {
                alias: entry.alias.clone(),
                has_private_key: entry.has_private_key,
                non_repudiation,
            }
        })
        .collect()
}

/// `(digital_signature, non_repudiation)`; unparseable certificates read as
/// having neither bit.
fn key_usage_flags(der: &[u8]) -> (bool, bool) {
    let Ok((_, cert)) = X509Certificate::from_der(der) else {
        return (false, false);
    };
    match cert.key_usage() {
        Ok(Some(usage)) => (
            usage.value.digital_signature(),
            usage.value.non_repudiation(),
        ),
        _ => (false, false),
    }
}

/// One row of the certificate inventory report.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateDescription {
    pub alias: String,
    pub has_private_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    pub digital_signature: bool,
    pub non_repudiation: bool,
}

/// Inventory rows for the list-certs report, in token order.
pub fn describe(entries: &[KeyEntry]) -> Vec<CertificateDescription> {
    entries
        .iter()
        .map(|entry| {
            let mut description = CertificateDescription {
                alias: entry.alias.clone(),
                has_private_key: entry.has_private_key,
                subject: None,
                issuer: None,
                serial: None,
                not_before: None,
                not_after: None,
                digital_signature: false,
                non_repudiation: false,
            };
            if let Some(der) = entry.certificate.as_deref()
                && let Ok((_, cert)) = X509Certificate::from_der(der)
            {
                description.subject = Some(cert.subject().to_string());
                description.issuer = Some(cert.issuer().to_string());
                description.serial = Some(cert.serial.to_str_radix(16));
                description.not_before = Some(cert.validity().not_before.to_string());
                description.not_after = Some(cert.validity().not_after.to_string());
                let (ds, nr) = key_usage_flags(der);
                description.digital_signature = ds;
                description.non_repudiation = nr;
            }
            description
        })
        .collect()
}

/// Subject DN of a DER certificate, for the signing report.
pub fn subject_name(der: &[u8]) -> Result<String, SignError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| SignError::signing_with("cannot parse signing certificate", e))?;
    Ok(cert.subject().to_string())
}

/// Leaf-first chain assembled by issuer-to-subject matching against the
/// certificates available in `pool`. Stops at a self-signed certificate or
/// when no issuer is found; the leaf alone is still a valid result.
pub fn build_chain(leaf: Vec<u8>, pool: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut chain = vec![leaf];
    loop {
        let next = {
            let Some(current) = chain.last() else { break };
            let Ok((_, cert)) = X509Certificate::from_der(current) else {
                break;
            };
            if cert.subject().as_raw() == cert.issuer().as_raw() {
                break;
            }
            let issuer_raw = cert.issuer().as_raw().to_vec();
            pool.iter()
                .find(|candidate| {
                    !chain.iter().any(|c| c == *candidate)
                        && X509Certificate::from_der(candidate)
                            .map(|(_, c)| c.subject().as_raw() == issuer_raw.as_slice())
                            .unwrap_or(false)
                })
                .cloned()
        };
        match next {
            Some(issuer) => chain.push(issuer),
            None => break,
        }
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(alias: &str, key: bool, non_rep: bool) -> EntrySummary {
        EntrySummary {
            alias: alias.to_string(),
            has_private_key: key,
            non_repudiation: non_rep,
        }
    }

    #[test]
    fn explicit_alias_wins_without_existence_check() {
        let alias = select_alias(&[], Some("qualified-signature")).unwrap();
        assert_eq!(alias, "qualified-signature");
    }

    #[test]
    fn prefers_non_repudiation_over_order() {
        let summaries = vec![
            entry("auth", true, false),
            entry("sig", true, true),
            entry("other", true, true),
        ];
        assert_eq!(select_from_summaries(&summaries).unwrap(), "sig");
    }

    #[test]
    fn falls_back_to_first_private_key_entry() {
        let summaries = vec![
            entry("ca-cert", false, true),
            entry("auth", true, false),
            entry("enc", true, false),
        ];
        assert_eq!(select_from_summaries(&summaries).unwrap(), "auth");
    }

    #[test]
    fn no_private_key_entries_is_no_certificate_found() {
        let summaries = vec![entry("ca-cert", false, false)];
        let err = select_from_summaries(&summaries).unwrap_err();
        assert!(matches!(err, SignError::NoCertificateFound));
        assert!(matches!(
            select_from_summaries(&[]).unwrap_err(),
            SignError::NoCertificateFound
        ));
    }

    #[test]
    fn selection_is_deterministic() {
        let summaries = vec![entry("a", true, false), entry("b", true, false)];
        for _ in 0..5 {
            assert_eq!(select_from_summaries(&summaries).unwrap(), "a");
        }
    }

    #[test]
    fn describe_keeps_token_order_and_flags() {
        let entries = vec![
            KeyEntry {
                alias: "first".into(),
                certificate: None,
                has_private_key: false,
            },
            KeyEntry {
                alias: "second".into(),
                certificate: Some(vec![0x30, 0x03, 0x01, 0x01, 0x00]),
                has_private_key: true,
            },
        ];
        let described = describe(&entries);
        assert_eq!(described.len(), 2);
        assert_eq!(described[0].alias, "first");
        assert!(described[0].subject.is_none());
        // Garbage DER never panics, the entry is just bare.
        assert_eq!(described[1].alias, "second");
        assert!(described[1].has_private_key);
        assert!(!described[1].non_repudiation);
    }
}
