//! PKCS#11 adapter over the `cryptoki` crate.

use std::path::{Path, PathBuf};

use cardsign_core::SignError;
use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::types::AuthPin;

use crate::provider::{KeyEntry, SlotDescription, TokenProvider, TokenSession};

pub struct Pkcs11Provider {
    module_path: PathBuf,
}

impl Pkcs11Provider {
    pub fn new(module_path: impl Into<PathBuf>) -> Self {
        Pkcs11Provider {
            module_path: module_path.into(),
        }
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    fn context(&self) -> Result<Pkcs11, SignError> {
        let ctx = Pkcs11::new(&self.module_path).map_err(|e| {
            SignError::token_with(
                format!("cannot load PKCS#11 module {}", self.module_path.display()),
                e,
            )
        })?;
        ctx.initialize(CInitializeArgs::OsThreads)
            .map_err(|e| SignError::token_with("cannot initialize PKCS#11 module", e))?;
        Ok(ctx)
    }
}

impl TokenProvider for Pkcs11Provider {
    fn list_slots(&self) -> Result<Vec<SlotDescription>, SignError> {
        let ctx = self.context()?;
        let slots = ctx
            .get_slots_with_token()
            .map_err(|e| SignError::token_with("cannot enumerate slots", e))?;
        let mut described = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            let info = ctx
                .get_token_info(*slot)
                .map_err(|e| SignError::token_with(format!("cannot read token in slot {index}"), e))?;
            described.push(SlotDescription {
                slot: index,
                label: info.label().trim().to_string(),
                manufacturer: info.manufacturer_id().trim().to_string(),
                model: info.model().trim().to_string(),
                serial: info.serial_number().trim().to_string(),
            });
        }
        Ok(described)
    }

    fn open_session(&self, slot: usize, pin: &str) -> Result<Box<dyn TokenSession>, SignError> {
        let ctx = self.context()?;
        let slots = ctx
            .get_slots_with_token()
            .map_err(|e| SignError::token_with("cannot enumerate slots", e))?;
        let slot_id = slots.get(slot).copied().ok_or_else(|| {
            SignError::token(format!(
                "slot {slot} has no token present ({} available)",
                slots.len()
            ))
        })?;
        let session = ctx
            .open_ro_session(slot_id)
            .map_err(|e| SignError::token_with(format!("cannot open session on slot {slot}"), e))?;
        session
            .login(UserType::User, Some(&AuthPin::new(pin.into())))
            .map_err(|e| SignError::token_with("authentication failed", e))?;
        tracing::debug!(slot, "token session opened");
        let entries = load_entries(&session)?;
        Ok(Box::new(Pkcs11Session { session, entries }))
    }
}

struct StoredEntry {
    entry: KeyEntry,
    private_key: Option<ObjectHandle>,
}

struct Pkcs11Session {
    session: Session,
    entries: Vec<StoredEntry>,
}

/// Walks the certificate objects and pairs each with a private-key object
/// sharing its CKA_ID.
fn load_entries(session: &Session) -> Result<Vec<StoredEntry>, SignError> {
    let cert_handles = session
        .find_objects(&[Attribute::Class(ObjectClass::CERTIFICATE)])
        .map_err(|e| SignError::token_with("cannot enumerate certificates", e))?;
    let key_handles = session
        .find_objects(&[Attribute::Class(ObjectClass::PRIVATE_KEY)])
        .map_err(|e| SignError::token_with("cannot enumerate private keys", e))?;

    let mut key_ids: Vec<(Vec<u8>, ObjectHandle)> = Vec::with_capacity(key_handles.len());
    for handle in key_handles {
        let attrs = session
            .get_attributes(handle, &[AttributeType::Id])
            .map_err(|e| SignError::token_with("cannot read private-key attributes", e))?;
        for attr in attrs {
            if let Attribute::Id(id) = attr {
                key_ids.push((id, handle));
            }
        }
    }

    let mut entries = Vec::with_capacity(cert_handles.len());
    for handle in cert_handles {
        let attrs = session
            .get_attributes(
                handle,
                &[AttributeType::Label, AttributeType::Id, AttributeType::Value],
            )
            .map_err(|e| SignError::token_with("cannot read certificate attributes", e))?;
        let mut label: Option<Vec<u8>> = None;
        let mut id: Vec<u8> = Vec::new();
        let mut value: Option<Vec<u8>> = None;
        for attr in attrs {
            match attr {
                Attribute::Label(v) => label = Some(v),
                Attribute::Id(v) => id = v,
                Attribute::Value(v) => value = Some(v),
                _ => {}
            }
        }
        let alias = label
            .map(|l| String::from_utf8_lossy(&l).trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| hex::encode(&id));
        let private_key = if id.is_empty() {
            None
        } else {
            key_ids.iter().find(|(kid, _)| *kid == id).map(|(_, h)| *h)
        };
        entries.push(StoredEntry {
            entry: KeyEntry {
                alias,
                certificate: value,
                has_private_key: private_key.is_some(),
            },
            private_key,
        });
    }
    tracing::debug!(entries = entries.len(), "token inventory loaded");
    Ok(entries)
}

impl Pkcs11Session {
    fn stored(&self, alias: &str) -> Result<&StoredEntry, SignError> {
        self.entries
            .iter()
            .find(|s| s.entry.alias == alias)
            .ok_or_else(|| SignError::signing(format!("alias {alias:?} not found on token")))
    }
}

impl TokenSession for Pkcs11Session {
    fn entries(&self) -> Result<Vec<KeyEntry>, SignError> {
        Ok(self.entries.iter().map(|s| s.entry.clone()).collect())
    }

    fn sign(&self, alias: &str, data: &[u8]) -> Result<Vec<u8>, SignError> {
        let stored = self.stored(alias)?;
        let key = stored
            .private_key
            .ok_or_else(|| SignError::signing(format!("alias {alias:?} has no private key")))?;
        self.session
            .sign(&Mechanism::Sha256RsaPkcs, key, data)
            .map_err(|e| SignError::signing_with("token refused the signing operation", e))
    }

    fn certificate_chain(&self, alias: &str) -> Result<Vec<Vec<u8>>, SignError> {
        let leaf = self
            .stored(alias)?
            .entry
            .certificate
            .clone()
            .ok_or_else(|| SignError::signing(format!("alias {alias:?} has no certificate")))?;
        let pool: Vec<Vec<u8>> = self
            .entries
            .iter()
            .filter_map(|s| s.entry.certificate.clone())
            .collect();
        Ok(crate::select::build_chain(leaf, &pool))
    }
}

impl Drop for Pkcs11Session {
    fn drop(&mut self) {
        if let Err(e) = self.session.logout() {
            tracing::debug!(error = %e, "logout failed during session teardown");
        }
    }
}
