//! Smart-card signing backend: PKCS#11 session management, certificate
//! inventory and selection, and CAdES-B detached container assembly.
//!
//! Everything is reachable through the [`TokenProvider`]/[`TokenSession`]
//! capability traits; `Pkcs11Provider` is the hardware adapter and
//! `mock::MockToken` the in-memory double.

pub mod cades;
pub mod mock;
pub mod pkcs11;
pub mod provider;
pub mod select;

pub use cades::{CONTAINER_RESERVED_LEN, CadesBuilder};
pub use pkcs11::Pkcs11Provider;
pub use provider::{
    KeyEntry, SlotDescription, TokenProvider, TokenSession, WELL_KNOWN_MODULE_PATHS,
    resolve_module_path,
};
pub use select::{CertificateDescription, describe, select_alias, subject_name};
