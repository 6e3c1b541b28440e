//! Records with a stable identity that other records can point at.

use crate::id::{RecordRef, Uuid};

/// A record that keeps its identity for life and can be referenced from
/// elsewhere (ledger entries, audit trails).
pub trait Entity {
    /// Tag stored next to the id in a [`RecordRef`], e.g. `"prescription_line"`.
    const KIND: &'static str;

    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + Into<Uuid>;

    fn id(&self) -> &Self::Id;

    /// Typed reference to this record.
    fn record_ref(&self) -> RecordRef {
        let id: Uuid = (*self.id()).into();
        RecordRef::new(Self::KIND, id)
    }
}
