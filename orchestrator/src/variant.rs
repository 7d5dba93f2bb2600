//! Production / tester variant selection.
//!
//! Tester artifacts expose extra inspection methods but keep the same
//! constructor and setter shapes, so swapping them in leaves identities,
//! dependency lists and orchestration order untouched.

use crate::registry::DescriptorTable;
use crate::types::{TableKind, Variant};

impl Variant {
    pub fn from_flag(use_testers: bool) -> Self {
        if use_testers {
            Variant::Tester
        } else {
            Variant::Production
        }
    }
}

impl DescriptorTable {
    /// Same table with every artifact swapped for `variant`.
    pub fn select(mut self, variant: Variant) -> Self {
        self.set_variant(variant);
        self
    }
}

/// Fixed table for `kind`, with tester artifacts when `use_testers` is set.
pub fn select_variant(kind: TableKind, use_testers: bool) -> DescriptorTable {
    DescriptorTable::fixed(kind).select(Variant::from_flag(use_testers))
}
