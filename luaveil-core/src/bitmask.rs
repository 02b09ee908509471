//! Translation between method-selection bitmasks and engine flag keys.
//!
//! The engine understands named flags, not bit vectors. This is the single
//! translation point, so masks can live in UI state and wire formats
//! without flag strings being built prematurely. The functions are pure;
//! the registry is small and fixed, so no caching is warranted.

use crate::errors::{CoreError, Result};
use crate::registry::MethodRegistry;

/// Expands a bitmask into the active method keys, in registry order.
///
/// Fails with `OutOfRange` for any mask above the registry's width and
/// produces no partial result.
pub fn active_keys<'r>(registry: &'r MethodRegistry, mask: u64) -> Result<Vec<&'r str>> {
    let max = registry.max_mask();
    if mask > max {
        return Err(CoreError::OutOfRange { mask, max });
    }
    Ok(registry
        .methods()
        .iter()
        .filter(|m| mask & (1 << m.bit_position) != 0)
        .map(|m| m.key)
        .collect())
}

/// Flips exactly one bit. The UI only offers valid positions, but the
/// range is checked anyway.
pub fn toggle(registry: &MethodRegistry, mask: u64, bit: u8) -> Result<u64> {
    if usize::from(bit) >= registry.len() {
        return Err(CoreError::UnknownBit(bit));
    }
    Ok(mask ^ (1 << bit))
}

/// A per-interaction method selection. Constructed from the registry
/// defaults, mutated by toggling, consumed once when a job launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSelection(u64);

impl MethodSelection {
    /// Selection with every default-enabled method set.
    pub fn defaults(registry: &MethodRegistry) -> Self {
        Self(registry.default_mask())
    }

    /// Range-checked construction from a raw mask.
    pub fn from_mask(registry: &MethodRegistry, mask: u64) -> Result<Self> {
        let max = registry.max_mask();
        if mask > max {
            return Err(CoreError::OutOfRange { mask, max });
        }
        Ok(Self(mask))
    }

    pub fn toggle(&mut self, registry: &MethodRegistry, bit: u8) -> Result<()> {
        self.0 = toggle(registry, self.0, bit)?;
        Ok(())
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn mask(self) -> u64 {
        self.0
    }
}
