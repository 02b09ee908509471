//! The fixed catalog of obfuscation methods understood by the engine.
//!
//! Each method owns a stable bit position; selections travel through the
//! system as a bitmask and are only expanded into engine flags at the
//! invocation boundary.

use serde::Serialize;

use crate::errors::{CoreError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct ObfuscationMethod {
    /// Stable machine identifier, doubles as the engine's `--<key>` flag.
    pub key: &'static str,
    pub display_name: &'static str,
    /// Bit positions are dense: the registry always covers `{0..N-1}`.
    pub bit_position: u8,
    pub enabled_by_default: bool,
    pub description: &'static str,
}

/// Read-only after construction. No component may re-number or remove
/// entries at runtime; hand it around behind an `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct MethodRegistry {
    methods: Vec<ObfuscationMethod>,
}

impl MethodRegistry {
    /// Builds a registry, enforcing unique keys and dense bit positions
    /// (`{0, 1, ..., N-1}`, no gaps, no duplicates, N <= 64).
    pub fn new(methods: Vec<ObfuscationMethod>) -> Result<Self> {
        let n = methods.len();
        if n > 64 {
            return Err(CoreError::Other(format!(
                "registry holds {n} methods, the bitmask supports at most 64"
            )));
        }
        let mut seen_bits = 0u64;
        for method in &methods {
            let bit = method.bit_position;
            if usize::from(bit) >= n {
                return Err(CoreError::Other(format!(
                    "method '{}' has bit position {bit}, outside 0..{n}",
                    method.key
                )));
            }
            if seen_bits & (1 << bit) != 0 {
                return Err(CoreError::Other(format!(
                    "duplicate bit position {bit} in registry"
                )));
            }
            seen_bits |= 1 << bit;
            if methods.iter().filter(|m| m.key == method.key).count() > 1 {
                return Err(CoreError::Other(format!(
                    "duplicate method key '{}' in registry",
                    method.key
                )));
            }
        }
        Ok(Self { methods })
    }

    /// The engine's method catalog.
    pub fn standard() -> Self {
        Self::new(STANDARD_METHODS.to_vec()).expect("standard registry is well formed")
    }

    /// Methods in registry order.
    pub fn methods(&self) -> &[ObfuscationMethod] {
        &self.methods
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Lookup by human label. Absence is a value, never a panic.
    pub fn find_by_display_name(&self, name: &str) -> Option<&ObfuscationMethod> {
        self.methods.iter().find(|m| m.display_name == name)
    }

    /// Lookup by machine key.
    pub fn find_by_key(&self, key: &str) -> Option<&ObfuscationMethod> {
        self.methods.iter().find(|m| m.key == key)
    }

    /// Bitmask with every default-enabled method set.
    pub fn default_mask(&self) -> u64 {
        self.methods
            .iter()
            .filter(|m| m.enabled_by_default)
            .fold(0, |mask, m| mask | (1 << m.bit_position))
    }

    /// Largest valid bitmask value for this registry.
    pub fn max_mask(&self) -> u64 {
        if self.methods.len() == 64 {
            u64::MAX
        } else {
            (1u64 << self.methods.len()) - 1
        }
    }
}

const STANDARD_METHODS: &[ObfuscationMethod] = &[
    ObfuscationMethod {
        key: "control_flow",
        display_name: "Control Flow",
        bit_position: 0,
        enabled_by_default: true,
        description: "Rewrites the execution path so static analysis has to chase \
                      a scrambled control flow.",
    },
    ObfuscationMethod {
        key: "variable_renaming",
        display_name: "Variable Renaming",
        bit_position: 1,
        enabled_by_default: true,
        description: "Replaces variable names with meaningless identifiers to hide \
                      their purpose.",
    },
    ObfuscationMethod {
        key: "garbage_code",
        display_name: "Garbage Code",
        bit_position: 2,
        enabled_by_default: true,
        description: "Injects non-functional statements that only exist to confuse \
                      decompilers.",
    },
    ObfuscationMethod {
        key: "opaque_preds",
        display_name: "Opaque Predicates",
        bit_position: 3,
        enabled_by_default: true,
        description: "Adds predicates with fixed outcomes that obscure the real \
                      branching logic.",
    },
    ObfuscationMethod {
        key: "bytecode_encoder",
        display_name: "Bytecode Encoding",
        bit_position: 4,
        enabled_by_default: false,
        description: "Encodes the program's bytecode so the original instructions \
                      cannot be read off directly.",
    },
    ObfuscationMethod {
        key: "string_encoding",
        display_name: "String Encoding",
        bit_position: 5,
        enabled_by_default: false,
        description: "Encodes string literals to keep embedded data out of plain \
                      sight.",
    },
    ObfuscationMethod {
        key: "compressor",
        display_name: "Code Compressor",
        bit_position: 6,
        enabled_by_default: true,
        description: "Compresses the source, stripping readability as a side \
                      effect.",
    },
    ObfuscationMethod {
        key: "string_to_expr",
        display_name: "String to Expression",
        bit_position: 7,
        enabled_by_default: false,
        description: "Turns strings into expressions that only resolve at runtime.",
    },
    ObfuscationMethod {
        key: "virtual_machine",
        display_name: "Virtual Machine",
        bit_position: 8,
        enabled_by_default: true,
        description: "Runs code through a custom virtual machine, a heavy layer \
                      against static analysis.",
    },
    ObfuscationMethod {
        key: "wrap_in_func",
        display_name: "Function Wrapping",
        bit_position: 9,
        enabled_by_default: true,
        description: "Wraps blocks into functions to break up the program's \
                      natural structure.",
    },
    ObfuscationMethod {
        key: "func_inlining",
        display_name: "Function Inlining",
        bit_position: 10,
        enabled_by_default: false,
        description: "Merges functions into their call sites so boundaries \
                      disappear.",
    },
    ObfuscationMethod {
        key: "dynamic_code",
        display_name: "Dynamic Code",
        bit_position: 11,
        enabled_by_default: false,
        description: "Generates or rewrites code at runtime, defeating ahead-of-time \
                      inspection.",
    },
    ObfuscationMethod {
        key: "antitamper",
        display_name: "Anti-Tampering",
        bit_position: 12,
        enabled_by_default: true,
        description: "Plants integrity checks that detect modified code.",
    },
];
