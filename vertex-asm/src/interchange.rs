//! The cross-module import/export interchange format: a YAML document with
//! `globals`, `data`, and `routines` sections, each a name → record map.
//!
//! Only the `routines` section is read/written by the assembler itself (an
//! imported routine's `address` is what resolves an external label); the
//! `globals` and `data` sections are carried opaquely so the Storn code
//! generator can round-trip the type information it cares about without
//! this crate needing to understand it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A routine's resolved entry point, as recorded in the interchange file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineEntry {
    pub address: u16,
}

/// The full interchange document for one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleInterchange {
    #[serde(default)]
    pub globals: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub data: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub routines: HashMap<String, RoutineEntry>,
}

impl ModuleInterchange {
    /// An empty interchange document, as used when a module declares no
    /// imports.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_yaml() {
        let mut doc = ModuleInterchange::empty();
        doc.routines.insert("main".to_string(), RoutineEntry { address: 0x8000 });
        let text = doc.to_yaml().unwrap();
        let parsed = ModuleInterchange::from_yaml(&text).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let doc = ModuleInterchange::from_yaml("routines: {}\n").unwrap();
        assert!(doc.globals.is_empty());
        assert!(doc.data.is_empty());
    }
}
