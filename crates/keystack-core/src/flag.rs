// Keystack State Flags
// Interned boolean variables allocated per compilation

use std::fmt;

use indexmap::IndexMap;

/// A boolean host variable, as an index into the [`FlagNamespace`] that
/// allocated it.
///
/// The compiler only emits side effects on flags (set / clear) and
/// conditions over them; their runtime values belong to the host engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateFlag(u32);

impl StateFlag {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flag#{}", self.0)
    }
}

/// Arena of flag names for one compilation.
///
/// `intern` is for names that mean the same thing wherever they appear
/// (layer flags, user variables); `allocate` always returns a fresh flag and
/// is used for compiler-owned flags such as sequence steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagNamespace {
    names: IndexMap<String, StateFlag>,
}

impl FlagNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the flag named `name`, creating it on first use
    pub fn intern(&mut self, name: &str) -> StateFlag {
        if let Some(flag) = self.names.get(name) {
            return *flag;
        }
        self.insert(name.to_string())
    }

    /// Allocate a new flag whose name starts with `base`.
    ///
    /// If `base` is taken, `_2`, `_3`, ... are appended until the name is free.
    pub fn allocate(&mut self, base: &str) -> StateFlag {
        if !self.names.contains_key(base) {
            return self.insert(base.to_string());
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}", base, suffix);
            if !self.names.contains_key(&candidate) {
                return self.insert(candidate);
            }
            suffix += 1;
        }
    }

    fn insert(&mut self, name: String) -> StateFlag {
        let flag = StateFlag(self.names.len() as u32);
        log::trace!("allocated {} = '{}'", flag, name);
        self.names.insert(name, flag);
        flag
    }

    /// Name of a flag allocated by this namespace
    pub fn name(&self, flag: StateFlag) -> &str {
        self.names
            .get_index(flag.index())
            .map(|(name, _)| name.as_str())
            .unwrap_or("<unknown>")
    }

    /// Look up a flag by name without creating it
    pub fn get(&self, name: &str) -> Option<StateFlag> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All flags in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (StateFlag, &str)> + '_ {
        self.names.iter().map(|(name, flag)| (*flag, name.as_str()))
    }
}
