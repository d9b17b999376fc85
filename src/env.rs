use std::collections::{BTreeMap, HashMap};

/// Read access to a set of environment variables.
pub trait EnvLookup {
    fn get_var(&self, key: &str) -> Option<String>;

    fn contains_key(&self, key: &str) -> bool {
        self.get_var(key).is_some()
    }
}

/// Read/write access to a set of environment variables.
pub trait EnvStore: EnvLookup {
    fn set_var(&mut self, key: &str, value: &str);
}

/// Read-only view of the current process environment.
///
/// Values that are not valid UTF-8 are converted lossily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemEnv;

impl EnvLookup for SystemEnv {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
    }

    fn contains_key(&self, key: &str) -> bool {
        std::env::var_os(key).is_some()
    }
}

/// Lookup that knows no variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmptyEnv;

impl EnvLookup for EmptyEnv {
    fn get_var(&self, _key: &str) -> Option<String> {
        None
    }
}

impl<T: EnvLookup + ?Sized> EnvLookup for &T {
    fn get_var(&self, key: &str) -> Option<String> {
        (**self).get_var(key)
    }

    fn contains_key(&self, key: &str) -> bool {
        (**self).contains_key(key)
    }
}

impl<T: EnvLookup + ?Sized> EnvLookup for &mut T {
    fn get_var(&self, key: &str) -> Option<String> {
        (**self).get_var(key)
    }

    fn contains_key(&self, key: &str) -> bool {
        (**self).contains_key(key)
    }
}

impl<T: EnvStore + ?Sized> EnvStore for &mut T {
    fn set_var(&mut self, key: &str, value: &str) {
        (**self).set_var(key, value);
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn get_var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn contains_key(&self, key: &str) -> bool {
        BTreeMap::contains_key(self, key)
    }
}

impl EnvStore for BTreeMap<String, String> {
    fn set_var(&mut self, key: &str, value: &str) {
        self.insert(key.to_owned(), value.to_owned());
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get_var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn contains_key(&self, key: &str) -> bool {
        HashMap::contains_key(self, key)
    }
}

impl EnvStore for HashMap<String, String> {
    fn set_var(&mut self, key: &str, value: &str) {
        self.insert(key.to_owned(), value.to_owned());
    }
}

/// Destination for loaded environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    kind: TargetEnvKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TargetEnvKind {
    /// Apply entries to the current process environment.
    ///
    /// This writes through [`std::env::set_var`], which mutates global process
    /// state and is not thread-safe for concurrent environment access.
    Process,
    /// Apply entries to an in-memory map.
    Memory(BTreeMap<String, String>),
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::memory()
    }
}

impl TargetEnv {
    /// Create a process-environment target.
    ///
    /// # Safety
    ///
    /// The caller must ensure no other threads concurrently read or write the
    /// process environment for the duration of operations that may mutate this
    /// target.
    pub unsafe fn process() -> Self {
        Self {
            kind: TargetEnvKind::Process,
        }
    }

    /// Create an in-memory environment target.
    ///
    /// Use this to avoid mutating the process environment.
    pub fn memory() -> Self {
        Self::from_memory(BTreeMap::new())
    }

    /// Create an in-memory environment target from an existing map.
    pub fn from_memory(map: BTreeMap<String, String>) -> Self {
        Self {
            kind: TargetEnvKind::Memory(map),
        }
    }

    pub fn is_process(&self) -> bool {
        matches!(self.kind, TargetEnvKind::Process)
    }

    pub fn as_memory(&self) -> Option<&BTreeMap<String, String>> {
        match &self.kind {
            TargetEnvKind::Memory(map) => Some(map),
            TargetEnvKind::Process => None,
        }
    }

    pub fn into_memory(self) -> Option<BTreeMap<String, String>> {
        match self.kind {
            TargetEnvKind::Memory(map) => Some(map),
            TargetEnvKind::Process => None,
        }
    }
}

impl EnvLookup for TargetEnv {
    fn get_var(&self, key: &str) -> Option<String> {
        match &self.kind {
            TargetEnvKind::Process => SystemEnv.get_var(key),
            TargetEnvKind::Memory(map) => map.get(key).cloned(),
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        match &self.kind {
            TargetEnvKind::Process => SystemEnv.contains_key(key),
            TargetEnvKind::Memory(map) => map.contains_key(key),
        }
    }
}

impl EnvStore for TargetEnv {
    fn set_var(&mut self, key: &str, value: &str) {
        match &mut self.kind {
            // SAFETY: `TargetEnv::process` is unsafe and its caller vouched for
            // exclusive access to the process environment.
            TargetEnvKind::Process => unsafe { std::env::set_var(key, value) },
            TargetEnvKind::Memory(map) => {
                map.insert(key.to_owned(), value.to_owned());
            }
        }
    }
}
