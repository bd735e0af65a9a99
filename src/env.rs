use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;
use std::sync::Arc;

/// Copy-on-write mapping from variable name to value.
///
/// Holds both ordinary variables (`PATH`, `PATHEXT`, ...) and mangled alias
/// entries. Cloning shares the underlying map; the first mutation through a
/// shared handle copies it, so a frame's changes are never visible to the frame
/// it was cloned from.
#[derive(Debug, Clone, Default)]
pub struct EnvMap {
    vars: Arc<HashMap<String, String>>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        stdenv::vars_os()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable, copying the map first if it is shared.
    pub fn set(&mut self, key: impl Into<String>, val: impl Into<String>) {
        Arc::make_mut(&mut self.vars).insert(key.into(), val.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries ordered lexicographically by key.
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// `true` when both handles point at the very same map, i.e. no copy has been made.
    pub fn shares_storage_with(&self, other: &EnvMap) -> bool {
        Arc::ptr_eq(&self.vars, &other.vars)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: Arc::new(
                iter.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for EnvMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let vars = Arc::make_mut(&mut self.vars);
        for (k, v) in iter {
            vars.insert(k.into(), v.into());
        }
    }
}

impl PartialEq for EnvMap {
    fn eq(&self, other: &Self) -> bool {
        self.shares_storage_with(other) || self.vars == other.vars
    }
}

impl Eq for EnvMap {}

/// Ambient state of one dispatch frame: variables plus working directory.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Variables (and aliases) visible to built-ins and to launched programs.
    pub vars: EnvMap,
    /// The working directory relative identifiers and child processes use.
    pub current_dir: PathBuf,
}

impl Environment {
    pub fn new(vars: EnvMap, current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars,
            current_dir: current_dir.into(),
        }
    }

    /// Capture the current process state into a new `Environment` instance.
    pub fn from_process() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(EnvMap::from_process(), current_dir)
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key)
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.set(key, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_copies_shared_map() {
        let parent: EnvMap = [("KEY", "parent")].into_iter().collect();
        let mut child = parent.clone();
        assert!(child.shares_storage_with(&parent));

        child.set("KEY", "child");
        child.set("OTHER", "x");

        assert!(!child.shares_storage_with(&parent));
        assert_eq!(parent.get("KEY"), Some("parent"));
        assert_eq!(parent.get("OTHER"), None);
        assert_eq!(child.get("KEY"), Some("child"));
    }

    #[test]
    fn test_sorted_orders_by_key() {
        let env: EnvMap = [("foo", "abc"), ("bar", "xyz"), ("Baz", "1")]
            .into_iter()
            .collect();
        assert_eq!(
            env.sorted(),
            vec![("Baz", "1"), ("bar", "xyz"), ("foo", "abc")]
        );
    }

    #[test]
    fn test_environment_does_not_fall_back_to_process_env() {
        let env = Environment::new(EnvMap::new(), "/");
        assert_eq!(env.get_var("PATH"), None);
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::from_process();
        assert!(env.get_var("PATH").is_some());
    }
}
