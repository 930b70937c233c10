use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::PluginError;

/// One discoverable implementation: a name, an availability probe, and a
/// factory producing a default-configured instance.
///
/// Discovery returns every registered entry regardless of what the probe
/// reports; callers consult [`is_usable`](PluginEntry::is_usable) before
/// instantiating.
pub struct PluginEntry<T> {
    name: String,
    usable: fn() -> bool,
    build: Arc<dyn Fn() -> T + Send + Sync>,
}

// Not derived: entries are clonable for any T, the derive would demand
// T: Clone.
impl<T> Clone for PluginEntry<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            usable: self.usable,
            build: self.build.clone(),
        }
    }
}

impl<T> PluginEntry<T> {
    pub fn new(
        name: impl Into<String>,
        usable: fn() -> bool,
        build: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            usable,
            build: Arc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this implementation's runtime requirements (e.g. an optional
    /// native dependency) are currently satisfied.
    pub fn is_usable(&self) -> bool {
        (self.usable)()
    }

    /// Instantiate the implementation. Callers should have checked
    /// [`is_usable`](PluginEntry::is_usable) first.
    pub fn instantiate(&self) -> T {
        (self.build)()
    }
}

type ListFn<T> = Arc<dyn Fn() -> Result<Vec<PluginEntry<T>>, PluginError> + Send + Sync>;

/// A batch of candidate registrations. Sources replace the runtime module
/// scan of older plugin systems: each source is enumerated explicitly and
/// evaluated at discovery time.
///
/// A guard returning false is a deliberate opt-out: the whole source
/// contributes nothing, typically because an optional dependency is absent.
pub struct PluginSource<T> {
    name: String,
    guard: Option<fn() -> bool>,
    list: ListFn<T>,
}

impl<T> Clone for PluginSource<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            guard: self.guard,
            list: self.list.clone(),
        }
    }
}

impl<T> PluginSource<T> {
    pub fn new(
        name: impl Into<String>,
        list: impl Fn() -> Result<Vec<PluginEntry<T>>, PluginError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            guard: None,
            list: Arc::new(list),
        }
    }

    /// Gate this source on a probe re-evaluated at every (re)discovery.
    pub fn guarded(mut self, guard: fn() -> bool) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Name→implementation registry.
///
/// Built-in sources are always evaluated. Extra sources are evaluated only
/// when named in the configured environment variable, which holds a
/// path-separator-delimited list of source names. The discovery result is
/// cached; [`rediscover`](PluginRegistry::rediscover) re-reads the
/// environment and re-runs every guard.
pub struct PluginRegistry<T> {
    env_var: String,
    builtin: Vec<PluginSource<T>>,
    extra: Vec<PluginSource<T>>,
    cache: RwLock<Option<Arc<HashMap<String, PluginEntry<T>>>>>,
}

impl<T> PluginRegistry<T> {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
            builtin: Vec::new(),
            extra: Vec::new(),
            cache: RwLock::new(None),
        }
    }

    /// Add a source that is always evaluated.
    pub fn with_source(mut self, source: PluginSource<T>) -> Self {
        self.builtin.push(source);
        self
    }

    /// Add a source evaluated only when its name appears in the registry's
    /// environment variable.
    pub fn with_env_source(mut self, source: PluginSource<T>) -> Self {
        self.extra.push(source);
        self
    }

    /// Evaluate all active sources and return the name→entry table.
    /// The result is cached until [`rediscover`](PluginRegistry::rediscover).
    pub fn discover(&self) -> Result<Arc<HashMap<String, PluginEntry<T>>>, PluginError> {
        if let Some(cached) = self.cache.read().as_ref() {
            return Ok(cached.clone());
        }
        let table = Arc::new(self.scan()?);
        *self.cache.write() = Some(table.clone());
        Ok(table)
    }

    /// Drop the cached table and discover again.
    pub fn rediscover(&self) -> Result<Arc<HashMap<String, PluginEntry<T>>>, PluginError> {
        *self.cache.write() = None;
        self.discover()
    }

    /// Look up one discovered entry by name.
    pub fn get(&self, name: &str) -> Result<PluginEntry<T>, PluginError> {
        self.discover()?
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::UnknownName(name.to_string()))
    }

    /// Names of all discovered entries.
    pub fn names(&self) -> Result<Vec<String>, PluginError> {
        let mut names: Vec<String> = self.discover()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn active_extras(&self) -> Vec<&PluginSource<T>> {
        let raw = match std::env::var(&self.env_var) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        let mut active = Vec::new();
        for name in raw.split(path_separator()).filter(|s| !s.is_empty()) {
            match self.extra.iter().find(|s| s.name == name) {
                Some(s) => active.push(s),
                None => warn!(
                    source = name,
                    env_var = %self.env_var,
                    "unknown plugin source named in environment, skipping"
                ),
            }
        }
        active
    }

    fn scan(&self) -> Result<HashMap<String, PluginEntry<T>>, PluginError> {
        let mut table: HashMap<String, PluginEntry<T>> = HashMap::new();
        // Which source each name came from, for duplicate reporting.
        let mut origin: HashMap<String, String> = HashMap::new();

        let sources = self.builtin.iter().chain(self.active_extras());
        for source in sources {
            if let Some(guard) = source.guard {
                if !guard() {
                    debug!(source = %source.name, "plugin source opted out");
                    continue;
                }
            }
            let entries = match (source.list)() {
                Ok(entries) => entries,
                Err(e) => {
                    // One broken source must not abort discovery of the rest.
                    warn!(source = %source.name, error = %e, "plugin source failed, skipping");
                    continue;
                }
            };
            for entry in entries {
                if let Some(first) = origin.get(entry.name()) {
                    return Err(PluginError::DuplicateName {
                        name: entry.name().to_string(),
                        first: first.clone(),
                        second: source.name.clone(),
                    });
                }
                origin.insert(entry.name().to_string(), source.name.clone());
                table.insert(entry.name().to_string(), entry);
            }
        }
        Ok(table)
    }
}

fn path_separator() -> char {
    if cfg!(windows) { ';' } else { ':' }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    trait Algo: Send + Sync {
        fn tag(&self) -> &'static str;
    }

    struct AlgoA;
    impl Algo for AlgoA {
        fn tag(&self) -> &'static str {
            "a"
        }
    }

    struct AlgoB;
    impl Algo for AlgoB {
        fn tag(&self) -> &'static str {
            "b"
        }
    }

    fn entry(name: &str, usable: fn() -> bool) -> PluginEntry<Box<dyn Algo>> {
        match name {
            "AlgoA" => PluginEntry::new(name, usable, || Box::new(AlgoA) as Box<dyn Algo>),
            _ => PluginEntry::new(name, usable, || Box::new(AlgoB) as Box<dyn Algo>),
        }
    }

    #[test]
    fn test_discover_and_instantiate() {
        let reg = PluginRegistry::new("PERCEPT_TEST_UNSET").with_source(PluginSource::new(
            "builtin",
            || Ok(vec![entry("AlgoA", || true), entry("AlgoB", || false)]),
        ));
        let table = reg.discover().unwrap();
        assert_eq!(table.len(), 2);

        let a = reg.get("AlgoA").unwrap();
        assert!(a.is_usable());
        assert_eq!(a.instantiate().tag(), "a");

        // Unusable entries are still returned; the probe is advisory.
        let b = reg.get("AlgoB").unwrap();
        assert!(!b.is_usable());

        assert!(matches!(
            reg.get("Nope"),
            Err(PluginError::UnknownName(_))
        ));
    }

    #[test]
    fn test_entry_clones_without_clonable_instances() {
        // Box<dyn Algo> is not Clone; the entry must still be.
        let e = entry("AlgoA", || true);
        let c = e.clone();
        assert_eq!(c.name(), e.name());
        assert_eq!(c.instantiate().tag(), e.instantiate().tag());
    }

    #[test]
    fn test_guarded_source_opt_out() {
        // Guard is false: the source defines entries but contributes none.
        let reg = PluginRegistry::new("PERCEPT_TEST_UNSET")
            .with_source(
                PluginSource::new("optional", || Ok(vec![entry("AlgoA", || true)]))
                    .guarded(|| false),
            );
        assert!(reg.discover().unwrap().is_empty());
    }

    #[test]
    fn test_failing_source_is_skipped() {
        let reg = PluginRegistry::new("PERCEPT_TEST_UNSET")
            .with_source(PluginSource::new("broken", || {
                Err(PluginError::Source("dependency import failed".into()))
            }))
            .with_source(PluginSource::new("ok", || {
                Ok(vec![entry("AlgoA", || true)])
            }));
        let table = reg.discover().unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains_key("AlgoA"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let reg = PluginRegistry::new("PERCEPT_TEST_UNSET")
            .with_source(PluginSource::new("one", || Ok(vec![entry("AlgoA", || true)])))
            .with_source(PluginSource::new("two", || Ok(vec![entry("AlgoA", || true)])));
        assert!(matches!(
            reg.discover(),
            Err(PluginError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_env_sources_and_rediscover() {
        let var = "PERCEPT_TEST_PLUGIN_PATH";
        unsafe { std::env::remove_var(var) };

        let make = || {
            PluginRegistry::new(var)
                .with_source(PluginSource::new("builtin", || {
                    Ok(vec![entry("AlgoA", || true)])
                }))
                .with_env_source(PluginSource::new("extra", || {
                    Ok(vec![entry("AlgoB", || true)])
                }))
        };

        let reg = make();
        assert_eq!(reg.names().unwrap(), vec!["AlgoA"]);

        // Activating the extra source only takes effect on a forced re-scan.
        unsafe { std::env::set_var(var, "extra") };
        assert_eq!(reg.names().unwrap(), vec!["AlgoA"]);
        let table = reg.rediscover().unwrap();
        assert_eq!(table.len(), 2);

        // Unknown names in the variable are skipped.
        unsafe { std::env::set_var(var, "extra:missing") };
        assert_eq!(reg.rediscover().unwrap().len(), 2);

        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn test_guard_reevaluated_on_rediscover() {
        static ENABLED: AtomicBool = AtomicBool::new(false);

        let reg = PluginRegistry::new("PERCEPT_TEST_UNSET").with_source(
            PluginSource::new("toggled", || Ok(vec![entry("AlgoA", || true)]))
                .guarded(|| ENABLED.load(Ordering::SeqCst)),
        );

        assert!(reg.discover().unwrap().is_empty());
        ENABLED.store(true, Ordering::SeqCst);
        // Cached result until rediscovery is forced.
        assert!(reg.discover().unwrap().is_empty());
        assert_eq!(reg.rediscover().unwrap().len(), 1);
    }
}
