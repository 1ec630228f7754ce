//! Module resolver: specifier -> executed, memoized export.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use nimbus_script::{Heap, Interpreter, Limits, ScriptError, Value};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::chain::CallChain;
use super::packages::{PackageRegistry, default_sdk};
use super::sandbox;
use super::specifier::{Specifier, classify};
use crate::cache::{FunctionCache, FunctionRecord};
use crate::config::RuntimeConfig;
use crate::error::ResolveError;

/// The export of one executed function module.
#[derive(Debug)]
pub struct ModuleInstance {
    /// Logical name of the module.
    pub name: String,
    /// Export record (`default`, `main`, named exports).
    pub exports: Value,
    /// Owner of the module's closures; must outlive any use of `exports`.
    pub heap: Arc<Heap>,
}

/// Outcome of resolving a specifier.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A workspace module, memoized by logical name.
    Module(Arc<ModuleInstance>),
    /// The SDK alias or a host package.
    External(Value),
}

impl Resolution {
    pub fn exports(&self) -> &Value {
        match self {
            Self::Module(instance) => &instance.exports,
            Self::External(value) => value,
        }
    }
}

/// First resolutions in progress, and who waits on whom.
#[derive(Default)]
struct Flights {
    slots: FxHashMap<String, Arc<Mutex<()>>>,
    holders: FxHashMap<String, ThreadId>,
    blocked: FxHashMap<ThreadId, String>,
}

impl Flights {
    /// Names `me` would wait through by blocking on `name`, if that wait
    /// ends at a slot `me` already holds.
    fn wait_cycle(&self, me: ThreadId, name: &str) -> Option<Vec<String>> {
        let mut path = vec![name.to_string()];
        let mut current = name.to_string();
        for _ in 0..=self.holders.len() {
            let holder = *self.holders.get(&current)?;
            if holder == me {
                return Some(path);
            }
            current = self.blocked.get(&holder)?.clone();
            path.push(current.clone());
        }
        None
    }
}

/// Releases a held slot; the map entry goes once nobody waits on it.
struct FlightGuard<'a> {
    flights: &'a Mutex<Flights>,
    name: &'a str,
    slot: &'a Arc<Mutex<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock();
        flights.holders.remove(self.name);
        let idle = flights
            .slots
            .get(self.name)
            .is_some_and(|s| Arc::ptr_eq(s, self.slot) && Arc::strong_count(s) == 2);
        if idle {
            flights.slots.remove(self.name);
        }
    }
}

/// Resolves specifiers to executed module exports.
///
/// With caching on, the first resolution of a name is single-flight: other
/// threads asking for the same name wait for it and then read the memo, so
/// a module body runs at most once per cache generation. A wait that would
/// close a loop between threads fails at once as a circular dependency.
pub struct ModuleResolver {
    this: Weak<ModuleResolver>,
    functions: Arc<FunctionCache>,
    memo: RwLock<FxHashMap<String, Arc<ModuleInstance>>>,
    flights: Mutex<Flights>,
    generation: AtomicU64,
    packages: PackageRegistry,
    sdk: RwLock<Value>,
    cache_enabled: bool,
    extension: String,
    limits: Limits,
    resolve_wait: Duration,
}

impl ModuleResolver {
    pub fn new(functions: Arc<FunctionCache>, config: &RuntimeConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            functions,
            memo: RwLock::new(FxHashMap::default()),
            flights: Mutex::new(Flights::default()),
            generation: AtomicU64::new(0),
            packages: PackageRegistry::new(),
            sdk: RwLock::new(default_sdk()),
            cache_enabled: config.module_cache_enabled,
            extension: config.source_extension.clone(),
            limits: config.limits(),
            resolve_wait: config.resolve_wait,
        })
    }

    /// Interpreter limits applied to every execution.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn functions(&self) -> &Arc<FunctionCache> {
        &self.functions
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Resolve the function named `name` as an entry point.
    pub fn load(&self, name: &str) -> Result<Arc<ModuleInstance>, ResolveError> {
        self.resolve_name(name, &format!("@/{name}"), &CallChain::new())
    }

    /// Resolve `specifier`, required from module `from` with ancestry `chain`.
    pub fn resolve(
        &self,
        specifier: &str,
        from: &str,
        chain: &CallChain,
    ) -> Result<Resolution, ResolveError> {
        match classify(specifier, from, &self.extension)? {
            Specifier::Sdk => Ok(Resolution::External(self.sdk.read().clone())),
            Specifier::Package(name) => self
                .packages
                .get(name)
                .map(Resolution::External)
                .ok_or_else(|| ResolveError::PackageNotFound(name.to_string())),
            Specifier::Local(name) => self
                .resolve_name(&name, specifier, chain)
                .map(Resolution::Module),
        }
    }

    fn resolve_name(
        &self,
        name: &str,
        specifier: &str,
        chain: &CallChain,
    ) -> Result<Arc<ModuleInstance>, ResolveError> {
        if let Some(instance) = self.memoized(name) {
            return Ok(instance);
        }

        if chain.contains(name) {
            let mut cycle = chain.names().to_vec();
            cycle.push(name.to_string());
            return Err(ResolveError::CircularDependency { chain: cycle });
        }

        let record = self
            .functions
            .get(name)
            .ok_or_else(|| ResolveError::ModuleNotFound {
                specifier: specifier.to_string(),
                name: name.to_string(),
            })?;

        if !self.cache_enabled {
            return self.instantiate(&record, chain.with(name));
        }

        let me = thread::current().id();
        let slot = {
            let mut flights = self.flights.lock();
            if let Some(path) = flights.wait_cycle(me, name) {
                let mut cycle = chain.names().to_vec();
                cycle.extend(path);
                return Err(ResolveError::CircularDependency { chain: cycle });
            }
            flights.blocked.insert(me, name.to_string());
            Arc::clone(flights.slots.entry(name.to_string()).or_default())
        };

        let guard = slot.try_lock_for(self.resolve_wait);
        {
            let mut flights = self.flights.lock();
            flights.blocked.remove(&me);
            if guard.is_some() {
                flights.holders.insert(name.to_string(), me);
            }
        }
        let Some(_guard) = guard else {
            return Err(ResolveError::Contended {
                name: name.to_string(),
                waited: self.resolve_wait,
            });
        };
        let _flight = FlightGuard {
            flights: &self.flights,
            name,
            slot: &slot,
        };

        if let Some(instance) = self.memoized(name) {
            return Ok(instance);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let instance = self.instantiate(&record, chain.with(name))?;

        // A clear or invalidate during instantiation means `record` may be stale.
        if self.generation.load(Ordering::Acquire) == generation {
            self.memo
                .write()
                .insert(name.to_string(), Arc::clone(&instance));
        }
        Ok(instance)
    }

    fn memoized(&self, name: &str) -> Option<Arc<ModuleInstance>> {
        if !self.cache_enabled {
            return None;
        }
        self.memo.read().get(name).cloned()
    }

    fn instantiate(
        &self,
        record: &FunctionRecord,
        chain: CallChain,
    ) -> Result<Arc<ModuleInstance>, ResolveError> {
        tracing::debug!(module = %record.name, chain = %chain, "instantiating module");

        let scope = sandbox::build(self.this.clone(), &record.name, chain);
        let mut interp = Interpreter::new(self.limits);
        interp.heap().retain(&scope);

        let exports = interp
            .run_module(&record.program, &scope)
            .map_err(|err| instantiate_error(&record.name, err))?;

        Ok(Arc::new(ModuleInstance {
            name: record.name.clone(),
            exports,
            heap: Arc::clone(interp.heap()),
        }))
    }

    /// Drop the memoized export of `name`.
    pub fn invalidate(&self, name: &str) -> bool {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.memo.write().remove(name).is_some()
    }

    /// Drop every memoized export.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.memo.write().clear();
    }

    /// Number of memoized modules.
    pub fn len(&self) -> usize {
        self.memo.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.memo.read().contains_key(name)
    }

    /// Register a host package for external specifiers.
    pub fn register_package(&self, name: impl Into<String>, exports: Value) {
        self.packages.register(name, exports);
    }

    /// Replace the export of the SDK alias.
    pub fn set_sdk(&self, sdk: Value) {
        *self.sdk.write() = sdk;
    }
}

impl std::fmt::Debug for ModuleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleResolver")
            .field("cache_enabled", &self.cache_enabled)
            .field("memoized", &self.len())
            .field("packages", &self.packages.names())
            .finish()
    }
}

/// A failed `require` inside the body surfaces as its own resolve error so
/// the typed chain stays intact; anything else names the failing module.
fn instantiate_error(name: &str, err: ScriptError) -> ResolveError {
    if let ScriptError::Host {
        source: Some(source),
        ..
    } = &err
    {
        if let Some(resolve) = source.downcast_ref::<ResolveError>() {
            return resolve.clone();
        }
    }
    ResolveError::Instantiate {
        name: name.to_string(),
        source: err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(files: &[(&str, &str)], cache: bool) -> Arc<ModuleResolver> {
        let functions = Arc::new(FunctionCache::new("/unused", "ns"));
        for (name, source) in files {
            functions.set(FunctionRecord::compile(name, source).unwrap());
        }
        let config = RuntimeConfig {
            module_cache_enabled: cache,
            ..RuntimeConfig::default()
        };
        ModuleResolver::new(functions, &config)
    }

    #[test]
    fn test_memoized_instance_is_shared() {
        let r = resolver(&[("a", "export default uuid()")], true);
        let first = r.load("a").unwrap();
        let second = r.load("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(r.is_cached("a"));
    }

    #[test]
    fn test_cache_disabled_reexecutes() {
        let r = resolver(&[("a", "export default uuid()")], false);
        let first = r.load("a").unwrap();
        let second = r.load("a").unwrap();
        assert_ne!(first.exports, second.exports);
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn test_relative_require() {
        let r = resolver(
            &[
                ("lib/math", "export fn double(x) { return x * 2 }"),
                ("api/calc", "const m = require('../lib/math')\nexport default m.double(21)"),
            ],
            true,
        );
        let instance = r.load("api/calc").unwrap();
        assert_eq!(instance.exports.get("default"), Some(Value::from(42i64)));
        assert!(r.is_cached("lib/math"));
    }

    #[test]
    fn test_cycle_detected() {
        let r = resolver(
            &[
                ("a", "export default require('./b')"),
                ("b", "export default require('./a')"),
            ],
            true,
        );
        let err = r.load("a").unwrap_err();
        match err.root_cause() {
            ResolveError::CircularDependency { chain } => assert_eq!(chain, &["a", "b", "a"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!r.is_cached("a"));
        assert!(!r.is_cached("b"));
    }

    #[test]
    fn test_missing_module_and_package() {
        let r = resolver(&[("a", "export default require('./nope')")], true);
        let err = r.load("a").unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ResolveError::ModuleNotFound { name, .. } if name == "nope"
        ));

        let chain = CallChain::new().with("a");
        assert!(matches!(
            r.resolve("left-pad", "a", &chain),
            Err(ResolveError::PackageNotFound(_))
        ));
    }

    #[test]
    fn test_sdk_replaceable() {
        let r = resolver(&[], true);
        let chain = CallChain::new();
        let sdk = r.resolve("@/cloud-sdk", "", &chain).unwrap();
        assert_eq!(sdk.exports().get("name"), Some(Value::from("nimbus")));

        r.set_sdk(Value::object([("name", Value::from("custom"))]));
        let sdk = r.resolve("@/cloud-sdk", "", &chain).unwrap();
        assert_eq!(sdk.exports().get("name"), Some(Value::from("custom")));
    }

    #[test]
    fn test_body_error_names_module() {
        let r = resolver(&[("broken", "throw 'boom'")], true);
        let err = r.load("broken").unwrap_err();
        assert!(matches!(err, ResolveError::Instantiate { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_slots_released_after_success_and_failure() {
        let r = resolver(
            &[("ok", "export default 1"), ("broken", "throw 'boom'")],
            true,
        );
        r.load("ok").unwrap();
        assert!(r.load("broken").is_err());
        let flights = r.flights.lock();
        assert!(flights.slots.is_empty());
        assert!(flights.holders.is_empty());
        assert!(flights.blocked.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let r = resolver(&[("a", "export default 1")], true);
        r.load("a").unwrap();
        assert!(r.invalidate("a"));
        assert!(!r.is_cached("a"));
        r.load("a").unwrap();
        r.clear();
        assert!(r.is_empty());
    }
}
