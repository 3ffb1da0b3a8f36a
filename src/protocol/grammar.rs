// protocol/grammar.rs - Protocol Grammar Resolution

//! Lookup of protocol grammars by name
//!
//! [`ProtocolGrammar`] is the seam conversations validate through. Resolution
//! never fails: an unknown protocol is `None`, and conversations then track
//! messages without validating them.

use super::standard;
use super::state_machine::{GrammarError, StateMachine};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolve a protocol name to its grammar
pub trait ProtocolGrammar: Send + Sync {
    fn resolve(&self, protocol: &str, resource_dir: &Path) -> Option<Arc<StateMachine>>;
}

impl<G: ProtocolGrammar + ?Sized> ProtocolGrammar for Arc<G> {
    fn resolve(&self, protocol: &str, resource_dir: &Path) -> Option<Arc<StateMachine>> {
        (**self).resolve(protocol, resource_dir)
    }
}

/// Grammar used when none is given: JSON files from the resource directory,
/// falling back to the FIPA standard protocols, behind a cache.
pub fn default_grammar() -> Arc<dyn ProtocolGrammar> {
    let library = GrammarLibrary::fipa_standard();
    Arc::new(CachedGrammar::new(DirectoryGrammar::with_fallback(library)))
}

/// `FIPA-Request`, `fipa_request` and `request` all name the same protocol.
fn normalize(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase().replace('_', "-");
    match lower.strip_prefix("fipa-") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

// =============================================================================
// In-memory library
// =============================================================================

/// In-memory grammars keyed by normalized protocol name
#[derive(Debug, Clone, Default)]
pub struct GrammarLibrary {
    machines: HashMap<String, Arc<StateMachine>>,
}

impl GrammarLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// FIPA request, query, request-when, contract-net, subscribe and propose
    pub fn fipa_standard() -> Self {
        let mut library = Self::new();
        match standard::all() {
            Ok(machines) => {
                for machine in machines {
                    library.insert(machine);
                }
            }
            Err(e) => warn!(error = %e, "Standard protocol tables failed to build"),
        }
        library
    }

    /// Load a JSON array of grammars
    pub fn from_json(json: &str) -> Result<Self, GrammarError> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut library = Self::new();
        for value in raw {
            let machine = StateMachine::from_json(&value.to_string())?;
            library.insert(machine);
        }
        Ok(library)
    }

    pub fn insert(&mut self, machine: StateMachine) {
        self.machines
            .insert(normalize(machine.name()), Arc::new(machine));
    }

    pub fn with(mut self, machine: StateMachine) -> Self {
        self.insert(machine);
        self
    }

    pub fn get(&self, protocol: &str) -> Option<Arc<StateMachine>> {
        self.machines.get(&normalize(protocol)).cloned()
    }

    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.machines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

impl ProtocolGrammar for GrammarLibrary {
    fn resolve(&self, protocol: &str, _resource_dir: &Path) -> Option<Arc<StateMachine>> {
        self.get(protocol)
    }
}

// =============================================================================
// Resource directory
// =============================================================================

/// Grammars read from `<resource_dir>/<protocol>.json`
#[derive(Debug, Clone, Default)]
pub struct DirectoryGrammar {
    fallback: Option<GrammarLibrary>,
}

impl DirectoryGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consult `library` for protocols without a file
    pub fn with_fallback(library: GrammarLibrary) -> Self {
        Self {
            fallback: Some(library),
        }
    }

    /// Read one grammar file
    pub fn load_file(path: &Path) -> Result<StateMachine, GrammarError> {
        let json = fs::read_to_string(path).map_err(|source| GrammarError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        StateMachine::from_json(&json)
    }

    fn candidates(protocol: &str, resource_dir: &Path) -> Vec<PathBuf> {
        // Protocol names come off the wire; keep them inside the directory.
        if protocol.is_empty()
            || protocol.contains(['/', '\\'])
            || protocol.starts_with('.')
        {
            return Vec::new();
        }
        let mut names = vec![protocol.to_string()];
        let normalized = normalize(protocol);
        if !normalized.is_empty() && normalized != protocol {
            names.push(normalized);
        }
        names
            .into_iter()
            .map(|name| resource_dir.join(format!("{}.json", name)))
            .collect()
    }
}

impl ProtocolGrammar for DirectoryGrammar {
    fn resolve(&self, protocol: &str, resource_dir: &Path) -> Option<Arc<StateMachine>> {
        for path in Self::candidates(protocol, resource_dir) {
            if !path.is_file() {
                continue;
            }
            match Self::load_file(&path) {
                Ok(machine) => {
                    debug!(protocol, path = %path.display(), "Loaded protocol grammar");
                    return Some(Arc::new(machine));
                }
                Err(e) => {
                    warn!(protocol, path = %path.display(), error = %e, "Ignoring unreadable protocol grammar");
                }
            }
        }
        self.fallback.as_ref().and_then(|library| library.get(protocol))
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Read-through cache in front of another grammar
///
/// Only grammars that were found are kept, keyed by resource dir and
/// normalized protocol name. Unknown protocols reach the inner grammar on
/// every lookup, so a grammar file added later is picked up and names
/// arriving off the wire cannot grow the cache.
pub struct CachedGrammar<G> {
    inner: G,
    cache: DashMap<(PathBuf, String), Arc<StateMachine>>,
}

impl<G: ProtocolGrammar> CachedGrammar<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Number of cached grammars
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Forget all cached grammars
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl<G: ProtocolGrammar> ProtocolGrammar for CachedGrammar<G> {
    fn resolve(&self, protocol: &str, resource_dir: &Path) -> Option<Arc<StateMachine>> {
        let key = (resource_dir.to_path_buf(), normalize(protocol));
        if let Some(machine) = self.cache.get(&key) {
            return Some(machine.value().clone());
        }

        let resolved = self.inner.resolve(protocol, resource_dir);
        debug!(
            protocol,
            resource_dir = %resource_dir.display(),
            found = resolved.is_some(),
            "Resolved protocol grammar"
        );
        let machine = resolved?;
        // A concurrent lookup may have won; keep whichever went in first.
        Some(self.cache.entry(key).or_insert(machine).value().clone())
    }
}

impl<G> std::fmt::Debug for CachedGrammar<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedGrammar")
            .field("entries", &self.cache.len())
            .finish()
    }
}
