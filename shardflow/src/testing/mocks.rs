//! Scripted service and engine doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::client::CallError;
use crate::domain::{chemsys, CatalogEntry, CatalogService, DiagramEngine};
use crate::errors::EngineError;

type FetchHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A catalog whose answers are scripted per chemical system.
///
/// Queued errors for a system are returned first, one per call. After that
/// the system's entries are returned, or an empty list if none were set.
#[derive(Default)]
pub struct ScriptedCatalog {
    entries: Mutex<HashMap<String, Vec<CatalogEntry>>>,
    queued: Mutex<HashMap<String, VecDeque<CallError>>>,
    always_failing: Mutex<HashMap<String, CallError>>,
    calls: Mutex<Vec<String>>,
    hook: Mutex<Option<FetchHook>>,
}

impl ScriptedCatalog {
    /// Creates a catalog that knows no systems.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entries returned for `system`.
    #[must_use]
    pub fn with_entries(self, system: &str, entries: Vec<CatalogEntry>) -> Self {
        self.entries.lock().insert(system.to_string(), entries);
        self
    }

    /// Queues one failing answer for `system`.
    #[must_use]
    pub fn with_error(self, system: &str, error: CallError) -> Self {
        self.push_error(system, error);
        self
    }

    /// Makes every call for `system` fail with `error`.
    #[must_use]
    pub fn always_failing(self, system: &str, error: CallError) -> Self {
        self.always_failing.lock().insert(system.to_string(), error);
        self
    }

    /// Queues one failing answer for `system`.
    pub fn push_error(&self, system: &str, error: CallError) {
        self.queued
            .lock()
            .entry(system.to_string())
            .or_default()
            .push_back(error);
    }

    /// Runs `hook` with the system key at the start of every call.
    pub fn on_fetch<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    /// Number of calls made for `system`.
    #[must_use]
    pub fn calls(&self, system: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == system).count()
    }

    /// Total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Systems in call order.
    #[must_use]
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl std::fmt::Debug for ScriptedCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedCatalog")
            .field("systems", &self.entries.lock().len())
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CatalogService for ScriptedCatalog {
    async fn fetch_entries(&self, symbols: &[String]) -> Result<Vec<CatalogEntry>, CallError> {
        let system = chemsys(symbols);
        self.calls.lock().push(system.clone());

        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&system);
        }

        if let Some(error) = self.always_failing.lock().get(&system) {
            return Err(error.clone());
        }
        if let Some(error) = self
            .queued
            .lock()
            .get_mut(&system)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(self.entries.lock().get(&system).cloned().unwrap_or_default())
    }
}

/// Diagram produced by [`CountingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct FakeDiagram {
    /// Number of entries the diagram was built from.
    pub entries: usize,
    /// Weights passed to the build.
    pub weights: Vec<(String, f64)>,
}

/// An engine that counts builds and returns reproducible energies.
#[derive(Debug, Default)]
pub struct CountingEngine {
    builds: AtomicUsize,
    evaluations: AtomicUsize,
    fail_builds: bool,
}

impl CountingEngine {
    /// Creates an engine that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine whose builds always fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_builds: true,
            ..Self::default()
        }
    }

    /// Number of diagrams built.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Number of energies evaluated.
    #[must_use]
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    /// Energy returned for the given inputs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn energy(diagram: &FakeDiagram, ph: f64, voltage: f64) -> f64 {
        diagram.entries as f64 * 0.01 + ph * 0.05 - voltage
    }
}

impl DiagramEngine for CountingEngine {
    type Diagram = FakeDiagram;

    fn build(
        &self,
        entries: &[CatalogEntry],
        weights: &[(String, f64)],
    ) -> Result<FakeDiagram, EngineError> {
        if self.fail_builds {
            return Err(EngineError::new("diagram construction failed"));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(FakeDiagram {
            entries: entries.len(),
            weights: weights.to_vec(),
        })
    }

    fn evaluate(
        &self,
        diagram: &FakeDiagram,
        _entry: &CatalogEntry,
        ph: f64,
        voltage: f64,
    ) -> Result<f64, EngineError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        Ok(Self::energy(diagram, ph, voltage))
    }
}
