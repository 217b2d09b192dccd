use log::{debug, warn};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::artifact::Artifact;
use crate::dataset::Dataset;
use crate::error::DashboardError;
use crate::input::{InputSurface, InputValue, Snapshot};
use crate::registry::{View, ViewRegistry};

/// Rendered artifacts keyed by view name.
pub type Outputs = BTreeMap<String, Artifact>;

/// Keeps one session's view outputs consistent with its inputs.
///
/// The dataset and registry are shared; the input surface and outputs are
/// owned, so every session gets its own engine. All mutation goes through
/// `&mut self`, which makes event processing strictly one at a time.
pub struct ReactiveEngine {
    dataset: Arc<Dataset>,
    registry: Arc<ViewRegistry>,
    inputs: InputSurface,
    outputs: Outputs,
    initialized: bool,
}

impl ReactiveEngine {
    /// Builds an engine over `inputs`.
    ///
    /// # Errors
    /// * `UnknownInput` if a registered view reads an input `inputs` does
    ///   not declare
    pub fn new(
        dataset: Arc<Dataset>,
        registry: Arc<ViewRegistry>,
        inputs: InputSurface,
    ) -> Result<Self, DashboardError> {
        for view in registry.views() {
            if let Some(missing) = view.inputs.iter().find(|i| !inputs.is_declared(i)) {
                return Err(DashboardError::UnknownInput {
                    view: view.name.clone(),
                    input: missing.clone(),
                });
            }
        }
        Ok(Self::from_parts(dataset, registry, inputs))
    }

    /// Skips the declaration check; `registry` must have been registered
    /// against `inputs`.
    pub(crate) fn from_parts(
        dataset: Arc<Dataset>,
        registry: Arc<ViewRegistry>,
        inputs: InputSurface,
    ) -> Self {
        ReactiveEngine {
            dataset,
            registry,
            inputs,
            outputs: Outputs::new(),
            initialized: false,
        }
    }

    /// Renders every registered view against the current (default) inputs
    /// and returns the full mapping.
    ///
    /// Views with no inputs are only ever rendered here.
    pub fn initialize(&mut self) -> Outputs {
        let snapshot = self.inputs.current();
        for view in self.registry.views() {
            let artifact = render_view(view, &self.dataset, &snapshot);
            self.outputs.insert(view.name.clone(), artifact);
        }
        self.initialized = true;
        debug!("Initialized {} views", self.outputs.len());
        self.outputs.clone()
    }

    /// Applies one input change and returns the views it recomputed.
    ///
    /// # Errors
    /// * `NoSuchInput` if `name` is not declared
    /// * `InvalidInputValue` if `value` is outside the input's domain; the
    ///   session is left unchanged
    pub fn on_input_changed(
        &mut self,
        name: &str,
        value: InputValue,
    ) -> Result<Outputs, DashboardError> {
        self.apply_batch(vec![(name.to_string(), value)])
    }

    /// Applies several input changes as one event.
    ///
    /// Every value is validated before any is stored, so a rejected batch
    /// changes nothing. Each affected view is rendered once, against the
    /// snapshot holding all the new values. Re-sending current values is a
    /// no-op.
    pub fn apply_batch<I>(&mut self, changes: I) -> Result<Outputs, DashboardError>
    where
        I: IntoIterator<Item = (String, InputValue)>,
    {
        let mut staged: Vec<(String, InputValue)> = Vec::new();
        for (name, value) in changes {
            self.inputs.validate(&name, &value).inspect_err(|e| {
                warn!("Rejected input event: {}", e);
            })?;
            match staged.iter_mut().find(|(n, _)| *n == name) {
                Some(entry) => entry.1 = value,
                None => staged.push((name, value)),
            }
        }

        if !self.initialized {
            self.initialize();
        }

        staged.retain(|(name, value)| self.inputs.value(name) != Some(value));
        if staged.is_empty() {
            return Ok(Outputs::new());
        }

        let changed: Vec<String> = staged.iter().map(|(n, _)| n.clone()).collect();
        for (name, value) in staged {
            self.inputs.set(&name, value);
        }

        let snapshot = self.inputs.current();
        let affected = self.registry.affected_by(changed.iter().map(String::as_str));
        debug!(
            "Inputs {:?} changed; recomputing {} view(s)",
            changed,
            affected.len()
        );

        let mut recomputed = Outputs::new();
        for view in affected {
            let artifact = render_view(view, &self.dataset, &snapshot);
            self.outputs.insert(view.name.clone(), artifact.clone());
            recomputed.insert(view.name.clone(), artifact);
        }
        Ok(recomputed)
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn output(&self, view: &str) -> Option<&Artifact> {
        self.outputs.get(view)
    }

    pub fn inputs(&self) -> &InputSurface {
        &self.inputs
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inputs.current()
    }

    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Runs a view's render function, turning a returned error or a panic into
/// an `Artifact::Error` so sibling views are unaffected.
fn render_view(view: &View, dataset: &Dataset, snapshot: &Snapshot) -> Artifact {
    match panic::catch_unwind(AssertUnwindSafe(|| view.render(dataset, snapshot))) {
        Ok(Ok(artifact)) => artifact,
        Ok(Err(err)) => {
            warn!("View \"{}\" failed to render: {}", view.name, err);
            Artifact::Error {
                message: err.message,
            }
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "render function panicked".to_string());
            warn!("View \"{}\" panicked: {}", view.name, message);
            Artifact::Error { message }
        }
    }
}
