use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::artifact::Artifact;
use crate::dataset::Dataset;
use crate::error::{DashboardError, RenderError};
use crate::input::{InputSurface, Snapshot};

/// Signature of a view's render function.
pub type RenderFn = dyn Fn(&Dataset, &Snapshot) -> Result<Artifact, RenderError> + Send + Sync;

/// A named derived artifact and the inputs it reads.
pub struct View {
    pub name: String,
    pub inputs: Vec<String>,
    render: Box<RenderFn>,
}

impl View {
    pub fn render(&self, dataset: &Dataset, snapshot: &Snapshot) -> Result<Artifact, RenderError> {
        (self.render)(dataset, snapshot)
    }

    pub fn depends_on(&self, input: &str) -> bool {
        self.inputs.iter().any(|i| i == input)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Views reading one input, as registration indices.
///
/// Most inputs drive only a couple of views, so a small vector is kept and
/// promoted to an ordered set once it grows.
#[derive(Clone, Debug, Default)]
pub enum Dependents {
    #[default]
    None,
    Vector(Vec<usize>),
    Set(BTreeSet<usize>),
}

impl Dependents {
    pub fn insert(&mut self, view: usize) {
        match self {
            Dependents::None => {
                *self = Dependents::Vector(vec![view]);
            }
            Dependents::Vector(vec) => {
                if vec.contains(&view) {
                    return;
                }
                if vec.len() > 7 {
                    let mut set: BTreeSet<usize> = vec.iter().copied().collect();
                    set.insert(view);
                    *self = Dependents::Set(set);
                } else {
                    vec.push(view);
                }
            }
            Dependents::Set(set) => {
                set.insert(view);
            }
        }
    }

    pub fn contains(&self, view: usize) -> bool {
        match self {
            Dependents::Vector(vec) => vec.contains(&view),
            Dependents::Set(set) => set.contains(&view),
            Dependents::None => false,
        }
    }

    /// Indices in ascending (registration) order.
    pub fn to_sorted(&self) -> Vec<usize> {
        match self {
            Dependents::Vector(vec) => {
                let mut out = vec.clone();
                out.sort_unstable();
                out
            }
            Dependents::Set(set) => set.iter().copied().collect(),
            Dependents::None => Vec::new(),
        }
    }
}

/// Every view of the dashboard, plus the reverse index from input name to
/// dependent views.
///
/// Filled during startup and then shared read-only between sessions.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: Vec<View>,
    by_name: BTreeMap<String, usize>,
    dependents: BTreeMap<String, Dependents>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a view.
    ///
    /// # Arguments
    /// * `name` - Unique view name
    /// * `input_names` - Inputs the render function reads
    /// * `inputs` - Declared inputs the names are checked against
    /// * `render` - Pure render function
    ///
    /// # Errors
    /// * `DuplicateView` if `name` is taken
    /// * `UnknownInput` if an input name is not declared on `inputs`
    pub fn register<F>(
        &mut self,
        name: &str,
        input_names: &[&str],
        inputs: &InputSurface,
        render: F,
    ) -> Result<(), DashboardError>
    where
        F: Fn(&Dataset, &Snapshot) -> Result<Artifact, RenderError> + Send + Sync + 'static,
    {
        if self.by_name.contains_key(name) {
            return Err(DashboardError::DuplicateView(name.to_string()));
        }
        if let Some(missing) = input_names.iter().find(|i| !inputs.is_declared(i)) {
            return Err(DashboardError::UnknownInput {
                view: name.to_string(),
                input: missing.to_string(),
            });
        }

        let index = self.views.len();
        let mut deps: Vec<String> = Vec::with_capacity(input_names.len());
        for input in input_names {
            if !deps.iter().any(|d| d == input) {
                deps.push(input.to_string());
            }
            self.dependents
                .entry(input.to_string())
                .or_default()
                .insert(index);
        }

        self.views.push(View {
            name: name.to_string(),
            inputs: deps,
            render: Box::new(render),
        });
        self.by_name.insert(name.to_string(), index);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&View, DashboardError> {
        self.by_name
            .get(name)
            .map(|&i| &self.views[i])
            .ok_or_else(|| DashboardError::UnknownView(name.to_string()))
    }

    /// Views in registration order.
    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Views that declared `input`, in registration order.
    pub fn dependents_of(&self, input: &str) -> Vec<&View> {
        self.dependents
            .get(input)
            .map(|deps| deps.to_sorted())
            .unwrap_or_default()
            .into_iter()
            .map(|i| &self.views[i])
            .collect()
    }

    /// Views depending on any of `inputs`, each once, in registration order.
    pub fn affected_by<'a, I>(&self, inputs: I) -> Vec<&View>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut indices = BTreeSet::new();
        for input in inputs {
            if let Some(deps) = self.dependents.get(input) {
                indices.extend(deps.to_sorted());
            }
        }
        indices.into_iter().map(|i| &self.views[i]).collect()
    }
}
