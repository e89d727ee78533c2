//! Collaborators available to evaluation sequences and expansion.

use crate::core::expr::KnownValues;
use crate::plugin::provider::{ProviderResolver, ProvisionerResolver};
use crate::state::{SharedState, State};
use std::fmt;
use std::sync::Arc;

/// Handles a node needs to evaluate and expand itself.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct EvalContext {
    /// Provider resolution
    pub providers: Arc<dyn ProviderResolver>,
    /// Provisioner resolution
    pub provisioners: Arc<dyn ProvisionerResolver>,
    /// Recorded state, read-only during a walk
    pub state: SharedState,
    /// Values known before apply
    pub values: Arc<KnownValues>,
}

impl EvalContext {
    /// Create a context with empty state and no known values.
    pub fn new(
        providers: Arc<dyn ProviderResolver>,
        provisioners: Arc<dyn ProvisionerResolver>,
    ) -> Self {
        Self {
            providers,
            provisioners,
            state: State::new().into_shared(),
            values: Arc::new(KnownValues::new()),
        }
    }

    /// Use a shared state store.
    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = state;
        self
    }

    /// Use the given known values.
    pub fn with_values(mut self, values: KnownValues) -> Self {
        self.values = Arc::new(values);
        self
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("providers", &"<resolver>")
            .field("provisioners", &"<resolver>")
            .field("state", &self.state.read().len())
            .field("values", &self.values.variables.len())
            .finish()
    }
}
