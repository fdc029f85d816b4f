//! Plugins and plugin data.
//!
//! A plugin is the unit of composition: it declares an id, dependencies on
//! other plugins, immutable configuration payloads, and an initializer that
//! registers data managers, actors, and reports. The kernel is
//! domain-agnostic; every capability arrives through a plugin.

use std::any::Any;
use std::fmt;

use crate::context::Context;
use crate::error::{ConfigurationError, KairosResult};

/// Stable identifier of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(String);

impl PluginId {
    /// Creates an id from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The underlying name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Immutable configuration payload contributed by a plugin.
///
/// Concrete payloads are plain immutable value types built by ordinary
/// builders; deriving a scenario variant from a baseline is a value copy
/// followed by a rebuild, never shared mutation. `clone_box` exists so the
/// kernel can hand each scenario replicate its own independent copy.
///
/// # Examples
///
/// ```
/// use std::any::Any;
/// use kairos::PluginData;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct PopulationData {
///     initial_size: usize,
/// }
///
/// impl PluginData for PopulationData {
///     fn clone_box(&self) -> Box<dyn PluginData> {
///         Box::new(self.clone())
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait PluginData: Any + fmt::Debug {
    /// Clones the payload behind the trait object.
    fn clone_box(&self) -> Box<dyn PluginData>;

    /// Upcast for downcasting to the concrete payload type.
    fn as_any(&self) -> &dyn Any;
}

/// Initializer invoked once, in dependency order, during phase 2 of
/// simulation construction.
pub type PluginInit = Box<dyn FnOnce(&mut Context) -> KairosResult<()>>;

/// A declared capability module: id, dependencies, data, initializer.
pub struct Plugin {
    pub(crate) id: PluginId,
    pub(crate) dependencies: Vec<PluginId>,
    pub(crate) data: Vec<Box<dyn PluginData>>,
    pub(crate) init: Option<PluginInit>,
}

impl Plugin {
    /// Starts building a plugin with the given id.
    #[must_use]
    pub fn builder(id: impl Into<PluginId>) -> PluginBuilder {
        PluginBuilder {
            id: id.into(),
            dependencies: Vec::new(),
            data: Vec::new(),
            init: None,
        }
    }

    /// The plugin's id.
    #[must_use]
    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Declared dependency ids.
    #[must_use]
    pub fn dependencies(&self) -> &[PluginId] {
        &self.dependencies
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Plugin`].
pub struct PluginBuilder {
    id: PluginId,
    dependencies: Vec<PluginId>,
    data: Vec<Box<dyn PluginData>>,
    init: Option<PluginInit>,
}

impl PluginBuilder {
    /// Declares a dependency on another plugin's id.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<PluginId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Contributes an immutable data payload.
    #[must_use]
    pub fn with_data(mut self, data: impl PluginData) -> Self {
        self.data.push(Box::new(data));
        self
    }

    /// Sets the initializer callback.
    #[must_use]
    pub fn on_init(
        mut self,
        init: impl FnOnce(&mut Context) -> KairosResult<()> + 'static,
    ) -> Self {
        self.init = Some(Box::new(init));
        self
    }

    /// Finalizes the plugin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::EmptyPluginId` for an empty id.
    pub fn build(self) -> KairosResult<Plugin> {
        if self.id.as_str().is_empty() {
            return Err(ConfigurationError::EmptyPluginId.into());
        }
        Ok(Plugin {
            id: self.id,
            dependencies: self.dependencies,
            data: self.data,
            init: self.init,
        })
    }
}
