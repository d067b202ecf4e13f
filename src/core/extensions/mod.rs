// Extensions: the unit bots are assembled from.

mod extension;
mod registry;

pub use extension::{Extension, ExtensionSetup, NamedCommand};
pub use registry::{ExtensionRegistry, ExtensionState, ExtensionSummary};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("An extension named `{0}` is already registered")]
    Duplicate(String),

    #[error("No extension named `{0}`")]
    NotFound(String),

    #[error("Extension `{0}` is already loaded")]
    AlreadyLoaded(String),

    #[error("Extension `{0}` is not loaded")]
    NotLoaded(String),

    #[error("Command `{command}` is already provided by extension `{owner}`")]
    CommandConflict { command: String, owner: String },

    #[error("Extension `{name}` failed to set up: {reason}")]
    Setup { name: String, reason: String },
}
