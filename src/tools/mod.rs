//! Capability schemas, argument validation and agent-facing wrappers.

pub mod builtin;
pub mod translate;
pub mod types;
pub mod validation;
pub mod wrapper;

pub use builtin::{builtin_capabilities, current_time_capability};
pub use translate::translate_schema;
pub use types::{ArgumentField, ArgumentSchema, ArgumentType};
pub use validation::{coerce_arguments, validate_arguments, JsonObject};
pub use wrapper::{CapabilityInvoker, CapabilityWrapper};
