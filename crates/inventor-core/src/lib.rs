//! Inventor Core - document model, builder state, and error handling

pub mod builder;
pub mod error;
pub mod function;
pub mod modality;
pub mod name;
pub mod parameters;
pub mod progress;
pub mod quality;
pub mod state;

pub use builder::{FieldPreset, FunctionBuilder};
pub use error::{Error, Result};
pub use function::*;
pub use modality::{collect_modalities, Modality};
pub use name::validate_name;
pub use parameters::{ParameterOverrides, Parameters, WidthRange};
pub use progress::{
    project, FanoutSink, Notification, NotificationMessage, ProgressLog, ProgressNode,
    ProgressSink, Reporter, TracingSink,
};
pub use quality::{QualityChecker, StructuralChecker};
pub use state::{InventState, TypePreset};
