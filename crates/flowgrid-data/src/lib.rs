pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, FlowData, PartTemplate, load_flow_data};
