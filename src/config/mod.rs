pub mod configuration;
pub mod paths;
pub mod store;

pub use configuration::Configuration;
pub use paths::{create_notes_structure, AppDirs};
pub use store::ConfigStore;
