pub mod module_service;

pub use module_service::{ModuleQuery, ModuleService};
