pub mod capability_store;
pub mod task_store;

pub use capability_store::CapabilityStore;
pub use task_store::TaskStore;
