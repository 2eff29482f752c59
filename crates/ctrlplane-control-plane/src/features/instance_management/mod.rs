pub mod controller;
pub mod repo;
pub mod service;

pub use controller::InstanceController;
pub use repo::{InMemoryInstanceRepository, InstanceRepository};
pub use service::InstanceService;
