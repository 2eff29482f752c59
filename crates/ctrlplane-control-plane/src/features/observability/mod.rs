pub mod controller;
pub mod repo;
pub mod service;

pub use controller::MetricsExtension;
