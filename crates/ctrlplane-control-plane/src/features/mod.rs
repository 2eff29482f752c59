pub mod audit_hook;
pub mod event_bus;
pub mod instance_management;
pub mod observability;
pub mod plugins;
pub mod providers;
