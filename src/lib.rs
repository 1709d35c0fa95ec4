pub mod app;
pub mod core;
pub mod monitor;
pub mod orchestrator;
pub mod retention;
pub mod spawner;
pub mod status;
pub mod worker;
