pub mod builder;
pub mod orchestrator;
pub mod state;
