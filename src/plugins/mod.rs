pub mod local;
pub mod registry;
pub mod remote;
