pub mod cli;
pub mod mover;
pub mod reorganizer;
