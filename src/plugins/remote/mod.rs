pub mod cli;
pub mod client;
pub mod poller;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;
