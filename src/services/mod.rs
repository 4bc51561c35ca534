pub mod aggregator;
pub mod clock;
pub mod dedup;
pub mod dispatcher;
pub mod email;
pub mod events;
pub mod generator;
pub mod init;
pub mod pipeline;
pub mod push;
pub mod recorder;
pub mod render;
pub mod retry;
pub mod scanner;
pub mod settings;
pub mod stores;
pub mod token_lifecycle;

#[cfg(test)]
pub mod testing;
