pub mod engine;
pub mod export;
pub mod persist;
pub mod record;
pub mod settings;
pub mod shutdown;
pub mod snapshot;
pub mod tailer;
pub mod teams;
