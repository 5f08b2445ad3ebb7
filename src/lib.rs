pub mod config;
pub mod coverage;
pub mod errors;
pub mod init;
pub mod instrument;
pub mod logging;
pub mod pipeline;
pub mod select;
pub mod stage;
pub mod ui;
