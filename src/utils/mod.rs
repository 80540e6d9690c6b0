pub mod dirs;
pub mod init;
pub mod logging;
pub mod server;
