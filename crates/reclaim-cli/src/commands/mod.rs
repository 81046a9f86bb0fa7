pub mod init;
pub mod sweep;
