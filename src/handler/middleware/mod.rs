pub mod clientaddr;
pub mod request_log;
