pub mod config;
pub mod flow;
pub mod legacy;
pub mod starttls;
pub mod transport;
