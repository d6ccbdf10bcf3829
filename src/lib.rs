pub mod addr;
pub mod config;
pub mod data;
pub mod docker;
pub mod error;
pub mod exec;
pub mod kill;
pub mod lsof;
pub mod merge;
pub mod names;
pub mod process;
pub mod sink;
pub mod track;
