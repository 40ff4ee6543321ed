//! CSV script driver: commands in, account report out.

pub mod account_writer;
pub mod command_reader;
pub mod runner;
