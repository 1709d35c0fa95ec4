//! CLI module containing argument parsing, subcommands and output formatting

pub mod args;
pub mod commands;
pub mod display;

#[cfg(test)]
mod tests;
