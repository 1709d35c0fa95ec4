//! Tests for the CLI module
//!
//! Argument parsing and output formatting, kept apart from the modules they
//! exercise.
