//! Unit tests for goplay configuration types.
//!
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults and serialisation
//! - [`validation`] - `AppConfig::validate` rules
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence

mod helpers;
