//! Unit tests for podbridge configuration types.
//!
//! This module contains tests organised into:
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults, TOML parsing and conversions
//! - [`validation`] - Post-merge validation
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
