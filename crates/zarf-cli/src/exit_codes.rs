//! Process exit codes

#![allow(dead_code)] // Reserved codes are part of the contract

/// Success
pub const OK: i32 = 0;

/// Any fatal error with a logged cause
pub const ERROR: i32 = 1;

/// Reserved for validation-only failures from lint-style commands
pub const VALIDATION_ERROR: i32 = 2;
