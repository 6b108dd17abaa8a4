// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Return-code style error types for the compile-time and runtime halves of
//! the core.
//!
//! Nothing in this crate panics or throws outside of development-only
//! assertions; every fallible operation returns [`CompileError`] or
//! [`RuntimeError`] with enough context (source location, op offset, member
//! name) to be actionable.

use crate::ast::Loc;
use std::fmt;

/// Errors raised while compiling an AST into a [`crate::emit::Descriptor`].
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Malformed input: an AST invariant the compiler relies on does not hold.
    BadParameter(String),
    /// An internal table could not grow (only possible on allocation failure).
    NoMemory,
    /// Bytecode exceeded the `int16` relocation range, or a case label
    /// exceeded `int32`.
    OutOfRange { what: String, loc: Loc },
    /// A construct this core does not implement (maps, `long double`,
    /// a key member of union type, a key nested through a sequence, ...).
    Unsupported { what: String, loc: Loc },
    /// Reserved for the (out-of-scope) IDL parser; never produced here.
    ParseError(String),
    /// An invariant the compiler itself is supposed to maintain was violated.
    Internal(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::BadParameter(msg) => write!(f, "bad parameter: {msg}"),
            CompileError::NoMemory => write!(f, "out of memory"),
            CompileError::OutOfRange { what, loc } => {
                write!(f, "{loc}: out of range: {what}")
            }
            CompileError::Unsupported { what, loc } => {
                write!(f, "{loc}: unsupported: {what}")
            }
            CompileError::ParseError(msg) => write!(f, "parse error: {msg}"),
            CompileError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised by the runtime serializer interpreter and the QoS/RxO
/// matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Deserialization failed: length overrun, invalid enum value, unknown
    /// must-understand parameter, etc. `op_offset` is the failing
    /// instruction index.
    BadData { reason: String, op_offset: u32 },
    /// RxO matching failed (reported separately from the boolean result for
    /// callers that want a `Result`-shaped API).
    PreconditionNotMet,
    /// A requested QoS combination fails `Qos::validate` (e.g. a zero-depth
    /// `KEEP_LAST` history, or a deadline shorter than the time-based
    /// filter).
    IllegalOperation(String),
    /// `set_qos` attempted to change a policy classified `IMMUTABLE`.
    ImmutablePolicy,
    /// `set_qos` attempted to change a policy the OMG spec classifies
    /// `MUTABLE` but this core does not implement, or another requested
    /// operation this core has no implementation for.
    Unsupported(String),
    /// Allocation failed while deserializing (e.g. growing a sequence).
    NoMemory,
    /// Caller-defined timeout elapsed.
    Timeout,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::BadData { reason, op_offset } => {
                write!(f, "bad data at op {op_offset}: {reason}")
            }
            RuntimeError::PreconditionNotMet => write!(f, "precondition not met"),
            RuntimeError::IllegalOperation(msg) => write!(f, "illegal operation: {msg}"),
            RuntimeError::ImmutablePolicy => write!(f, "immutable policy"),
            RuntimeError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            RuntimeError::NoMemory => write!(f, "out of memory"),
            RuntimeError::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::error::Error for RuntimeError {}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_carries_location() {
        let loc = Loc::new("sensor.idl", 12);
        let err = CompileError::Unsupported {
            what: "key member of union type".into(),
            loc,
        };
        assert_eq!(
            err.to_string(),
            "sensor.idl:12: unsupported: key member of union type"
        );
    }

    #[test]
    fn runtime_error_display_carries_op_offset() {
        let err = RuntimeError::BadData {
            reason: "enum value outside max".into(),
            op_offset: 7,
        };
        assert_eq!(err.to_string(), "bad data at op 7: enum value outside max");
    }
}
