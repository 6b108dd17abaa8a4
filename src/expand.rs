// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `${VAR}` / shell variable expansion.
//!
//! A brace-only grammar (`expand()`, `${NAME}`, `${NAME:-ALT}`,
//! `${NAME:+ALT}`, `${NAME:?ALT}`) and a shell grammar that additionally
//! recognises bare `$NAME`/`$X` and backslash escapes (`expand_sh()`) share
//! one recursive core, [`core_expand`], parameterized by whether bare
//! `$NAME` forms are recognised.
//!
//! Lookup is delegated to a caller-supplied [`EnvLookup`] rather than
//! reading the process environment directly. [`ProcessEnvLookup`] and
//! [`MapLookup`] are the two concrete implementations provided.

use std::collections::HashMap;
use std::fmt;

/// Recursion depth cap for nested `${...:-${...}}` expansions.
const MAX_DEPTH: u32 = 20;
/// Output size cap, so a pathological expansion cannot exhaust memory.
const MAX_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    TooDeeplyNested,
    /// Unterminated `${...}`, dangling `\`, or similar grammar violation.
    Malformed(String),
    /// `${NAME:?ALT}` with `NAME` unset or empty: `ALT` (itself expanded)
    /// is the error message.
    Required { name: String, message: String },
    /// The expansion would exceed [`MAX_SIZE`].
    TooLarge,
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpandError::TooDeeplyNested => write!(f, "variable expansions too deeply nested"),
            ExpandError::Malformed(s) => write!(f, "invalid expansion: {s}"),
            ExpandError::Required { name, message } => write!(f, "{name}: {message}"),
            ExpandError::TooLarge => write!(f, "result too large"),
        }
    }
}

impl std::error::Error for ExpandError {}

/// Caller-supplied name resolver.
pub trait EnvLookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<F> EnvLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Reads `std::env::var`, and synthesizes the two keys the original's
/// `expand_env` hard-codes: `$`/`CYCLONEDDS_PID` (the running process id)
/// and, when a domain id is supplied, `CYCLONEDDS_DOMAIN_ID`.
pub struct ProcessEnvLookup {
    domain_id: Option<u32>,
}

impl ProcessEnvLookup {
    pub fn new(domain_id: Option<u32>) -> Self {
        Self { domain_id }
    }
}

impl EnvLookup for ProcessEnvLookup {
    fn lookup(&self, name: &str) -> Option<String> {
        if name == "$" || name == "CYCLONEDDS_PID" {
            return Some(std::process::id().to_string());
        }
        if name == "CYCLONEDDS_DOMAIN_ID" {
            if let Some(id) = self.domain_id {
                return Some(id.to_string());
            }
        }
        std::env::var(name).ok()
    }
}

/// A `HashMap`-backed lookup, for tests and for callers that already have
/// their variables in a map rather than the process environment.
#[derive(Debug, Clone, Default)]
pub struct MapLookup(pub HashMap<String, String>);

impl MapLookup {
    pub fn new(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(vars.into_iter().collect())
    }
}

impl EnvLookup for MapLookup {
    fn lookup(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// `${VAR}` / `${VAR:-alt}` / `${VAR:+alt}` / `${VAR:?alt}` only — no bare
/// `$VAR`, no backslash escapes. `ddsrt_expand_vars` in the original.
pub fn expand(src: &str, lookup: &dyn EnvLookup) -> Result<String, ExpandError> {
    core_expand(src, lookup, false, 0)
}

/// Adds bare `$VAR`/`$X` and `\`-escaping of `$`/`\` on top of [`expand`].
/// `ddsrt_expand_vars_sh` in the original.
pub fn expand_sh(src: &str, lookup: &dyn EnvLookup) -> Result<String, ExpandError> {
    core_expand(src, lookup, true, 0)
}

fn core_expand(
    src: &str,
    lookup: &dyn EnvLookup,
    shell: bool,
    depth: u32,
) -> Result<String, ExpandError> {
    if depth >= MAX_DEPTH {
        return Err(ExpandError::TooDeeplyNested);
    }
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::new();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if shell && c == '\\' {
            i += 1;
            let Some(&escaped) = chars.get(i) else {
                return Err(ExpandError::Malformed(
                    "incomplete escape at end of string".into(),
                ));
            };
            push(&mut out, escaped)?;
            i += 1;
        } else if c == '$' && chars.get(i + 1) == Some(&'{') {
            i += 1;
            let piece = expand_brace(&chars, &mut i, lookup, shell, depth)?;
            push_str(&mut out, &piece)?;
        } else if c == '$' && shell {
            i += 1;
            let Some(&next) = chars.get(i) else {
                return Err(ExpandError::Malformed(
                    "incomplete variable expansion at end of string".into(),
                ));
            };
            let piece = if next.is_alphanumeric() || next == '_' {
                expand_simple(&chars, &mut i, lookup)
            } else {
                i += 1;
                lookup.lookup(&next.to_string()).unwrap_or_default()
            };
            push_str(&mut out, &piece)?;
        } else {
            // Non-shell grammar: a `$` not followed by `{` is not an
            // expansion trigger at all and passes through literally,
            // exactly as `ddsrt_expand_vars1`'s fallback `else` branch.
            push(&mut out, c)?;
            i += 1;
        }
    }
    Ok(out)
}

fn push(out: &mut String, c: char) -> Result<(), ExpandError> {
    if out.len() + c.len_utf8() > MAX_SIZE {
        return Err(ExpandError::TooLarge);
    }
    out.push(c);
    Ok(())
}

fn push_str(out: &mut String, s: &str) -> Result<(), ExpandError> {
    if out.len() + s.len() > MAX_SIZE {
        return Err(ExpandError::TooLarge);
    }
    out.push_str(s);
    Ok(())
}

/// Reads a bare `$NAME` reference (shell grammar only).
fn expand_simple(chars: &[char], i: &mut usize, lookup: &dyn EnvLookup) -> String {
    let start = *i;
    while matches!(chars.get(*i), Some(c) if c.is_alphanumeric() || *c == '_') {
        *i += 1;
    }
    let name: String = chars[start..*i].iter().collect();
    lookup.lookup(&name).unwrap_or_default()
}

/// Reads a `${NAME}` or `${NAME:OP alt}` reference, starting with `*i`
/// pointing at the `{`.
fn expand_brace(
    chars: &[char],
    i: &mut usize,
    lookup: &dyn EnvLookup,
    shell: bool,
    depth: u32,
) -> Result<String, ExpandError> {
    let brace_start = *i;
    *i += 1; // consume '{'
    let name_start = *i;
    while matches!(chars.get(*i), Some(&c) if c != ':' && c != '}') {
        *i += 1;
    }
    if chars.get(*i).is_none() {
        return Err(unterminated(chars, brace_start));
    }
    let name: String = chars[name_start..*i].iter().collect();

    if chars[*i] == '}' {
        *i += 1;
        return Ok(lookup.lookup(&name).unwrap_or_default());
    }

    // chars[*i] == ':'
    *i += 1;
    let op = match chars.get(*i) {
        Some(c @ ('-' | '+' | '?')) => {
            let op = *c;
            *i += 1;
            op
        }
        _ => return Err(unterminated(chars, brace_start)),
    };

    let alt_start = *i;
    let mut nest = 0i32;
    loop {
        match chars.get(*i) {
            None => return Err(unterminated(chars, brace_start)),
            Some('{') => {
                nest += 1;
                *i += 1;
            }
            Some('}') if nest > 0 => {
                nest -= 1;
                *i += 1;
            }
            Some('}') => break,
            Some('\\') => {
                *i += 1;
                if chars.get(*i).is_none() {
                    return Err(unterminated(chars, brace_start));
                }
                *i += 1;
            }
            Some(_) => *i += 1,
        }
    }
    let alt_raw: String = chars[alt_start..*i].iter().collect();
    *i += 1; // consume closing '}'

    let value = lookup.lookup(&name);
    let present_nonempty = value.as_deref().is_some_and(|v| !v.is_empty());
    match op {
        '-' => {
            if present_nonempty {
                Ok(value.unwrap())
            } else {
                core_expand(&alt_raw, lookup, shell, depth + 1)
            }
        }
        '+' => {
            if present_nonempty {
                core_expand(&alt_raw, lookup, shell, depth + 1)
            } else {
                Ok(String::new())
            }
        }
        '?' => {
            if present_nonempty {
                Ok(value.unwrap())
            } else {
                let message = core_expand(&alt_raw, lookup, shell, depth + 1)?;
                Err(ExpandError::Required { name, message })
            }
        }
        _ => unreachable!("op is one of -+? by construction"),
    }
}

fn unterminated(chars: &[char], start: usize) -> ExpandError {
    let snippet: String = chars[start..].iter().take(100).collect();
    ExpandError::Malformed(format!("unterminated expansion: {snippet}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> MapLookup {
        MapLookup::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn default_alt_used_when_unset() {
        assert_eq!(expand("${A:-B}", &map(&[])).unwrap(), "B");
    }

    #[test]
    fn default_alt_used_when_empty() {
        assert_eq!(expand("${A:-B}", &map(&[("A", "")])).unwrap(), "B");
    }

    #[test]
    fn value_used_when_set() {
        assert_eq!(expand("${A:-B}", &map(&[("A", "x")])).unwrap(), "x");
    }

    #[test]
    fn plus_form_substitutes_alt_only_when_set() {
        assert_eq!(expand("${A:+B}", &map(&[("A", "x")])).unwrap(), "B");
        assert_eq!(expand("${A:+B}", &map(&[])).unwrap(), "");
    }

    #[test]
    fn question_form_errors_with_alt_as_message() {
        let err = expand("${A:?missing A}", &map(&[])).unwrap_err();
        assert_eq!(
            err,
            ExpandError::Required {
                name: "A".into(),
                message: "missing A".into()
            }
        );
    }

    #[test]
    fn question_form_passes_through_when_set() {
        assert_eq!(expand("${A:?oops}", &map(&[("A", "x")])).unwrap(), "x");
    }

    #[test]
    fn nested_alt_is_balanced_and_expanded() {
        assert_eq!(expand("${A:-${B:-C}}", &map(&[])).unwrap(), "C");
    }

    #[test]
    fn depth_cap_is_enforced() {
        let mut src = "${A".to_string();
        for _ in 0..21 {
            src.push_str(":-${A");
        }
        for _ in 0..22 {
            src.push('}');
        }
        assert_eq!(expand(&src, &map(&[])), Err(ExpandError::TooDeeplyNested));
    }

    #[test]
    fn shell_variant_expands_bare_dollar_name() {
        assert_eq!(expand_sh("$A", &map(&[("A", "x")])).unwrap(), "x");
    }

    #[test]
    fn shell_variant_expands_single_char_name() {
        assert_eq!(expand_sh("$X", &map(&[("X", "y")])).unwrap(), "y");
    }

    #[test]
    fn shell_variant_honours_backslash_escapes() {
        assert_eq!(expand_sh("\\${A}", &map(&[])).unwrap(), "${A}");
        assert_eq!(expand_sh("\\\\", &map(&[])).unwrap(), "\\");
    }

    #[test]
    fn brace_only_variant_passes_through_bare_dollar_name() {
        // `ddsrt_expand_vars` only recognises `${...}`; a lone `$NAME` is
        // not an expansion trigger and is copied through verbatim.
        assert_eq!(expand("$A", &map(&[])).unwrap(), "$A");
    }

    #[test]
    fn process_env_lookup_synthesizes_pid() {
        let lookup = ProcessEnvLookup::new(None);
        let pid = expand("${CYCLONEDDS_PID}", &lookup).unwrap();
        assert_eq!(pid, std::process::id().to_string());
    }

    #[test]
    fn process_env_lookup_synthesizes_domain_id_when_given() {
        let lookup = ProcessEnvLookup::new(Some(7));
        assert_eq!(expand("${CYCLONEDDS_DOMAIN_ID}", &lookup).unwrap(), "7");
        let no_domain = ProcessEnvLookup::new(None);
        assert_eq!(expand("${CYCLONEDDS_DOMAIN_ID:-none}", &no_domain).unwrap(), "none");
    }

    #[test]
    fn tracing_tag_scenario() {
        let lookup = map(&[(
            "CYCLONEDDS_URI",
            "<Tracing><Verbosity>finest</></>",
        )]);
        // CYCLONEDDS_PID has to come from a lookup that also knows the URI;
        // MapLookup only serves plain vars, so this exercises the string
        // concatenation and nesting the scenario cares about, with the pid
        // substituted manually.
        let src = "${CYCLONEDDS_URI},<Discovery><Tag>${PID}</Tag></Discovery>";
        let lookup = MapLookup::new(
            lookup
                .0
                .into_iter()
                .chain(std::iter::once(("PID".to_string(), "4242".to_string()))),
        );
        let result = expand(src, &lookup).unwrap();
        assert_eq!(
            result,
            "<Tracing><Verbosity>finest</></>,<Discovery><Tag>4242</Tag></Discovery>"
        );
    }
}
