//! Pre-lex pass: collects `.macro`/`.endm` definitions and textually
//! substitutes invocations with their bodies.
//!
//! Substitution is purely textual: `$k` placeholders are replaced with the
//! literal argument text, left to right, with the cursor advanced past each
//! replacement so the substituted text is never re-scanned. There is no
//! hygiene; an argument like `[r1+4]` lands in the body verbatim.

use std::collections::HashMap;

struct MacroDef {
    arity: usize,
    body: Vec<String>,
}

/// Expand every macro invocation in `source`, returning the expanded text.
pub fn expand(source: &str) -> Result<String, Error> {
    let lines: Vec<&str> = source.lines().collect();
    let mut macros: HashMap<String, MacroDef> = HashMap::new();
    let mut out: Vec<String> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        if starts_with_word(trimmed, ".macro") {
            let (name, arity, def_end) = parse_definition(&lines, i)?;
            let body = lines[i + 1..def_end].iter().map(|s| s.to_string()).collect();
            macros.insert(name, MacroDef { arity, body });
            i = def_end + 1;
            continue;
        }

        if starts_with_word(trimmed, ".endm") {
            // An .endm with no matching .macro in flight.
            return Err(Error::UnterminatedDefinition {
                name: String::new(),
                line: i + 1,
            });
        }

        match find_invocation(trimmed, &macros) {
            Some((name, args)) => {
                let def = &macros[&name];
                if args.len() != def.arity {
                    return Err(Error::ArityMismatch {
                        name: name.clone(),
                        expected: def.arity,
                        found: args.len(),
                        line: i + 1,
                    });
                }
                for body_line in &def.body {
                    out.push(substitute(body_line, &args));
                }
            }
            None => out.push(line.to_string()),
        }
        i += 1;
    }

    Ok(out.join("\n"))
}

fn starts_with_word(trimmed: &str, word: &str) -> bool {
    trimmed == word || trimmed.starts_with(&format!("{word} ")) || trimmed.starts_with(&format!("{word}\t"))
}

/// Parse a `.macro NAME ARITY` header starting at `lines[start]` and scan
/// forward for the matching `.endm`. Returns `(name, arity, index_of_endm)`.
fn parse_definition(lines: &[&str], start: usize) -> Result<(String, usize, usize), Error> {
    let header = lines[start].trim_start();
    let rest = header[".macro".len()..].trim();
    let mut parts = rest.split_whitespace();
    let name = parts
        .next()
        .ok_or(Error::MissingName { line: start + 1 })?
        .to_string();
    let arity_str = parts.next().ok_or(Error::MissingName { line: start + 1 })?;
    let arity: usize = arity_str
        .parse()
        .map_err(|_| Error::MissingName { line: start + 1 })?;

    let mut j = start + 1;
    while j < lines.len() {
        let t = lines[j].trim_start();
        if starts_with_word(t, ".macro") {
            return Err(Error::NestedDefinition { line: j + 1 });
        }
        if starts_with_word(t, ".endm") {
            return Ok((name, arity, j));
        }
        j += 1;
    }
    Err(Error::UnterminatedDefinition { name, line: start + 1 })
}

/// If `trimmed` invokes a known macro, return its name and argument list.
fn find_invocation(trimmed: &str, macros: &HashMap<String, MacroDef>) -> Option<(String, Vec<String>)> {
    let name = trimmed.split_whitespace().next()?;
    if !macros.contains_key(name) {
        return None;
    }
    if !starts_with_word(trimmed, name) {
        return None;
    }
    let rest = trimmed[name.len()..].trim();
    let args = split_top_level_commas(rest);
    Some((name.to_string(), args))
}

/// Split on commas that are not nested inside `[...]`.
fn split_top_level_commas(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in s.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// Replace every `$k` (1-indexed) in `line` with `args[k - 1]`, scanning left
/// to right without rescanning substituted text.
fn substitute(line: &str, args: &[String]) -> String {
    let mut result = String::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 {
                let num: usize = chars[i + 1..j].iter().collect::<String>().parse().unwrap();
                if num >= 1 && num <= args.len() {
                    result.push_str(&args[num - 1]);
                    i = j;
                    continue;
                }
            }
        }
        result.push(chars[i]);
        i += 1;
    }
    result
}

/// An error that can occur while expanding macros.
#[derive(Debug)]
pub enum Error {
    /// `.macro` was never closed with a matching `.endm`.
    UnterminatedDefinition { name: String, line: usize },
    /// A `.macro` line was missing a name or an arity.
    MissingName { line: usize },
    /// A `.macro` definition was started while already inside one.
    NestedDefinition { line: usize },
    /// A macro invocation passed the wrong number of arguments.
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        line: usize,
    },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnterminatedDefinition { name, line } => write!(
                f,
                "macro error: unterminated definition of \"{name}\" starting at line {line}"
            ),
            Error::MissingName { line } => {
                write!(f, "macro error: expected \"NAME ARITY\" after .macro at line {line}")
            }
            Error::NestedDefinition { line } => {
                write!(f, "macro error: nested .macro definition at line {line}")
            }
            Error::ArityMismatch { name, expected, found, line } => write!(
                f,
                "macro error: \"{name}\" expects {expected} argument(s), found {found} at line {line}"
            ),
        }
    }
}
