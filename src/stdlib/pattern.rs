//! Lua patterns.
//!
//! A pattern is translated to a regular expression on every call and handed
//! to the `regex` crate. Character classes map onto ASCII classes, so `%d`
//! matches `[0-9]` only. Balanced matches (`%b`), frontiers (`%f`),
//! back-references and position captures have no regular-expression
//! counterpart and are rejected.

use std::cell::Cell;

use log::debug;
use regex::{Captures, Regex};

use super::{arg, check_string, opt_integer, ready, BuiltinResult};
use crate::error::{LuaError, Result};
use crate::frame::StackFrame;
use crate::interpreter::invoke;
use crate::pending::{gather, Eval};
use crate::table::TableRef;
use crate::value::{Callable, Value};

fn class_name(c: char) -> Option<&'static str> {
    let name = match c.to_ascii_lowercase() {
        'a' => "alpha",
        'c' => "cntrl",
        'd' => "digit",
        'l' => "lower",
        'p' => "punct",
        's' => "space",
        'u' => "upper",
        'w' => "alnum",
        'x' => "xdigit",
        _ => return None,
    };

    Some(name)
}

/// `%a`-style class as a bracket item; upper case is the complement.
fn class_item(c: char) -> Option<String> {
    let name = class_name(c)?;
    let negate = if c.is_ascii_uppercase() { "^" } else { "" };

    Some(format!("[:{}{}:]", negate, name))
}

fn push_set_literal(out: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~' | '-') {
        out.push('\\');
    }

    out.push(c);
}

fn push_literal(out: &mut String, c: char) {
    out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
}

/// Translate `[...]` starting at `chars[start]`; returns the index after `]`.
fn translate_set(chars: &[char], start: usize, out: &mut String) -> std::result::Result<usize, String> {
    let mut i = start + 1;
    out.push('[');

    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }

    let first = i;

    loop {
        let Some(&c) = chars.get(i) else {
            return Err("malformed pattern (missing ']')".to_string());
        };

        match c {
            ']' if i > first => {
                out.push(']');

                return Ok(i + 1);
            }

            '%' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    return Err("malformed pattern (ends with '%')".to_string());
                };

                match class_item(escaped) {
                    Some(item) => out.push_str(&item),

                    None => push_set_literal(out, escaped),
                }

                i += 2;
            }

            // range operator between two literals, literal at either end
            '-' if i > first && chars.get(i + 1).is_some_and(|&n| n != ']') => {
                out.push('-');
                i += 1;
            }

            c => {
                push_set_literal(out, c);
                i += 1;
            }
        }
    }
}

/// Translate a Lua pattern into `regex` syntax.
pub fn translate(pattern: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)");

    // quantifiers only apply to single-character items
    let mut quantifiable = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        match c {
            '^' if i == 0 => {
                out.push('^');
                quantifiable = false;
            }

            '$' if i + 1 == chars.len() => {
                out.push('$');
                quantifiable = false;
            }

            '%' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    return Err("malformed pattern (ends with '%')".to_string());
                };

                match escaped {
                    'b' | 'f' => {
                        return Err(format!("pattern item '%{}' is not supported", escaped))
                    }

                    d if d.is_ascii_digit() => {
                        return Err("back-references are not supported in patterns".to_string())
                    }

                    c => match class_item(c) {
                        Some(item) => out.push_str(&format!("[{}]", item)),

                        None => push_literal(&mut out, c),
                    },
                }

                quantifiable = true;
                i += 1;
            }

            '.' => {
                out.push('.');
                quantifiable = true;
            }

            '[' => {
                i = translate_set(&chars, i, &mut out)?;
                quantifiable = true;

                continue;
            }

            '(' => {
                if chars.get(i + 1) == Some(&')') {
                    return Err("position captures are not supported".to_string());
                }

                out.push('(');
                quantifiable = false;
            }

            ')' => {
                out.push(')');
                quantifiable = false;
            }

            '*' | '+' | '?' | '-' if quantifiable => {
                match c {
                    '-' => out.push_str("*?"),

                    c => out.push(c),
                }

                quantifiable = false;
            }

            c => {
                push_literal(&mut out, c);
                quantifiable = true;
            }
        }

        i += 1;
    }

    debug!("Translated pattern {:?} to {:?}", pattern, out);

    Ok(out)
}

pub fn compile(pattern: &str, sf: &StackFrame) -> Result<Regex> {
    let translated = translate(pattern).map_err(|message| LuaError::runtime(sf, message))?;

    Regex::new(&translated)
        .map_err(|e| LuaError::runtime(sf, format!("malformed pattern '{}': {}", pattern, e)))
}

/// Captured groups, or the whole match when the pattern has none.
fn captures_of(caps: &Captures) -> Vec<Value> {
    if caps.len() == 1 {
        return vec![Value::str(&caps[0])];
    }

    (1..caps.len())
        .map(|i| caps.get(i).map_or(Value::Nil, |m| Value::str(m.as_str())))
        .collect()
}

/// 0-based byte offset of a 1-based (possibly negative) `init`; `None` past
/// the end.
fn start_offset(subject: &str, init: i64) -> Option<usize> {
    let len = subject.len() as i64;

    let start = match init {
        i if i > 0 => i - 1,

        0 => 0,

        i => (len + i).max(0),
    };

    if start > len {
        return None;
    }

    let mut start = start as usize;

    while !subject.is_char_boundary(start) {
        start += 1;
    }

    Some(start)
}

/// Position after an empty match at `at`.
fn step_past(subject: &str, at: usize) -> usize {
    at + subject[at..].chars().next().map_or(1, char::len_utf8)
}

/// A match found by [`Scan`].
struct Found {
    start: usize,
    end: usize,
    captures: Vec<Value>,
}

/// Successive non-overlapping matches of a regex over a subject.
struct Scan<'r> {
    regex: &'r Regex,
    subject: &'r str,
    position: usize,
}

impl Iterator for Scan<'_> {
    type Item = Found;

    fn next(&mut self) -> Option<Found> {
        if self.position > self.subject.len() {
            return None;
        }

        let caps = self.regex.captures_at(self.subject, self.position)?;
        let whole = caps.get(0)?;

        self.position = if whole.start() == whole.end() {
            step_past(self.subject, whole.end())
        } else {
            whole.end()
        };

        Some(Found {
            start: whole.start(),
            end: whole.end(),
            captures: captures_of(&caps),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Library functions
// ─────────────────────────────────────────────────────────────────────────────

/// `string.find(s, pattern [, init [, plain]])`
pub(crate) fn find(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let subject = check_string(&args, 0, "find", sf)?;
    let pattern = check_string(&args, 1, "find", sf)?;
    let init = opt_integer(&args, 2, "find", 1, sf)?;

    let Some(start) = start_offset(&subject, init) else {
        return ready(Value::Nil);
    };

    if arg(&args, 3).is_truthy() {
        return ready(match subject[start..].find(&pattern) {
            Some(offset) => {
                let from = start + offset;

                Value::Multi(vec![
                    Value::Number((from + 1) as f64),
                    Value::Number((from + pattern.len()) as f64),
                ])
            }

            None => Value::Nil,
        });
    }

    let regex = compile(&pattern, sf)?;

    // search the tail so that `^` anchors at `init`
    let Some(caps) = regex.captures(&subject[start..]) else {
        return ready(Value::Nil);
    };

    let Some(whole) = caps.get(0) else {
        return ready(Value::Nil);
    };

    let mut results = vec![
        Value::Number((start + whole.start() + 1) as f64),
        Value::Number((start + whole.end()) as f64),
    ];

    if caps.len() > 1 {
        results.extend(captures_of(&caps));
    }

    ready(Value::Multi(results))
}

/// `string.match(s, pattern [, init])`
pub(crate) fn match_(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let subject = check_string(&args, 0, "match", sf)?;
    let pattern = check_string(&args, 1, "match", sf)?;
    let init = opt_integer(&args, 2, "match", 1, sf)?;

    let Some(start) = start_offset(&subject, init) else {
        return ready(Value::Nil);
    };

    let regex = compile(&pattern, sf)?;

    ready(match regex.captures(&subject[start..]) {
        Some(caps) => Value::from_results(captures_of(&caps)),

        None => Value::Nil,
    })
}

/// `string.gmatch(s, pattern)`: an iterator over successive matches.
pub(crate) fn gmatch(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let subject = check_string(&args, 0, "gmatch", sf)?;
    let pattern = check_string(&args, 1, "gmatch", sf)?;
    let regex = compile(&pattern, sf)?;
    let position = Cell::new(0);

    let iterator = Callable::builtin("gmatch_iterator", move |_, _| {
        let mut scan = Scan {
            regex: &regex,
            subject: &subject,
            position: position.get(),
        };

        let found = scan.next();
        position.set(scan.position);

        ready(match found {
            Some(found) => Value::from_results(found.captures),

            None => {
                position.set(subject.len() + 1);
                Value::Nil
            }
        })
    });

    ready(Value::Function(iterator))
}

/// Expand `%0`–`%9` and `%%` in a replacement string.
fn expand(template: &str, found: &Found, whole: &str, sf: &StackFrame) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('%') => out.push('%'),

            Some('0') => out.push_str(whole),

            Some(d @ '1'..='9') => {
                let index = d as usize - '1' as usize;

                match found.captures.get(index) {
                    Some(capture) => out.push_str(&capture.to_string()),

                    None if index == 0 => out.push_str(whole),

                    None => {
                        return Err(LuaError::runtime(
                            sf,
                            format!("invalid capture index %{} in replacement string", d),
                        ))
                    }
                }
            }

            _ => {
                return Err(LuaError::runtime(
                    sf,
                    "invalid use of '%' in replacement string",
                ))
            }
        }
    }

    Ok(out)
}

/// Replacement text for a table or function result; `None` keeps the match.
fn replacement_text(value: Value, sf: &StackFrame) -> Result<Option<String>> {
    match value.single() {
        Value::Nil | Value::Bool(false) => Ok(None),

        Value::String(s) => Ok(Some(s)),

        n @ (Value::Number(_) | Value::Float(_)) => Ok(Some(n.to_string())),

        other => Err(LuaError::runtime(
            sf,
            format!("invalid replacement value (a {})", other.type_name()),
        )),
    }
}

/// `string.gsub(s, pattern, repl [, n])`
pub(crate) fn gsub(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let subject = check_string(&args, 0, "gsub", sf)?;
    let pattern = check_string(&args, 1, "gsub", sf)?;
    let replacement = arg(&args, 2);
    let limit = opt_integer(&args, 3, "gsub", i64::MAX, sf)?.max(0) as usize;
    let regex = compile(&pattern, sf)?;

    let matches: Vec<Found> = Scan {
        regex: &regex,
        subject: &subject,
        position: 0,
    }
    .take(limit)
    .collect();

    debug!("gsub found {} matches", matches.len());

    let mut pending = Vec::with_capacity(matches.len());

    for found in &matches {
        let whole = &subject[found.start..found.end];

        let text = match &replacement {
            Value::String(_) | Value::Number(_) | Value::Float(_) => {
                Eval::Ready(Value::String(expand(&replacement.to_string(), found, whole, sf)?))
            }

            Value::Table(table) => {
                Eval::Ready(table.get(found.captures.first().unwrap_or(&Value::Nil)))
            }

            Value::Function(_) => invoke(&replacement, found.captures.clone(), sf)?,

            other => {
                return Err(LuaError::runtime(
                    sf,
                    format!(
                        "bad argument #3 to 'gsub' (string/function/table expected, got {})",
                        other.type_name()
                    ),
                ))
            }
        };

        pending.push(text);
    }

    let sf = sf.clone();

    gather(pending).try_map(move |texts| {
        let count = matches.len();
        let mut out = subject;

        // back to front so earlier offsets stay valid
        for (found, text) in matches.iter().zip(texts).rev() {
            if let Some(text) = replacement_text(text, &sf)? {
                out.replace_range(found.start..found.end, &text);
            }
        }

        Ok(Value::Multi(vec![Value::String(out), Value::Number(count as f64)]))
    })
}

fn regex_argument(args: &[Value], name: &str, sf: &StackFrame) -> Result<(String, Regex)> {
    let subject = check_string(args, 0, name, sf)?;
    let expression = check_string(args, 1, name, sf)?;

    let regex = Regex::new(&expression)
        .map_err(|e| LuaError::runtime(sf, format!("invalid regex '{}': {}", expression, e)))?;

    Ok((subject, regex))
}

/// Whole match followed by every group, as an array table.
fn groups_table(caps: &Captures) -> Value {
    let groups = caps
        .iter()
        .map(|m| m.map_or(Value::Nil, |m| Value::str(m.as_str())))
        .collect();

    Value::Table(TableRef::from_values(groups))
}

/// `string.matchRegex(s, regex)`
pub(crate) fn match_regex(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let (subject, regex) = regex_argument(&args, "matchRegex", sf)?;

    ready(regex.captures(&subject).map_or(Value::Nil, |caps| groups_table(&caps)))
}

/// `string.matchRegexAll(s, regex)`: an iterator over all matches.
pub(crate) fn match_regex_all(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let (subject, regex) = regex_argument(&args, "matchRegexAll", sf)?;
    let position = Cell::new(0);

    let iterator = Callable::builtin("matchRegexAll_iterator", move |_, _| {
        let at = position.get();

        if at > subject.len() {
            return ready(Value::Nil);
        }

        let Some(caps) = regex.captures_at(&subject, at) else {
            position.set(subject.len() + 1);

            return ready(Value::Nil);
        };

        let (start, end) = caps.get(0).map_or((at, at), |m| (m.start(), m.end()));
        position.set(if start == end { step_past(&subject, end) } else { end });

        ready(groups_table(&caps))
    });

    ready(Value::Function(iterator))
}
