//! The `string` library. Strings also index this table, so `s:upper()` works.

use super::pattern;
use super::{arg, bad_argument, check_integer, check_number, check_string, opt_integer, ready, register, BuiltinResult};
use crate::ast_printer::AstPrinter;
use crate::error::Result;
use crate::frame::StackFrame;
use crate::table::{Table, TableRef};
use crate::value::Value;

pub fn library() -> Table {
    let mut string = Table::new();

    register(&mut string, "len", len);
    register(&mut string, "sub", sub);
    register(&mut string, "upper", upper);
    register(&mut string, "lower", lower);
    register(&mut string, "rep", rep);
    register(&mut string, "reverse", reverse);
    register(&mut string, "byte", byte);
    register(&mut string, "char", from_codes);
    register(&mut string, "format", format);

    register(&mut string, "find", pattern::find);
    register(&mut string, "match", pattern::match_);
    register(&mut string, "gmatch", pattern::gmatch);
    register(&mut string, "gsub", pattern::gsub);

    // non-standard
    register(&mut string, "split", split);
    register(&mut string, "startsWith", starts_with);
    register(&mut string, "endsWith", ends_with);
    register(&mut string, "trim", trim);
    register(&mut string, "trimStart", trim_start);
    register(&mut string, "trimEnd", trim_end);
    register(&mut string, "matchRegex", pattern::match_regex);
    register(&mut string, "matchRegexAll", pattern::match_regex_all);

    string
}

fn len(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_string(&args, 0, "len", sf)?.len() as f64)
}

/// Byte range `[i, j]` (1-based, inclusive, negatives from the end) clamped
/// to the string; `None` when empty.
fn byte_range(len: usize, i: i64, j: i64) -> Option<(usize, usize)> {
    let len = len as i64;

    let from = match i {
        i if i < 0 => (len + i + 1).max(1),

        0 => 1,

        i => i,
    };

    let to = match j {
        j if j < 0 => len + j + 1,

        j => j.min(len),
    };

    (from <= to).then(|| (from as usize, to as usize))
}

fn sub(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let s = check_string(&args, 0, "sub", sf)?;
    let i = opt_integer(&args, 1, "sub", 1, sf)?;
    let j = opt_integer(&args, 2, "sub", -1, sf)?;

    ready(match byte_range(s.len(), i, j) {
        Some((from, to)) => String::from_utf8_lossy(&s.as_bytes()[from - 1..to]).into_owned(),

        None => String::new(),
    })
}

fn upper(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_string(&args, 0, "upper", sf)?.to_uppercase())
}

fn lower(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_string(&args, 0, "lower", sf)?.to_lowercase())
}

fn rep(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let s = check_string(&args, 0, "rep", sf)?;
    let n = check_integer(&args, 1, "rep", sf)?;
    let separator = match arg(&args, 2) {
        Value::Nil => String::new(),

        _ => check_string(&args, 2, "rep", sf)?,
    };

    if n <= 0 {
        return ready("");
    }

    ready(vec![s; n as usize].join(&separator))
}

fn reverse(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_string(&args, 0, "reverse", sf)?.chars().rev().collect::<String>())
}

fn byte(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let s = check_string(&args, 0, "byte", sf)?;
    let i = opt_integer(&args, 1, "byte", 1, sf)?;
    let j = opt_integer(&args, 2, "byte", i, sf)?;

    let codes = match byte_range(s.len(), i, j) {
        Some((from, to)) => s.as_bytes()[from - 1..to]
            .iter()
            .map(|&b| Value::Number(b as f64))
            .collect(),

        None => Vec::new(),
    };

    ready(Value::from_results(codes))
}

fn from_codes(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let mut bytes = Vec::with_capacity(args.len());

    for i in 0..args.len() {
        let code = check_integer(&args, i, "char", sf)?;

        match u8::try_from(code) {
            Ok(b) => bytes.push(b),

            Err(_) => return Err(bad_argument(sf, i, "char", "value out of range")),
        }
    }

    ready(String::from_utf8_lossy(&bytes).into_owned())
}

// ── format ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

impl Directive {
    fn pad(&self, body: String, numeric: bool) -> String {
        let len = body.chars().count();

        if len >= self.width {
            return body;
        }

        let fill = self.width - len;

        if self.left {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero && numeric {
            let (sign, digits) = match body.strip_prefix(['-', '+']) {
                Some(rest) => (&body[..1], rest),

                None => ("", body.as_str()),
            };

            format!("{}{}{}", sign, "0".repeat(fill), digits)
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }

    fn signed(&self, body: String) -> String {
        if body.starts_with('-') {
            body
        } else if self.plus {
            format!("+{}", body)
        } else if self.space {
            format!(" {}", body)
        } else {
            body
        }
    }
}

/// Width or precision of a directive, at most two digits.
fn digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, sf: &StackFrame) -> Result<usize> {
    let mut text = String::new();

    while let Some(&c) = chars.peek().filter(|c| c.is_ascii_digit()) {
        text.push(c);
        chars.next();
    }

    if text.len() > 2 {
        return Err(bad_argument(
            sf,
            0,
            "format",
            &format!("invalid conversion '%{}' to 'format'", text),
        ));
    }

    Ok(text.parse().unwrap_or(0))
}

fn format_item(conversion: char, directive: &Directive, args: &[Value], i: usize, sf: &StackFrame) -> Result<String> {
    if i >= args.len() {
        return Err(bad_argument(sf, i, "format", "no value"));
    }

    let body = match conversion {
        'd' | 'i' => directive.pad(directive.signed(check_integer(args, i, "format", sf)?.to_string()), true),

        'f' | 'F' => {
            let n = check_number(args, i, "format", sf)?;

            directive.pad(directive.signed(format!("{:.*}", directive.precision.unwrap_or(6), n)), true)
        }

        'x' => directive.pad(format!("{:x}", check_integer(args, i, "format", sf)?), true),

        'X' => directive.pad(format!("{:X}", check_integer(args, i, "format", sf)?), true),

        'c' => {
            let code = check_integer(args, i, "format", sf)?;
            let c = u32::try_from(code).ok().and_then(char::from_u32).unwrap_or('\u{fffd}');

            directive.pad(c.to_string(), false)
        }

        's' => {
            let mut s = args[i].to_string();

            if let Some(precision) = directive.precision {
                s = s.chars().take(precision).collect();
            }

            directive.pad(s, false)
        }

        'q' => match &args[i] {
            Value::String(s) => AstPrinter::quote(s),

            other => other.to_string(),
        },

        other => {
            return Err(bad_argument(
                sf,
                0,
                "format",
                &format!("invalid conversion '%{}' to 'format'", other),
            ))
        }
    };

    Ok(body)
}

/// `string.format` with `%s %d %i %f %x %X %c %q %%`, flags `- 0 + space`,
/// width and precision.
fn format(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let template = check_string(&args, 0, "format", sf)?;
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_arg = 1;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut directive = Directive::default();

        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => directive.left = true,
                '0' => directive.zero = true,
                '+' => directive.plus = true,
                ' ' => directive.space = true,
                '#' => {}
                _ => break,
            }

            chars.next();
        }

        directive.width = digits(&mut chars, sf)?;

        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(digits(&mut chars, sf)?);
        }

        let Some(conversion) = chars.next() else {
            return Err(bad_argument(sf, 0, "format", "invalid conversion '%' to 'format'"));
        };

        out.push_str(&format_item(conversion, &directive, &args, next_arg, sf)?);
        next_arg += 1;
    }

    ready(out)
}

// ── extensions ──────────────────────────────────────────────────────────────

fn split(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let s = check_string(&args, 0, "split", sf)?;
    let separator = check_string(&args, 1, "split", sf)?;

    let parts: Vec<Value> = if separator.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(separator.as_str()).map(Value::str).collect()
    };

    ready(Value::Table(TableRef::from_values(parts)))
}

fn starts_with(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let s = check_string(&args, 0, "startsWith", sf)?;

    ready(s.starts_with(check_string(&args, 1, "startsWith", sf)?.as_str()))
}

fn ends_with(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let s = check_string(&args, 0, "endsWith", sf)?;

    ready(s.ends_with(check_string(&args, 1, "endsWith", sf)?.as_str()))
}

fn trim(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_string(&args, 0, "trim", sf)?.trim())
}

fn trim_start(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_string(&args, 0, "trimStart", sf)?.trim_start())
}

fn trim_end(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_string(&args, 0, "trimEnd", sf)?.trim_end())
}
