use std::cmp::Ordering;

use serde_json::Value;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathError {
    #[error("Empty path")]
    Empty,

    #[error("Invalid path {path:?} at position {position}: {reason}")]
    Syntax {
        path: String,
        position: usize,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    /// Negative indexes count from the end
    Index(i64),
    Wildcard,
    /// `[start:end:step]` with Python slice bounds
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
    Filter(Filter),
    /// `..`: the current node and every node below it
    Descendants,
}

/// `[?(@.path)]` or `[?(@.path <op> literal)]`
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub path: Vec<Segment>,
    /// `None` only tests that the path exists
    pub condition: Option<(CompareOp, Value)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn syntax(path: &str, position: usize, reason: &'static str) -> PathError {
    PathError::Syntax {
        path: path.to_string(),
        position,
        reason,
    }
}

/// Parse `$.a.b[0]['c'][*]`, `$..a`, `$.a[1:3]` and `$.a[?(@.b == 1)]` style paths.
/// The leading `$` is optional.
pub fn parse(path: &str) -> Result<Vec<Segment>, PathError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let chars: Vec<char> = path.chars().collect();

    let mut segments = Vec::new();
    let mut i = 0;
    if chars[0] == '$' {
        i = 1;
    } else if chars[0] != '.' && chars[0] != '[' {
        // bare dotted path: first key without a leading dot
        let (key, next) = read_key(&chars, 0);
        segments.push(Segment::Key(key));
        i = next;
    }

    while i < chars.len() {
        match chars[i] {
            '.' if chars.get(i + 1) == Some(&'.') => {
                i += 2;
                segments.push(Segment::Descendants);
                match chars.get(i) {
                    // bracket selector is read on the next turn
                    Some('[') => {}
                    Some('*') => {
                        segments.push(Segment::Wildcard);
                        i += 1;
                    }
                    Some(_) => {
                        let (key, next) = read_key(&chars, i);
                        if key.is_empty() {
                            return Err(syntax(path, i, "expected a key after '..'"));
                        }
                        segments.push(Segment::Key(key));
                        i = next;
                    }
                    None => return Err(syntax(path, i, "expected a selector after '..'")),
                }
            }
            '.' => {
                i += 1;
                if chars.get(i) == Some(&'*') {
                    segments.push(Segment::Wildcard);
                    i += 1;
                    continue;
                }
                let (key, next) = read_key(&chars, i);
                if key.is_empty() {
                    return Err(syntax(path, i, "expected a key after '.'"));
                }
                segments.push(Segment::Key(key));
                i = next;
            }
            '[' => {
                let (segment, next) = parse_bracket(path, &chars, i + 1)?;
                segments.push(segment);
                i = next;
            }
            _ => return Err(syntax(path, i, "expected '.' or '['")),
        }
    }

    Ok(segments)
}

fn read_key(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
        end += 1;
    }
    (chars[start..end].iter().collect::<String>().trim().to_string(), end)
}

/// Selector between `[` (already consumed) and `]`; returns the position after `]`
fn parse_bracket(path: &str, chars: &[char], mut i: usize) -> Result<(Segment, usize), PathError> {
    let segment = match chars.get(i) {
        None => return Err(syntax(path, i, "unterminated bracket")),
        Some('*') => {
            i += 1;
            Segment::Wildcard
        }
        Some(&quote) if quote == '\'' || quote == '"' => {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|c| *c == quote)
                .map(|p| start + p)
                .ok_or_else(|| syntax(path, i, "unterminated quoted key"))?;
            i = end + 1;
            Segment::Key(chars[start..end].iter().collect())
        }
        Some('?') => {
            let (filter, next) = parse_filter(path, chars, i + 1)?;
            i = next;
            Segment::Filter(filter)
        }
        Some(_) => {
            let start = i;
            while i < chars.len() && matches!(chars[i], '-' | ':' | ' ' | '0'..='9') {
                i += 1;
            }
            let raw: String = chars[start..i].iter().collect();
            index_or_slice(&raw).ok_or_else(|| {
                syntax(path, start, "expected an index, a slice, '*', a filter or a quoted key")
            })?
        }
    };

    if chars.get(i) != Some(&']') {
        return Err(syntax(path, i, "expected ']'"));
    }
    Ok((segment, i + 1))
}

fn index_or_slice(raw: &str) -> Option<Segment> {
    let raw = raw.trim();
    if !raw.contains(':') {
        return raw.parse().ok().map(Segment::Index);
    }

    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return None;
    }
    let bound = |s: &str| -> Option<Option<i64>> {
        if s.is_empty() {
            Some(None)
        } else {
            s.parse().ok().map(Some)
        }
    };
    let start = bound(parts[0])?;
    let end = bound(parts[1])?;
    let step = match parts.get(2) {
        Some(s) if !s.is_empty() => s.parse().ok()?,
        _ => 1,
    };
    if step == 0 {
        return None;
    }

    Some(Segment::Slice { start, end, step })
}

/// `(...)` after `[?`; returns the position after `)`
fn parse_filter(path: &str, chars: &[char], mut i: usize) -> Result<(Filter, usize), PathError> {
    if chars.get(i) != Some(&'(') {
        return Err(syntax(path, i, "expected '(' after '?'"));
    }

    let open = i;
    let mut depth = 0usize;
    let mut quote = None;
    let mut close = None;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }

    let close = close.ok_or_else(|| syntax(path, open, "unterminated filter"))?;
    let expr: String = chars[open + 1..close].iter().collect();
    let filter = parse_condition(&expr)
        .ok_or_else(|| syntax(path, open + 1, "expected '@' path, optionally compared to a literal"))?;

    Ok((filter, close + 1))
}

fn parse_condition(expr: &str) -> Option<Filter> {
    let expr = expr.trim();
    let (lhs, condition) = match find_operator(expr) {
        Some((pos, op, len)) => {
            let literal = parse_literal(expr[pos + len..].trim())?;
            (expr[..pos].trim(), Some((op, literal)))
        }
        None => (expr, None),
    };

    let rest = lhs.strip_prefix('@')?;
    let path = parse(&format!("${}", rest)).ok()?;
    Some(Filter { path, condition })
}

/// Byte position, operator and operator width of the first comparison outside quotes
fn find_operator(expr: &str) -> Option<(usize, CompareOp, usize)> {
    let bytes = expr.as_bytes();
    let mut quote = None;

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        let (op, width) = match (b, bytes.get(i + 1).copied()) {
            (b'\'' | b'"', _) => {
                quote = Some(b);
                continue;
            }
            (b'=', Some(b'=')) => (CompareOp::Eq, 2),
            (b'!', Some(b'=')) => (CompareOp::Ne, 2),
            (b'<', Some(b'=')) => (CompareOp::Le, 2),
            (b'>', Some(b'=')) => (CompareOp::Ge, 2),
            (b'<', _) => (CompareOp::Lt, 1),
            (b'>', _) => (CompareOp::Gt, 1),
            _ => continue,
        };
        return Some((i, op, width));
    }

    None
}

/// JSON literal, or a single-quoted string
fn parse_literal(raw: &str) -> Option<Value> {
    if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Some(Value::String(inner.to_string()));
    }
    serde_json::from_str(raw).ok()
}

/// First value matching `path` inside `root`; `Null` when nothing matches
pub fn query(root: &Value, path: &str) -> Result<Value, PathError> {
    let segments = parse(path)?;
    Ok(select(root, &segments)
        .into_iter()
        .next()
        .cloned()
        .unwrap_or(Value::Null))
}

/// Every match, in document order
fn select<'a>(root: &'a Value, segments: &[Segment]) -> Vec<&'a Value> {
    segments.iter().fold(vec![root], |nodes, segment| {
        nodes
            .into_iter()
            .flat_map(|node| apply(node, segment))
            .collect()
    })
}

fn apply<'a>(node: &'a Value, segment: &Segment) -> Vec<&'a Value> {
    match segment {
        Segment::Key(key) => node.as_object().and_then(|m| m.get(key)).into_iter().collect(),
        Segment::Index(index) => {
            let Some(items) = node.as_array() else {
                return Vec::new();
            };
            let idx = if *index < 0 {
                items.len().checked_sub(index.unsigned_abs() as usize)
            } else {
                Some(*index as usize)
            };
            idx.and_then(|i| items.get(i)).into_iter().collect()
        }
        Segment::Wildcard => children(node),
        Segment::Slice { start, end, step } => match node.as_array() {
            Some(items) => slice_indices(items.len(), *start, *end, *step)
                .into_iter()
                .map(|i| &items[i])
                .collect(),
            None => Vec::new(),
        },
        Segment::Filter(filter) => children(node)
            .into_iter()
            .filter(|child| filter.matches(child))
            .collect(),
        Segment::Descendants => {
            let mut out = Vec::new();
            descendants(node, &mut out);
            out
        }
    }
}

fn children(node: &Value) -> Vec<&Value> {
    match node {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn descendants<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(node);
    for child in children(node) {
        descendants(child, out);
    }
}

fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let bound = |b: i64, low: i64, high: i64| (if b < 0 { b + len } else { b }).clamp(low, high);

    if step > 0 {
        let start = start.map_or(0, |s| bound(s, 0, len));
        let end = end.map_or(len, |e| bound(e, 0, len));
        (start..end).step_by(step as usize).map(|i| i as usize).collect()
    } else {
        let start = start.map_or(len - 1, |s| bound(s, -1, len - 1));
        let end = end.map_or(-1, |e| bound(e, -1, len - 1));
        let mut out = Vec::new();
        let mut i = start;
        while i > end {
            out.push(i as usize);
            i += step;
        }
        out
    }
}

impl Filter {
    fn matches(&self, candidate: &Value) -> bool {
        let Some(actual) = select(candidate, &self.path).into_iter().next() else {
            return false;
        };
        match &self.condition {
            None => true,
            Some((op, expected)) => compare(actual, *op, expected),
        }
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        CompareOp::Eq => ordering.map_or(actual == expected, |o| o == Ordering::Equal),
        CompareOp::Ne => ordering.map_or(actual != expected, |o| o != Ordering::Equal),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}
