//! JSONPath-style path expressions over `serde_json::Value`.
//!
//! Supported syntax:
//!
//! | Form          | Meaning                                  |
//! |---------------|------------------------------------------|
//! | `$`           | root                                     |
//! | `.name`       | object member                            |
//! | `['name']`    | object member (any characters)           |
//! | `[n]`, `[-n]` | array element, negative counts from end  |
//! | `.*`, `[*]`   | every member / element                   |
//! | `..name`      | `name` at any depth                      |
//! | `..*`         | every descendant                         |

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Name(String),
    Index(i64),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Child(Selector),
    Descendant(Selector),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Step {
    Key(String),
    Index(usize),
}

type Location = Vec<Step>;

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    raw: String,
    segments: Vec<Segment>,
}

impl PathExpr {
    /// Parse an expression such as `$.items[*].image.url`.
    pub fn parse(input: &str) -> Result<Self> {
        Parser::new(input).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// All nodes matched by this expression, in document order.
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        self.locate(root)
            .iter()
            .filter_map(|loc| resolve(root, loc))
            .collect()
    }

    /// Replace every matched node with `f(node)`.
    ///
    /// Either every match is rewritten or, when `f` fails, `root` is left
    /// untouched. Nested matches are rewritten innermost first. Returns the
    /// number of rewritten nodes.
    pub fn apply<F>(&self, root: &mut Value, mut f: F) -> std::result::Result<usize, String>
    where
        F: FnMut(Value) -> std::result::Result<Value, String>,
    {
        let mut locations = self.locate(root);
        if locations.is_empty() {
            return Ok(0);
        }
        locations.sort_by_key(|loc| std::cmp::Reverse(loc.len()));

        let mut working = root.clone();
        for loc in &locations {
            if let Some(node) = working.pointer_mut(&to_pointer(loc)) {
                let current = node.take();
                *node = f(current)?;
            }
        }
        *root = working;
        Ok(locations.len())
    }

    fn locate(&self, root: &Value) -> Vec<Location> {
        let mut current: Vec<Location> = vec![Vec::new()];
        for segment in &self.segments {
            let mut next = Vec::new();
            for loc in &current {
                let Some(node) = resolve(root, loc) else {
                    continue;
                };
                match segment {
                    Segment::Child(selector) => select_children(node, loc, selector, &mut next),
                    Segment::Descendant(selector) => {
                        descend(node, loc.clone(), selector, &mut next)
                    }
                }
            }
            current = dedup(next);
        }
        current
    }
}

impl FromStr for PathExpr {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn resolve<'a>(root: &'a Value, loc: &[Step]) -> Option<&'a Value> {
    loc.iter().try_fold(root, |node, step| match step {
        Step::Key(key) => node.get(key.as_str()),
        Step::Index(idx) => node.get(*idx),
    })
}

fn select_children(node: &Value, loc: &Location, selector: &Selector, out: &mut Vec<Location>) {
    let mut push = |step: Step| {
        let mut child = loc.clone();
        child.push(step);
        out.push(child);
    };
    match (selector, node) {
        (Selector::Name(name), Value::Object(map)) if map.contains_key(name) => {
            push(Step::Key(name.clone()))
        }
        (Selector::Index(idx), Value::Array(items)) => {
            let len = items.len() as i64;
            let resolved = if *idx < 0 { len + idx } else { *idx };
            if (0..len).contains(&resolved) {
                push(Step::Index(resolved as usize));
            }
        }
        (Selector::Wildcard, Value::Object(map)) => {
            map.keys().for_each(|key| push(Step::Key(key.clone())))
        }
        (Selector::Wildcard, Value::Array(items)) => {
            (0..items.len()).for_each(|idx| push(Step::Index(idx)))
        }
        _ => {}
    }
}

fn descend(node: &Value, loc: Location, selector: &Selector, out: &mut Vec<Location>) {
    select_children(node, &loc, selector, out);
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                let mut next = loc.clone();
                next.push(Step::Key(key.clone()));
                descend(child, next, selector, out);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                let mut next = loc.clone();
                next.push(Step::Index(idx));
                descend(child, next, selector, out);
            }
        }
        _ => {}
    }
}

fn dedup(locations: Vec<Location>) -> Vec<Location> {
    let mut seen = HashSet::new();
    locations
        .into_iter()
        .filter(|loc| seen.insert(loc.clone()))
        .collect()
}

/// RFC 6901 pointer for a location.
fn to_pointer(loc: &[Step]) -> String {
    loc.iter()
        .map(|step| match step {
            Step::Key(key) => format!("/{}", key.replace('~', "~0").replace('/', "~1")),
            Step::Index(idx) => format!("/{idx}"),
        })
        .collect()
}

struct Parser<'a> {
    raw: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            chars: raw.trim().chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<PathExpr> {
        if self.peek() != Some('$') {
            return Err(self.error("must start with '$'"));
        }
        self.pos += 1;

        let mut segments = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.pos += 1;
                    if self.peek() == Some('.') {
                        self.pos += 1;
                        let selector = if self.peek() == Some('[') {
                            self.bracket()?
                        } else {
                            self.dotted()?
                        };
                        segments.push(Segment::Descendant(selector));
                    } else {
                        segments.push(Segment::Child(self.dotted()?));
                    }
                }
                '[' => segments.push(Segment::Child(self.bracket()?)),
                other => return Err(self.error(format!("unexpected '{other}'"))),
            }
        }

        Ok(PathExpr {
            raw: self.raw.trim().to_string(),
            segments,
        })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn dotted(&mut self) -> Result<Selector> {
        if self.peek() == Some('*') {
            self.pos += 1;
            return Ok(Selector::Wildcard);
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("empty member name"));
        }
        Ok(Selector::Name(self.chars[start..self.pos].iter().collect()))
    }

    fn bracket(&mut self) -> Result<Selector> {
        self.pos += 1; // '['
        let selector = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Selector::Wildcard
            }
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated quoted name"));
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Selector::Name(name)
            }
            Some(_) => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ']') {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                let idx = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| self.error(format!("invalid index '{text}'")))?;
                Selector::Index(idx)
            }
            None => return Err(self.error("unterminated '['")),
        };
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(selector)
    }

    fn error(&self, message: impl fmt::Display) -> AppError {
        AppError::path(self.raw, format!("{message} at position {}", self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "title": "Hello",
            "hero": { "url": "https://x/hero.png" },
            "blocks": [
                { "type": "image", "image": { "url": "https://x/a.png" } },
                { "type": "text", "body": "..." },
                { "type": "image", "image": { "url": "https://x/b.png" } }
            ],
            "odd/key": 1
        })
    }

    #[test]
    fn test_parse_errors() {
        assert!(PathExpr::parse("title").is_err());
        assert!(PathExpr::parse("$.").is_err());
        assert!(PathExpr::parse("$[abc]").is_err());
        assert!(PathExpr::parse("$['open").is_err());
        assert!("$.blocks[0]".parse::<PathExpr>().is_ok());
    }

    #[test]
    fn test_select_member_and_index() {
        let d = doc();
        let hits = PathExpr::parse("$.hero.url").unwrap().select(&d);
        assert_eq!(hits, vec![&json!("https://x/hero.png")]);

        let hits = PathExpr::parse("$.blocks[-1].image.url").unwrap().select(&d);
        assert_eq!(hits, vec![&json!("https://x/b.png")]);

        let hits = PathExpr::parse("$['odd/key']").unwrap().select(&d);
        assert_eq!(hits, vec![&json!(1)]);
    }

    #[test]
    fn test_select_wildcard_and_descendant() {
        let d = doc();
        let hits = PathExpr::parse("$.blocks[*].image.url").unwrap().select(&d);
        assert_eq!(hits.len(), 2);

        let hits = PathExpr::parse("$..url").unwrap().select(&d);
        assert_eq!(hits.len(), 3);

        let hits = PathExpr::parse("$").unwrap().select(&d);
        assert_eq!(hits, vec![&d]);
    }

    #[test]
    fn test_apply_rewrites_matches() {
        let mut d = doc();
        let count = PathExpr::parse("$..url")
            .unwrap()
            .apply(&mut d, |v| {
                Ok(Value::String(v.as_str().unwrap_or_default().replace("https://x", "/media")))
            })
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(d["hero"]["url"], json!("/media/hero.png"));
        assert_eq!(d["blocks"][2]["image"]["url"], json!("/media/b.png"));
    }

    #[test]
    fn test_apply_failure_leaves_value_untouched() {
        let mut d = doc();
        let before = d.clone();
        let mut calls = 0;
        let result = PathExpr::parse("$..url").unwrap().apply(&mut d, |v| {
            calls += 1;
            if calls == 2 { Err("boom".into()) } else { Ok(v) }
        });
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(d, before);
    }

    #[test]
    fn test_apply_nested_matches_innermost_first() {
        let mut d = json!({ "a": { "a": 1 } });
        PathExpr::parse("$..a")
            .unwrap()
            .apply(&mut d, |v| Ok(json!({ "wrapped": v })))
            .unwrap();
        assert_eq!(d, json!({ "a": { "wrapped": { "a": { "wrapped": 1 } } } }));
    }
}
