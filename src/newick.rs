//! Reading and writing gene trees in the newick format.
//!
//! Both directions are iterative, so that arbitrarily deep trees do not grow the
//! call stack. Branch lengths and internal labels are preserved, `[...]`
//! comments (e.g. NHX annotations) are skipped, and labels containing special
//! characters are single-quoted.
use crate::errors::NewickError;
use crate::tree::{GeneTree, NodeID};

const SPECIALS: &[u8] = b"()[]':;,";

struct Reader<'a> {
    s: &'a str,
    pos: usize,
}
impl<'a> Reader<'a> {
    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.pos).copied()
    }

    fn unexpected(&self) -> NewickError {
        NewickError::UnexpectedChar {
            found: self.s[self.pos..].chars().next().unwrap_or(' '),
            pos: self.pos,
        }
    }

    fn skip_blanks(&mut self) -> Result<(), NewickError> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => self.pos += 1,
                Some(b'[') => {
                    let start = self.pos;
                    let end = self.s[start..]
                        .find(']')
                        .ok_or(NewickError::Unterminated { what: "comment", pos: start })?;
                    self.pos = start + end + 1;
                }
                _ => return Ok(()),
            }
        }
    }

    fn label(&mut self) -> Result<Option<String>, NewickError> {
        if self.peek() == Some(b'\'') {
            let start = self.pos;
            self.pos += 1;
            let mut label = String::new();
            loop {
                let rest = &self.s[self.pos..];
                let end = rest
                    .find('\'')
                    .ok_or(NewickError::Unterminated { what: "quoted label", pos: start })?;
                label.push_str(&rest[..end]);
                self.pos += end + 1;
                if self.peek() == Some(b'\'') {
                    label.push('\'');
                    self.pos += 1;
                } else {
                    return Ok(Some(label));
                }
            }
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if SPECIALS.contains(&c) || c.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        Ok(if start == self.pos { None } else { Some(self.s[start..self.pos].to_owned()) })
    }

    fn length(&mut self) -> Result<f64, NewickError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_ascii_digit() || b"+-.eE".contains(&c)) {
                break;
            }
            self.pos += 1;
        }
        let raw = &self.s[start..self.pos];
        raw.parse::<f64>().map_err(|_| NewickError::InvalidLength(raw.to_owned()))
    }
}

/// Parse a single newick tree, terminated by a `;`.
pub fn from_str(s: &str) -> Result<GeneTree, NewickError> {
    let mut r = Reader { s, pos: 0 };
    let mut tree = GeneTree::new();
    let mut current = tree.root();
    let mut depth = 0usize;
    let mut named = false;
    // A clade may only open at the start, or after `(` or `,`
    let mut closed = false;

    loop {
        r.skip_blanks()?;
        match r.peek() {
            None => return Err(NewickError::MissingSemicolon),
            Some(b'(') => {
                if named || closed {
                    return Err(r.unexpected());
                }
                r.pos += 1;
                depth += 1;
                current = tree.add_node(current, None, None);
            }
            Some(b',') => {
                let parent = tree.parent(current).ok_or(NewickError::Unbalanced(r.pos))?;
                r.pos += 1;
                current = tree.add_node(parent, None, None);
                named = false;
                closed = false;
            }
            Some(b')') => {
                if depth == 0 {
                    return Err(NewickError::Unbalanced(r.pos));
                }
                r.pos += 1;
                depth -= 1;
                current = tree.parent(current).ok_or(NewickError::Unbalanced(r.pos))?;
                named = false;
                closed = true;
            }
            Some(b';') => {
                if depth != 0 {
                    return Err(NewickError::Unbalanced(r.pos));
                }
                r.pos += 1;
                r.skip_blanks()?;
                if r.peek().is_some() {
                    return Err(NewickError::Trailing(r.pos));
                }
                break;
            }
            Some(b']') => return Err(r.unexpected()),
            Some(_) => {
                if named {
                    return Err(r.unexpected());
                }
                let label = r.label()?;
                r.skip_blanks()?;
                let length = if r.peek() == Some(b':') {
                    r.pos += 1;
                    r.skip_blanks()?;
                    Some(r.length()?)
                } else {
                    None
                };
                if label.is_none() && length.is_none() {
                    return Err(r.unexpected());
                }
                tree[current].label = label;
                tree[current].length = length;
                named = true;
            }
        }
    }

    let rooted = tree.children(tree.root()).len() == 2;
    tree.set_rooted(rooted);
    Ok(tree)
}

fn push_label(out: &mut String, tree: &GeneTree, n: NodeID) {
    if let Some(label) = tree.label(n) {
        let needs_quotes = label
            .bytes()
            .any(|c| SPECIALS.contains(&c) || c.is_ascii_whitespace());
        if needs_quotes {
            out.push('\'');
            out.push_str(&label.replace('\'', "''"));
            out.push('\'');
        } else {
            out.push_str(label);
        }
    }
    if let Some(length) = tree[n].length {
        out.push(':');
        out.push_str(&length.to_string());
    }
}

enum Step {
    Enter(NodeID),
    Exit(NodeID),
    Comma,
}

impl GeneTree {
    pub fn to_newick(&self) -> String {
        let mut out = String::with_capacity(self.len() * 8);
        let mut todo = vec![Step::Enter(self.root())];
        while let Some(step) = todo.pop() {
            match step {
                Step::Enter(n) => {
                    if self.is_leaf(n) {
                        push_label(&mut out, self, n);
                    } else {
                        out.push('(');
                        todo.push(Step::Exit(n));
                        for (i, &c) in self.children(n).iter().enumerate().rev() {
                            todo.push(Step::Enter(c));
                            if i > 0 {
                                todo.push(Step::Comma);
                            }
                        }
                    }
                }
                Step::Exit(n) => {
                    out.push(')');
                    push_label(&mut out, self, n);
                }
                Step::Comma => out.push(','),
            }
        }
        out.push(';');
        out
    }
}
