//! The selection-set language: a small set algebra over event indices that
//! sits in front of every surgical command. Parsing is recursive descent;
//! evaluation always yields a sorted, deduplicated index set.

use crate::error::ReferenceError;
use crate::error::SemanticError;
use crate::event::Event;
use crate::event::Mark;
use crate::repo::Repository;
use anyhow::Result;
use anyhow::bail;
use bstr::ByteSlice as _;
use chrono::DateTime;
use chrono::FixedOffset;

/// Sorted, deduplicated 0-based event indices.
pub type Selection = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// 1-based indices as typed by the user.
    Indices(Vec<u64>),
    /// Inclusive 1-based range.
    Range(u64, u64),
    /// `$`: the last event.
    Last,
    /// `:N`: the event holding mark N.
    MarkRef(Mark),
    /// `<name>`: tag name, reset or branch basename, or legacy ID.
    NameRef(String),
    /// `<ISO8601>` or `<ISO8601!email>` action stamp.
    Stamp {
        date: DateTime<FixedOffset>,
        email: Option<String>,
    },
    /// `=CB...` named set letters.
    Sets(Vec<char>),
    /// `/regex/flags` text search.
    TextRegex { pattern: String, flags: String },
    /// `[regex]` path search; `*` widens to manifests, `@` inverts.
    PathRegex {
        pattern: String,
        manifest: bool,
        invert: bool,
    },
    /// `@fun(expr)`.
    Fun { name: String, arg: Box<Expr> },
}

/// Parses a selection expression.
pub fn parse(text: &str) -> Result<Expr> {
    let mut parser = Parser {
        bytes: text.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        bail!(parser.error("trailing junk after selection"));
    }
    Ok(expr)
}

/// Parses and evaluates in one step.
pub fn evaluate(repo: &Repository, text: &str) -> Result<Selection> {
    let expr = parse(text)?;
    eval(repo, &expr)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, msg: &str) -> SemanticError {
        SemanticError(format!("selection parse error at byte {}: {msg}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn skip_ws(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            self.skip_ws();
            if self.peek() == Some(b'|') {
                self.pos += 1;
                self.skip_ws();
                let right = self.parse_term()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            self.skip_ws();
            if self.peek() == Some(b'&') {
                self.pos += 1;
                self.skip_ws();
                let right = self.parse_factor()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        self.skip_ws();
        match self.peek() {
            Some(b'~') => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_factor()?)))
            }
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.skip_ws();
                if self.bump() != Some(b')') {
                    bail!(self.error("expected ')'"));
                }
                Ok(inner)
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_int(&mut self) -> Result<u64> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            bail!(self.error("expected integer"));
        }
        Ok(std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("digits are ascii")
            .parse()
            .expect("digits parse"))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(b'0'..=b'9') => {
                let mut indices = Vec::new();
                let mut ranges: Vec<Expr> = Vec::new();
                loop {
                    let low = self.parse_int()?;
                    if self.bytes[self.pos..].starts_with(b"..") {
                        self.pos += 2;
                        let high = self.parse_int()?;
                        ranges.push(Expr::Range(low, high));
                    } else {
                        indices.push(low);
                    }
                    if self.peek() == Some(b',') {
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
                let mut expr = if indices.is_empty() {
                    None
                } else {
                    Some(Expr::Indices(indices))
                };
                for range in ranges {
                    expr = Some(match expr {
                        Some(left) => Expr::Or(Box::new(left), Box::new(range)),
                        None => range,
                    });
                }
                Ok(expr.expect("at least one atom parsed"))
            }
            Some(b'$') => {
                self.pos += 1;
                Ok(Expr::Last)
            }
            Some(b':') => {
                self.pos += 1;
                let mark = self.parse_int()? as Mark;
                Ok(Expr::MarkRef(mark))
            }
            Some(b'=') => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
                    self.pos += 1;
                }
                if start == self.pos {
                    bail!(self.error("expected set letters after '='"));
                }
                Ok(Expr::Sets(
                    self.bytes[start..self.pos].iter().map(|b| *b as char).collect(),
                ))
            }
            Some(b'<') => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|b| b != b'>') {
                    self.pos += 1;
                }
                if self.bump() != Some(b'>') {
                    bail!(self.error("unterminated '<...>' reference"));
                }
                let content = std::str::from_utf8(&self.bytes[start..self.pos - 1])
                    .map_err(|_| self.error("reference is not UTF-8"))?
                    .to_owned();
                Ok(parse_angle_reference(&content))
            }
            Some(b'/') => {
                self.pos += 1;
                let mut pattern = String::new();
                loop {
                    match self.bump() {
                        Some(b'\\') => {
                            if let Some(next) = self.bump() {
                                if next != b'/' {
                                    pattern.push('\\');
                                }
                                pattern.push(next as char);
                            }
                        }
                        Some(b'/') => break,
                        Some(b) => pattern.push(b as char),
                        None => bail!(self.error("unterminated regexp")),
                    }
                }
                let start = self.pos;
                while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
                    self.pos += 1;
                }
                let flags = std::str::from_utf8(&self.bytes[start..self.pos])
                    .expect("letters are ascii")
                    .to_owned();
                Ok(Expr::TextRegex { pattern, flags })
            }
            Some(b'[') => {
                self.pos += 1;
                let manifest = self.peek() == Some(b'*');
                let invert = self.peek() == Some(b'@');
                if manifest || invert {
                    self.pos += 1;
                }
                let mut pattern = String::new();
                loop {
                    match self.bump() {
                        Some(b'\\') => {
                            if let Some(next) = self.bump() {
                                if next != b']' {
                                    pattern.push('\\');
                                }
                                pattern.push(next as char);
                            }
                        }
                        Some(b']') => break,
                        Some(b) => pattern.push(b as char),
                        None => bail!(self.error("unterminated path match")),
                    }
                }
                Ok(Expr::PathRegex {
                    pattern,
                    manifest,
                    invert,
                })
            }
            Some(b'@') => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|b| b.is_ascii_alphanumeric()) {
                    self.pos += 1;
                }
                let name = std::str::from_utf8(&self.bytes[start..self.pos])
                    .expect("letters are ascii")
                    .to_owned();
                self.skip_ws();
                if self.bump() != Some(b'(') {
                    bail!(self.error("expected '(' after function name"));
                }
                let arg = self.parse_expr()?;
                self.skip_ws();
                if self.bump() != Some(b')') {
                    bail!(self.error("expected ')' after function argument"));
                }
                Ok(Expr::Fun {
                    name,
                    arg: Box::new(arg),
                })
            }
            _ => bail!(self.error("expected selection atom")),
        }
    }
}

/// Distinguishes `<123>` legacy refs, `<ISO8601>` stamps, and `<name>` refs.
fn parse_angle_reference(content: &str) -> Expr {
    if content.chars().all(|c| c.is_ascii_digit()) && !content.is_empty() {
        return Expr::NameRef(content.to_owned());
    }
    let (date_part, email) = match content.split_once('!') {
        Some((date, email)) => (date, Some(email.to_owned())),
        None => (content, None),
    };
    if let Ok(date) = DateTime::parse_from_rfc3339(date_part) {
        return Expr::Stamp { date, email };
    }
    Expr::NameRef(content.to_owned())
}

fn universe(repo: &Repository) -> Selection {
    (0..repo.events.len()).collect()
}

fn union(a: Selection, b: Selection) -> Selection {
    let mut out = a;
    out.extend(b);
    out.sort_unstable();
    out.dedup();
    out
}

fn intersection(a: &Selection, b: &Selection) -> Selection {
    let b_set: std::collections::HashSet<usize> = b.iter().copied().collect();
    a.iter().copied().filter(|i| b_set.contains(i)).collect()
}

fn complement(repo: &Repository, a: &Selection) -> Selection {
    let a_set: std::collections::HashSet<usize> = a.iter().copied().collect();
    (0..repo.events.len()).filter(|i| !a_set.contains(i)).collect()
}

/// Evaluates an expression to a sorted set of event indices.
pub fn eval(repo: &Repository, expr: &Expr) -> Result<Selection> {
    match expr {
        Expr::Or(left, right) => Ok(union(eval(repo, left)?, eval(repo, right)?)),
        Expr::And(left, right) => Ok(intersection(&eval(repo, left)?, &eval(repo, right)?)),
        Expr::Not(inner) => Ok(complement(repo, &eval(repo, inner)?)),
        Expr::Indices(indices) => {
            let n = repo.events.len() as u64;
            let mut out: Selection = indices
                .iter()
                .filter(|i| **i >= 1 && **i <= n)
                .map(|i| (*i - 1) as usize)
                .collect();
            out.sort_unstable();
            out.dedup();
            Ok(out)
        }
        Expr::Range(low, high) => {
            let n = repo.events.len() as u64;
            if *low < 1 || low > high {
                bail!(SemanticError(format!("bad range {low}..{high}")));
            }
            Ok((*low..=*high.min(&n))
                .map(|i| (i - 1) as usize)
                .collect())
        }
        Expr::Last => Ok(if repo.events.is_empty() {
            Vec::new()
        } else {
            vec![repo.events.len() - 1]
        }),
        Expr::MarkRef(mark) => Ok(repo.index_of_mark(*mark).into_iter().collect()),
        Expr::NameRef(name) => resolve_name(repo, name),
        Expr::Stamp { date, email } => {
            let mut out = Vec::new();
            for (index, event) in repo.events.iter().enumerate() {
                let Some(commit) = event.as_commit() else {
                    continue;
                };
                if commit.committer.date.timestamp() != date.timestamp() {
                    continue;
                }
                if let Some(email) = email
                    && commit.committer.email != email.as_bytes()
                {
                    continue;
                }
                out.push(index);
            }
            Ok(out)
        }
        Expr::Sets(letters) => {
            let mut out = Vec::new();
            for letter in letters {
                out = union(out, named_set(repo, *letter)?);
            }
            Ok(out)
        }
        Expr::TextRegex { pattern, flags } => text_search(repo, pattern, flags),
        Expr::PathRegex {
            pattern,
            manifest,
            invert,
        } => {
            let matched = path_search(repo, pattern, *manifest)?;
            if *invert {
                Ok(complement(repo, &matched))
            } else {
                Ok(matched)
            }
        }
        Expr::Fun { name, arg } => {
            let arg = eval(repo, arg)?;
            apply_function(repo, name, arg)
        }
    }
}

fn named_set(repo: &Repository, letter: char) -> Result<Selection> {
    let mut out = Vec::new();
    match letter {
        'C' => {
            for (index, event) in repo.events.iter().enumerate() {
                if matches!(event, Event::Commit(_)) {
                    out.push(index);
                }
            }
        }
        'B' => {
            for (index, event) in repo.events.iter().enumerate() {
                if matches!(event, Event::Blob(_)) {
                    out.push(index);
                }
            }
        }
        'T' => {
            for (index, event) in repo.events.iter().enumerate() {
                if matches!(event, Event::Tag(_)) {
                    out.push(index);
                }
            }
        }
        'R' => {
            for (index, event) in repo.events.iter().enumerate() {
                if matches!(event, Event::Reset(_)) {
                    out.push(index);
                }
            }
        }
        'H' => {
            out = repo.branch_heads().into_values().collect();
            out.sort_unstable();
        }
        'N' => {
            if repo.sourcetype.is_some() {
                for (index, event) in repo.events.iter().enumerate() {
                    if event
                        .as_commit()
                        .is_some_and(|commit| commit.legacy_id.is_some())
                    {
                        out.push(index);
                    }
                }
            }
        }
        'A' => {
            for (index, event) in repo.events.iter().enumerate() {
                if !matches!(event, Event::Reset(_) | Event::Passthrough(_)) {
                    out.push(index);
                }
            }
        }
        _ => bail!(SemanticError(format!("unknown named set =${letter}"))),
    }
    Ok(out)
}

fn text_search(repo: &Repository, pattern: &str, flags: &str) -> Result<Selection> {
    let regex = regex::bytes::Regex::new(pattern)
        .map_err(|err| SemanticError(format!("bad regexp /{pattern}/: {err}")))?;
    let explicit = !flags.is_empty();
    let want = |flag: char| -> bool { !explicit || flags.contains(flag) };
    let mut out = Vec::new();
    for (index, event) in repo.events.iter().enumerate() {
        let hit = match event {
            Event::Commit(commit) => {
                (want('c') && regex.is_match(&commit.comment))
                    || ((want('a') || want('n'))
                        && commit
                            .authors
                            .iter()
                            .chain(std::iter::once(&commit.committer))
                            .any(|a| regex.is_match(&a.name)))
                    || (want('e')
                        && explicit
                        && commit
                            .authors
                            .iter()
                            .chain(std::iter::once(&commit.committer))
                            .any(|a| regex.is_match(&a.email)))
                    || (want('B') && explicit && regex.is_match(&commit.branch))
            }
            Event::Tag(tag) => {
                (want('c') && regex.is_match(&tag.comment))
                    || (want('n') && regex.is_match(&tag.name))
                    || (want('a') && regex.is_match(&tag.tagger.name))
                    || (want('e') && explicit && regex.is_match(&tag.tagger.email))
            }
            _ => false,
        };
        if hit {
            out.push(index);
        }
    }
    Ok(out)
}

fn path_search(repo: &Repository, pattern: &str, manifest: bool) -> Result<Selection> {
    let regex = regex::bytes::Regex::new(pattern)
        .map_err(|err| SemanticError(format!("bad path regexp [{pattern}]: {err}")))?;
    let mut out = Vec::new();
    for (index, event) in repo.events.iter().enumerate() {
        let hit = match event {
            Event::Commit(commit) => {
                let in_ops = commit
                    .fileops
                    .iter()
                    .any(|op| op.paths().iter().any(|path| regex.is_match(path)));
                if in_ops {
                    true
                } else if manifest {
                    let mut found = false;
                    repo.manifest(index)?.iter(|path, _| {
                        if regex.is_match(path) {
                            found = true;
                        }
                    });
                    found
                } else {
                    false
                }
            }
            Event::Blob(blob) => repo
                .paths_of_blob(blob.mark)
                .iter()
                .any(|path| regex.is_match(path)),
            _ => false,
        };
        if hit {
            out.push(index);
        }
    }
    Ok(out)
}

fn apply_function(repo: &Repository, name: &str, arg: Selection) -> Result<Selection> {
    match name {
        "min" => Ok(arg.first().copied().into_iter().collect()),
        "max" => Ok(arg.last().copied().into_iter().collect()),
        "amp" => Ok(if arg.is_empty() {
            Vec::new()
        } else {
            universe(repo)
        }),
        "pre" => {
            let mut out: Selection = arg
                .iter()
                .filter(|i| **i > 0)
                .map(|i| i - 1)
                .collect();
            out.dedup();
            Ok(out)
        }
        "suc" => {
            let mut out: Selection = arg
                .iter()
                .map(|i| i + 1)
                .filter(|i| *i < repo.events.len())
                .collect();
            out.dedup();
            Ok(out)
        }
        "par" => {
            let mut out = Vec::new();
            for index in arg {
                if let Some(commit) = repo.events[index].as_commit() {
                    for parent in &commit.parents {
                        if let Some(parent_index) = repo.index_of_mark(*parent) {
                            out.push(parent_index);
                        }
                    }
                }
            }
            out.sort_unstable();
            out.dedup();
            Ok(out)
        }
        "srt" => {
            let mut out = arg;
            out.sort_unstable();
            out.dedup();
            Ok(out)
        }
        _ => bail!(SemanticError(format!("unknown selection function @{name}"))),
    }
}

/// Resolves `<name>`: tag name, then reset basename, then branch basename,
/// then legacy ID. Ambiguity within a namespace is an error.
fn resolve_name(repo: &Repository, name: &str) -> Result<Selection> {
    let mut tags = Vec::new();
    for (index, event) in repo.events.iter().enumerate() {
        if let Event::Tag(tag) = event
            && tag.name == name.as_bytes()
        {
            tags.push(index);
        }
    }
    if tags.len() > 1 {
        bail!(ReferenceError(format!("tag name {name} is ambiguous")));
    }
    if let Some(index) = tags.first() {
        return Ok(vec![*index]);
    }
    for (index, event) in repo.events.iter().enumerate() {
        if let Event::Reset(reset) = event
            && crate::svn_read::branch_basename(reset.ref_name.as_bstr()) == name.as_bytes()
        {
            return Ok(vec![index]);
        }
    }
    for (branch, head) in repo.branch_heads() {
        if crate::svn_read::branch_basename(branch.as_bstr()) == name.as_bytes() {
            return Ok(vec![head]);
        }
    }
    if let Some(index) = repo.legacy_index().get(name) {
        return Ok(vec![*index]);
    }
    bail!(ReferenceError(format!("no tag, branch, or legacy ID named {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast_import::ReadOptions;
    use crate::fast_import::read_stream;
    use pretty_assertions::assert_eq;

    /// blob(0,:1) commit(1,:2) blob(2,:3) commit(3,:4) tag(4) reset(5)
    fn repo() -> Repository {
        let stream = "\
#reposurgeon sourcetype svn
blob
mark :1
data 4
one

#legacy-id 351
commit refs/heads/master
mark :2
committer Fred <fred@example.com> 1288205012 +0000
data 14
fixed in r352

M 100644 :1 src/one.txt

blob
mark :3
data 4
two

#legacy-id 352
commit refs/heads/master
mark :4
committer Wilma <wilma@example.com> 1288205100 +0000
data 7
second

from :2
M 100644 :3 doc/two.txt

tag v1
from :4
tagger Fred <fred@example.com> 1288205200 +0000
data 8
release

reset refs/heads/devel
from :2

done
";
        read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_named_sets() {
        let repo = repo();
        assert_eq!(evaluate(&repo, "=C").unwrap(), vec![1, 3]);
        assert_eq!(evaluate(&repo, "=B").unwrap(), vec![0, 2]);
        assert_eq!(evaluate(&repo, "=T").unwrap(), vec![4]);
        assert_eq!(evaluate(&repo, "=R").unwrap(), vec![5]);
        assert_eq!(evaluate(&repo, "=H").unwrap(), vec![3]);
        assert_eq!(evaluate(&repo, "=N").unwrap(), vec![1, 3]);
        assert_eq!(evaluate(&repo, "=A").unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(evaluate(&repo, "=TB").unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_indices_ranges_and_marks() {
        let repo = repo();
        assert_eq!(evaluate(&repo, "1").unwrap(), vec![0]);
        assert_eq!(evaluate(&repo, "2..4").unwrap(), vec![1, 2, 3]);
        assert_eq!(evaluate(&repo, "1,3,5").unwrap(), vec![0, 2, 4]);
        assert_eq!(evaluate(&repo, "$").unwrap(), vec![5]);
        assert_eq!(evaluate(&repo, ":4").unwrap(), vec![3]);
        // Out-of-range indices drop out instead of erroring.
        assert_eq!(evaluate(&repo, "99").unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_algebra_laws() {
        let repo = repo();
        let universe: Selection = (0..repo.events.len()).collect();
        let a = "=C";
        let b = "=B";
        let c = "2..5";
        let left = evaluate(&repo, &format!("({a}|{b})&{c}")).unwrap();
        let right = evaluate(&repo, &format!("({a}&{c})|({b}&{c})")).unwrap();
        assert_eq!(left, right);
        assert_eq!(
            evaluate(&repo, &format!("~~{a}")).unwrap(),
            evaluate(&repo, a).unwrap()
        );
        assert_eq!(evaluate(&repo, &format!("{a}|~{a}")).unwrap(), universe);
        assert_eq!(
            evaluate(&repo, &format!("{a}&~{a}")).unwrap(),
            Vec::<usize>::new()
        );
    }

    #[test]
    fn test_text_and_path_regex() {
        let repo = repo();
        assert_eq!(evaluate(&repo, "/fixed/").unwrap(), vec![1]);
        assert_eq!(evaluate(&repo, "/Wilma/a").unwrap(), vec![3]);
        assert_eq!(evaluate(&repo, "/wilma@/e").unwrap(), vec![3]);
        assert_eq!(evaluate(&repo, "/master/B").unwrap(), vec![1, 3]);
        // Path atoms match commits touching the path and blobs referenced
        // under it.
        assert_eq!(evaluate(&repo, "[^src/]").unwrap(), vec![0, 1]);
        assert_eq!(evaluate(&repo, "[two]").unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_manifest_path_match() {
        let repo = repo();
        // src/one.txt is still present in commit :4's manifest even though
        // that commit does not touch it.
        assert_eq!(evaluate(&repo, "[*^src/]").unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_functions() {
        let repo = repo();
        assert_eq!(evaluate(&repo, "@min(=C)").unwrap(), vec![1]);
        assert_eq!(evaluate(&repo, "@max(=C)").unwrap(), vec![3]);
        assert_eq!(evaluate(&repo, "@pre(=T)").unwrap(), vec![3]);
        assert_eq!(evaluate(&repo, "@suc(=T)").unwrap(), vec![5]);
        assert_eq!(evaluate(&repo, "@par(:4)").unwrap(), vec![1]);
        assert_eq!(evaluate(&repo, "@amp(=T)").unwrap(), (0..6).collect::<Selection>());
        assert_eq!(
            evaluate(&repo, "@amp(=T&=C)").unwrap(),
            Vec::<usize>::new()
        );
    }

    #[test]
    fn test_angle_references() {
        let repo = repo();
        assert_eq!(evaluate(&repo, "<v1>").unwrap(), vec![4]);
        assert_eq!(evaluate(&repo, "<352>").unwrap(), vec![3]);
        assert_eq!(evaluate(&repo, "<master>").unwrap(), vec![3]);
        assert_eq!(
            evaluate(&repo, "<2010-10-27T18:43:32Z>").unwrap(),
            vec![1]
        );
        assert_eq!(
            evaluate(&repo, "<2010-10-27T18:43:32Z!fred@example.com>").unwrap(),
            vec![1]
        );
        let err = evaluate(&repo, "<nosuch>").unwrap_err();
        assert!(err.downcast_ref::<ReferenceError>().is_some());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("(=C").is_err());
        assert!(parse("=C extra").is_err());
        assert!(parse("@bogus").is_err());
        let repo = repo();
        assert!(evaluate(&repo, "@frob(=C)").is_err());
        assert!(evaluate(&repo, "=Z").is_err());
    }
}
