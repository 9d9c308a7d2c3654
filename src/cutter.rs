//! Streaming filters over Subversion dump records: the repocutter core.
//! Filters never build an event graph; working memory is bounded by one
//! revision's payload.

use crate::error::SemanticError;
use crate::svn_dump::DumpReader;
use crate::svn_dump::DumpRevision;
use crate::svn_dump::DumpWriter;
use crate::svn_dump::NodeAction;
use crate::svn_dump::NodeKind;
use crate::util::convert_backrefs;
use anyhow::Result;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Write;

/// A revision selection: comma-joined `N`, `N:M`, or `N:HEAD` ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionRange {
    ranges: Vec<(u64, Option<u64>)>,
}

impl RevisionRange {
    /// An empty range selects everything.
    pub fn all() -> RevisionRange {
        RevisionRange::default()
    }

    pub fn parse(text: &str) -> Result<RevisionRange> {
        let mut ranges = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once(':') {
                Some((low, high)) => {
                    let low: u64 = low
                        .parse()
                        .map_err(|_| SemanticError(format!("bad revision {low:?}")))?;
                    let high = if high == "HEAD" {
                        None
                    } else {
                        Some(high.parse().map_err(|_| {
                            SemanticError(format!("bad revision {high:?}"))
                        })?)
                    };
                    ranges.push((low, high));
                }
                None => {
                    let rev: u64 = part
                        .parse()
                        .map_err(|_| SemanticError(format!("bad revision {part:?}")))?;
                    ranges.push((rev, Some(rev)));
                }
            }
        }
        Ok(RevisionRange { ranges })
    }

    pub fn contains(&self, revision: u64) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        self.ranges.iter().any(|(low, high)| {
            revision >= *low && high.is_none_or(|high| revision <= high)
        })
    }
}

/// Drives every revision of the input through `transform`, writing the
/// survivors.
fn stream_filter(
    input: impl BufRead,
    output: impl Write,
    mut transform: impl FnMut(DumpRevision) -> Result<Option<DumpRevision>>,
) -> Result<()> {
    let mut reader = DumpReader::new(input)?;
    let mut writer = DumpWriter::new(output);
    writer.write_preamble(&reader.preamble)?;
    while let Some(revision) = reader.read_revision()? {
        crate::interrupt::check()?;
        if let Some(revision) = transform(revision)? {
            writer.write_revision(&revision)?;
        }
    }
    Ok(())
}

/// Emits only revisions inside (or with `invert`, outside) the range.
/// Revision 0 always survives; it carries the dump's epoch.
pub fn select(
    input: impl BufRead,
    output: impl Write,
    range: &RevisionRange,
    invert: bool,
) -> Result<()> {
    stream_filter(input, output, |revision| {
        let keep =
            revision.number == 0 || (range.contains(revision.number) != invert);
        Ok(keep.then_some(revision))
    })
}

/// Sets a revision property over the selected revisions.
pub fn propset(
    input: impl BufRead,
    output: impl Write,
    range: &RevisionRange,
    key: &str,
    value: &BStr,
) -> Result<()> {
    stream_filter(input, output, |mut revision| {
        if range.contains(revision.number) {
            revision.props.set(key, value);
        }
        Ok(Some(revision))
    })
}

/// Deletes a revision property over the selected revisions.
pub fn propdel(
    input: impl BufRead,
    output: impl Write,
    range: &RevisionRange,
    key: &str,
) -> Result<()> {
    stream_filter(input, output, |mut revision| {
        if range.contains(revision.number) {
            revision.props.remove(key);
        }
        Ok(Some(revision))
    })
}

/// Renames a revision property over the selected revisions.
pub fn proprename(
    input: impl BufRead,
    output: impl Write,
    range: &RevisionRange,
    old: &str,
    new: &str,
) -> Result<()> {
    stream_filter(input, output, |mut revision| {
        if range.contains(revision.number) {
            for (key, _) in &mut revision.props.entries {
                if key == old {
                    *key = BString::from(new);
                }
            }
        }
        Ok(Some(revision))
    })
}

const LOG_DELIMITER: &str =
    "------------------------------------------------------------------------";

/// Extracts commit messages in an `svn log`-like report, consumable by
/// [`setlog`].
pub fn log_report(input: impl BufRead, mut output: impl Write) -> Result<()> {
    let mut reader = DumpReader::new(input)?;
    while let Some(revision) = reader.read_revision()? {
        let Some(log) = revision.log() else { continue };
        writeln!(output, "{LOG_DELIMITER}")?;
        writeln!(
            output,
            "r{} | {} | {}",
            revision.number,
            revision
                .author()
                .map_or_else(|| "(no author)".to_owned(), |author| author.to_string()),
            revision
                .date()
                .map_or_else(String::new, |date| date.to_string()),
        )?;
        writeln!(output)?;
        output.write_all(log)?;
        if !log.ends_with(b"\n") {
            writeln!(output)?;
        }
    }
    writeln!(output, "{LOG_DELIMITER}")?;
    Ok(())
}

/// Parses a [`log_report`]-style file into revision → message.
pub fn parse_log_report(report: &BStr) -> Result<HashMap<u64, BString>> {
    let mut messages = HashMap::new();
    let mut current_rev: Option<u64> = None;
    let mut body = BString::new(Vec::new());
    for raw_line in report.lines_with_terminator() {
        let line = raw_line.trim_end_with(|c| c == '\n' || c == '\r');
        if line == LOG_DELIMITER.as_bytes() {
            if let Some(rev) = current_rev.take() {
                if body.first() == Some(&b'\n') {
                    body.remove(0);
                }
                messages.insert(rev, std::mem::take(&mut body));
            }
            body.clear();
            continue;
        }
        if current_rev.is_none() {
            if let Some(rest) = line.strip_prefix(b"r")
                && let Some((rev, _)) = rest.split_once_str(b" ")
                && let Ok(rev) = rev.to_str().unwrap_or("").parse::<u64>()
            {
                current_rev = Some(rev);
                continue;
            }
            if !line.is_empty() {
                bail!(SemanticError(format!(
                    "unexpected log report line {:?}",
                    line.as_bstr()
                )));
            }
            continue;
        }
        body.extend_from_slice(raw_line);
    }
    Ok(messages)
}

/// Replaces `svn:log` values from a log report.
pub fn setlog(input: impl BufRead, output: impl Write, report: &BStr) -> Result<()> {
    let messages = parse_log_report(report)?;
    stream_filter(input, output, |mut revision| {
        if let Some(message) = messages.get(&revision.number) {
            revision.props.set("svn:log", message.clone());
        }
        Ok(Some(revision))
    })
}

/// Replaces file payloads with small cookies, preserving structure. With
/// patterns, only matching paths are stripped.
pub fn strip(input: impl BufRead, output: impl Write, patterns: &[String]) -> Result<()> {
    let regexes = compile_patterns(patterns)?;
    stream_filter(input, output, |mut revision| {
        for node in &mut revision.nodes {
            if node.text.is_none() {
                continue;
            }
            if !regexes.is_empty() && !regexes.iter().any(|re| re.is_match(&node.path)) {
                continue;
            }
            let cookie = format!("Stripped blob at {} in r{}\n", node.path, revision.number);
            node.text = Some(BString::from(cookie));
            node.text_md5 = None;
            node.text_sha1 = None;
        }
        Ok(Some(revision))
    })
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<regex::bytes::Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            regex::bytes::Regex::new(pattern)
                .map_err(|err| SemanticError(format!("bad pattern {pattern:?}: {err}")).into())
        })
        .collect()
}

/// Drops nodes whose path matches any pattern (`keep_matching == false`,
/// expunge) or whose path matches none (`keep_matching == true`, sift).
/// Revisions left with no nodes are dropped, except revision 0.
pub fn expunge(
    input: impl BufRead,
    output: impl Write,
    patterns: &[String],
    keep_matching: bool,
) -> Result<()> {
    let regexes = compile_patterns(patterns)?;
    stream_filter(input, output, |mut revision| {
        let had_nodes = !revision.nodes.is_empty();
        revision.nodes.retain(|node| {
            let matched = regexes.iter().any(|re| re.is_match(&node.path));
            matched == keep_matching
        });
        if had_nodes && revision.nodes.is_empty() && revision.number != 0 {
            return Ok(None);
        }
        Ok(Some(revision))
    })
}

/// Applies a regex rewrite to node paths and copyfrom sources.
pub fn pathrename(
    input: impl BufRead,
    output: impl Write,
    pattern: &str,
    replacement: &str,
) -> Result<()> {
    let regex = regex::bytes::Regex::new(pattern)
        .map_err(|err| SemanticError(format!("bad pattern {pattern:?}: {err}")))?;
    let template = convert_backrefs(replacement);
    stream_filter(input, output, |mut revision| {
        for node in &mut revision.nodes {
            node.path = BString::from(
                regex
                    .replace_all(&node.path, template.as_bytes())
                    .into_owned(),
            );
            if let Some((_, path)) = &mut node.copyfrom {
                *path = BString::from(regex.replace_all(path, template.as_bytes()).into_owned());
            }
        }
        Ok(Some(revision))
    })
}

/// Renumbers revisions densely, patching `Node-copyfrom-rev` references to
/// the nearest surviving revision.
pub fn renumber(input: impl BufRead, output: impl Write) -> Result<()> {
    let mut translation: BTreeMap<u64, u64> = BTreeMap::new();
    let mut next = 0u64;
    stream_filter(input, output, move |mut revision| {
        let new_number = if revision.number == 0 {
            0
        } else {
            next += 1;
            next
        };
        translation.insert(revision.number, new_number);
        revision.number = new_number;
        for node in &mut revision.nodes {
            if let Some((rev, _)) = &mut node.copyfrom {
                // The nearest translated revision at or below the reference.
                let resolved = translation
                    .range(..=*rev)
                    .next_back()
                    .map(|(_, new)| *new)
                    .unwrap_or(0);
                *rev = resolved;
            }
        }
        Ok(Some(revision))
    })
}

/// Keeps only nodes that materially affect history: adds, deletes,
/// replaces, copies, and property changes. Plain file content changes are
/// dropped, and so are revisions they leave empty.
pub fn reduce(input: impl BufRead, output: impl Write) -> Result<()> {
    stream_filter(input, output, |mut revision| {
        let had_nodes = !revision.nodes.is_empty();
        revision.nodes.retain(|node| {
            node.action != NodeAction::Change
                || node.kind == Some(NodeKind::Dir)
                || node.copyfrom.is_some()
                || node.props.is_some()
        });
        if had_nodes && revision.nodes.is_empty() && revision.number != 0 {
            return Ok(None);
        }
        Ok(Some(revision))
    })
}

/// Writes a condensed topology report: one line per node.
pub fn see(input: impl BufRead, mut output: impl Write) -> Result<()> {
    let mut reader = DumpReader::new(input)?;
    while let Some(revision) = reader.read_revision()? {
        for node in &revision.nodes {
            let kind = match node.kind {
                Some(NodeKind::Dir) => "dir",
                Some(NodeKind::File) => "file",
                None => "?",
            };
            write!(
                output,
                "r{}  {:<7} {:<4} {}",
                revision.number,
                node.action.as_str(),
                kind,
                node.path
            )?;
            if let Some((rev, path)) = &node.copyfrom {
                write!(output, " (from {path}@r{rev})")?;
            }
            writeln!(output)?;
        }
    }
    Ok(())
}

fn swap_components(path: &BStr) -> BString {
    let mut components = path.splitn_str(3, b"/");
    let first = components.next();
    let second = components.next();
    let rest = components.next();
    match (first, second) {
        (Some(first), Some(second)) => {
            let mut out = BString::new(Vec::with_capacity(path.len()));
            out.extend_from_slice(second);
            out.push(b'/');
            out.extend_from_slice(first);
            if let Some(rest) = rest {
                out.push(b'/');
                out.extend_from_slice(rest);
            }
            out
        }
        _ => path.to_owned(),
    }
}

/// Swaps the top two path components, turning `project/trunk/...` layouts
/// into `trunk/project/...`.
pub fn swap(input: impl BufRead, output: impl Write) -> Result<()> {
    stream_filter(input, output, |mut revision| {
        for node in &mut revision.nodes {
            node.path = swap_components(node.path.as_bstr());
            if let Some((_, path)) = &mut node.copyfrom {
                *path = swap_components(path.as_bstr());
            }
        }
        Ok(Some(revision))
    })
}

/// Canonicalizes timestamps and authors so regression dumps diff cleanly.
pub fn testify(input: impl BufRead, output: impl Write) -> Result<()> {
    let mut reader = DumpReader::new(input)?;
    let mut preamble = reader.preamble.clone();
    preamble.uuid = None;
    let mut writer = DumpWriter::new(output);
    writer.write_preamble(&preamble)?;
    while let Some(mut revision) = reader.read_revision()? {
        let seconds = revision.number * 10;
        let date = chrono::DateTime::from_timestamp(seconds as i64, 0)
            .expect("small timestamps are in range")
            .format("%Y-%m-%dT%H:%M:%S.000000Z")
            .to_string();
        if revision.props.contains("svn:date") {
            revision.props.set("svn:date", date);
        }
        if revision.props.contains("svn:author") {
            revision.props.set("svn:author", "fred");
        }
        writer.write_revision(&revision)?;
    }
    Ok(())
}

/// Replaces path components with stable pseudonyms, keeping the standard
/// layout directories recognizable.
pub fn obscure(input: impl BufRead, output: impl Write) -> Result<()> {
    let mut names: HashMap<BString, BString> = HashMap::new();
    let mut counter = 0usize;
    let mut obscure_path = move |path: &BStr| -> BString {
        let mut out = BString::new(Vec::new());
        for (position, component) in path.split_str(b"/").enumerate() {
            if position > 0 {
                out.push(b'/');
            }
            if component == b"trunk" || component == b"branches" || component == b"tags" {
                out.extend_from_slice(component);
                continue;
            }
            let pseudonym = names
                .entry(BString::from(component))
                .or_insert_with(|| {
                    counter += 1;
                    BString::from(format!("p{counter:06}"))
                });
            out.extend_from_slice(pseudonym);
        }
        out
    };
    stream_filter(input, output, move |mut revision| {
        for node in &mut revision.nodes {
            node.path = obscure_path(node.path.as_bstr());
            if let Some((_, path)) = &mut node.copyfrom {
                *path = obscure_path(path.as_bstr());
            }
        }
        Ok(Some(revision))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svn_dump::DumpNode;
    use crate::svn_dump::DumpPreamble;
    use crate::svn_dump::Properties;
    use pretty_assertions::assert_eq;

    fn make_dump() -> Vec<u8> {
        let mut writer = DumpWriter::new(Vec::new());
        writer
            .write_preamble(&DumpPreamble {
                format_version: 2,
                uuid: Some("uuid".to_owned()),
            })
            .unwrap();
        let mut r0_props = Properties::default();
        r0_props.set("svn:date", "2020-01-01T00:00:00.000000Z");
        writer
            .write_revision(&DumpRevision {
                line: 0,
                number: 0,
                props: r0_props,
                nodes: vec![],
            })
            .unwrap();
        for rev in 1..=3u64 {
            let mut props = Properties::default();
            props.set("svn:author", format!("author{rev}"));
            props.set("svn:date", format!("2020-01-0{rev}T10:00:00.000000Z"));
            props.set("svn:log", format!("log {rev}\n"));
            let mut node = DumpNode::new(
                format!("trunk/file{rev}"),
                NodeKind::File,
                NodeAction::Add,
            );
            node.text = Some(BString::from(format!("content {rev}\n")));
            let mut nodes = vec![node];
            if rev == 3 {
                let mut copy = DumpNode::new("trunk/copied", NodeKind::Dir, NodeAction::Add);
                copy.copyfrom = Some((2, "trunk".into()));
                nodes.push(copy);
            }
            writer
                .write_revision(&DumpRevision {
                    line: 0,
                    number: rev,
                    props,
                    nodes,
                })
                .unwrap();
        }
        writer.into_inner()
    }

    fn revisions(dump: &[u8]) -> Vec<DumpRevision> {
        let mut reader = DumpReader::new(dump).unwrap();
        let mut out = Vec::new();
        while let Some(revision) = reader.read_revision().unwrap() {
            out.push(revision);
        }
        out
    }

    #[test]
    fn test_range_parse() {
        let range = RevisionRange::parse("2,5:7,9:HEAD").unwrap();
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(6));
        assert!(!range.contains(8));
        assert!(range.contains(1000));
        assert!(RevisionRange::all().contains(42));
    }

    #[test]
    fn test_select_and_deselect() {
        let dump = make_dump();
        let range = RevisionRange::parse("2").unwrap();
        let mut out = Vec::new();
        select(dump.as_slice(), &mut out, &range, false).unwrap();
        let selected = revisions(&out);
        assert_eq!(
            selected.iter().map(|r| r.number).collect::<Vec<_>>(),
            vec![0, 2]
        );
        let mut out = Vec::new();
        select(dump.as_slice(), &mut out, &range, true).unwrap();
        let deselected = revisions(&out);
        assert_eq!(
            deselected.iter().map(|r| r.number).collect::<Vec<_>>(),
            vec![0, 1, 3]
        );
    }

    #[test]
    fn test_prop_filters() {
        let dump = make_dump();
        let range = RevisionRange::all();
        let mut out = Vec::new();
        propset(dump.as_slice(), &mut out, &range, "svn:log", b"same".into()).unwrap();
        assert!(
            revisions(&out)
                .iter()
                .skip(1)
                .all(|r| r.log().unwrap() == "same")
        );
        let mut out2 = Vec::new();
        propdel(out.as_slice(), &mut out2, &range, "svn:log").unwrap();
        assert!(revisions(&out2).iter().all(|r| r.log().is_none()));
        let mut out3 = Vec::new();
        proprename(out.as_slice(), &mut out3, &range, "svn:log", "svn:oldlog").unwrap();
        assert!(
            revisions(&out3)
                .iter()
                .skip(1)
                .all(|r| r.props.get("svn:oldlog").is_some())
        );
    }

    #[test]
    fn test_log_report_roundtrip() {
        let dump = make_dump();
        let mut report = Vec::new();
        log_report(dump.as_slice(), &mut report).unwrap();
        let text = report.as_bstr().to_string();
        assert!(text.contains("r2 | author2 | 2020-01-02T10:00:00.000000Z"));
        let messages = parse_log_report(report.as_bstr()).unwrap();
        assert_eq!(messages.get(&1).unwrap(), "log 1\n");
        assert_eq!(messages.get(&3).unwrap(), "log 3\n");
        // Feeding the report back through setlog is a no-op.
        let mut out = Vec::new();
        setlog(dump.as_slice(), &mut out, report.as_bstr()).unwrap();
        let before = revisions(&dump);
        let after = revisions(&out);
        let logs =
            |revisions: &[DumpRevision]| -> Vec<Option<BString>> {
                revisions
                    .iter()
                    .map(|r| r.log().map(|l| l.to_owned()))
                    .collect()
            };
        assert_eq!(logs(&before), logs(&after));
    }

    #[test]
    fn test_setlog_replaces_message() {
        let dump = make_dump();
        let report = format!("{LOG_DELIMITER}\nr2 | fred | date\n\nrewritten\n{LOG_DELIMITER}\n");
        let mut out = Vec::new();
        setlog(dump.as_slice(), &mut out, report.as_bytes().into()).unwrap();
        let after = revisions(&out);
        assert_eq!(after[2].log().unwrap(), "rewritten\n");
        assert_eq!(after[1].log().unwrap(), "log 1\n");
    }

    #[test]
    fn test_strip_replaces_payloads() {
        let dump = make_dump();
        let mut out = Vec::new();
        strip(dump.as_slice(), &mut out, &[]).unwrap();
        let after = revisions(&out);
        let node = &after[1].nodes[0];
        assert_eq!(
            node.text.as_ref().unwrap().as_bstr(),
            "Stripped blob at trunk/file1 in r1\n"
        );
    }

    #[test]
    fn test_expunge_and_sift() {
        let dump = make_dump();
        let mut out = Vec::new();
        expunge(
            dump.as_slice(),
            &mut out,
            &["file2".to_owned()],
            false,
        )
        .unwrap();
        let after = revisions(&out);
        // Revision 2 only touched file2, so it disappeared entirely.
        assert_eq!(
            after.iter().map(|r| r.number).collect::<Vec<_>>(),
            vec![0, 1, 3]
        );
        let mut out = Vec::new();
        expunge(dump.as_slice(), &mut out, &["file2".to_owned()], true).unwrap();
        let after = revisions(&out);
        assert_eq!(
            after.iter().map(|r| r.number).collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn test_renumber_patches_copyfrom() {
        let dump = make_dump();
        // Drop revision 1, then renumber: 2 -> 1, 3 -> 2, and the copy from
        // r2 must now reference r1.
        let range = RevisionRange::parse("2:HEAD").unwrap();
        let mut selected = Vec::new();
        select(dump.as_slice(), &mut selected, &range, false).unwrap();
        let mut out = Vec::new();
        renumber(selected.as_slice(), &mut out).unwrap();
        let after = revisions(&out);
        assert_eq!(
            after.iter().map(|r| r.number).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        let copy = after[2]
            .nodes
            .iter()
            .find(|node| node.copyfrom.is_some())
            .unwrap();
        assert_eq!(copy.copyfrom.as_ref().unwrap().0, 1);
    }

    #[test]
    fn test_reduce_drops_plain_changes() {
        let mut writer = DumpWriter::new(Vec::new());
        writer
            .write_preamble(&DumpPreamble {
                format_version: 2,
                uuid: None,
            })
            .unwrap();
        let mut change = DumpNode::new("trunk/f", NodeKind::File, NodeAction::Change);
        change.text = Some("new\n".into());
        writer
            .write_revision(&DumpRevision {
                line: 0,
                number: 1,
                props: Properties::default(),
                nodes: vec![
                    DumpNode::new("trunk", NodeKind::Dir, NodeAction::Add),
                    change,
                ],
            })
            .unwrap();
        let mut plain = DumpNode::new("trunk/f", NodeKind::File, NodeAction::Change);
        plain.text = Some("newer\n".into());
        writer
            .write_revision(&DumpRevision {
                line: 0,
                number: 2,
                props: Properties::default(),
                nodes: vec![plain],
            })
            .unwrap();
        let dump = writer.into_inner();
        let mut out = Vec::new();
        reduce(dump.as_slice(), &mut out).unwrap();
        let after = revisions(&out);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].nodes.len(), 1);
        assert_eq!(after[0].nodes[0].path, "trunk");
    }

    #[test]
    fn test_see_report() {
        let dump = make_dump();
        let mut out = Vec::new();
        see(dump.as_slice(), &mut out).unwrap();
        let text = out.as_bstr().to_string();
        assert!(text.contains("r1  add     file trunk/file1"));
        assert!(text.contains("(from trunk@r2)"));
    }

    #[test]
    fn test_swap_components() {
        assert_eq!(swap_components(b"project/trunk/f".into()), "trunk/project/f");
        assert_eq!(swap_components(b"project/trunk".into()), "trunk/project");
        assert_eq!(swap_components(b"single".into()), "single");
    }

    #[test]
    fn test_testify_canonicalizes() {
        let dump = make_dump();
        let mut out = Vec::new();
        testify(dump.as_slice(), &mut out).unwrap();
        let mut reader = DumpReader::new(out.as_slice()).unwrap();
        assert_eq!(reader.preamble.uuid, None);
        let r0 = reader.read_revision().unwrap().unwrap();
        assert_eq!(r0.date().unwrap(), "1970-01-01T00:00:00.000000Z");
        let r1 = reader.read_revision().unwrap().unwrap();
        assert_eq!(r1.author().unwrap(), "fred");
        assert_eq!(r1.date().unwrap(), "1970-01-01T00:00:10.000000Z");
    }

    #[test]
    fn test_obscure_is_stable() {
        let dump = make_dump();
        let mut out = Vec::new();
        obscure(dump.as_slice(), &mut out).unwrap();
        let after = revisions(&out);
        let path1 = after[1].nodes[0].path.clone();
        assert!(path1.starts_with(b"trunk/p"));
        let copy = after[3]
            .nodes
            .iter()
            .find(|node| node.copyfrom.is_some())
            .unwrap();
        // The copyfrom source reuses the same pseudonym space.
        assert_eq!(copy.copyfrom.as_ref().unwrap().1, "trunk");
    }
}
