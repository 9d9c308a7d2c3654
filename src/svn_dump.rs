//! Subversion dumpfile records: the streaming reader and writer shared by
//! the ingester and by repocutter. Neither side buffers more than one
//! revision's payload at a time.

use crate::error::DumpFormatError;
use anyhow::Result;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use md5::Digest as _;
use std::io::BufRead;
use std::io::Write;

/// Ordered property list. Order is preserved for faithful re-emission;
/// lookups scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// `None` values are `D`-deleted properties (format version 3).
    pub entries: Vec<(BString, Option<BString>)>,
}

impl Properties {
    pub fn get(&self, key: &str) -> Option<&BStr> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_ref().map(|v| v.as_bstr()))
    }

    pub fn set(&mut self, key: impl Into<BString>, value: impl Into<BString>) {
        let key = key.into();
        let value = value.into();
        for (k, v) in &mut self.entries {
            if *k == key {
                *v = Some(value);
                return;
            }
        }
        self.entries.push((key, Some(value)));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        before != self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes to the `K`/`V`/`PROPS-END` wire form.
    pub fn to_bytes(&self) -> BString {
        let mut out = BString::new(Vec::new());
        for (key, value) in &self.entries {
            match value {
                Some(value) => {
                    out.extend_from_slice(format!("K {}\n", key.len()).as_bytes());
                    out.extend_from_slice(key);
                    out.push(b'\n');
                    out.extend_from_slice(format!("V {}\n", value.len()).as_bytes());
                    out.extend_from_slice(value);
                    out.push(b'\n');
                }
                None => {
                    out.extend_from_slice(format!("D {}\n", key.len()).as_bytes());
                    out.extend_from_slice(key);
                    out.push(b'\n');
                }
            }
        }
        out.extend_from_slice(b"PROPS-END\n");
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    Add,
    Change,
    Delete,
    Replace,
}

impl NodeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeAction::Add => "add",
            NodeAction::Change => "change",
            NodeAction::Delete => "delete",
            NodeAction::Replace => "replace",
        }
    }
}

/// One node record within a revision.
#[derive(Debug, Clone)]
pub struct DumpNode {
    pub path: BString,
    pub kind: Option<NodeKind>,
    pub action: NodeAction,
    pub copyfrom: Option<(u64, BString)>,
    /// `None` means the record had no property block at all; `Some` with an
    /// empty list is an explicit empty block.
    pub props: Option<Properties>,
    pub text: Option<BString>,
    pub text_md5: Option<String>,
    pub text_sha1: Option<String>,
    /// Input line of the `Node-path` header, for error reporting. Zero for
    /// synthesized records; not part of record identity.
    pub line: u64,
}

/// Record identity ignores the parse position.
impl PartialEq for DumpNode {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.kind == other.kind
            && self.action == other.action
            && self.copyfrom == other.copyfrom
            && self.props == other.props
            && self.text == other.text
            && self.text_md5 == other.text_md5
            && self.text_sha1 == other.text_sha1
    }
}

impl Eq for DumpNode {}

impl DumpNode {
    pub fn new(path: impl Into<BString>, kind: NodeKind, action: NodeAction) -> DumpNode {
        DumpNode {
            path: path.into(),
            kind: Some(kind),
            action,
            copyfrom: None,
            props: None,
            text: None,
            text_md5: None,
            text_sha1: None,
            line: 0,
        }
    }

    /// Verifies recorded checksums against the payload. Returns a message
    /// describing the first mismatch.
    pub fn verify_checksums(&self) -> Option<String> {
        let text = self.text.as_ref()?;
        if let Some(want) = &self.text_md5 {
            let got = hex::encode(md5::Md5::digest(text.as_slice()));
            if got != *want {
                return Some(format!(
                    "md5 mismatch on {}: header {want}, payload {got}",
                    self.path
                ));
            }
        }
        if let Some(want) = &self.text_sha1 {
            let mut hasher = gix::hash::hasher(gix::hash::Kind::Sha1);
            hasher.update(text.as_slice());
            match hasher.try_finalize() {
                Ok(oid) => {
                    let got = oid.to_hex().to_string();
                    if got != *want {
                        return Some(format!(
                            "sha1 mismatch on {}: header {want}, payload {got}",
                            self.path
                        ));
                    }
                }
                Err(err) => return Some(format!("sha1 of {} failed: {err}", self.path)),
            }
        }
        None
    }
}

/// One revision record: properties plus ordered nodes.
#[derive(Debug, Clone)]
pub struct DumpRevision {
    pub number: u64,
    pub props: Properties,
    pub nodes: Vec<DumpNode>,
    /// Input line of the `Revision-number` header, for error reporting.
    /// Zero for synthesized records; not part of record identity.
    pub line: u64,
}

/// Record identity ignores the parse position.
impl PartialEq for DumpRevision {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.props == other.props && self.nodes == other.nodes
    }
}

impl Eq for DumpRevision {}

impl DumpRevision {
    pub fn new(number: u64, props: Properties, nodes: Vec<DumpNode>) -> DumpRevision {
        DumpRevision {
            number,
            props,
            nodes,
            line: 0,
        }
    }

    pub fn author(&self) -> Option<&BStr> {
        self.props.get("svn:author")
    }

    pub fn date(&self) -> Option<&BStr> {
        self.props.get("svn:date")
    }

    pub fn log(&self) -> Option<&BStr> {
        self.props.get("svn:log")
    }
}

/// Dumpfile preamble: format version and optional UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPreamble {
    pub format_version: u32,
    pub uuid: Option<String>,
}

#[derive(Debug)]
pub struct DumpReader<R> {
    reader: R,
    current_line: BString,
    line_number: u64,
    eof: bool,
    pub preamble: DumpPreamble,
    /// The revision header already consumed from the input: (number, line).
    pending_revision: Option<(u64, u64)>,
}

impl<R: BufRead> DumpReader<R> {
    /// Parses the preamble and positions the reader at the first revision.
    pub fn new(reader: R) -> Result<DumpReader<R>> {
        let mut dump_reader = DumpReader {
            reader,
            current_line: BString::new(Vec::new()),
            line_number: 0,
            eof: false,
            preamble: DumpPreamble {
                format_version: 2,
                uuid: None,
            },
            pending_revision: None,
        };
        dump_reader.read_preamble()?;
        Ok(dump_reader)
    }

    fn err(&self, msg: impl Into<String>) -> DumpFormatError {
        DumpFormatError::new(self.line_number, msg)
    }

    fn advance(&mut self) -> Result<()> {
        self.current_line.clear();
        let bytes = self.reader.read_until(b'\n', &mut self.current_line)?;
        self.line_number += 1;
        if bytes == 0 {
            self.eof = true;
        } else if self.current_line.last() == Some(&b'\n') {
            self.current_line.truncate(bytes - 1);
        }
        Ok(())
    }

    fn read_exact(&mut self, len: usize) -> Result<BString> {
        let mut buf = vec![0u8; len];
        std::io::Read::read_exact(&mut self.reader, &mut buf)
            .map_err(|_| self.err(format!("truncated content, expected {len} bytes")))?;
        self.line_number += buf.iter().filter(|b| **b == b'\n').count() as u64;
        Ok(BString::from(buf))
    }

    fn header_value(line: &BStr, key: &str) -> Option<BString> {
        let rest = line.strip_prefix(key.as_bytes())?;
        let rest = rest.strip_prefix(b": ")?;
        Some(rest.as_bstr().to_owned())
    }

    fn read_preamble(&mut self) -> Result<()> {
        self.advance()?;
        loop {
            if self.eof {
                return Ok(());
            }
            let line = self.current_line.clone();
            if let Some(version) = Self::header_value(line.as_bstr(), "SVN-fs-dump-format-version") {
                let version: u32 = version
                    .to_str()
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .ok_or_else(|| self.err("bad dump format version"))?;
                if !(1..=3).contains(&version) {
                    bail!(self.err(format!("unsupported dump format version {version}")));
                }
                self.preamble.format_version = version;
                self.advance()?;
            } else if let Some(uuid) = Self::header_value(line.as_bstr(), "UUID") {
                self.preamble.uuid = Some(uuid.to_str()?.trim().to_owned());
                self.advance()?;
            } else if line.is_empty() {
                self.advance()?;
            } else if line.starts_with(b"Revision-number: ") {
                let line_number = self.line_number;
                self.pending_revision = Some((self.parse_revision_number()?, line_number));
                return Ok(());
            } else {
                bail!(self.err(format!("unexpected preamble line {line:?}")));
            }
        }
    }

    fn parse_revision_number(&mut self) -> Result<u64> {
        let number = Self::header_value(self.current_line.as_bstr(), "Revision-number")
            .and_then(|v| v.to_str().ok().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| self.err("bad Revision-number header"))?;
        Ok(number)
    }

    /// Collects `Header: value` lines up to the blank separator into pairs.
    fn read_headers(&mut self) -> Result<Vec<(BString, BString)>> {
        let mut headers = Vec::new();
        loop {
            if self.eof || self.current_line.is_empty() {
                return Ok(headers);
            }
            let Some((key, value)) = self.current_line.split_once_str(b": ") else {
                bail!(self.err(format!("malformed header line {:?}", self.current_line)));
            };
            headers.push((key.as_bstr().to_owned(), value.as_bstr().to_owned()));
            self.advance()?;
        }
    }

    fn parse_props(&mut self, len: usize) -> Result<Properties> {
        let block = self.read_exact(len)?;
        let mut props = Properties::default();
        let mut rest: &[u8] = block.as_slice();
        loop {
            let Some(line_end) = rest.find_byte(b'\n') else {
                bail!(self.err("property block not terminated by PROPS-END"));
            };
            let line = &rest[..line_end];
            rest = &rest[line_end + 1..];
            if line == b"PROPS-END" {
                return Ok(props);
            }
            let deleted = line.starts_with(b"D ");
            let Some(key_len) = line
                .get(2..)
                .and_then(|s| s.to_str().ok())
                .and_then(|s| s.parse::<usize>().ok())
            else {
                bail!(self.err(format!("malformed property length line {:?}", line.as_bstr())));
            };
            if !line.starts_with(b"K ") && !deleted {
                bail!(self.err(format!("malformed property line {:?}", line.as_bstr())));
            }
            if rest.len() < key_len + 1 {
                bail!(self.err("property key extends past block"));
            }
            let key = rest[..key_len].as_bstr().to_owned();
            rest = &rest[key_len + 1..];
            if deleted {
                props.entries.push((key, None));
                continue;
            }
            let Some(line_end) = rest.find_byte(b'\n') else {
                bail!(self.err("missing V line in property block"));
            };
            let vline = &rest[..line_end];
            rest = &rest[line_end + 1..];
            let Some(value_len) = vline
                .strip_prefix(b"V ")
                .and_then(|s| s.to_str().ok())
                .and_then(|s| s.parse::<usize>().ok())
            else {
                bail!(self.err(format!("malformed V line {:?}", vline.as_bstr())));
            };
            if rest.len() < value_len + 1 {
                bail!(self.err("property value extends past block"));
            }
            let value = rest[..value_len].as_bstr().to_owned();
            rest = &rest[value_len + 1..];
            props.entries.push((key, Some(value)));
        }
    }

    fn read_node(&mut self, headers: Vec<(BString, BString)>, line: u64) -> Result<DumpNode> {
        let mut node = DumpNode {
            path: BString::new(Vec::new()),
            kind: None,
            action: NodeAction::Change,
            copyfrom: None,
            props: None,
            text: None,
            text_md5: None,
            text_sha1: None,
            line,
        };
        let mut prop_len: Option<usize> = None;
        let mut text_len: Option<usize> = None;
        let mut copyfrom_rev: Option<u64> = None;
        let mut copyfrom_path: Option<BString> = None;
        let mut have_action = false;
        for (key, value) in headers {
            match key.as_slice() {
                b"Node-path" => node.path = value,
                b"Node-kind" => {
                    node.kind = Some(match value.as_slice() {
                        b"file" => NodeKind::File,
                        b"dir" => NodeKind::Dir,
                        _ => bail!(self.err(format!("bad Node-kind {value:?}"))),
                    });
                }
                b"Node-action" => {
                    have_action = true;
                    node.action = match value.as_slice() {
                        b"add" => NodeAction::Add,
                        b"change" => NodeAction::Change,
                        b"delete" => NodeAction::Delete,
                        b"replace" => NodeAction::Replace,
                        _ => bail!(self.err(format!("bad Node-action {value:?}"))),
                    };
                }
                b"Node-copyfrom-rev" => {
                    copyfrom_rev = value.to_str().ok().and_then(|s| s.trim().parse().ok());
                    if copyfrom_rev.is_none() {
                        bail!(self.err("bad Node-copyfrom-rev header"));
                    }
                }
                b"Node-copyfrom-path" => copyfrom_path = Some(value),
                b"Prop-content-length" => {
                    prop_len = value.to_str().ok().and_then(|s| s.trim().parse().ok());
                }
                b"Text-content-length" => {
                    text_len = value.to_str().ok().and_then(|s| s.trim().parse().ok());
                }
                b"Text-content-md5" => node.text_md5 = Some(value.to_str()?.trim().to_owned()),
                b"Text-content-sha1" => node.text_sha1 = Some(value.to_str()?.trim().to_owned()),
                b"Content-length" => {}
                _ => {
                    log::debug!("ignoring node header {key}: {value}");
                }
            }
        }
        if !have_action {
            bail!(self.err(format!("node {} lacks Node-action", node.path)));
        }
        if let Some(rev) = copyfrom_rev {
            let Some(path) = copyfrom_path else {
                bail!(self.err("Node-copyfrom-rev without Node-copyfrom-path"));
            };
            node.copyfrom = Some((rev, path));
        } else if copyfrom_path.is_some() {
            bail!(self.err("Node-copyfrom-path without Node-copyfrom-rev"));
        }
        // The header scan stopped on the blank separator; payloads follow
        // immediately in the byte stream.
        if let Some(len) = prop_len {
            node.props = Some(self.parse_props(len)?);
        }
        if let Some(len) = text_len {
            node.text = Some(self.read_exact(len)?);
        }
        Ok(node)
    }

    /// Reads the next revision record, or `None` at end of dump.
    pub fn read_revision(&mut self) -> Result<Option<DumpRevision>> {
        let Some((number, revision_line)) = self.pending_revision.take() else {
            return Ok(None);
        };
        self.advance()?;
        let headers = self.read_headers()?;
        let mut prop_len = 0usize;
        for (key, value) in &headers {
            if key == "Prop-content-length" {
                prop_len = value
                    .to_str()
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .ok_or_else(|| self.err("bad Prop-content-length"))?;
            }
        }
        // The header scan stopped on the blank separator; the property block
        // follows immediately in the byte stream.
        let props = if prop_len > 0 {
            self.parse_props(prop_len)?
        } else {
            Properties::default()
        };
        self.advance()?;

        let mut revision = DumpRevision {
            number,
            props,
            nodes: Vec::new(),
            line: revision_line,
        };
        // Node records follow until the next Revision-number or EOF.
        loop {
            if self.eof {
                return Ok(Some(revision));
            }
            if self.current_line.is_empty() {
                self.advance()?;
                continue;
            }
            if self.current_line.starts_with(b"Revision-number: ") {
                let line_number = self.line_number;
                self.pending_revision = Some((self.parse_revision_number()?, line_number));
                return Ok(Some(revision));
            }
            if !self.current_line.starts_with(b"Node-path: ") {
                bail!(self.err(format!("unexpected line {:?}", self.current_line)));
            }
            let node_line = self.line_number;
            let headers = self.read_headers()?;
            let node = self.read_node(headers, node_line)?;
            self.advance()?;
            revision.nodes.push(node);
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<DumpRevision>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_revision().transpose()
    }
}

/// Serializes revision records back to dumpfile form, recomputing all length
/// and checksum headers from the actual content.
pub struct DumpWriter<W> {
    out: W,
}

impl<W: Write> DumpWriter<W> {
    pub fn new(out: W) -> DumpWriter<W> {
        DumpWriter { out }
    }

    pub fn write_preamble(&mut self, preamble: &DumpPreamble) -> Result<()> {
        writeln!(
            self.out,
            "SVN-fs-dump-format-version: {}\n",
            preamble.format_version
        )?;
        if let Some(uuid) = &preamble.uuid {
            writeln!(self.out, "UUID: {uuid}\n")?;
        }
        Ok(())
    }

    pub fn write_revision(&mut self, revision: &DumpRevision) -> Result<()> {
        let props = revision.props.to_bytes();
        writeln!(self.out, "Revision-number: {}", revision.number)?;
        writeln!(self.out, "Prop-content-length: {}", props.len())?;
        writeln!(self.out, "Content-length: {}", props.len())?;
        writeln!(self.out)?;
        self.out.write_all(&props)?;
        writeln!(self.out)?;
        for node in &revision.nodes {
            self.write_node(node)?;
        }
        Ok(())
    }

    fn write_node(&mut self, node: &DumpNode) -> Result<()> {
        self.out.write_all(b"Node-path: ")?;
        self.out.write_all(&node.path)?;
        writeln!(self.out)?;
        if let Some(kind) = node.kind {
            writeln!(
                self.out,
                "Node-kind: {}",
                match kind {
                    NodeKind::File => "file",
                    NodeKind::Dir => "dir",
                }
            )?;
        }
        writeln!(self.out, "Node-action: {}", node.action.as_str())?;
        if let Some((rev, path)) = &node.copyfrom {
            writeln!(self.out, "Node-copyfrom-rev: {rev}")?;
            self.out.write_all(b"Node-copyfrom-path: ")?;
            self.out.write_all(path)?;
            writeln!(self.out)?;
        }
        let props = node.props.as_ref().map(|p| p.to_bytes());
        let prop_len = props.as_ref().map_or(0, |p| p.len());
        let text_len = node.text.as_ref().map_or(0, |t| t.len());
        if let Some(text) = &node.text {
            let md5_hex = hex::encode(md5::Md5::digest(text.as_slice()));
            writeln!(self.out, "Text-content-length: {text_len}")?;
            writeln!(self.out, "Text-content-md5: {md5_hex}")?;
        }
        if props.is_some() {
            writeln!(self.out, "Prop-content-length: {prop_len}")?;
        }
        if props.is_some() || node.text.is_some() {
            writeln!(self.out, "Content-length: {}", prop_len + text_len)?;
        }
        writeln!(self.out)?;
        if let Some(props) = props {
            self.out.write_all(&props)?;
        }
        if let Some(text) = &node.text {
            self.out.write_all(text)?;
        }
        writeln!(self.out)?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const TWO_REV_DUMP: &str = "\
SVN-fs-dump-format-version: 2

UUID: 8e5c9d49-93a4-4a9b-a3f6-d34bf57a0123

Revision-number: 0
Prop-content-length: 56
Content-length: 56

K 8
svn:date
V 27
2020-01-01T00:00:00.000000Z
PROPS-END

Revision-number: 1
Prop-content-length: 106
Content-length: 106

K 10
svn:author
V 4
fred
K 8
svn:date
V 27
2020-01-02T00:00:00.000000Z
K 7
svn:log
V 8
add file
PROPS-END

Node-path: trunk
Node-kind: dir
Node-action: add


Node-path: trunk/README
Node-kind: file
Node-action: add
Text-content-length: 6
Text-content-md5: b1946ac92492d2347c6235b4d2611184
Content-length: 6

hello


";

    #[test]
    fn test_read_two_revisions() {
        let mut reader = DumpReader::new(TWO_REV_DUMP.as_bytes()).unwrap();
        assert_eq!(reader.preamble.format_version, 2);
        assert_eq!(
            reader.preamble.uuid.as_deref(),
            Some("8e5c9d49-93a4-4a9b-a3f6-d34bf57a0123")
        );
        let r0 = reader.read_revision().unwrap().unwrap();
        assert_eq!(r0.number, 0);
        assert!(r0.nodes.is_empty());
        assert_eq!(r0.date().unwrap(), "2020-01-01T00:00:00.000000Z");
        let r1 = reader.read_revision().unwrap().unwrap();
        assert_eq!(r1.number, 1);
        assert_eq!(r1.author().unwrap(), "fred");
        assert_eq!(r1.log().unwrap(), "add file");
        assert_eq!(r1.nodes.len(), 2);
        assert_eq!(r1.nodes[0].path, "trunk");
        assert_eq!(r1.nodes[0].kind, Some(NodeKind::Dir));
        assert_eq!(r1.nodes[1].text.as_ref().unwrap(), "hello\n");
        assert_eq!(r1.nodes[1].verify_checksums(), None);
        assert!(reader.read_revision().unwrap().is_none());

        // Records carry the 1-based input line of their header.
        let line_of = |needle: &str| -> u64 {
            TWO_REV_DUMP
                .lines()
                .position(|line| line == needle)
                .unwrap() as u64
                + 1
        };
        assert_eq!(r0.line, line_of("Revision-number: 0"));
        assert_eq!(r1.line, line_of("Revision-number: 1"));
        assert_eq!(r1.nodes[0].line, line_of("Node-path: trunk"));
        assert_eq!(r1.nodes[1].line, line_of("Node-path: trunk/README"));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut node = DumpNode::new("f", NodeKind::File, NodeAction::Add);
        node.text = Some("payload".into());
        node.text_md5 = Some("00000000000000000000000000000000".into());
        let msg = node.verify_checksums().unwrap();
        assert!(msg.contains("md5 mismatch"));
    }

    #[test]
    fn test_roundtrip_through_writer() {
        let mut reader = DumpReader::new(TWO_REV_DUMP.as_bytes()).unwrap();
        let preamble = reader.preamble.clone();
        let mut writer = DumpWriter::new(Vec::new());
        writer.write_preamble(&preamble).unwrap();
        let mut revisions = Vec::new();
        while let Some(revision) = reader.read_revision().unwrap() {
            writer.write_revision(&revision).unwrap();
            revisions.push(revision);
        }
        let output = writer.into_inner();
        let mut reread = DumpReader::new(output.as_slice()).unwrap();
        let mut reread_revisions = Vec::new();
        while let Some(revision) = reread.read_revision().unwrap() {
            reread_revisions.push(revision);
        }
        assert_eq!(revisions, reread_revisions);
    }

    #[test]
    fn test_copyfrom_parsed() {
        let dump = "\
SVN-fs-dump-format-version: 2

Revision-number: 1
Prop-content-length: 10
Content-length: 10

PROPS-END

Node-path: trunk/dir2
Node-kind: dir
Node-action: add
Node-copyfrom-rev: 1
Node-copyfrom-path: trunk/dir1


";
        let mut reader = DumpReader::new(dump.as_bytes()).unwrap();
        let r1 = reader.read_revision().unwrap().unwrap();
        assert_eq!(
            r1.nodes[0].copyfrom,
            Some((1, BString::from("trunk/dir1")))
        );
    }

    #[test]
    fn test_malformed_header_is_dump_error() {
        let dump = "SVN-fs-dump-format-version: 2\n\nRevision-number: bogus\n";
        let err = DumpReader::new(dump.as_bytes()).unwrap_err();
        assert!(err.downcast_ref::<DumpFormatError>().is_some());
    }
}
