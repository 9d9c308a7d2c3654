//! The fast-import stream codec: the canonical interchange format. The
//! reader consumes the git fast-import grammar plus two extensions,
//! `#legacy-id <id>` and `#reposurgeon sourcetype <vcs>`. The writer emits a
//! stream that reconstructs an equivalent event graph, with marks renumbered
//! to a dense 1..N sequence unless mark preservation was requested.

use crate::attribution;
use crate::error::BadData;
use crate::error::MalformedStream;
use crate::error::ReferenceError;
use crate::error::UnresolvedMark;
use crate::event::Blob;
use crate::event::BlobRef;
use crate::event::Commit;
use crate::event::Event;
use crate::event::FileMode;
use crate::event::FileOp;
use crate::event::Mark;
use crate::event::Passthrough;
use crate::event::Reset;
use crate::event::Tag;
use crate::repo::Repository;
use anyhow::Context as _;
use anyhow::Result;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Write;

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Downgrade dangling-reference errors to warnings.
    pub relaxed: bool,
}

/// Parses a fast-import stream into a repository.
pub fn read_stream(input: impl BufRead, name: &str, options: &ReadOptions) -> Result<Repository> {
    let mut reader = StreamReader::new(input);
    let mut repo = Repository::new(name);
    let mut pending_legacy: Option<String> = None;

    reader.advance()?;
    loop {
        if reader.eof {
            break;
        }
        let line = reader.line().to_owned();
        if line.is_empty() {
            reader.advance()?;
        } else if line == "done" {
            break;
        } else if let Some(rest) = line.strip_prefix(b"#reposurgeon ") {
            if let Some(sourcetype) = rest.strip_prefix(b"sourcetype ") {
                repo.sourcetype = Some(sourcetype.to_str()?.trim().to_owned());
            }
            reader.advance()?;
        } else if let Some(rest) = line.strip_prefix(b"#legacy-id ") {
            pending_legacy = Some(rest.to_str()?.trim().to_owned());
            reader.advance()?;
        } else if line == "blob" {
            let blob = reader.read_blob(&mut repo)?;
            repo.append_blob(blob)?;
        } else if line.starts_with(b"commit ") {
            let mut commit = reader.read_commit(&mut repo)?;
            // An explicit #legacy-id wins over the original-oid fallback.
            if let Some(legacy) = pending_legacy.take() {
                commit.legacy_id = Some(legacy);
            }
            repo.append(Event::Commit(commit));
        } else if line.starts_with(b"tag ") {
            let tag = reader.read_tag()?;
            repo.append(Event::Tag(tag));
        } else if line.starts_with(b"reset ") {
            let reset = reader.read_reset()?;
            repo.append(Event::Reset(reset));
        } else if line.starts_with(b"cat-blob") || line.starts_with(b"ls ") {
            bail!(reader.malformed("request directives are not supported by a stream editor"));
        } else if line.starts_with(b"feature ")
            || line.starts_with(b"option ")
            || line.starts_with(b"progress ")
            || line == "checkpoint"
            || line.starts_with(b"#")
        {
            let mut text = line.clone();
            text.push(b'\n');
            repo.append(Event::Passthrough(Passthrough { text }));
            reader.advance()?;
        } else {
            bail!(reader.malformed(format!("unknown directive {line:?}")));
        }
    }

    link_up(&repo, options)?;
    Ok(repo)
}

/// The final phase resolving forward declarations: every referenced mark must
/// now have a defining event.
fn link_up(repo: &Repository, options: &ReadOptions) -> Result<()> {
    let mut complain = |msg: String| -> Result<()> {
        if options.relaxed {
            log::warn!("{msg}");
            Ok(())
        } else {
            Err(anyhow::Error::new(ReferenceError(msg)))
        }
    };
    for (index, event) in repo.events.iter().enumerate() {
        match event {
            Event::Commit(commit) => {
                for parent in &commit.parents {
                    if repo.commit_by_mark(*parent).is_none() {
                        complain(format!(
                            "event {}: parent mark :{parent} never defined",
                            index + 1
                        ))?;
                    }
                }
                for blob_mark in commit.blob_marks() {
                    if repo.blob_by_mark(blob_mark).is_none() {
                        complain(format!(
                            "event {}: blob mark :{blob_mark} never defined",
                            index + 1
                        ))?;
                    }
                }
            }
            Event::Tag(tag) => {
                if repo.commit_by_mark(tag.referent).is_none() {
                    complain(format!(
                        "tag {}: referent mark :{} never defined",
                        tag.name, tag.referent
                    ))?;
                }
            }
            Event::Reset(reset) => {
                if let Some(from) = reset.from
                    && repo.commit_by_mark(from).is_none()
                {
                    complain(format!(
                        "reset {}: referent mark :{from} never defined",
                        reset.ref_name
                    ))?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

struct StreamReader<R> {
    reader: R,
    current_line: BString,
    line_number: u64,
    byte_offset: u64,
    eof: bool,
}

impl<R: BufRead> StreamReader<R> {
    fn new(reader: R) -> Self {
        StreamReader {
            reader,
            current_line: BString::new(Vec::new()),
            line_number: 0,
            byte_offset: 0,
            eof: false,
        }
    }

    fn line(&self) -> &BStr {
        self.current_line.as_bstr()
    }

    fn malformed(&self, msg: impl Into<String>) -> MalformedStream {
        MalformedStream {
            line: self.line_number,
            offset: self.byte_offset,
            msg: msg.into(),
        }
    }

    /// Reads the next line, stripping the trailing newline. Sets `eof` when
    /// the input is exhausted.
    fn advance(&mut self) -> Result<()> {
        self.byte_offset += self.current_line.len() as u64;
        if self.line_number > 0 {
            self.byte_offset += 1; // The newline of the previous line.
        }
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

    fn must_advance(&mut self) -> Result<()> {
        self.advance()?;
        if self.eof {
            bail!(self.malformed("unexpected end of stream"));
        }
        Ok(())
    }

    /// Reads a `data` block: either sized or `data <<DELIM` heredoc. Leaves
    /// the cursor on the line after the block.
    fn read_data(&mut self) -> Result<BString> {
        let Some(arg) = self.current_line.strip_prefix(b"data ") else {
            bail!(self.malformed(format!("expected 'data' line, found {:?}", self.current_line)));
        };
        if let Some(delimiter) = arg.strip_prefix(b"<<") {
            let delimiter = delimiter.to_vec();
            let mut body = BString::new(Vec::new());
            loop {
                self.advance()?;
                if self.eof {
                    bail!(self.malformed("unterminated heredoc data block"));
                }
                if self.current_line == delimiter {
                    break;
                }
                body.extend_from_slice(&self.current_line);
                body.push(b'\n');
            }
            self.advance()?;
            Ok(body)
        } else {
            let size: usize = arg
                .to_str()
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| self.malformed("bad data length"))?;
            let mut body = vec![0u8; size];
            let mut got = 0;
            while got < size {
                let n = self.reader.read(&mut body[got..])?;
                if n == 0 {
                    bail!(BadData {
                        line: self.line_number,
                        offset: self.byte_offset,
                        expected: size,
                        got,
                    });
                }
                got += n;
            }
            self.byte_offset += self.current_line.len() as u64 + 1 + size as u64;
            self.line_number += body.iter().filter(|b| **b == b'\n').count() as u64;
            self.current_line.clear();
            let bytes = self.reader.read_until(b'\n', &mut self.current_line)?;
            if bytes == 0 {
                self.eof = true;
            } else if self.current_line.last() == Some(&b'\n') {
                self.current_line.truncate(bytes - 1);
            }
            Ok(BString::from(body))
        }
    }

    fn read_optional_mark(&mut self, repo: &mut Repository) -> Result<Option<Mark>> {
        if let Some(mark) = self.current_line.strip_prefix(b"mark :") {
            let mark: Mark = mark
                .to_str()
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| self.malformed("bad mark"))?;
            if repo.index_of_mark(mark).is_some() {
                bail!(self.malformed(format!("duplicate mark :{mark}")));
            }
            self.must_advance()?;
            Ok(Some(mark))
        } else {
            Ok(None)
        }
    }

    fn read_original_oid(&mut self) -> Result<Option<BString>> {
        if let Some(oid) = self.current_line.strip_prefix(b"original-oid ") {
            let oid = oid.as_bstr().to_owned();
            self.must_advance()?;
            Ok(Some(oid))
        } else {
            Ok(None)
        }
    }

    fn read_blob(&mut self, repo: &mut Repository) -> Result<Blob> {
        self.must_advance()?;
        let mark = self.read_optional_mark(repo)?;
        self.read_original_oid()?;
        let content = self.read_data()?;
        let mark = match mark {
            Some(mark) => mark,
            None => repo.new_mark(),
        };
        Ok(Blob::new(mark, content))
    }

    /// Parses a commit reference on a `from`/`merge` line. Only mark
    /// references participate in the graph; raw object ids are reported.
    fn parse_commit_ref(&self, bytes: &BStr) -> Result<Option<Mark>> {
        if let Some(mark) = bytes.strip_prefix(b":") {
            let mark: Mark = mark
                .to_str()
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| self.malformed("bad mark reference"))?;
            Ok(Some(mark))
        } else {
            log::warn!(
                "line {}: parent {} is outside the stream, dropping the link",
                self.line_number,
                bytes
            );
            Ok(None)
        }
    }

    fn read_commit(&mut self, repo: &mut Repository) -> Result<Commit> {
        let branch = self
            .current_line
            .strip_prefix(b"commit ")
            .expect("caller checked the directive")
            .as_bstr()
            .to_owned();
        self.must_advance()?;

        let mark = self.read_optional_mark(repo)?;
        // Producers running with --show-original-ids name the source commit;
        // keep it as the legacy identifier.
        let original_oid = self.read_original_oid()?;

        let mut authors = Vec::new();
        while let Some(ident) = self.current_line.strip_prefix(b"author ") {
            authors.push(attribution::parse_at(
                ident.as_bstr(),
                self.line_number,
                self.byte_offset,
            )?);
            self.must_advance()?;
        }
        let Some(ident) = self.current_line.strip_prefix(b"committer ") else {
            bail!(self.malformed("expected 'committer' line"));
        };
        let committer = attribution::parse_at(ident.as_bstr(), self.line_number, self.byte_offset)?;
        self.must_advance()?;

        let mut commit = Commit::new(branch, committer);
        commit.mark = mark;
        commit.authors = authors;
        commit.legacy_id = original_oid.map(|oid| oid.to_str_lossy().into_owned());

        if let Some(encoding) = self.current_line.strip_prefix(b"encoding ") {
            commit.encoding = Some(encoding.as_bstr().to_owned());
            self.must_advance()?;
        }

        commit.comment = self.read_data()?;
        if self.current_line.is_empty() && !self.eof {
            self.advance()?;
        }

        if let Some(first) = self.current_line.strip_prefix(b"from ") {
            if let Some(mark) = self.parse_commit_ref(first.as_bstr())? {
                commit.parents.push(mark);
            }
            self.advance()?;
        }
        while let Some(parent) = self.current_line.strip_prefix(b"merge ") {
            if commit.parents.is_empty() {
                bail!(self.malformed("'merge' line without 'from' line"));
            }
            if let Some(mark) = self.parse_commit_ref(parent.as_bstr())? {
                commit.parents.push(mark);
            }
            self.advance()?;
        }

        loop {
            if self.eof {
                break;
            }
            let line = self.current_line.clone();
            let op = if let Some(rest) = line.strip_prefix(b"M ") {
                let mut fields = rest.splitn_str(3, b" ");
                let (mode, dataref, raw_path) =
                    match (fields.next(), fields.next(), fields.next()) {
                        (Some(mode), Some(dataref), Some(path)) => (mode, dataref, path),
                        _ => bail!(self.malformed(format!("bad filemodify line {line:?}"))),
                    };
                let mode = FileMode::parse(mode.as_bstr())
                    .map_err(|err| self.malformed(format!("{err:#}")))?;
                let path = unquote_path(raw_path.as_bstr());
                if dataref == b"inline" {
                    self.must_advance()?;
                    let content = self.read_data()?;
                    FileOp::Modify {
                        mode,
                        blobref: BlobRef::Inline(content),
                        path,
                        generated: false,
                    }
                } else {
                    let blobref = if let Some(mark) = dataref.strip_prefix(b":") {
                        let mark: Mark = mark
                            .to_str()
                            .ok()
                            .and_then(|s| s.parse().ok())
                            .ok_or_else(|| self.malformed("bad mark in filemodify"))?;
                        BlobRef::Mark(mark)
                    } else {
                        BlobRef::Oid(dataref.as_bstr().to_owned())
                    };
                    self.advance()?;
                    FileOp::Modify {
                        mode,
                        blobref,
                        path,
                        generated: false,
                    }
                }
            } else if let Some(rest) = line.strip_prefix(b"D ") {
                self.advance()?;
                FileOp::Delete {
                    path: unquote_path(rest.as_bstr()),
                }
            } else if let Some(rest) = line.strip_prefix(b"R ") {
                let (source, target) = split_two_paths(rest.as_bstr())
                    .ok_or_else(|| self.malformed(format!("bad filerename line {line:?}")))?;
                self.advance()?;
                FileOp::Rename { source, target }
            } else if let Some(rest) = line.strip_prefix(b"C ") {
                let (source, target) = split_two_paths(rest.as_bstr())
                    .ok_or_else(|| self.malformed(format!("bad filecopy line {line:?}")))?;
                self.advance()?;
                FileOp::Copy { source, target }
            } else if line == "deleteall" {
                self.advance()?;
                FileOp::DeleteAll
            } else if line.starts_with(b"N ") {
                bail!(self.malformed("notemodify is not supported"));
            } else {
                break;
            };
            commit.fileops.push(op);
        }
        Ok(commit)
    }

    fn read_tag(&mut self) -> Result<Tag> {
        let name = self
            .current_line
            .strip_prefix(b"tag ")
            .expect("caller checked the directive")
            .as_bstr()
            .to_owned();
        self.must_advance()?;
        // Some producers mark tags; the mark carries no information we keep.
        if self.current_line.starts_with(b"mark :") {
            self.must_advance()?;
        }
        let Some(from) = self.current_line.strip_prefix(b"from ") else {
            bail!(self.malformed("expected 'from' line in tag"));
        };
        let Some(referent) = self.parse_commit_ref(from.as_bstr())? else {
            bail!(self.malformed("tag referent must be a mark reference"));
        };
        self.must_advance()?;
        self.read_original_oid()?;
        let tagger = if let Some(ident) = self.current_line.strip_prefix(b"tagger ") {
            let tagger =
                attribution::parse_at(ident.as_bstr(), self.line_number, self.byte_offset)?;
            self.must_advance()?;
            tagger
        } else {
            crate::attribution::Attribution::new("", "", attribution::epoch())
        };
        let comment = self.read_data()?;
        if self.current_line.is_empty() && !self.eof {
            self.advance()?;
        }
        Ok(Tag {
            name,
            referent,
            tagger,
            comment,
        })
    }

    fn read_reset(&mut self) -> Result<Reset> {
        let ref_name = self
            .current_line
            .strip_prefix(b"reset ")
            .expect("caller checked the directive")
            .as_bstr()
            .to_owned();
        self.advance()?;
        let from = if let Some(from) = self.current_line.strip_prefix(b"from ") {
            let mark = self.parse_commit_ref(from.as_bstr())?;
            self.advance()?;
            mark
        } else {
            None
        };
        Ok(Reset { ref_name, from })
    }
}

/// Decodes a C-style quoted path if it starts with a double quote.
pub fn unquote_path(raw: &BStr) -> BString {
    if !raw.starts_with(b"\"") {
        return raw.to_owned();
    }
    let mut out = BString::new(Vec::with_capacity(raw.len()));
    let mut bytes = raw[1..].iter().copied().peekable();
    while let Some(b) = bytes.next() {
        match b {
            b'"' => break,
            b'\\' => match bytes.next() {
                Some(b'n') => out.push(b'\n'),
                Some(b't') => out.push(b'\t'),
                Some(d @ b'0'..=b'7') => {
                    let mut value = (d - b'0') as u32;
                    for _ in 0..2 {
                        if let Some(d2 @ b'0'..=b'7') = bytes.peek().copied() {
                            value = value * 8 + (d2 - b'0') as u32;
                            bytes.next();
                        }
                    }
                    out.push(value as u8);
                }
                Some(other) => out.push(other),
                None => break,
            },
            _ => out.push(b),
        }
    }
    out
}

/// Encodes a path for the stream, quoting only when required.
fn quote_path(path: &BStr, force_quote_spaces: bool) -> BString {
    let needs_quoting = path.starts_with(b"\"")
        || path.contains(&b'\n')
        || path.contains(&b'\\')
        || (force_quote_spaces && path.contains(&b' '));
    if !needs_quoting {
        return path.to_owned();
    }
    let mut out = BString::from("\"");
    for b in path.iter() {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(*b),
        }
    }
    out.push(b'"');
    out
}

/// Splits the two-path operand list of `R`/`C` lines, honoring quoting on
/// the first path.
fn split_two_paths(rest: &BStr) -> Option<(BString, BString)> {
    if rest.starts_with(b"\"") {
        let mut escape = false;
        for (index, b) in rest.iter().enumerate().skip(1) {
            if escape {
                escape = false;
            } else if *b == b'\\' {
                escape = true;
            } else if *b == b'"' {
                let source = unquote_path(rest[..=index].as_bstr());
                let target = rest.get(index + 2..)?;
                return Some((source, unquote_path(target.as_bstr())));
            }
        }
        None
    } else {
        let (source, target) = rest.split_once_str(b" ")?;
        Some((
            source.as_bstr().to_owned(),
            unquote_path(target.as_bstr()),
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Keep existing mark numbers instead of renumbering densely.
    pub preserve_marks: bool,
}

/// Serializes the repository as a fast-import stream. Blobs are emitted
/// before the first commit referencing them, and no reference ever points
/// forward in the output.
pub fn write_stream(repo: &Repository, out: impl Write, options: &WriteOptions) -> Result<()> {
    let _critical = crate::interrupt::critical();
    let order = emission_order(repo)?;

    // Marks are assigned in emission order so output references are dense and
    // strictly backward.
    let mut translation: HashMap<Mark, Mark> = HashMap::new();
    if !options.preserve_marks && !repo.preserve_marks {
        let mut next = 0;
        for index in &order {
            if let Some(mark) = repo.events[*index].mark() {
                next += 1;
                translation.insert(mark, next);
            }
        }
    }
    let xlate = |mark: Mark| -> Mark { translation.get(&mark).copied().unwrap_or(mark) };

    let mut emitted: std::collections::HashSet<Mark> = std::collections::HashSet::new();
    let mut out = std::io::BufWriter::new(out);
    if let Some(sourcetype) = &repo.sourcetype {
        writeln!(out, "#reposurgeon sourcetype {sourcetype}")?;
    }
    for index in order {
        match &repo.events[index] {
            Event::Blob(blob) => {
                writeln!(out, "blob")?;
                writeln!(out, "mark :{}", xlate(blob.mark))?;
                let content = blob.content(repo.scratch())?;
                writeln!(out, "data {}", content.len())?;
                out.write_all(&content)?;
                out.write_all(b"\n")?;
                emitted.insert(xlate(blob.mark));
            }
            Event::Commit(commit) => {
                if let Some(legacy_id) = &commit.legacy_id {
                    writeln!(out, "#legacy-id {legacy_id}")?;
                }
                out.write_all(b"commit ")?;
                out.write_all(&commit.branch)?;
                out.write_all(b"\n")?;
                if let Some(mark) = commit.mark {
                    writeln!(out, "mark :{}", xlate(mark))?;
                }
                for author in &commit.authors {
                    out.write_all(b"author ")?;
                    out.write_all(&author.to_stream_bytes())?;
                    out.write_all(b"\n")?;
                }
                out.write_all(b"committer ")?;
                out.write_all(&commit.committer.to_stream_bytes())?;
                out.write_all(b"\n")?;
                if let Some(encoding) = &commit.encoding {
                    out.write_all(b"encoding ")?;
                    out.write_all(encoding)?;
                    out.write_all(b"\n")?;
                }
                writeln!(out, "data {}", commit.comment.len())?;
                out.write_all(&commit.comment)?;
                for (parent_index, parent) in commit.parents.iter().enumerate() {
                    let parent = xlate(*parent);
                    if !emitted.contains(&parent) {
                        bail!(UnresolvedMark(parent));
                    }
                    let keyword: &[u8] = if parent_index == 0 { b"from" } else { b"merge" };
                    out.write_all(keyword)?;
                    writeln!(out, " :{parent}")?;
                }
                for op in &commit.fileops {
                    write_fileop(&mut out, op, &xlate, &emitted)?;
                }
                out.write_all(b"\n")?;
                if let Some(mark) = commit.mark {
                    emitted.insert(xlate(mark));
                }
            }
            Event::Tag(tag) => {
                out.write_all(b"tag ")?;
                out.write_all(&tag.name)?;
                out.write_all(b"\n")?;
                let referent = xlate(tag.referent);
                if !emitted.contains(&referent) {
                    bail!(UnresolvedMark(referent));
                }
                writeln!(out, "from :{referent}")?;
                out.write_all(b"tagger ")?;
                out.write_all(&tag.tagger.to_stream_bytes())?;
                out.write_all(b"\n")?;
                writeln!(out, "data {}", tag.comment.len())?;
                out.write_all(&tag.comment)?;
                out.write_all(b"\n")?;
            }
            Event::Reset(reset) => {
                out.write_all(b"reset ")?;
                out.write_all(&reset.ref_name)?;
                out.write_all(b"\n")?;
                if let Some(from) = reset.from {
                    let from = xlate(from);
                    if !emitted.contains(&from) {
                        bail!(UnresolvedMark(from));
                    }
                    writeln!(out, "from :{from}")?;
                }
                out.write_all(b"\n")?;
            }
            Event::Passthrough(passthrough) => {
                out.write_all(&passthrough.text)?;
            }
        }
    }
    out.write_all(b"done\n")?;
    out.flush()?;
    Ok(())
}

fn write_fileop(
    out: &mut impl Write,
    op: &FileOp,
    xlate: &impl Fn(Mark) -> Mark,
    emitted: &std::collections::HashSet<Mark>,
) -> Result<()> {
    match op {
        FileOp::Modify {
            mode, blobref, path, ..
        } => match blobref {
            BlobRef::Mark(mark) => {
                let mark = xlate(*mark);
                if !emitted.contains(&mark) {
                    bail!(UnresolvedMark(mark));
                }
                write!(out, "M {mode} :{mark} ")?;
                out.write_all(&quote_path(path.as_bstr(), false))?;
                out.write_all(b"\n")?;
            }
            BlobRef::Oid(oid) => {
                write!(out, "M {mode} ")?;
                out.write_all(oid)?;
                out.write_all(b" ")?;
                out.write_all(&quote_path(path.as_bstr(), false))?;
                out.write_all(b"\n")?;
            }
            BlobRef::Inline(content) => {
                write!(out, "M {mode} inline ")?;
                out.write_all(&quote_path(path.as_bstr(), false))?;
                out.write_all(b"\n")?;
                writeln!(out, "data {}", content.len())?;
                out.write_all(content)?;
                out.write_all(b"\n")?;
            }
        },
        FileOp::Delete { path } => {
            out.write_all(b"D ")?;
            out.write_all(&quote_path(path.as_bstr(), false))?;
            out.write_all(b"\n")?;
        }
        FileOp::Rename { source, target } => {
            out.write_all(b"R ")?;
            out.write_all(&quote_path(source.as_bstr(), true))?;
            out.write_all(b" ")?;
            out.write_all(&quote_path(target.as_bstr(), false))?;
            out.write_all(b"\n")?;
        }
        FileOp::Copy { source, target } => {
            out.write_all(b"C ")?;
            out.write_all(&quote_path(source.as_bstr(), true))?;
            out.write_all(b" ")?;
            out.write_all(&quote_path(target.as_bstr(), false))?;
            out.write_all(b"\n")?;
        }
        FileOp::DeleteAll => {
            out.write_all(b"deleteall\n")?;
        }
    }
    Ok(())
}

/// Computes output order: each event keeps its position except that blobs
/// hoist ahead of their first referencing commit and tags/resets wait for
/// their referent.
fn emission_order(repo: &Repository) -> Result<Vec<usize>> {
    let mut order = Vec::with_capacity(repo.events.len());
    let mut emitted_events = vec![false; repo.events.len()];
    let mut emitted_marks: std::collections::HashSet<Mark> = std::collections::HashSet::new();
    // Tags/resets whose referent has not been emitted yet, keyed by mark.
    let mut deferred: HashMap<Mark, Vec<usize>> = HashMap::new();

    for (index, event) in repo.events.iter().enumerate() {
        if emitted_events[index] {
            continue;
        }
        match event {
            Event::Blob(_) | Event::Passthrough(_) => {
                emitted_events[index] = true;
                if let Some(mark) = event.mark() {
                    emitted_marks.insert(mark);
                }
                order.push(index);
            }
            Event::Commit(commit) => {
                for blob_mark in commit.blob_marks() {
                    if let Some(blob_index) = repo.index_of_mark(blob_mark)
                        && !emitted_events[blob_index]
                        && repo.events[blob_index].as_blob().is_some()
                    {
                        emitted_events[blob_index] = true;
                        emitted_marks.insert(blob_mark);
                        order.push(blob_index);
                    }
                }
                emitted_events[index] = true;
                order.push(index);
                if let Some(mark) = commit.mark {
                    emitted_marks.insert(mark);
                    if let Some(waiting) = deferred.remove(&mark) {
                        for waiting_index in waiting {
                            emitted_events[waiting_index] = true;
                            order.push(waiting_index);
                        }
                    }
                }
            }
            Event::Tag(tag) => {
                if emitted_marks.contains(&tag.referent) {
                    emitted_events[index] = true;
                    order.push(index);
                } else {
                    deferred.entry(tag.referent).or_default().push(index);
                    emitted_events[index] = true;
                }
            }
            Event::Reset(reset) => match reset.from {
                Some(from) if !emitted_marks.contains(&from) => {
                    deferred.entry(from).or_default().push(index);
                    emitted_events[index] = true;
                }
                _ => {
                    emitted_events[index] = true;
                    order.push(index);
                }
            },
        }
    }
    if let Some((mark, _)) = deferred.into_iter().next() {
        bail!(UnresolvedMark(mark));
    }
    Ok(order)
}

/// Serializes to an in-memory buffer; the convenient form for tests and
/// round-trip checks.
pub fn write_to_vec(repo: &Repository, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_stream(repo, &mut out, options).context("failed to serialize stream")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SMALL_STREAM: &str = "\
blob
mark :1
data 6
hello

commit refs/heads/master
mark :2
author A U Thor <author@example.com> 1288205012 +0000
committer C O Mitter <committer@example.com> 1288205013 +0000
data 6
first

M 100644 :1 greeting

commit refs/heads/master
mark :3
committer C O Mitter <committer@example.com> 1288205099 +0000
data 7
second

from :2
D greeting

tag release-1
from :3
tagger C O Mitter <committer@example.com> 1288205100 +0000
data 4
tag

reset refs/heads/devel
from :2

done
";

    fn read_small() -> Repository {
        read_stream(SMALL_STREAM.as_bytes(), "test", &ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_read_small_stream() {
        let repo = read_small();
        assert_eq!(repo.events.len(), 5);
        let blob = repo.blob_by_mark(1).unwrap();
        assert_eq!(blob.content(None).unwrap(), "hello\n");
        let first = repo.commit_by_mark(2).unwrap();
        assert_eq!(first.comment, "first\n");
        assert_eq!(first.authors.len(), 1);
        assert_eq!(first.fileops.len(), 1);
        let second = repo.commit_by_mark(3).unwrap();
        assert_eq!(second.parents, vec![2]);
        let tag = repo.events[3].as_tag().unwrap();
        assert_eq!(tag.name, "release-1");
        assert_eq!(tag.referent, 3);
        repo.check().unwrap();
    }

    #[test]
    fn test_write_is_idempotent_after_read() {
        let repo = read_small();
        let options = WriteOptions::default();
        let once = write_to_vec(&repo, &options).unwrap();
        let reread = read_stream(once.as_slice(), "test", &ReadOptions::default()).unwrap();
        let twice = write_to_vec(&reread, &options).unwrap();
        assert_eq!(once.as_bstr(), twice.as_bstr());
    }

    #[test]
    fn test_heredoc_data() {
        let stream = "\
blob
mark :1
data <<EOT
line one
line two
EOT

done
";
        let repo = read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap();
        assert_eq!(
            repo.blob_by_mark(1).unwrap().content(None).unwrap(),
            "line one\nline two\n"
        );
    }

    #[test]
    fn test_truncated_data_is_bad_data() {
        let stream = "blob\nmark :1\ndata 100\nshort";
        let err = read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap_err();
        assert!(err.downcast_ref::<BadData>().is_some());
    }

    #[test]
    fn test_unknown_directive_is_malformed() {
        let stream = "frobnicate\n";
        let err = read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap_err();
        assert!(err.downcast_ref::<MalformedStream>().is_some());
    }

    #[test]
    fn test_dangling_parent_reference() {
        let stream = "\
commit refs/heads/master
mark :2
committer C <c@example.com> 100 +0000
data 2
x

from :77

done
";
        let err = read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap_err();
        assert!(err.downcast_ref::<ReferenceError>().is_some());
        // Relaxed mode downgrades to a warning.
        let relaxed = ReadOptions { relaxed: true };
        assert!(read_stream(stream.as_bytes(), "test", &relaxed).is_ok());
    }

    #[test]
    fn test_legacy_id_and_sourcetype_roundtrip() {
        let stream = "\
#reposurgeon sourcetype svn
#legacy-id 352
commit refs/heads/master
mark :1
committer C <c@example.com> 100 +0000
data 4
fix

done
";
        let repo = read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap();
        assert_eq!(repo.sourcetype.as_deref(), Some("svn"));
        assert_eq!(
            repo.commit_by_mark(1).unwrap().legacy_id.as_deref(),
            Some("352")
        );
        let out = write_to_vec(&repo, &WriteOptions::default()).unwrap();
        let text = out.to_str().unwrap();
        assert!(text.starts_with("#reposurgeon sourcetype svn\n"));
        assert!(text.contains("#legacy-id 352\ncommit refs/heads/master\n"));
    }

    #[test]
    fn test_forward_tag_referent_resolves_in_linkup() {
        let stream = "\
tag early
from :5
tagger T <t@example.com> 100 +0000
data 2
t

commit refs/heads/master
mark :5
committer C <c@example.com> 100 +0000
data 2
x

done
";
        let repo = read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap();
        assert_eq!(repo.events[0].as_tag().unwrap().referent, 5);
        // The writer reorders so the tag follows its referent.
        let out = write_to_vec(&repo, &WriteOptions::default()).unwrap();
        let text = out.to_str().unwrap().to_owned();
        let commit_at = text.find("commit ").unwrap();
        let tag_at = text.find("tag early").unwrap();
        assert!(commit_at < tag_at);
    }

    #[test]
    fn test_quoted_paths() {
        assert_eq!(unquote_path(b"\"a\\tb\"".into()), "a\tb");
        assert_eq!(unquote_path(b"plain".into()), "plain");
        let (source, target) = split_two_paths(b"\"sp ace\" dst".into()).unwrap();
        assert_eq!(source, "sp ace");
        assert_eq!(target, "dst");
        let (source, target) = split_two_paths(b"src dst".into()).unwrap();
        assert_eq!(source, "src");
        assert_eq!(target, "dst");
    }

    #[test]
    fn test_blobs_hoisted_before_referencing_commit() {
        // Blob :1 appears after the commit in event order; the writer hoists.
        let mut repo = Repository::new("test");
        let committer =
            crate::attribution::Attribution::parse(b"C <c@example.com> 100 +0000".into()).unwrap();
        let mut commit = Commit::new("refs/heads/master", committer);
        commit.mark = Some(2);
        commit
            .fileops
            .push(FileOp::modify(FileMode::NORMAL, BlobRef::Mark(1), "f"));
        repo.append(Event::Commit(commit));
        repo.append(Event::Blob(Blob::new(1, "late")));
        let out = write_to_vec(&repo, &WriteOptions::default()).unwrap();
        let text = out.to_str().unwrap();
        assert!(text.find("blob").unwrap() < text.find("commit").unwrap());
    }
}
