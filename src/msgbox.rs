//! The message-box format: RFC-822-ish per-event blocks used to edit commit
//! comments and attributions outside the tool, round-trippable through
//! `msgout` and `msgin`.

use crate::attribution::Attribution;
use crate::error::SemanticError;
use crate::event::Event;
use crate::event::Mark;
use crate::repo::Repository;
use crate::selection::Selection;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use chrono::DateTime;
use chrono::FixedOffset;

const DELIMITER: &str =
    "------------------------------------------------------------------------------";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

fn push_header(out: &mut BString, key: &str, value: &BStr) {
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.push(b'\n');
}

fn format_date(date: &DateTime<FixedOffset>) -> BString {
    BString::from(date.format(DATE_FORMAT).to_string())
}

/// Serializes the selected events as message-box blocks.
pub fn msgout(repo: &Repository, selection: &Selection, include_blobs: bool) -> Result<BString> {
    let mut out = BString::new(Vec::new());
    for index in selection {
        let event = repo
            .events
            .get(*index)
            .ok_or_else(|| SemanticError(format!("event {} out of range", index + 1)))?;
        match event {
            Event::Commit(commit) => {
                out.extend_from_slice(DELIMITER.as_bytes());
                out.push(b'\n');
                push_header(&mut out, "Event-Number", format!("{}", index + 1).as_bytes().into());
                if let Some(mark) = commit.mark {
                    push_header(&mut out, "Event-Mark", format!(":{mark}").as_bytes().into());
                }
                push_header(&mut out, "Branch", commit.branch.as_bstr());
                if !commit.parents.is_empty() {
                    let parents = commit
                        .parents
                        .iter()
                        .map(|parent| format!(":{parent}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    push_header(&mut out, "Parents", parents.as_bytes().into());
                }
                push_header(&mut out, "Committer", commit.committer.to_header_bytes().as_bstr());
                push_header(
                    &mut out,
                    "Committer-Date",
                    format_date(&commit.committer.date).as_bstr(),
                );
                for author in &commit.authors {
                    push_header(&mut out, "Author", author.to_header_bytes().as_bstr());
                    push_header(&mut out, "Author-Date", format_date(&author.date).as_bstr());
                }
                out.push(b'\n');
                out.extend_from_slice(&commit.comment);
            }
            Event::Tag(tag) => {
                out.extend_from_slice(DELIMITER.as_bytes());
                out.push(b'\n');
                push_header(&mut out, "Event-Number", format!("{}", index + 1).as_bytes().into());
                push_header(&mut out, "Tag", tag.name.as_bstr());
                push_header(&mut out, "Tagger", tag.tagger.to_header_bytes().as_bstr());
                push_header(
                    &mut out,
                    "Tagger-Date",
                    format_date(&tag.tagger.date).as_bstr(),
                );
                out.push(b'\n');
                out.extend_from_slice(&tag.comment);
            }
            Event::Blob(blob) if include_blobs => {
                out.extend_from_slice(DELIMITER.as_bytes());
                out.push(b'\n');
                push_header(&mut out, "Event-Number", format!("{}", index + 1).as_bytes().into());
                push_header(&mut out, "Event-Mark", format!(":{}", blob.mark).as_bytes().into());
                out.push(b'\n');
                out.extend_from_slice(&blob.content(repo.scratch())?);
            }
            _ => {}
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Default)]
pub struct MsginOptions {
    /// Refuse to replace non-empty comments.
    pub empty_only: bool,
    /// Accept blob-content blocks.
    pub blobs: bool,
}

#[derive(Debug, Default)]
struct Block {
    event_number: Option<usize>,
    event_mark: Option<Mark>,
    tag_name: Option<BString>,
    committer: Option<BString>,
    committer_date: Option<BString>,
    authors: Vec<(Option<BString>, Option<BString>)>,
    tagger: Option<BString>,
    tagger_date: Option<BString>,
    body: BString,
}

/// Applies message-box blocks back onto the repository. Returns the number
/// of events updated.
pub fn msgin(repo: &mut Repository, input: &BStr, options: &MsginOptions) -> Result<usize> {
    let blocks = parse_blocks(input)?;
    let mut updated = 0;
    for block in blocks {
        let index = locate(repo, &block)?;
        match &mut repo.events[index] {
            Event::Commit(commit) => {
                if options.empty_only && !commit.comment.is_empty() && commit.comment != block.body
                {
                    bail!(SemanticError(format!(
                        "event {} already has a comment and --empty-only is set",
                        index + 1
                    )));
                }
                if let Some(ident) = &block.committer {
                    let date = match &block.committer_date {
                        Some(date) => parse_date(date)?,
                        None => commit.committer.date,
                    };
                    commit.committer = Attribution::parse_header(ident.as_bstr(), date)?;
                }
                if !block.authors.is_empty() {
                    let mut authors = Vec::new();
                    for (ident, date) in &block.authors {
                        let Some(ident) = ident else { continue };
                        let date = match date {
                            Some(date) => parse_date(date)?,
                            None => commit.committer.date,
                        };
                        authors.push(Attribution::parse_header(ident.as_bstr(), date)?);
                    }
                    commit.authors = authors;
                }
                commit.comment = block.body;
                updated += 1;
            }
            Event::Tag(tag) => {
                if options.empty_only && !tag.comment.is_empty() && tag.comment != block.body {
                    bail!(SemanticError(format!(
                        "event {} already has a comment and --empty-only is set",
                        index + 1
                    )));
                }
                if let Some(name) = &block.tag_name {
                    tag.name = name.clone();
                }
                if let Some(ident) = &block.tagger {
                    let date = match &block.tagger_date {
                        Some(date) => parse_date(date)?,
                        None => tag.tagger.date,
                    };
                    tag.tagger = Attribution::parse_header(ident.as_bstr(), date)?;
                }
                tag.comment = block.body;
                updated += 1;
            }
            Event::Blob(blob) => {
                if !options.blobs {
                    bail!(SemanticError(format!(
                        "event {} is a blob; pass --blobs to allow content replacement",
                        index + 1
                    )));
                }
                blob.set_content(block.body);
                updated += 1;
            }
            _ => bail!(SemanticError(format!(
                "event {} cannot take message-box input",
                index + 1
            ))),
        }
    }
    Ok(updated)
}

fn parse_date(raw: &BString) -> Result<DateTime<FixedOffset>> {
    let text = raw.to_str()?;
    DateTime::parse_from_str(text, DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map_err(|err| anyhow!("bad date {text:?}: {err}"))
}

fn locate(repo: &Repository, block: &Block) -> Result<usize> {
    if let Some(mark) = block.event_mark {
        return repo
            .index_of_mark(mark)
            .ok_or_else(|| anyhow!(SemanticError(format!("no event with mark :{mark}"))));
    }
    if let Some(number) = block.event_number {
        if number >= 1 && number <= repo.events.len() {
            return Ok(number - 1);
        }
        bail!(SemanticError(format!("event number {number} out of range")));
    }
    if let Some(name) = &block.tag_name {
        for (index, event) in repo.events.iter().enumerate() {
            if event.as_tag().is_some_and(|tag| tag.name == *name) {
                return Ok(index);
            }
        }
        bail!(SemanticError(format!("no tag named {name}")));
    }
    bail!(SemanticError(
        "message block has no Event-Mark, Event-Number, or Tag header".to_owned()
    ))
}

fn parse_blocks(input: &BStr) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let mut in_body = false;
    for raw_line in input.lines_with_terminator() {
        let line = raw_line.trim_end_with(|c| c == '\n' || c == '\r');
        if line == DELIMITER.as_bytes() {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some(Block::default());
            in_body = false;
            continue;
        }
        let Some(block) = &mut current else {
            if !line.trim_ascii().is_empty() {
                bail!(SemanticError("text before the first delimiter".to_owned()));
            }
            continue;
        };
        if in_body {
            // Verbatim, terminator included.
            block.body.extend_from_slice(raw_line);
            continue;
        }
        if line.is_empty() {
            in_body = true;
            continue;
        }
        let Some((key, value)) = line.split_once_str(b": ") else {
            bail!(SemanticError(format!(
                "malformed message-box header {:?}",
                line.as_bstr()
            )));
        };
        let value = BString::from(value);
        match key {
            b"Event-Number" => {
                block.event_number = value.to_str().ok().and_then(|s| s.trim().parse().ok());
            }
            b"Event-Mark" => {
                block.event_mark = value
                    .strip_prefix(b":")
                    .and_then(|s| s.to_str().ok())
                    .and_then(|s| s.parse().ok());
            }
            b"Branch" | b"Parents" => {
                // Informational on output; msgin does not rewire the graph.
            }
            b"Tag" => block.tag_name = Some(value),
            b"Committer" => block.committer = Some(value),
            b"Committer-Date" => block.committer_date = Some(value),
            b"Author" => block.authors.push((Some(value), None)),
            b"Author-Date" => {
                if let Some(last) = block.authors.last_mut() {
                    last.1 = Some(value);
                } else {
                    block.authors.push((None, Some(value)));
                }
            }
            b"Tagger" => block.tagger = Some(value),
            b"Tagger-Date" => block.tagger_date = Some(value),
            _ => log::warn!("ignoring unknown message-box header {}", key.as_bstr()),
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast_import::ReadOptions;
    use crate::fast_import::read_stream;
    use crate::selection;
    use pretty_assertions::assert_eq;

    fn repo() -> Repository {
        let stream = "\
blob
mark :1
data 4
one

commit refs/heads/master
mark :2
author Anne <anne@example.com> 1288205000 +0100
committer Fred <fred@example.com> 1288205012 +0000
data 6
first

M 100644 :1 f

tag v1
from :2
tagger Fred <fred@example.com> 1288205100 +0000
data 4
tag

done
";
        read_stream(stream.as_bytes(), "test", &ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_msgout_format() {
        let repo = repo();
        let selection = selection::evaluate(&repo, "=C").unwrap();
        let out = msgout(&repo, &selection, false).unwrap();
        let text = out.to_str().unwrap();
        assert!(text.starts_with(DELIMITER));
        assert!(text.contains("Event-Mark: :2\n"));
        assert!(text.contains("Branch: refs/heads/master\n"));
        assert!(text.contains("Committer: Fred <fred@example.com>\n"));
        assert!(text.contains("Committer-Date: 2010-10-27T18:43:32+0000\n"));
        assert!(text.contains("Author: Anne <anne@example.com>\n"));
        assert!(text.ends_with("\nfirst\n"));
    }

    #[test]
    fn test_msgout_msgin_roundtrip_is_noop() {
        let mut repo = repo();
        let selection = selection::evaluate(&repo, "=C|=T").unwrap();
        let out = msgout(&repo, &selection, false).unwrap();
        let before = repo.events.clone();
        let updated = msgin(&mut repo, out.as_bstr(), &MsginOptions::default()).unwrap();
        assert_eq!(updated, 2);
        assert_eq!(repo.events, before);
    }

    #[test]
    fn test_msgin_edits_comment_and_committer() {
        let mut repo = repo();
        let block = format!(
            "{DELIMITER}\nEvent-Mark: :2\nCommitter: Wilma <wilma@example.com>\nCommitter-Date: 2011-01-01T00:00:00+0000\n\nrewritten comment\n"
        );
        let updated = msgin(
            &mut repo,
            block.as_bytes().into(),
            &MsginOptions::default(),
        )
        .unwrap();
        assert_eq!(updated, 1);
        let commit = repo.commit_by_mark(2).unwrap();
        assert_eq!(commit.comment, "rewritten comment\n");
        assert_eq!(commit.committer.name, "Wilma");
        assert_eq!(commit.committer.date.timestamp(), 1293840000);
        // The author block was not mentioned and is untouched.
        assert_eq!(commit.authors[0].name, "Anne");
    }

    #[test]
    fn test_msgin_empty_only_rejects_overwrite() {
        let mut repo = repo();
        let block = format!("{DELIMITER}\nEvent-Mark: :2\n\ndifferent text\n");
        let err = msgin(
            &mut repo,
            block.as_bytes().into(),
            &MsginOptions {
                empty_only: true,
                blobs: false,
            },
        )
        .unwrap_err();
        assert!(err.downcast_ref::<SemanticError>().is_some());
        assert_eq!(repo.commit_by_mark(2).unwrap().comment, "first\n");
    }

    #[test]
    fn test_msgin_blob_replacement() {
        let mut repo = repo();
        let block = format!("{DELIMITER}\nEvent-Mark: :1\n\nnew content\n");
        let err = msgin(
            &mut repo,
            block.as_bytes().into(),
            &MsginOptions::default(),
        )
        .unwrap_err();
        assert!(err.downcast_ref::<SemanticError>().is_some());
        let updated = msgin(
            &mut repo,
            block.as_bytes().into(),
            &MsginOptions {
                empty_only: false,
                blobs: true,
            },
        )
        .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(repo.blob_content(1).unwrap(), "new content\n");
    }
}
