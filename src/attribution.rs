//! Attributions: the (name, email, timestamp, timezone) tuples attached to
//! commits and tags, the fast-import identity line codec, action stamps, and
//! contributor maps.

use crate::error::MalformedStream;
use anyhow::Context as _;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use chrono::DateTime;
use chrono::FixedOffset;
use chrono::TimeZone as _;
use std::io::BufRead;
use std::io::Write;

/// Who did something, and when. Timestamps keep sub-second precision when the
/// source format carries it (Subversion dates do, import streams do not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub name: BString,
    pub email: BString,
    pub date: DateTime<FixedOffset>,
}

impl Attribution {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, date: DateTime<FixedOffset>) -> Self {
        Attribution {
            name: name.into(),
            email: email.into(),
            date,
        }
    }

    /// Parses the tail of an `author`/`committer`/`tagger` line:
    /// `Full Name <email> 1686121750 +0100`.
    pub fn parse(ident: &BStr) -> Result<Attribution> {
        let open = ident
            .find_byte(b'<')
            .ok_or_else(|| anyhow!("missing '<' in identity {ident:?}"))?;
        let close = ident
            .find_byte(b'>')
            .ok_or_else(|| anyhow!("missing '>' in identity {ident:?}"))?;
        if close < open {
            bail!("mismatched angle brackets in identity {ident:?}");
        }
        let name = ident[..open].trim().as_bstr().to_owned();
        let email = ident[open + 1..close].trim().as_bstr().to_owned();
        let rest = ident[close + 1..].trim();
        let date = if rest.is_empty() {
            epoch()
        } else {
            let (secs, offset) = rest
                .split_once_str(b" ")
                .ok_or_else(|| anyhow!("missing timezone offset in identity {ident:?}"))?;
            let secs: i64 = secs
                .to_str()?
                .parse()
                .with_context(|| format!("bad timestamp in identity {ident:?}"))?;
            let offset = parse_offset(offset.as_bstr())
                .with_context(|| format!("bad timezone offset in identity {ident:?}"))?;
            offset
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| anyhow!("timestamp out of range in identity {ident:?}"))?
        };
        Ok(Attribution { name, email, date })
    }

    /// Renders the raw-date identity form used by import streams.
    pub fn to_stream_bytes(&self) -> BString {
        let mut out = BString::new(Vec::new());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(
            format!("{} {}", self.date.timestamp(), format_offset(self.date.offset())).as_bytes(),
        );
        out
    }

    /// The portable commit reference `2010-10-27T18:43:32Z!esr@thyrsus.com`.
    pub fn action_stamp(&self) -> String {
        format!(
            "{}!{}",
            self.date.to_utc().format("%Y-%m-%dT%H:%M:%SZ"),
            self.email
        )
    }

    /// `Full Name <email>` without the date, for message-box headers.
    pub fn to_header_bytes(&self) -> BString {
        let mut out = BString::new(Vec::new());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b">");
        out
    }

    /// Parses `Full Name <email>` as found in message-box headers.
    pub fn parse_header(ident: &BStr, date: DateTime<FixedOffset>) -> Result<Attribution> {
        let mut attribution = Attribution::parse(ident)?;
        attribution.date = date;
        Ok(attribution)
    }
}

pub fn epoch() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .timestamp_opt(0, 0)
        .single()
        .unwrap()
}

/// Parses a `+hhmm`/`-hhmm` offset.
pub fn parse_offset(s: &BStr) -> Result<FixedOffset> {
    let s = s.to_str()?;
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => bail!("offset {s:?} must start with + or -"),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        bail!("offset {s:?} is not of the form +hhmm");
    }
    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("offset {s:?} out of range"))
}

pub fn format_offset(offset: &FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{}{:02}{:02}", sign, secs / 3600, (secs % 3600) / 60)
}

/// Raises `MalformedStream` with position info for identity parse failures.
pub fn parse_at(ident: &BStr, line: u64, offset: u64) -> Result<Attribution> {
    Attribution::parse(ident).map_err(|err| {
        anyhow::Error::new(MalformedStream {
            line,
            offset,
            msg: format!("{err:#}"),
        })
    })
}

/// One line of a contributor map: `shortname = Full Name <email> [TZ]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    pub local: String,
    pub name: BString,
    pub email: BString,
    pub timezone: Option<String>,
}

/// A contributor map, round-trippable through `authors write` and
/// `authors read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributorMap {
    pub entries: Vec<Contributor>,
}

impl ContributorMap {
    pub fn read(input: impl BufRead) -> Result<ContributorMap> {
        let mut entries = Vec::new();
        for (lineno, line) in input.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (local, rest) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("missing '=' on contributor map line {}", lineno + 1))?;
            let local = local.trim().to_owned();
            let rest = rest.trim();
            let open = rest
                .find('<')
                .ok_or_else(|| anyhow!("missing '<' on contributor map line {}", lineno + 1))?;
            let close = rest
                .find('>')
                .ok_or_else(|| anyhow!("missing '>' on contributor map line {}", lineno + 1))?;
            let name = BString::from(rest[..open].trim());
            let email = BString::from(rest[open + 1..close].trim());
            let timezone = match rest[close + 1..].trim() {
                "" => None,
                tz => Some(tz.to_owned()),
            };
            entries.push(Contributor {
                local,
                name,
                email,
                timezone,
            });
        }
        Ok(ContributorMap { entries })
    }

    pub fn write(&self, mut out: impl Write) -> Result<()> {
        for entry in &self.entries {
            out.write_all(entry.local.as_bytes())?;
            out.write_all(b" = ")?;
            out.write_all(&entry.name)?;
            out.write_all(b" <")?;
            out.write_all(&entry.email)?;
            out.write_all(b">")?;
            if let Some(tz) = &entry.timezone {
                out.write_all(b" ")?;
                out.write_all(tz.as_bytes())?;
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Finds the entry matching an attribution: by full email, by the email's
    /// local part, or by name.
    pub fn lookup(&self, attribution: &Attribution) -> Option<&Contributor> {
        let local_part = attribution
            .email
            .split_str(b"@")
            .next()
            .unwrap_or_default();
        self.entries.iter().find(|entry| {
            let shortname = entry.local.as_bytes();
            attribution.email == shortname
                || local_part == shortname
                || attribution.name == shortname
        })
    }

    /// Rewrites one attribution in place; returns true if it matched.
    pub fn apply_to(&self, attribution: &mut Attribution) -> bool {
        let Some(entry) = self.lookup(attribution) else {
            return false;
        };
        attribution.name = entry.name.clone();
        attribution.email = entry.email.clone();
        if let Some(tz) = &entry.timezone
            && let Ok(offset) = parse_offset(tz.as_str().into())
        {
            attribution.date = attribution.date.with_timezone(&offset);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_identity_roundtrip() {
        let ident = BStr::new(b"C Name <c@no.domain> 1686121750 +0100");
        let attribution = Attribution::parse(ident).unwrap();
        assert_eq!(attribution.name, "C Name");
        assert_eq!(attribution.email, "c@no.domain");
        assert_eq!(attribution.date.timestamp(), 1686121750);
        assert_eq!(attribution.to_stream_bytes(), ident.to_owned());
    }

    #[test]
    fn test_parse_identity_negative_offset() {
        let attribution = Attribution::parse(b"A <a@b.c> 100 -0730".into()).unwrap();
        assert_eq!(format_offset(attribution.date.offset()), "-0730");
    }

    #[test]
    fn test_action_stamp() {
        let attribution = Attribution::parse(b"E R <esr@thyrsus.com> 1288205012 +0000".into()).unwrap();
        assert_eq!(attribution.action_stamp(), "2010-10-27T18:43:32Z!esr@thyrsus.com");
    }

    #[test]
    fn test_contributor_map_roundtrip() {
        let text = "\
# project contributors
esr = Eric S. Raymond <esr@thyrsus.com> +0500
fred = Fred Flintstone <fred@bedrock.example.com>
";
        let map = ContributorMap::read(text.as_bytes()).unwrap();
        assert_eq!(map.entries.len(), 2);
        assert_eq!(map.entries[0].local, "esr");
        assert_eq!(map.entries[0].timezone.as_deref(), Some("+0500"));
        let mut out = Vec::new();
        map.write(&mut out).unwrap();
        let reread = ContributorMap::read(out.as_slice()).unwrap();
        assert_eq!(map, reread);
    }

    #[test]
    fn test_apply_rewrites_shortname() {
        let map = ContributorMap::read("fred = Fred Flintstone <fred@bedrock.example.com>".as_bytes())
            .unwrap();
        let mut attribution = Attribution::parse(b"fred <fred> 100 +0000".into()).unwrap();
        assert!(map.apply_to(&mut attribution));
        assert_eq!(attribution.name, "Fred Flintstone");
        assert_eq!(attribution.email, "fred@bedrock.example.com");
    }
}
