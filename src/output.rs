//! Output formatting for filter results

use crate::corpus::ChunkRecord;
use crate::query::candidate::Allowlist;
use crate::query::diagnostics::{FilterEvent, PrefilterSkip};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn color_choice(color: bool) -> ColorChoice {
    if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Print matching chunks, one per line: `file:id kind author`
pub fn print_chunks(chunks: &[&ChunkRecord], color: bool) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice(color));

    for chunk in chunks {
        // Print path
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(stdout, "{}", chunk.normalized_file())?;
        stdout.reset()?;
        write!(stdout, ":")?;

        // Print chunk id
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(stdout, "{}", chunk.id)?;
        stdout.reset()?;

        let kinds = chunk.kind.to_vec();
        if !kinds.is_empty() {
            stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(stdout, " {}", kinds.join(","))?;
            stdout.reset()?;
        }

        let authors = chunk.last_author.to_vec();
        if !authors.is_empty() {
            write!(stdout, " ({})", authors.join(", "))?;
        }
        writeln!(stdout)?;
    }

    Ok(())
}

/// Print matching chunks as a JSON array of records
pub fn print_chunks_json(chunks: &[&ChunkRecord]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, chunks).map_err(io::Error::other)?;
    writeln!(out)
}

/// Print an allowlist: `unrestricted`, or its size followed by sorted ids
pub fn print_allowlist(allowlist: Option<&Allowlist>, color: bool) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(color_choice(color));

    let Some(allowlist) = allowlist else {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        writeln!(stdout, "unrestricted")?;
        stdout.reset()?;
        return Ok(());
    };

    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(stdout, "{}", allowlist.len())?;
    stdout.reset()?;
    writeln!(stdout, " {}", if allowlist.is_bitmap() { "ids (bitmap)" } else { "ids" })?;

    let ids: Vec<String> = allowlist.to_sorted_vec().iter().map(|id| id.to_string()).collect();
    if !ids.is_empty() {
        writeln!(stdout, "{}", ids.join(" "))?;
    }
    Ok(())
}

/// One-line description of a diagnostic event
pub fn describe_event(event: &FilterEvent) -> String {
    match event {
        FilterEvent::RegexFallback { pattern, reason, needle } => {
            format!("regex {} fell back to substring {:?}: {}", pattern, needle, reason)
        }
        FilterEvent::PrefilterSkipped(skip) => match skip {
            PrefilterSkip::Disabled => "file prefilter disabled".to_string(),
            PrefilterSkip::NoIndex => "file prefilter skipped: no index".to_string(),
            PrefilterSkip::ChargramMismatch { requested, indexed } => format!(
                "file prefilter skipped: requested n={} but index uses n={}",
                requested, indexed
            ),
            PrefilterSkip::NoUsableLiteral { matcher } => {
                format!("file prefilter skipped: {} has no usable literal", matcher)
            }
        },
        FilterEvent::CandidatesResolved { clauses, size } => {
            format!("{} index clause(s) resolved to {} candidate(s)", clauses, size)
        }
        FilterEvent::ShortCircuit => "no candidates; scan skipped".to_string(),
        FilterEvent::Scanned { chunks } => format!("scanned {} chunk(s)", chunks),
    }
}

/// Print diagnostic events to stderr
pub fn print_events(events: &[FilterEvent], color: bool) -> io::Result<()> {
    let mut stderr = StandardStream::stderr(color_choice(color));
    for event in events {
        let warn = matches!(event, FilterEvent::RegexFallback { .. });
        let fg = if warn { Color::Yellow } else { Color::Blue };
        stderr.set_color(ColorSpec::new().set_fg(Some(fg)))?;
        write!(stderr, "{}", if warn { "warn" } else { "note" })?;
        stderr.reset()?;
        writeln!(stderr, ": {}", describe_event(event))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_event() {
        assert_eq!(describe_event(&FilterEvent::Scanned { chunks: 3 }), "scanned 3 chunk(s)");
        assert_eq!(
            describe_event(&FilterEvent::PrefilterSkipped(PrefilterSkip::ChargramMismatch {
                requested: 4,
                indexed: 3
            })),
            "file prefilter skipped: requested n=4 but index uses n=3"
        );
        let fallback = FilterEvent::RegexFallback {
            pattern: "/a(/".into(),
            reason: "unclosed group".into(),
            needle: "a".into(),
        };
        assert!(describe_event(&fallback).starts_with("regex /a(/ fell back"));
    }
}
