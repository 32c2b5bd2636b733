use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};

use super::entry::{FeedEntry, ParsedFeed, Tag};
use super::FeedError;
use crate::model::FeedType;

/// Extension and timestamp text for one entry, captured verbatim.
#[derive(Debug, Clone, Default)]
struct RawEntryFields {
    updated: Option<String>,
    published: Option<String>,
    portal_type: Option<String>,
    deletion_type: Option<String>,
    tile_urls: Option<String>,
    deleted_tile_urls: Option<String>,
}

/// Parse an Atom or RSS document into a [`ParsedFeed`].
///
/// `feed-rs` provides the standard model (ids, links, titles, categories).
/// It neither keeps unknown namespaced elements nor reports unparsable
/// dates, so a second `quick-xml` pass collects the `push:` extension
/// elements and the raw timestamp text for each entry.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, FeedError> {
    let feed = parser::parse(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;
    let raw_fields = scan_entry_fields(bytes)?;

    if raw_fields.len() != feed.entries.len() {
        tracing::warn!(
            parsed = feed.entries.len(),
            scanned = raw_fields.len(),
            "Entry count mismatch between parsers, extension fields may be missing"
        );
    }

    let feed_link = pick_feed_link(&feed.links);
    let origin = feed_link.as_deref().and_then(origin_from_link);
    tracing::debug!(
        feed_link = feed_link.as_deref().unwrap_or(""),
        origin = origin.map(FeedType::as_str).unwrap_or("unknown"),
        entries = feed.entries.len(),
        "Parsed feed"
    );

    let entries = feed
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let raw = raw_fields.get(index).cloned().unwrap_or_default();
            build_entry(entry, raw)
        })
        .collect();

    Ok(ParsedFeed {
        feed_link,
        origin,
        entries,
    })
}

fn build_entry(entry: Entry, raw: RawEntryFields) -> FeedEntry {
    let link = pick_entry_link(&entry.links);
    let title = entry.title.map(|t| t.content);
    let updated = raw.updated.or(raw.published);

    let existing_id = if entry.id.is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let id = generate_uid(
        existing_id,
        link.as_deref(),
        title.as_deref().unwrap_or(""),
        updated.as_deref(),
    );

    let tags = if entry.categories.is_empty() {
        None
    } else {
        Some(
            entry
                .categories
                .into_iter()
                .map(|c| Tag {
                    term: c.term,
                    label: c.label,
                })
                .collect(),
        )
    };

    FeedEntry {
        id,
        link,
        title,
        author: entry.authors.into_iter().next().map(|p| p.name),
        updated,
        summary: entry.summary.map(|s| s.content),
        content: entry
            .content
            .and_then(|c| c.body)
            .into_iter()
            .collect(),
        tags,
        portal_type: raw.portal_type,
        deletion_type: raw.deletion_type,
        tile_urls: raw.tile_urls,
        deleted_tile_urls: raw.deleted_tile_urls,
    }
}

fn generate_uid(
    existing: Option<&str>,
    url: Option<&str>,
    title: &str,
    updated: Option<&str>,
) -> String {
    if let Some(id) = existing {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        updated.unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

/// Prefer the `self` link, then the alternate link, then whatever comes first.
fn pick_feed_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("self"))
        .or_else(|| {
            links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        })
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

fn pick_entry_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

/// Infer the origin feed from the path of a link.
///
/// Only the path (and query) is inspected for absolute URLs so a host name
/// like `shared.example.com` does not count; relative links are checked as-is.
pub fn origin_from_link(link: &str) -> Option<FeedType> {
    match url::Url::parse(link) {
        Ok(url) => {
            let mut target = url.path().to_string();
            if let Some(query) = url.query() {
                target.push('?');
                target.push_str(query);
            }
            FeedType::from_feed_link(&target)
        }
        Err(_) => FeedType::from_feed_link(link),
    }
}

/// Collect extension and timestamp text for every `<entry>`/`<item>`, in
/// document order. Only direct children of the entry are considered, so a
/// nested `<source><updated>` does not shadow the entry's own timestamp.
fn scan_entry_fields(bytes: &[u8]) -> Result<Vec<RawEntryFields>, FeedError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations.
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<RawEntryFields> = None;
    // Depth relative to the current entry element (1 = direct child)
    let mut depth: usize = 0;
    let mut field: Option<Vec<u8>> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if current.is_none() {
                    if is_entry_element(&e) {
                        current = Some(RawEntryFields::default());
                        depth = 0;
                    }
                } else {
                    depth += 1;
                    if depth == 1 {
                        field = Some(e.local_name().as_ref().to_vec());
                        text.clear();
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(fields) = current.as_mut() {
                    if depth == 0 {
                        assign_field(fields, e.local_name().as_ref(), String::new());
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() && depth == 1 {
                    let value = t.unescape().map_err(|e| FeedError::Xml(e.to_string()))?;
                    text.push_str(&value);
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() && depth == 1 {
                    text.push_str(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Ok(Event::End(_)) if current.is_some() => {
                if depth == 0 {
                    if let Some(done) = current.take() {
                        entries.push(done);
                    }
                } else {
                    if depth == 1 {
                        if let (Some(fields), Some(name)) = (current.as_mut(), field.take()) {
                            assign_field(fields, &name, std::mem::take(&mut text));
                        }
                    }
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn is_entry_element(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"entry" | b"item")
}

fn assign_field(fields: &mut RawEntryFields, local_name: &[u8], value: String) {
    let value = value.trim().to_string();
    match local_name {
        b"updated" | b"modified" => fields.updated = Some(value),
        b"published" | b"pubDate" | b"date" => {
            if fields.published.is_none() {
                fields.published = Some(value);
            }
        }
        b"portal_type" => fields.portal_type = Some(value),
        b"deletion_type" => fields.deletion_type = Some(value),
        b"tile_urls" => fields.tile_urls = Some(value),
        b"deleted_tile_urls" => fields.deleted_tile_urls = Some(value),
        _ => {}
    }
}
