use url::Url;

use crate::search::{RawDocument, SearchError};

const DETAIL_VIEW_URL: &str = "http://click.ndsl.kr/servlet/OpenAPIDetailView";
const NO_ABSTRACT: &str = "없음";

const META_CODE_CN: &str = "CN";
const META_NAME_TITLE: &str = "논문명";
const META_NAME_ABSTRACT: &str = "초록";
const META_NAME_LINK: &str = "ScienceON상세링크";
const META_NAME_AUTHOR: &str = "저자";
const META_NAME_JOURNAL: &str = "저널명";
const META_NAME_PUBLISHER: &str = "출판사(발행기관)";
const META_NAME_YEAR: &str = "발행년";

/// Parses one search response page into raw records, in response order.
pub(super) fn parse_search_response(body: &str) -> Result<Vec<RawDocument>, SearchError> {
    let body = body.trim_start_matches('\u{feff}').trim();
    if !body.starts_with('<') {
        let end = body.floor_char_boundary(120);
        return Err(SearchError::Malformed(format!(
            "expected XML, got: {}",
            &body[..end]
        )));
    }

    if let Some(code) = first_element(body, "errorCode").map(|e| decode_text(e.body))
        && !code.is_empty()
    {
        let message = first_element(body, "errorMessage")
            .map(|e| decode_text(e.body))
            .unwrap_or_default();
        return Err(SearchError::Rejected { code, message });
    }

    let Some(record_list) = first_element(body, "recordList") else {
        return Ok(Vec::new());
    };

    Ok(elements(record_list.body, "record")
        .into_iter()
        .filter_map(|record| parse_record(record.body))
        .collect())
}

fn parse_record(record: &str) -> Option<RawDocument> {
    let mut doc = RawDocument::default();
    let mut link = None;

    for item in elements(record, "item") {
        let text = decode_text(item.body);
        if text.is_empty() {
            continue;
        }
        if attribute(item.attrs, "metaCode").as_deref() == Some(META_CODE_CN) {
            doc.identifier = Some(text);
            continue;
        }
        let slot = match attribute(item.attrs, "metaName").as_deref() {
            Some(META_NAME_TITLE) => {
                doc.title = text;
                continue;
            }
            Some(META_NAME_ABSTRACT) if text == NO_ABSTRACT => continue,
            Some(META_NAME_ABSTRACT) => &mut doc.abstract_text,
            Some(META_NAME_LINK) => &mut link,
            Some(META_NAME_AUTHOR) => &mut doc.author,
            Some(META_NAME_JOURNAL) => &mut doc.journal,
            Some(META_NAME_PUBLISHER) => &mut doc.publisher,
            Some(META_NAME_YEAR) => &mut doc.year,
            _ => continue,
        };
        *slot = Some(text);
    }

    if doc == RawDocument::default() && link.is_none() {
        return None;
    }

    doc.source_url = link.or_else(|| doc.identifier.as_deref().and_then(detail_url));
    Some(doc)
}

fn detail_url(cn: &str) -> Option<String> {
    let url = Url::parse_with_params(
        DETAIL_VIEW_URL,
        &[("keyValue", cn), ("target", "NART"), ("cn", cn)],
    )
    .ok()?;
    Some(url.into())
}

struct Element<'a> {
    attrs: &'a str,
    body: &'a str,
}

fn first_element<'a>(input: &'a str, tag: &str) -> Option<Element<'a>> {
    elements(input, tag).into_iter().next()
}

/// Non-nested elements named `tag`, in document order. Self-closing elements
/// yield an empty body.
fn elements<'a>(input: &'a str, tag: &str) -> Vec<Element<'a>> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find(&open) {
        let after_name = &rest[start + open.len()..];
        // Skip longer names sharing the prefix, e.g. <recordList> when looking for <record>.
        if !after_name.starts_with(['>', '/', ' ', '\t', '\r', '\n']) {
            rest = after_name;
            continue;
        }
        let Some(tag_end) = after_name.find('>') else {
            break;
        };
        let attrs = &after_name[..tag_end];
        let after_open = &after_name[tag_end + 1..];

        if let Some(attrs) = attrs.strip_suffix('/') {
            found.push(Element { attrs, body: "" });
            rest = after_open;
            continue;
        }

        let Some(end) = after_open.find(&close) else {
            break;
        };
        found.push(Element {
            attrs,
            body: &after_open[..end],
        });
        rest = &after_open[end + close.len()..];
    }
    found
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let mut rest = attrs;
    loop {
        let pos = rest.find(name)?;
        let preceded_ok = rest[..pos]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        let after = rest[pos + name.len()..].trim_start();
        if preceded_ok && let Some(after_eq) = after.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let quote = after_eq.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let value = &after_eq[1..];
            let end = value.find(quote)?;
            return Some(decode_entities(&value[..end]));
        }
        rest = &rest[pos + name.len()..];
    }
}

/// Element text with CDATA sections unwrapped and entities decoded elsewhere.
fn decode_text(raw: &str) -> String {
    let mut out = String::new();
    let mut rest = raw;
    while let Some(start) = rest.find("<![CDATA[") {
        out.push_str(&decode_entities(&rest[..start]));
        let inner = &rest[start + "<![CDATA[".len()..];
        match inner.find("]]>") {
            Some(end) => {
                out.push_str(&inner[..end]);
                rest = &inner[end + "]]>".len()..];
            }
            None => {
                out.push_str(inner);
                rest = "";
            }
        }
    }
    out.push_str(&decode_entities(rest));
    out.trim().to_string()
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
