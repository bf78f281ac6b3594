// X12 envelope parser
//
// Reads ISA/GS/ST headers only. Delimiters are learned from the ISA segment of
// the document being parsed; nothing here is configured.

use super::models::{
    Delimiters, FunctionalGroup, GroupHeader, Interchange, InterchangeHeader, TransactionSet,
};
use crate::error::X12Error;

const ISA_TAG: &str = "ISA";
const GS_TAG: &str = "GS";
const ST_TAG: &str = "ST";

const ISA_ELEMENT_COUNT: usize = 16;

const DEFAULT_REPETITION_SEPARATOR: char = '^';
const DEFAULT_COMPONENT_SEPARATOR: char = ':';

/// Segment terminators recognised while the real one is still unknown
const PROVISIONAL_TERMINATORS: [char; 3] = ['~', '\n', '\r'];

/// Segments that may directly follow the ISA segment
const FOLLOWING_TAGS: [&str; 4] = [GS_TAG, ST_TAG, "IEA", "TA1"];

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeParser;

impl EnvelopeParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw bytes, replacing invalid UTF-8 sequences
    pub fn parse_bytes(&self, data: &[u8]) -> Result<Interchange, X12Error> {
        self.parse(&String::from_utf8_lossy(data))
    }

    /// Parse the first interchange found in `edi`
    pub fn parse(&self, edi: &str) -> Result<Interchange, X12Error> {
        let (header, delimiters) = read_isa(edi)?;
        let segments = split_segments(edi, &delimiters);
        let groups = collect_groups(&segments, delimiters.element);

        Ok(Interchange {
            header,
            delimiters,
            groups,
        })
    }
}

fn read_isa(edi: &str) -> Result<(InterchangeHeader, Delimiters), X12Error> {
    let isa_start = edi.find(ISA_TAG).ok_or(X12Error::MissingIsa)?;
    let after_tag = isa_start + ISA_TAG.len();

    let element = edi[after_tag..]
        .chars()
        .next()
        .ok_or(X12Error::TruncatedAfterIsa)?;
    let mut cursor = after_tag + element.len_utf8();

    // ISA01..ISA15 are each closed by the element separator
    let mut elements: Vec<String> = Vec::with_capacity(ISA_ELEMENT_COUNT);
    while elements.len() < ISA_ELEMENT_COUNT - 1 {
        let Some(offset) = edi[cursor..].find(element) else {
            let trailing = usize::from(!edi[cursor..].is_empty());
            return Err(X12Error::IncompleteIsa {
                found: elements.len() + trailing,
            });
        };
        elements.push(edi[cursor..cursor + offset].to_string());
        cursor += offset + element.len_utf8();
    }

    // ISA16 is closed by the segment terminator, which is not known yet
    let isa16_end = find_isa16_end(edi, cursor, element)?;
    elements.push(edi[cursor..isa16_end].to_string());
    cursor = isa16_end;

    let segment = edi[cursor..]
        .chars()
        .next()
        .ok_or(X12Error::MissingSegmentTerminator)?;
    let segment_crlf = segment == '\r' && edi[cursor + segment.len_utf8()..].starts_with('\n');

    let elements: [String; ISA_ELEMENT_COUNT] = elements
        .try_into()
        .map_err(|found: Vec<String>| X12Error::IncompleteIsa { found: found.len() })?;

    let repetition = elements[10]
        .chars()
        .next()
        .unwrap_or(DEFAULT_REPETITION_SEPARATOR);
    let component = elements[15]
        .chars()
        .next()
        .unwrap_or(DEFAULT_COMPONENT_SEPARATOR);

    let delimiters = Delimiters {
        element,
        segment,
        segment_crlf,
        repetition,
        component,
    };

    Ok((InterchangeHeader::from_elements(elements), delimiters))
}

/// Byte offset where ISA16 ends, i.e. where the segment terminator sits.
///
/// ISA16 runs up to the first `~`, `\n` or `\r`, and is never split on the
/// element separator. When that scan would make ISA16 longer than one
/// character without an element separator in second position, the document
/// uses some other terminator and ISA16 is fixed width: one character, or
/// empty when the character right after ISA15 already ends the segment. The
/// candidate whose terminator is followed by the next segment tag wins.
fn find_isa16_end(edi: &str, start: usize, element: char) -> Result<usize, X12Error> {
    let rest = &edi[start..];
    let scanned = rest
        .find(|c: char| PROVISIONAL_TERMINATORS.contains(&c))
        .map(|offset| start + offset);

    let mut chars = rest.chars();
    let first = chars.next();
    let second = chars.next();
    let first_width = first.map_or(0, char::len_utf8);

    match (scanned, first, second) {
        (Some(end), _, _) if end - start <= first_width => return Ok(end),
        (Some(end), _, Some(next)) if next == element => return Ok(end),
        (_, Some(_), Some(_)) => {},
        (Some(end), _, _) => return Ok(end),
        (None, _, _) => return Ok(edi.len()),
    }

    let one_wide = start + first_width;
    if terminates_segment(edi, one_wide, element) {
        return Ok(one_wide);
    }
    if terminates_segment(edi, start, element) {
        return Ok(start);
    }

    // a letter or digit is never a usable terminator
    match second {
        Some(terminator) if terminator.is_alphanumeric() => Err(X12Error::MissingSegmentTerminator),
        _ => Ok(one_wide),
    }
}

/// Whether the character at `at` reads as a segment terminator: it is
/// followed by the end of input or by an envelope segment tag.
fn terminates_segment(edi: &str, at: usize, element: char) -> bool {
    let Some(terminator) = edi[at..].chars().next() else {
        return false;
    };
    let after = edi[at + terminator.len_utf8()..].trim_start_matches(['\r', '\n']);
    if after.is_empty() {
        return true;
    }
    FOLLOWING_TAGS.iter().any(|tag| {
        after
            .strip_prefix(*tag)
            .is_some_and(|tail| tail.starts_with(element))
    })
}

/// Split the whole document on the segment terminator.
///
/// Segments are trimmed, blank ones are dropped, and an unterminated tail is
/// kept.
fn split_segments<'a>(edi: &'a str, delimiters: &Delimiters) -> Vec<&'a str> {
    edi.split(delimiters.segment)
        .map(|raw| {
            if delimiters.segment_crlf {
                raw.strip_prefix('\n').unwrap_or(raw)
            } else {
                raw
            }
        })
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn collect_groups(segments: &[&str], element: char) -> Vec<FunctionalGroup> {
    let mut groups: Vec<FunctionalGroup> = Vec::new();
    let mut index_in_interchange = 0;

    for segment in segments {
        // str::split keeps empty and trailing elements: "GS*PO**2025" -> ["GS", "PO", "", "2025"]
        let elements: Vec<&str> = segment.split(element).collect();

        match elements.first().copied() {
            Some(GS_TAG) => {
                groups.push(FunctionalGroup::new(GroupHeader {
                    functional_identifier: value(&elements, 1),
                    application_sender: value(&elements, 2),
                    application_receiver: value(&elements, 3),
                    date: value(&elements, 4),
                    time: value(&elements, 5),
                    control_number: value(&elements, 6),
                    responsible_agency: value(&elements, 7),
                    version: value(&elements, 8),
                }));
            },
            Some(ST_TAG) => {
                if groups.is_empty() {
                    tracing::debug!("ST segment before any GS, holding it in a synthetic group");
                    groups.push(FunctionalGroup::synthetic());
                }
                if let Some(group) = groups.last_mut() {
                    group.transaction_sets.push(TransactionSet {
                        identifier_code: value(&elements, 1),
                        control_number: value(&elements, 2),
                        index_in_interchange,
                        index_in_group: group.transaction_sets.len(),
                    });
                    index_in_interchange += 1;
                }
            },
            _ => {},
        }
    }

    groups
}

fn value(elements: &[&str], index: usize) -> Option<String> {
    elements.get(index).map(|s| (*s).to_string())
}
