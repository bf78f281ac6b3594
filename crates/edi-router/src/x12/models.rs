//! X12 envelope data model
//!
//! Built once per parse call and never mutated afterwards.

use serde::Serialize;

/// Placeholder document type when an interchange carries no ST segment
pub const UNKNOWN_DOCUMENT_TYPE: &str = "UNKNOWN";

/// The four delimiters an interchange declares about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delimiters {
    /// Character immediately after the `ISA` tag
    pub element: char,
    /// Character immediately after ISA16
    pub segment: char,
    /// True when the segment terminator is `\r` followed by `\n`
    pub segment_crlf: bool,
    /// From ISA11, `^` when empty
    pub repetition: char,
    /// From ISA16, `:` when empty
    pub component: char,
}

/// ISA01..ISA16, kept verbatim (including the fixed-width padding)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterchangeHeader {
    pub authorization_qualifier: String,
    pub authorization_information: String,
    pub security_qualifier: String,
    pub security_information: String,
    pub sender_qualifier: String,
    pub sender_id: String,
    pub receiver_qualifier: String,
    pub receiver_id: String,
    /// YYMMDD
    pub date: String,
    /// HHMM
    pub time: String,
    pub repetition_separator: String,
    pub control_version: String,
    pub control_number: String,
    pub acknowledgment_requested: String,
    pub usage_indicator: String,
    pub component_separator: String,
}

impl InterchangeHeader {
    pub(crate) fn from_elements(elements: [String; 16]) -> Self {
        let [authorization_qualifier, authorization_information, security_qualifier, security_information, sender_qualifier, sender_id, receiver_qualifier, receiver_id, date, time, repetition_separator, control_version, control_number, acknowledgment_requested, usage_indicator, component_separator] =
            elements;

        Self {
            authorization_qualifier,
            authorization_information,
            security_qualifier,
            security_information,
            sender_qualifier,
            sender_id,
            receiver_qualifier,
            receiver_id,
            date,
            time,
            repetition_separator,
            control_version,
            control_number,
            acknowledgment_requested,
            usage_indicator,
            component_separator,
        }
    }
}

/// GS01..GS08
///
/// `None` means the element was absent from the segment; `Some("")` means it
/// was present but empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupHeader {
    pub functional_identifier: Option<String>,
    pub application_sender: Option<String>,
    pub application_receiver: Option<String>,
    /// CCYYMMDD
    pub date: Option<String>,
    pub time: Option<String>,
    pub control_number: Option<String>,
    pub responsible_agency: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSet {
    /// ST01, e.g. "850"
    pub identifier_code: Option<String>,
    /// ST02
    pub control_number: Option<String>,
    /// Zero-based position across the whole interchange
    pub index_in_interchange: usize,
    /// Zero-based position inside the owning group
    pub index_in_group: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionalGroup {
    pub header: GroupHeader,
    /// Created to hold ST segments that appeared before any GS
    pub synthetic: bool,
    pub transaction_sets: Vec<TransactionSet>,
}

impl FunctionalGroup {
    pub(crate) fn new(header: GroupHeader) -> Self {
        Self {
            header,
            synthetic: false,
            transaction_sets: Vec::new(),
        }
    }

    pub(crate) fn synthetic() -> Self {
        Self {
            header: GroupHeader::default(),
            synthetic: true,
            transaction_sets: Vec::new(),
        }
    }
}

/// A parsed ISA envelope with its groups in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interchange {
    pub header: InterchangeHeader,
    pub delimiters: Delimiters,
    pub groups: Vec<FunctionalGroup>,
}

impl Interchange {
    /// All transaction sets in interchange order
    pub fn transaction_sets(&self) -> impl Iterator<Item = &TransactionSet> {
        self.groups.iter().flat_map(|g| g.transaction_sets.iter())
    }

    pub fn transaction_count(&self) -> usize {
        self.groups.iter().map(|g| g.transaction_sets.len()).sum()
    }

    pub fn summary(&self) -> EnvelopeSummary {
        let document_type = self
            .transaction_sets()
            .find_map(|ts| ts.identifier_code.clone())
            .unwrap_or_else(|| UNKNOWN_DOCUMENT_TYPE.to_string());

        EnvelopeSummary {
            document_type,
            sender: self.header.sender_id.trim().to_string(),
            receiver: self.header.receiver_id.trim().to_string(),
            groups: self.groups.len(),
            transactions: self.transaction_count(),
        }
    }
}

/// What the pipeline logs about each ingested file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeSummary {
    pub document_type: String,
    pub sender: String,
    pub receiver: String,
    pub groups: usize,
    pub transactions: usize,
}

impl std::fmt::Display for EnvelopeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Type: {}, Sender: {}, Receiver: {} ({} groups, {} transactions)",
            self.document_type, self.sender, self.receiver, self.groups, self.transactions
        )
    }
}
