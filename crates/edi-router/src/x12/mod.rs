//! X12 envelope parsing
//!
//! Only the envelope layers are read: ISA (interchange), GS (functional
//! group) and ST (transaction set). Delimiters are discovered from the ISA
//! segment of each document, so any element separator, segment terminator
//! or component separator the sender chose is accepted.
//!
//! ```
//! use edi_router::x12::EnvelopeParser;
//!
//! let edi = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
//!            *250101*1200*^*00501*000000001*0*P*:~GS*PO*SENDER*RECEIVER*20250101*1200*1*X*005010~\
//!            ST*850*0001~SE*2*0001~GE*1*1~IEA*1*000000001~";
//! let interchange = EnvelopeParser::new().parse(edi).unwrap();
//! assert_eq!(interchange.summary().document_type, "850");
//! ```

pub mod models;
pub mod parser;

pub use models::{
    Delimiters, EnvelopeSummary, FunctionalGroup, GroupHeader, Interchange, InterchangeHeader,
    TransactionSet, UNKNOWN_DOCUMENT_TYPE,
};
pub use parser::EnvelopeParser;
