//! PDF parsing module.

mod content;
mod options;
mod pdf_parser;
mod structure;
mod text;

pub use options::{ErrorMode, ParseOptions};
pub use pdf_parser::PdfParser;
pub use text::{clean_text, parse_pdf_date};

pub(crate) use content::{page_content, page_resources, resolve_dict};
pub(crate) use pdf_parser::{AnnotationKind, AnnotationTarget};
pub(crate) use text::format_pdf_date;
