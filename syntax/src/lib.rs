#[macro_use]
mod macros;
mod parse;
pub use parse::Error;

/// Borrowed representations of parsed documents
pub mod ast;

/// `key = value` config files
mod ini;
pub use ini::{parse_ini, Ini, IniSection};

/// Instrument sample sheets
mod sheet;
pub use sheet::{DataTable, SampleSheet};

/// `{placeholder}` command templates
mod template;
pub use template::{parse_template, Piece};
