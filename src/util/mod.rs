pub mod time_parser;

pub use time_parser::{parse_time, parse_time_with_base, TimeParseError};
