// Keystack Config API
// Key expression parsing and TOML declaration files

pub mod key_parser;
pub mod parser;

pub use key_parser::{parse_key_string, KeyParseError, ParsedKey};
pub use parser::{parse_output, Config, ConfigError, ConfigToml, OneOrMany};
