pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, load_or_default, ConfigError, CONFIG_FILE};
pub use schema::{
    Config, EncodingSection, IndexSection, TreeSection, ValidationError, ValidationIssue,
    WriteSection,
};
