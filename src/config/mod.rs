pub mod metadata;
pub mod settings;

pub use metadata::{parse_definitions, CsvMetadata, MetadataSource};
pub use settings::{
    parse_interval,
    Config,
    DatabaseConfig,
    DiscoveryConfig,
    MetadataConfig,
    OutputConfig,
    OutputFormat,
    ParityConfig,
    PollingConfig,
    SerialConfig,
};
