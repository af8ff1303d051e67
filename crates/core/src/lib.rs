mod apply;
mod config;
mod exif_reader;
mod extractor;
mod heif;
mod media;
mod metadata;
mod planner;
mod report;
mod resolver;
mod run;
mod timestamp;
mod video_probe;
mod xmp_reader;

pub use chrono_tz::Tz;

pub use apply::{apply_plan, ApplyResult};
pub use config::{
    app_paths, load_config, parse_config, parse_zone, AppConfig, AppPaths,
    DEFAULT_LOG_BASE_NAME, DEFAULT_TIMEZONE,
};
pub use exif_reader::{read_exif_block_date, read_exif_date};
pub use extractor::{ExtractionError, Extractor};
pub use heif::{read_heif_metadata, HeifError, HeifMetadata};
pub use media::MediaCategory;
pub use metadata::{DateSource, FileRecord, ResolvedDate};
pub use planner::{
    assign_names, build_file_name, generate_plan, sequence_width, sort_records, PlanOptions,
    RenameCandidate, RenamePlan, RenameStats, FALLBACK_PREFIX,
};
pub use report::{
    unique_log_path, LogFileReporter, MemoryReporter, Reporter, RunContext, RunEvent, RunStage,
};
pub use resolver::DateResolver;
pub use run::{rename_folder, RunOptions, RunSummary};
pub use timestamp::{attach_zone, parse_timestamp, ParseError, RawFormat};
pub use video_probe::VideoProbe;
pub use xmp_reader::{find_namespaced_value, read_xmp_create_date, XMP_BASIC_NS};
