//! Artifact naming and format constants shared by the pipeline and the CLI.

/// Archive and report artifact names
pub mod artifacts {
    /// Suffix appended to the product identifier for archive downloads
    pub const ARCHIVE_FILE_SUFFIX: &str = "_images.zip";

    /// File name of the missing-image report
    pub const REPORT_FILE_NAME: &str = "missing_images_report.csv";

    /// Header row of the missing-image report
    pub const REPORT_HEADER: [&str; 5] = ["sku", "title", "category", "listingType", "missingImageLabels"];

    /// Separator used when joining several labels into one report field
    pub const LABEL_SEPARATOR: &str = ",";
}

/// Image labelling
pub mod labels {
    /// Label of the first image of a product
    pub const MAIN_LABEL: &str = "MAIN";

    /// Prefix of every subsequent image label (`PT01`, `PT02`, ...)
    pub const PART_PREFIX: &str = "PT";
}

/// Content-type handling
pub mod media {
    /// Extension used when a response carries no recognizable image type
    pub const DEFAULT_EXTENSION: &str = ".jpg";

    /// Known image MIME types and the archive extension used for each
    pub const KNOWN_IMAGE_TYPES: &[(&str, &str)] = &[
        ("image/jpeg", ".jpg"),
        ("image/jpg", ".jpg"),
        ("image/pjpeg", ".jpg"),
        ("image/png", ".png"),
        ("image/gif", ".gif"),
        ("image/webp", ".webp"),
        ("image/avif", ".avif"),
        ("image/bmp", ".bmp"),
        ("image/svg+xml", ".svg"),
        ("image/tiff", ".tiff"),
    ];
}

/// Pipeline concurrency and deadline defaults
pub mod pipeline {
    /// Concurrency for single-product archive exports
    pub const ARCHIVE_CONCURRENCY: usize = 4;

    /// Concurrency for the catalog-wide report
    pub const REPORT_CONCURRENCY: usize = 8;

    /// Head-only probe deadline in milliseconds
    pub const PROBE_HEAD_TIMEOUT_MS: u64 = 8_000;

    /// Full-load fallback deadline in milliseconds, covering download and decode
    pub const PROBE_LOAD_TIMEOUT_MS: u64 = 12_000;

    /// Archive fetch deadline in milliseconds
    pub const FETCH_TIMEOUT_MS: u64 = 15_000;
}

/// Progress narrative
pub mod progress {
    /// Initial progress text shown before any task settles
    pub const INITIAL_MESSAGE: &str = "Initializing download...";
}
