pub mod downloader;
pub mod fs;
pub mod mirror_pool;
pub mod network;
pub mod settings;
pub mod telemetry;

pub use downloader::HttpDownloader;
pub use fs::{FsPatchStore, FsRunConfigScanner};
pub use mirror_pool::GlobalMirrorPoolCache;
