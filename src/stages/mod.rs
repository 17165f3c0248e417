pub mod archive;
pub mod build;
pub mod convert;
pub mod sync;

pub use archive::archive_site;
pub use build::{SiteBuildStage, apply_overlay};
pub use convert::ConversionStage;
pub use sync::{SyncReport, copy_recursive, sync_all};
