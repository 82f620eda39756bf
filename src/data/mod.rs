//! Data module
//!
//! Labeled series containers, archive loading, input checking and
//! seeded splitting.

mod check;
mod dataset;
pub mod loader;
pub mod split;

pub use check::{sanitize_features, DataCheck, LabelEncoder, Task};
pub use dataset::{count_classes, SeriesDataset};
pub use loader::{ArchiveLoader, DatasetSplits, RawSplit};
pub use split::{holdout_split, k_fold, Split};
