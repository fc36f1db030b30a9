pub mod bitmap;
pub mod build;
pub mod filter_index;
pub mod serialize;
pub mod stats;
pub mod store;
pub mod types;

pub use bitmap::{default_backend, BackendKind, Bitmap, BitmapBackend, PlainBackend, RoaringBackend};
pub use build::{build_filter_index, build_filter_index_for_corpus, build_filter_index_from_json};
pub use filter_index::{release_filter_index_memory, BitmapIndex, FilterIndex};
pub use serialize::{
    hydrate_filter_index, serialize_filter_index, validate_serialized_filter_index, SerializedFilterIndex,
};
pub use stats::{summarize_filter_index, FilterIndexStats};
pub use types::*;
