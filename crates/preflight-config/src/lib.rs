//! Layered YAML configuration loading and merging: discovers a config
//! root, reads its `targets` document, loads and deep-merges the named
//! target's layers, and resolves per-target path overrides. Never
//! touches secret values — references stay symbolic until a provider
//! resolves them.

pub mod layer;
pub mod loader;
pub mod merge;
pub mod path;
pub mod value;

pub use layer::{Layer, LayerMetadata};
pub use loader::{discover_config_root, load_target, LoadedConfig};
pub use merge::{merge_layers, Lineage};
pub use path::{is_within_root, resolve_target_path};
pub use value::{ConfigValue, Scalar};
