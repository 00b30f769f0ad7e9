/// JSON document manifests and their loader.
pub mod manifest;
/// Document forest, layer kinds and the loader trait.
pub mod model;
