//! Quilt publishes a Fabric-shaped meta API with its own endpoints.
use super::fabric::{MetaFlavor, MetaLoader};

pub fn loader() -> MetaLoader {
    MetaLoader::new(MetaFlavor::Quilt)
}
