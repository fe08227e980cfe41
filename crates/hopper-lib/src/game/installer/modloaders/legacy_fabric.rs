//! LegacyFabric targets pre-1.14 Minecraft through a Fabric-shaped meta API.
//! Newer loader builds stop shading their server launch jar.
use super::fabric::{MetaFlavor, MetaLoader};

pub fn loader() -> MetaLoader {
    MetaLoader::new(MetaFlavor::LegacyFabric)
}
