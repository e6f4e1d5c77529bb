use iconstage_assets::AssetStore;
use iconstage_kernel::Scene;

use crate::device::Device;
use crate::error::RenderError;

/// The mutable state a render operates on.
///
/// Renders borrow the host exclusively for their whole duration.
#[derive(Debug)]
pub struct RenderHost {
    pub scene: Scene,
    pub assets: AssetStore,
    pub device: Device,
}

impl RenderHost {
    /// An empty scene and asset store drawing through `device`.
    pub fn new(device: Device) -> Self {
        Self {
            scene: Scene::new(),
            assets: AssetStore::new(),
            device,
        }
    }

    /// An empty host on a freshly opened headless GPU device.
    pub fn headless() -> Result<Self, RenderError> {
        Device::headless().map(Self::new)
    }
}

/// A host on the shared test device, or `None` without a usable adapter.
#[cfg(test)]
pub(crate) fn test_host() -> Option<RenderHost> {
    crate::gpu::test_gpu().map(|gpu| RenderHost::new(Device::new(gpu)))
}
