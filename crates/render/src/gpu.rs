//! Headless wgpu device shared by every offscreen target.

use std::sync::Arc;

use crate::error::RenderError;

/// Color format of offscreen targets and sprite textures.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A wgpu device and queue without a surface.
///
/// Cheap to clone; clones share the device.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    adapter_name: Arc<str>,
    /// Multisample counts usable for both the color and the depth format, ascending.
    sample_counts: Arc<[u32]>,
}

impl GpuContext {
    /// Open a device on the first available adapter, falling back to a
    /// software adapter when no hardware one is present. Blocks until ready.
    pub fn headless() -> Result<Self, RenderError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Some(adapter) => adapter,
            None => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface: None,
                    force_fallback_adapter: true,
                })
                .await
                .ok_or_else(|| RenderError::gpu("no adapter available"))?,
        };

        // Per-adapter format features unlock sample counts beyond 4.
        let format_features = wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        let adapter_specific = adapter.features().contains(format_features);
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("iconstage_device"),
                    required_features: if adapter_specific {
                        format_features
                    } else {
                        wgpu::Features::empty()
                    },
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::gpu(format!("device request failed: {e}")))?;

        let sample_counts: Vec<u32> = if adapter_specific {
            let color = adapter.get_texture_format_features(COLOR_FORMAT).flags;
            let depth = adapter.get_texture_format_features(DEPTH_FORMAT).flags;
            [1, 2, 4, 8, 16]
                .into_iter()
                .filter(|&n| n == 1 || (color.sample_count_supported(n) && depth.sample_count_supported(n)))
                .collect()
        } else {
            vec![1, 4]
        };

        let info = adapter.get_info();
        tracing::debug!(
            adapter = %info.name,
            backend = ?info.backend,
            ?sample_counts,
            "opened headless gpu device"
        );
        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name: info.name.into(),
            sample_counts: sample_counts.into(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Highest supported multisample count not above `requested`; at least 1.
    pub fn sample_count(&self, requested: u32) -> u32 {
        snap_sample_count(&self.sample_counts, requested)
    }
}

fn snap_sample_count(supported: &[u32], requested: u32) -> u32 {
    supported
        .iter()
        .copied()
        .filter(|&n| n <= requested.max(1))
        .max()
        .unwrap_or(1)
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_name)
            .field("sample_counts", &self.sample_counts)
            .finish_non_exhaustive()
    }
}

/// One device for the whole test binary. `None` when the machine has no
/// usable adapter; tests that need to draw return early in that case.
#[cfg(test)]
pub(crate) fn test_gpu() -> Option<GpuContext> {
    static GPU: std::sync::OnceLock<Option<GpuContext>> = std::sync::OnceLock::new();
    GPU.get_or_init(|| match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("gpu tests skipped: {e}");
            None
        }
    })
    .clone()
}
