//! Offscreen render targets and the device-wide active-target binding.

use image::RgbaImage;
use std::collections::BTreeMap;

use crate::draw::Pipelines;
use crate::error::RenderError;
use crate::gpu::{GpuContext, COLOR_FORMAT, DEPTH_FORMAT};

/// Identifies a render target allocated on a [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u64);

/// GPU textures backing one offscreen target.
///
/// `color` is single-sampled and is what gets read back. With multisampling
/// the pass draws into `multisampled` and resolves into `color`.
#[derive(Debug)]
pub struct OffscreenTarget {
    width: u32,
    height: u32,
    samples: u32,
    pub(crate) color: wgpu::Texture,
    pub(crate) multisampled: Option<wgpu::Texture>,
    pub(crate) depth: wgpu::Texture,
}

impl OffscreenTarget {
    fn new(gpu: &GpuContext, width: u32, height: u32, samples: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = |label, format, sample_count, usage| {
            gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        let color = texture(
            "icon_color",
            COLOR_FORMAT,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let multisampled = (samples > 1).then(|| {
            texture(
                "icon_color_msaa",
                COLOR_FORMAT,
                samples,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        let depth = texture(
            "icon_depth",
            DEPTH_FORMAT,
            samples,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        Self {
            width: size.width,
            height: size.height,
            samples,
            color,
            multisampled,
            depth,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Multisample count the target was allocated with.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn destroy(self) {
        self.color.destroy();
        if let Some(msaa) = self.multisampled {
            msaa.destroy();
        }
        self.depth.destroy();
    }
}

/// Everything a draw into one target needs, borrowed from the [`Device`].
pub(crate) struct Frame<'a> {
    pub gpu: &'a GpuContext,
    pub target: &'a OffscreenTarget,
    pub pipelines: &'a Pipelines,
}

/// Owner of all offscreen targets and of the active-target binding.
///
/// The binding is shared state: whoever binds a target must restore the
/// previous binding when done.
#[derive(Debug)]
pub struct Device {
    gpu: GpuContext,
    targets: BTreeMap<TargetId, OffscreenTarget>,
    /// Render pipelines keyed by sample count, built on first use.
    pipelines: BTreeMap<u32, Pipelines>,
    next_id: u64,
    active: Option<TargetId>,
}

impl Device {
    /// A device with no targets on `gpu`.
    pub fn new(gpu: GpuContext) -> Self {
        Self {
            gpu,
            targets: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            next_id: 0,
            active: None,
        }
    }

    /// A device on a freshly opened headless GPU context.
    pub fn headless() -> Result<Self, RenderError> {
        GpuContext::headless().map(Self::new)
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Allocate a target. `samples` is snapped down to a count the adapter
    /// supports; the target's contents are undefined until first drawn.
    pub fn create_target(&mut self, width: u32, height: u32, samples: u32) -> TargetId {
        let samples = self.gpu.sample_count(samples);
        self.next_id += 1;
        let id = TargetId(self.next_id);
        self.targets
            .insert(id, OffscreenTarget::new(&self.gpu, width, height, samples));
        tracing::debug!(?id, width, height, samples, "created offscreen target");
        id
    }

    /// Free a target's GPU storage. Releasing the active target unbinds it.
    pub fn release_target(&mut self, id: TargetId) -> bool {
        if self.active == Some(id) {
            self.active = None;
        }
        match self.targets.remove(&id) {
            Some(target) => {
                target.destroy();
                true
            }
            None => false,
        }
    }

    /// Make `target` the active destination. Returns the previous binding.
    pub fn bind(&mut self, target: Option<TargetId>) -> Option<TargetId> {
        std::mem::replace(&mut self.active, target)
    }

    /// The target draws currently go to, if any.
    pub fn active(&self) -> Option<TargetId> {
        self.active
    }

    /// The target allocated as `id`, if it has not been released.
    pub fn target(&self, id: TargetId) -> Option<&OffscreenTarget> {
        self.targets.get(&id)
    }

    /// Number of targets currently allocated.
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Borrow what a draw into `id` needs, building pipelines for its sample
    /// count if this is the first target with that count.
    pub(crate) fn frame(&mut self, id: TargetId) -> Option<Frame<'_>> {
        let samples = self.targets.get(&id)?.samples;
        let gpu = &self.gpu;
        self.pipelines
            .entry(samples)
            .or_insert_with(|| Pipelines::new(&gpu.device, samples));
        Some(Frame {
            gpu: &self.gpu,
            target: self.targets.get(&id)?,
            pipelines: self.pipelines.get(&samples)?,
        })
    }

    /// Copy a target's resolved color into a straight-alpha bitmap.
    /// Blocks until the GPU has finished all submitted work.
    pub fn read_target(&self, id: TargetId) -> Result<RgbaImage, RenderError> {
        let target = self
            .targets
            .get(&id)
            .ok_or_else(|| RenderError::render("offscreen target is not allocated"))?;
        let (width, height) = (target.width, target.height);
        let unpadded = width * 4;
        let padded = align_to(unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("icon_readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RenderError::render("readback callback was dropped"))?
            .map_err(|e| RenderError::render(format!("mapping readback buffer failed: {e}")))?;

        let mut pixels = Vec::with_capacity(unpadded as usize * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();
        unpremultiply(&mut pixels);
        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::render("readback size does not match target"))
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Premultiplied RGBA8 in place to straight alpha. Fully transparent
/// pixels become all zero.
fn unpremultiply(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        match a {
            0 => px[..3].fill(0),
            255 => {}
            _ => {
                for c in &mut px[..3] {
                    *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_gpu;

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(align_to(128 * 4, 256), 512);
        assert_eq!(align_to(100 * 4, 256), 512);
        assert_eq!(align_to(1, 256), 256);
    }

    #[test]
    fn unpremultiply_restores_straight_alpha() {
        let mut px = [128, 0, 64, 128, 10, 20, 30, 255, 9, 9, 9, 0];
        unpremultiply(&mut px);
        assert_eq!(&px[..4], &[255, 0, 128, 128]);
        assert_eq!(&px[4..8], &[10, 20, 30, 255]);
        assert_eq!(&px[8..], &[0, 0, 0, 0]);
    }

    #[test]
    fn bind_returns_previous() {
        let Some(gpu) = test_gpu() else { return };
        let mut d = Device::new(gpu);
        let a = d.create_target(4, 4, 1);
        let b = d.create_target(4, 4, 1);
        assert_eq!(d.bind(Some(a)), None);
        assert_eq!(d.bind(Some(b)), Some(a));
        assert_eq!(d.active(), Some(b));
    }

    #[test]
    fn release_frees_and_unbinds() {
        let Some(gpu) = test_gpu() else { return };
        let mut d = Device::new(gpu);
        let a = d.create_target(4, 4, 1);
        d.bind(Some(a));
        assert!(d.release_target(a));
        assert_eq!(d.active(), None);
        assert_eq!(d.live_targets(), 0);
        assert!(!d.release_target(a));
    }

    #[test]
    fn sample_count_is_snapped_on_allocation() {
        let Some(gpu) = test_gpu() else { return };
        let mut d = Device::new(gpu);
        let single = d.create_target(8, 8, 0);
        assert_eq!(d.target(single).map(OffscreenTarget::samples), Some(1));
        let multi = d.create_target(8, 8, 4);
        let expected = d.gpu().sample_count(4);
        let target = d.target(multi).unwrap();
        assert_eq!(target.samples(), expected);
        assert_eq!(target.multisampled.is_some(), expected > 1);
    }

    #[test]
    fn reading_a_released_target_fails() {
        let Some(gpu) = test_gpu() else { return };
        let mut d = Device::new(gpu);
        let a = d.create_target(4, 4, 1);
        d.release_target(a);
        assert!(matches!(d.read_target(a), Err(RenderError::Render(_))));
    }
}
