use wgpu::util::DeviceExt;

use crate::error::GpuError;

pub async fn map_buffer_u32(buffer: &wgpu::Buffer, device: &wgpu::Device) -> Result<Vec<u32>, GpuError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .await
        .map_err(|_| GpuError::Readback("map callback dropped".into()))?
        .map_err(|err| GpuError::Readback(err.to_string()))?;
    let data = slice.get_mapped_range();
    let result = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    buffer.unmap();
    Ok(result)
}

/// Zero-initialised storage buffer of at least `min_bytes`.
pub fn storage_buffer(
    device: &wgpu::Device,
    label: &'static str,
    bytes: u64,
    min_bytes: u64,
    extra_usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: padded_size(bytes, min_bytes),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | extra_usage,
        mapped_at_creation: false,
    })
}

/// Storage buffer holding `contents`; an empty slice yields `min_bytes` of zeros
/// so the buffer can still be bound.
pub fn storage_buffer_init(
    device: &wgpu::Device,
    label: &'static str,
    contents: &[u8],
    min_bytes: u64,
) -> wgpu::Buffer {
    if (contents.len() as u64) < min_bytes {
        let mut padded = contents.to_vec();
        padded.resize(min_bytes as usize, 0);
        return device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &padded,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
    }
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn uniform_buffer<T: bytemuck::Pod>(device: &wgpu::Device, label: &'static str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Rounds up to a multiple of 4 (copy alignment) and to at least `min_bytes`.
pub fn padded_size(bytes: u64, min_bytes: u64) -> u64 {
    let size = bytes.max(min_bytes).max(4);
    (size + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_size_respects_minimum_and_alignment() {
        assert_eq!(padded_size(0, 16), 16);
        assert_eq!(padded_size(0, 0), 4);
        assert_eq!(padded_size(13, 4), 16);
        assert_eq!(padded_size(64, 32), 64);
    }
}
