//! Capture streams written by the generation pass and the primitive-count
//! readback.

use std::sync::mpsc;

use thiserror::Error;

use super::grid::{Grid, VERTICES_PER_TRIANGLE};

/// Bytes per captured vertex attribute (`vec4<f32>`).
pub const VERTEX_STRIDE: u64 = 16;

/// Bytes of `wgpu::util::DrawIndirectArgs`.
const INDIRECT_ARGS_SIZE: u64 = 16;

const COUNTER_SIZE: u64 = 4;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture stream needs {bytes} bytes but the device allows {limit} per storage binding")]
    TooLarge { bytes: u64, limit: u64 },

    #[error("no primitive-count copy has been recorded")]
    NothingRecorded,

    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("failed waiting for the device: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("readback callback was dropped before completion")]
    Disconnected,
}

/// More triangles were generated than the capture streams can hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("generated {triangles} triangles but capture holds at most {capacity}")]
pub struct CaptureOverflow {
    pub triangles: u32,
    pub capacity: u32,
}

/// Triangles generated by one pass, including any that were dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveCount(pub u32);

impl PrimitiveCount {
    /// Converts the number of reserved vertex slots into triangles.
    pub fn from_reserved_vertices(vertices: u32) -> Self {
        Self(vertices / VERTICES_PER_TRIANGLE)
    }

    #[inline]
    pub fn triangles(self) -> u32 {
        self.0
    }

    /// Checks the count against the stream capacity in triangles.
    pub fn validate(self, capacity_triangles: u32) -> Result<u32, CaptureOverflow> {
        if self.0 > capacity_triangles {
            return Err(CaptureOverflow {
                triangles: self.0,
                capacity: capacity_triangles,
            });
        }
        Ok(self.0)
    }
}

/// Device buffers the generation pass writes and the surface pass reads.
///
/// Overwritten by every generation pass.
pub struct CaptureBuffers {
    pub(crate) positions: wgpu::Buffer,
    pub(crate) normals: wgpu::Buffer,
    pub(crate) counter: wgpu::Buffer,
    pub(crate) indirect: wgpu::Buffer,
    capacity: u32,
}

impl CaptureBuffers {
    pub fn new(device: &wgpu::Device, grid: &Grid) -> Result<Self, CaptureError> {
        let capacity = grid.capture_capacity();
        let bytes = u64::from(capacity) * VERTEX_STRIDE;
        let limit = u64::from(device.limits().max_storage_buffer_binding_size);
        if bytes > limit {
            return Err(CaptureError::TooLarge { bytes, limit });
        }

        let stream = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };

        let positions = stream("isoflow capture positions");
        let normals = stream("isoflow capture normals");

        let counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isoflow capture counter"),
            size: COUNTER_SIZE,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let indirect = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isoflow capture draw args"),
            size: INDIRECT_ARGS_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT,
            mapped_at_creation: false,
        });

        log::debug!("capture buffers: {capacity} vertices ({bytes} bytes per stream)");

        Ok(Self {
            positions,
            normals,
            counter,
            indirect,
            capacity,
        })
    }

    /// Vertex slots per stream.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn capacity_triangles(&self) -> u32 {
        self.capacity / VERTICES_PER_TRIANGLE
    }

    #[inline]
    pub fn stream_size(&self) -> u64 {
        u64::from(self.capacity) * VERTEX_STRIDE
    }

    pub fn positions(&self) -> &wgpu::Buffer {
        &self.positions
    }

    pub fn normals(&self) -> &wgpu::Buffer {
        &self.normals
    }

    pub fn indirect(&self) -> &wgpu::Buffer {
        &self.indirect
    }
}

enum ReadbackState {
    Idle,
    /// Copy recorded into an encoder that has not been submitted yet.
    Recorded,
    Mapping(mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>),
}

/// Asynchronous readback of the vertex counter.
///
/// Per frame: [`record`](Self::record) while encoding, [`request`](Self::request)
/// after submission, [`try_read`](Self::try_read) on a later frame after the
/// device has been polled. At most one readback is in flight; frames recorded
/// meanwhile skip the copy.
pub struct PrimitiveCountQuery {
    staging: wgpu::Buffer,
    state: ReadbackState,
}

impl PrimitiveCountQuery {
    pub fn new(device: &wgpu::Device) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isoflow primitive count readback"),
            size: COUNTER_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            staging,
            state: ReadbackState::Idle,
        }
    }

    /// Whether a copy is recorded or a mapping is pending.
    pub fn in_flight(&self) -> bool {
        !matches!(self.state, ReadbackState::Idle)
    }

    /// Records a copy of `counter` if no readback is in flight.
    pub fn record(&mut self, encoder: &mut wgpu::CommandEncoder, counter: &wgpu::Buffer) -> bool {
        if self.in_flight() {
            return false;
        }
        encoder.copy_buffer_to_buffer(counter, 0, &self.staging, 0, COUNTER_SIZE);
        self.state = ReadbackState::Recorded;
        true
    }

    /// Starts mapping a recorded copy. Call after the encoder is submitted.
    pub fn request(&mut self) {
        if !matches!(self.state, ReadbackState::Recorded) {
            return;
        }
        let (tx, rx) = mpsc::channel();
        self.staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        self.state = ReadbackState::Mapping(rx);
    }

    /// Returns the count once the mapping has completed.
    pub fn try_read(&mut self) -> Option<Result<PrimitiveCount, CaptureError>> {
        let ReadbackState::Mapping(rx) = &self.state else {
            return None;
        };
        let result = match rx.try_recv() {
            Ok(result) => result.map_err(CaptureError::from),
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => Err(CaptureError::Disconnected),
        };
        self.state = ReadbackState::Idle;
        Some(result.map(|()| self.read_mapped()))
    }

    /// Blocks until the pending readback finishes.
    ///
    /// The encoder carrying the recorded copy must already be submitted.
    pub fn read_blocking(&mut self, device: &wgpu::Device) -> Result<PrimitiveCount, CaptureError> {
        if matches!(self.state, ReadbackState::Recorded) {
            self.request();
        }
        if !matches!(self.state, ReadbackState::Mapping(_)) {
            return Err(CaptureError::NothingRecorded);
        }
        device.poll(wgpu::PollType::wait_indefinitely())?;
        match self.try_read() {
            Some(result) => result,
            None => {
                self.state = ReadbackState::Idle;
                Err(CaptureError::Disconnected)
            }
        }
    }

    fn read_mapped(&self) -> PrimitiveCount {
        let vertices = {
            let mapped = self.staging.slice(..).get_mapped_range();
            bytemuck::pod_read_unaligned::<u32>(&mapped[..COUNTER_SIZE as usize])
        };
        self.staging.unmap();
        PrimitiveCount::from_reserved_vertices(vertices)
    }
}

/// Blocks until `buffer` (a `MAP_READ` staging copy) is mapped, then copies it out.
pub(crate) fn read_buffer_blocking(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> Result<Vec<u8>, CaptureError> {
    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::wait_indefinitely())?;
    rx.recv().map_err(|_| CaptureError::Disconnected)??;

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_vertices_become_triangles() {
        assert_eq!(PrimitiveCount::from_reserved_vertices(0), PrimitiveCount(0));
        assert_eq!(PrimitiveCount::from_reserved_vertices(6), PrimitiveCount(2));
    }

    #[test]
    fn count_within_capacity_passes() {
        let grid = Grid::new(3, 3, 3).unwrap();
        let capacity = grid.capture_capacity() / VERTICES_PER_TRIANGLE;
        assert_eq!(PrimitiveCount(capacity).validate(capacity), Ok(capacity));
        assert_eq!(PrimitiveCount(0).validate(capacity), Ok(0));
    }

    #[test]
    fn count_beyond_capacity_overflows() {
        assert_eq!(
            PrimitiveCount(41).validate(40),
            Err(CaptureOverflow {
                triangles: 41,
                capacity: 40,
            })
        );
    }
}
