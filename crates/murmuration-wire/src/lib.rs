//! Binary snapshot frames for streaming consumers.
//!
//! Layout (little-endian, 4-byte alignment for every non-byte field):
//!
//! ```text
//! header   20 B   n:u32, step:u32, has_resources:u8, has_obstacles:u8, reserved[10]
//! agents          positions n*3*f32, velocities n*3*f32,
//!                 types n*u8 (padded to 4), energies n*f32,
//!                 targets n*i32, group_labels n*i32
//! stats    64 B   mean_speed:f32, std_speed:f32, rg:f32, polarization:f32,
//!                 n_groups:u32, reserved[44]
//! resources       present iff has_resources:
//!                 n:u32, then per resource
//!                 pos:3*f32, amount:f32, radius:f32, renewable:u8, pad[3]
//! groups          always: n:u32, then per group
//!                 id:i32, size:i32, centroid:3*f32, velocity:3*f32, radius:f32
//! ```
//!
//! The `has_obstacles` flag is carried for layout compatibility; no obstacle
//! block is defined and encoders always write zero.

use glam::Vec3;
use murmuration_core::{Diagnostics, GroupAggregate, ResourceView, Snapshot};
use thiserror::Error;

/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 20;
/// Fixed statistics block length in bytes.
pub const STATS_LEN: usize = 64;
/// Bytes per resource record.
pub const RESOURCE_RECORD_LEN: usize = 24;
/// Bytes per group record.
pub const GROUP_RECORD_LEN: usize = 36;

/// Errors raised while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("frame has {0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

/// Bytes required for a frame with the given population and block sizes.
#[must_use]
pub fn frame_len(n_agents: usize, n_resources: usize, n_groups: usize) -> usize {
    let type_pad = (4 - (n_agents % 4)) % 4;
    let agents = n_agents * 12 * 2 + n_agents + type_pad + n_agents * 4 * 3;
    let resources = if n_resources > 0 {
        4 + n_resources * RESOURCE_RECORD_LEN
    } else {
        0
    };
    HEADER_LEN + agents + STATS_LEN + resources + 4 + n_groups * GROUP_RECORD_LEN
}

/// Encode a snapshot into one binary frame.
#[must_use]
pub fn encode_frame(snapshot: &Snapshot) -> Vec<u8> {
    let n = snapshot.agent_count;
    let mut out = Vec::with_capacity(frame_len(
        n,
        snapshot.resources.len(),
        snapshot.groups.len(),
    ));

    // Header.
    out.extend_from_slice(&(n as u32).to_le_bytes());
    out.extend_from_slice(&(snapshot.step.min(u32::MAX as u64) as u32).to_le_bytes());
    out.push(u8::from(!snapshot.resources.is_empty()));
    out.push(0); // has_obstacles: reserved, no block defined
    out.extend_from_slice(&[0u8; 10]);

    for p in &snapshot.positions {
        put_vec3(&mut out, *p);
    }
    for v in &snapshot.velocities {
        put_vec3(&mut out, *v);
    }
    out.extend_from_slice(&snapshot.kinds);
    out.resize(out.len() + (4 - (n % 4)) % 4, 0);
    for e in &snapshot.energies {
        out.extend_from_slice(&e.to_le_bytes());
    }
    for t in &snapshot.targets {
        out.extend_from_slice(&t.to_le_bytes());
    }
    for g in &snapshot.group_labels {
        out.extend_from_slice(&g.to_le_bytes());
    }

    // Statistics block.
    let stats = &snapshot.stats;
    out.extend_from_slice(&stats.mean_speed.to_le_bytes());
    out.extend_from_slice(&stats.std_speed.to_le_bytes());
    out.extend_from_slice(&stats.rg.to_le_bytes());
    out.extend_from_slice(&stats.polarization.to_le_bytes());
    out.extend_from_slice(&stats.n_groups.to_le_bytes());
    out.extend_from_slice(&[0u8; 44]);

    if !snapshot.resources.is_empty() {
        out.extend_from_slice(&(snapshot.resources.len() as u32).to_le_bytes());
        for resource in &snapshot.resources {
            put_vec3(&mut out, resource.position);
            out.extend_from_slice(&resource.amount.to_le_bytes());
            out.extend_from_slice(&resource.radius.to_le_bytes());
            out.push(u8::from(resource.renewable));
            out.extend_from_slice(&[0u8; 3]);
        }
    }

    out.extend_from_slice(&(snapshot.groups.len() as u32).to_le_bytes());
    for group in &snapshot.groups {
        out.extend_from_slice(&group.id.to_le_bytes());
        out.extend_from_slice(&(group.size as i32).to_le_bytes());
        put_vec3(&mut out, group.centroid.to_array());
        put_vec3(&mut out, group.mean_velocity.to_array());
        out.extend_from_slice(&group.radius.to_le_bytes());
    }

    out
}

/// A decoded frame; mirrors the wire layout rather than full engine state.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub step: u32,
    pub positions: Vec<[f32; 3]>,
    pub velocities: Vec<[f32; 3]>,
    pub kinds: Vec<u8>,
    pub energies: Vec<f32>,
    pub targets: Vec<i32>,
    pub group_labels: Vec<i32>,
    pub stats: Diagnostics,
    pub resources: Vec<ResourceView>,
    pub groups: Vec<GroupAggregate>,
}

/// Decode one frame, verifying the exact layout.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, FrameError> {
    let mut cursor = Cursor::new(bytes);
    let n = cursor.u32()? as usize;
    let step = cursor.u32()?;
    let has_resources = cursor.u8()? != 0;
    let _has_obstacles = cursor.u8()?;
    cursor.skip(10)?;

    let mut positions = Vec::with_capacity(n);
    for _ in 0..n {
        positions.push(cursor.vec3()?);
    }
    let mut velocities = Vec::with_capacity(n);
    for _ in 0..n {
        velocities.push(cursor.vec3()?);
    }
    let mut kinds = Vec::with_capacity(n);
    for _ in 0..n {
        kinds.push(cursor.u8()?);
    }
    cursor.skip((4 - (n % 4)) % 4)?;
    let mut energies = Vec::with_capacity(n);
    for _ in 0..n {
        energies.push(cursor.f32()?);
    }
    let mut targets = Vec::with_capacity(n);
    for _ in 0..n {
        targets.push(cursor.i32()?);
    }
    let mut group_labels = Vec::with_capacity(n);
    for _ in 0..n {
        group_labels.push(cursor.i32()?);
    }

    let stats = Diagnostics {
        mean_speed: cursor.f32()?,
        std_speed: cursor.f32()?,
        rg: cursor.f32()?,
        polarization: cursor.f32()?,
        n_groups: cursor.u32()?,
    };
    cursor.skip(44)?;

    let mut resources = Vec::new();
    if has_resources {
        let count = cursor.u32()? as usize;
        for _ in 0..count {
            let position = cursor.vec3()?;
            let amount = cursor.f32()?;
            let radius = cursor.f32()?;
            let renewable = cursor.u8()? != 0;
            cursor.skip(3)?;
            resources.push(ResourceView {
                position,
                amount,
                radius,
                renewable,
            });
        }
    }

    let mut groups = Vec::new();
    let count = cursor.u32()? as usize;
    for _ in 0..count {
        let id = cursor.i32()?;
        let size = cursor.i32()?.max(0) as u32;
        let centroid = Vec3::from_array(cursor.vec3()?);
        let mean_velocity = Vec3::from_array(cursor.vec3()?);
        let radius = cursor.f32()?;
        groups.push(GroupAggregate {
            id,
            size,
            centroid,
            mean_velocity,
            radius,
        });
    }

    cursor.finish()?;
    Ok(DecodedFrame {
        step,
        positions,
        velocities,
        kinds,
        energies,
        targets,
        group_labels,
        stats,
        resources,
        groups,
    })
}

fn put_vec3(out: &mut Vec<u8>, v: [f32; 3]) {
    for component in v {
        out.extend_from_slice(&component.to_le_bytes());
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        let end = self.offset.checked_add(len).ok_or(FrameError::Truncated {
            offset: self.offset,
            needed: len,
        })?;
        if end > self.bytes.len() {
            return Err(FrameError::Truncated {
                offset: self.offset,
                needed: len,
            });
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), FrameError> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, FrameError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, FrameError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32, FrameError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn vec3(&mut self) -> Result<[f32; 3], FrameError> {
        Ok([self.f32()?, self.f32()?, self.f32()?])
    }

    fn finish(&self) -> Result<(), FrameError> {
        let rest = self.bytes.len() - self.offset;
        if rest == 0 {
            Ok(())
        } else {
            Err(FrameError::TrailingBytes(rest))
        }
    }
}
