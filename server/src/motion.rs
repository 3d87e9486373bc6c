use mocap_transport::{Frame, HeaderFormat, PacketHeader, Result};

/// Produces synthetic frames for a fixed set of avatars.
///
/// Values follow phase-shifted sine waves so consecutive frames differ.
#[derive(Debug, Clone)]
pub struct MotionGenerator {
    format: HeaderFormat,
    avatars: u32,
    values: usize,
    frame_index: u32,
}

impl MotionGenerator {
    pub fn new(format: HeaderFormat, avatars: u32, values: usize) -> Self {
        Self {
            format,
            avatars: avatars.max(1),
            values,
            frame_index: 0,
        }
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// One frame per avatar for the current tick, then advances the tick.
    pub fn next_frames(&mut self) -> Vec<Frame> {
        let t = self.frame_index as f32 / 60.0;
        let frames = (0..self.avatars)
            .map(|avatar| {
                let payload = (0..self.values)
                    .map(|i| (t + avatar as f32 * 0.5 + i as f32 * 0.1).sin() * 90.0)
                    .collect();
                let mut header = PacketHeader::new(
                    self.format,
                    avatar,
                    format!("Avatar{avatar:02}"),
                    self.frame_index,
                    0,
                );
                header.with_displacement = self.format == HeaderFormat::Bvh;
                Frame::from_values(header, payload)
            })
            .collect();
        self.frame_index = self.frame_index.wrapping_add(1);
        frames
    }

    /// Encodes the next tick's frames back to back into `out`.
    pub fn encode_tick(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        out.clear();
        let frames = self.next_frames();
        for frame in &frames {
            frame.encode_into(out)?;
        }
        Ok(frames.len())
    }
}
