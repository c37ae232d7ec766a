use foundation::FrameIndex;

/// A still decoded to tightly packed RGBA8.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl DecodedFrame {
    pub fn byte_len(&self) -> usize {
        self.rgba.len()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.rgba.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

#[derive(Debug)]
pub struct DecodeError {
    pub frame_index: FrameIndex,
    source: image::ImageError,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame {} could not be decoded: {}", self.frame_index, self.source)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Decodes an encoded still (PNG or JPEG) into RGBA8.
pub fn decode_frame(frame_index: FrameIndex, bytes: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let image = image::load_from_memory(bytes).map_err(|source| DecodeError {
        frame_index,
        source,
    })?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedFrame {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}
