use anyhow::{anyhow, Result};

/// Pixel layouts capture devices hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

/// Convert a captured buffer to tightly packed RGB24.
pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = (width as usize)
                .checked_mul(height as usize)
                .and_then(|v| v.checked_mul(3))
                .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
            if pixels.len() != expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            Ok(pixels.to_vec())
        }
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height),
    }
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 || h % 2 != 0 {
        return Err(anyhow!("NV12 frame needs even dimensions, got {}x{}", w, h));
    }
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i];
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let offset = (j * w + i) * 3;
            write_rgb(&mut rgb[offset..offset + 3], y, pixels[uv_index], pixels[uv_index + 1]);
        }
    }

    Ok(rgb)
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 {
        return Err(anyhow!("YUYV frame needs an even width, got {}", w));
    }
    let expected = w
        .checked_mul(h)
        .and_then(|v| v.checked_mul(2))
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; w * h * 3];
    // Each 4-byte macropixel (Y0 U Y1 V) covers two output pixels.
    for (macropixel, out) in pixels.chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
        let (y0, u, y1, v) = (macropixel[0], macropixel[1], macropixel[2], macropixel[3]);
        write_rgb(&mut out[..3], y0, u, v);
        write_rgb(&mut out[3..], y1, u, v);
    }

    Ok(rgb)
}

fn write_rgb(out: &mut [u8], y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;

    out[0] = clamp_to_u8(r);
    out[1] = clamp_to_u8(g);
    out[2] = clamp_to_u8(b);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn yuyv_conversion_produces_gray() -> Result<()> {
        let yuyv = vec![128u8; 2 * 2 * 2];
        let rgb = normalize_to_rgb(&yuyv, 2, 2, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(normalize_to_rgb(&[0u8; 6], 2, 2, PixelFormat::Yuyv).is_err());
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<()> {
        let pixels = vec![1u8; 9];
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb, pixels);
        assert!(normalize_to_rgb(&pixels, 2, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }
}
