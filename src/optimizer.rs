use crate::config::CodecTuning;
use crate::constants::{
    DEFAULT_JPEG_QUALITY, GIF_ENCODE_SPEED, MAX_OXIPNG_PRESET, PNG_QUANT_DITHERING,
    PNG_QUANT_QUALITY_MAX, PNG_QUANT_QUALITY_MIN,
};
use crate::error::{Result, SqueezeError};
use crate::{info, warn};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, ImageFormat};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Jpeg,
    Png,
    Gif,
    Svg,
    Unknown,
}

/// Detects the image format from the buffer contents. The key's extension
/// is deliberately not consulted; mislabeled objects get the pass matching
/// their actual bytes.
pub fn sniff_format(buf: &[u8]) -> SniffedFormat {
    match image::guess_format(buf) {
        Ok(ImageFormat::Jpeg) => SniffedFormat::Jpeg,
        Ok(ImageFormat::Png) => SniffedFormat::Png,
        Ok(ImageFormat::Gif) => SniffedFormat::Gif,
        _ if looks_like_svg(buf) => SniffedFormat::Svg,
        _ => SniffedFormat::Unknown,
    }
}

fn looks_like_svg(buf: &[u8]) -> bool {
    let head = &buf[..buf.len().min(1024)];
    match std::str::from_utf8(head) {
        Ok(text) => {
            let text = text.trim_start_matches('\u{feff}').trim_start();
            text.starts_with("<svg")
                || ((text.starts_with("<?xml") || text.starts_with("<!DOCTYPE svg"))
                    && text.contains("<svg"))
        }
        Err(_) => false,
    }
}

/// Compresses an image buffer with the pass matching its format.
///
/// When the primary pass produces output of exactly the input's byte length
/// (the quantizer left an indexed PNG untouched), a lossless PNG pass runs
/// over the original bytes instead. The result of the last pass executed is
/// returned as-is, even if it came out larger than the input.
pub fn optimize_image(buf: &[u8], tuning: &CodecTuning) -> Result<Vec<u8>> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }

    let primary = primary_pass(buf, tuning)?;
    let optimized = if primary.len() == buf.len() {
        lossless_png_pass(buf, tuning)?
    } else {
        primary
    };

    let reduction =
        ((buf.len() as f64 - optimized.len() as f64) / buf.len() as f64 * 100.0).round();
    info!("Reduction: {reduction}%");
    Ok(optimized)
}

fn primary_pass(buf: &[u8], tuning: &CodecTuning) -> Result<Vec<u8>> {
    match sniff_format(buf) {
        SniffedFormat::Jpeg => jpeg_pass(buf, tuning),
        SniffedFormat::Png => png_lossy_pass(buf),
        SniffedFormat::Gif => gif_pass(buf, tuning),
        SniffedFormat::Svg => Ok(svg_pass(buf)),
        SniffedFormat::Unknown => Ok(buf.to_vec()),
    }
}

/// Re-encodes a JPEG at a fixed high quality, progressive when configured.
fn jpeg_pass(buf: &[u8], tuning: &CodecTuning) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let width = u16::try_from(width)
        .map_err(|_| SqueezeError::JpegEncoding(format!("width {width} exceeds encoder limit")))?;
    let height = u16::try_from(height).map_err(|_| {
        SqueezeError::JpegEncoding(format!("height {height} exceeds encoder limit"))
    })?;

    let mut out = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut out, DEFAULT_JPEG_QUALITY);
    encoder.set_progressive(tuning.jpg_progressive);
    encoder
        .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| SqueezeError::JpegEncoding(e.to_string()))?;
    Ok(out)
}

/// Quantizes a truecolor PNG down to an indexed palette.
///
/// An already-indexed PNG is returned unchanged: the quantizer has nothing
/// to take away, and the byte-identical result is what routes the buffer
/// into the lossless fallback pass.
fn png_lossy_pass(buf: &[u8]) -> Result<Vec<u8>> {
    if png_is_indexed(buf)? {
        return Ok(buf.to_vec());
    }

    let decoded = image::load_from_memory_with_format(buf, ImageFormat::Png)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut attributes = imagequant::new();
    attributes
        .set_quality(PNG_QUANT_QUALITY_MIN, PNG_QUANT_QUALITY_MAX)
        .map_err(quant_error)?;
    let pixels: Vec<imagequant::RGBA> = rgba
        .pixels()
        .map(|p| imagequant::RGBA::new(p.0[0], p.0[1], p.0[2], p.0[3]))
        .collect();
    let mut liq_image = attributes
        .new_image(pixels, width as usize, height as usize, 0.0)
        .map_err(quant_error)?;
    let mut quantized = attributes.quantize(&mut liq_image).map_err(quant_error)?;
    quantized
        .set_dithering_level(PNG_QUANT_DITHERING)
        .map_err(quant_error)?;
    let (palette, indexed) = quantized.remapped(&mut liq_image).map_err(quant_error)?;

    encode_indexed_png(width, height, &palette, &indexed)
}

fn quant_error(e: imagequant::Error) -> SqueezeError {
    SqueezeError::PngQuantization(e.to_string())
}

fn png_is_indexed(buf: &[u8]) -> Result<bool> {
    let decoder = png::Decoder::new(Cursor::new(buf));
    let reader = decoder
        .read_info()
        .map_err(|e| SqueezeError::PngQuantization(e.to_string()))?;
    Ok(reader.info().color_type == png::ColorType::Indexed)
}

fn encode_indexed_png(
    width: u32,
    height: u32,
    palette: &[imagequant::RGBA],
    indexed: &[u8],
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(
            palette
                .iter()
                .flat_map(|color| [color.r, color.g, color.b])
                .collect::<Vec<u8>>(),
        );
        if palette.iter().any(|color| color.a != u8::MAX) {
            encoder.set_trns(palette.iter().map(|color| color.a).collect::<Vec<u8>>());
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| SqueezeError::PngQuantization(e.to_string()))?;
        writer
            .write_image_data(indexed)
            .map_err(|e| SqueezeError::PngQuantization(e.to_string()))?;
    }
    Ok(out)
}

/// Re-encodes a GIF, keeping all frames and their delays.
fn gif_pass(buf: &[u8], tuning: &CodecTuning) -> Result<Vec<u8>> {
    if tuning.gif_interlaced {
        warn!("Interlaced GIF output is not supported by the encoder; writing sequential rows");
    }

    let decoder = GifDecoder::new(Cursor::new(buf))?;
    let frames = decoder.into_frames().collect_frames()?;
    let animated = frames.len() > 1;

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, GIF_ENCODE_SPEED);
        if animated {
            encoder.set_repeat(Repeat::Infinite)?;
        }
        encoder.encode_frames(frames)?;
    }
    Ok(out)
}

/// Textual SVG minification: XML comments go, indentation between tags goes.
/// Rendered geometry is never touched.
fn svg_pass(buf: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(buf) {
        Ok(text) => minify_svg(text).into_bytes(),
        Err(_) => buf.to_vec(),
    }
}

pub(crate) fn minify_svg(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        stripped.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => rest = "",
        }
    }
    stripped.push_str(rest);

    let mut minified = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !minified.is_empty() && !(minified.ends_with('>') && line.starts_with('<')) {
            minified.push(' ');
        }
        minified.push_str(line);
    }
    minified
}

/// The lossless fallback: oxipng over the original PNG bytes. Non-PNG input
/// passes through unchanged.
fn lossless_png_pass(buf: &[u8], tuning: &CodecTuning) -> Result<Vec<u8>> {
    if sniff_format(buf) != SniffedFormat::Png {
        return Ok(buf.to_vec());
    }

    let options =
        oxipng::Options::from_preset(tuning.png_optim_level.min(MAX_OXIPNG_PRESET));
    oxipng::optimize_from_memory(buf, &options)
        .map_err(|e| SqueezeError::PngOptimization(e.to_string()))
}
