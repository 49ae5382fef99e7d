//! Raster image containers: PNG, JPEG and GIF.
//!
//! Structure checks walk the container framing by hand; the content check
//! hands the bytes to the `image` decoders.

use crate::{ArtifactSource, Findings, InspectionContext, ValidationScope};
use datalint_core::{DatasetFormat, Diagnostic, DiagnosticCode, ImageInfo, Result};
use image::ImageFormat;

/// PNG file signature.
pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// JPEG start-of-image marker plus the first byte of the next marker.
pub const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];

const JPEG_EOI: &[u8] = &[0xFF, 0xD9];
const GIF_TRAILER: u8 = 0x3B;

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Validates PNG, JPEG and GIF artifacts.
pub struct ImageValidator;

impl ImageValidator {
    /// Creates a new image validator.
    pub fn new() -> Self {
        Self
    }

    /// Validates an image of the given format.
    pub fn validate(
        &self,
        source: &ArtifactSource,
        format: DatasetFormat,
        scope: ValidationScope,
        ctx: &InspectionContext,
    ) -> Result<Findings> {
        let data = source.to_bytes()?;
        let mut findings = Findings::whole(source.len());

        let image_format = match format {
            DatasetFormat::Png => {
                check_png(&data, scope, ctx, &mut findings)?;
                ImageFormat::Png
            }
            DatasetFormat::Jpeg => {
                check_jpeg(&data, scope, &mut findings);
                ImageFormat::Jpeg
            }
            DatasetFormat::Gif => {
                check_gif(&data, scope, &mut findings);
                ImageFormat::Gif
            }
            other => {
                return Err(datalint_core::DatalintError::internal(format!(
                    "{} is not an image format",
                    other
                )));
            }
        };

        if scope.content && !findings.has_errors() {
            ctx.checkpoint()?;
            match image::load_from_memory_with_format(&data, image_format) {
                Ok(decoded) => {
                    findings.records_checked = 1;
                    findings.image = Some(ImageInfo {
                        width: decoded.width(),
                        height: decoded.height(),
                        channels: decoded.color().channel_count(),
                    });
                }
                Err(e) => findings.push(Diagnostic::error(
                    DiagnosticCode::CorruptData,
                    format!("image does not decode: {}", e),
                )),
            }
        }

        Ok(findings)
    }
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_png(
    data: &[u8],
    scope: ValidationScope,
    ctx: &InspectionContext,
    findings: &mut Findings,
) -> Result<()> {
    if !data.starts_with(PNG_SIGNATURE) {
        findings.push(
            Diagnostic::error(DiagnosticCode::BadMagic, "missing PNG signature").at_offset(0),
        );
        return Ok(());
    }

    let len = data.len();
    let mut pos = PNG_SIGNATURE.len();
    let mut first = true;

    loop {
        ctx.checkpoint()?;
        if pos == len {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptTrailer,
                    format!("no IEND chunk before end of file at offset {}", pos),
                )
                .at_offset(pos as u64),
            );
            return Ok(());
        }
        if len - pos < 12 {
            findings.push(
                Diagnostic::error(DiagnosticCode::Truncated, "chunk header is cut off")
                    .at_offset(pos as u64),
            );
            return Ok(());
        }

        let length = be_u32(&data[pos..]) as usize;
        let kind = &data[pos + 4..pos + 8];
        let Some(end) = pos
            .checked_add(12)
            .and_then(|p| p.checked_add(length))
            .filter(|&end| end <= len)
        else {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::Truncated,
                    format!(
                        "chunk {} declares {} bytes past the end of the file",
                        String::from_utf8_lossy(kind),
                        length
                    ),
                )
                .at_offset(pos as u64),
            );
            return Ok(());
        };

        let body = &data[pos + 4..pos + 8 + length];
        let stored = be_u32(&data[pos + 8 + length..]);
        if crc32fast::hash(body) != stored {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::Checksum,
                    format!("CRC mismatch in {} chunk", String::from_utf8_lossy(kind)),
                )
                .at_offset(pos as u64),
            );
        }

        if first && scope.header {
            let payload = &data[pos + 8..pos + 8 + length];
            if kind != b"IHDR" || length != 13 {
                findings.push(
                    Diagnostic::error(DiagnosticCode::BadHeader, "first chunk is not IHDR")
                        .at_offset(pos as u64),
                );
            } else if be_u32(payload) == 0 || be_u32(&payload[4..]) == 0 {
                findings.push(
                    Diagnostic::error(DiagnosticCode::BadHeader, "image has a zero dimension")
                        .at_offset(pos as u64),
                );
            }
        }
        first = false;

        pos = end;
        if kind == b"IEND" {
            if pos < len {
                findings.push(
                    Diagnostic::warning(
                        DiagnosticCode::CorruptTrailer,
                        format!("{} bytes of trailing data after IEND", len - pos),
                    )
                    .at_offset(pos as u64),
                );
            }
            return Ok(());
        }
        if findings.error_budget_spent() {
            return Ok(());
        }
    }
}

fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

fn check_jpeg(data: &[u8], scope: ValidationScope, findings: &mut Findings) {
    if !data.starts_with(JPEG_SOI) {
        findings.push(
            Diagnostic::error(DiagnosticCode::BadMagic, "missing JPEG SOI marker").at_offset(0),
        );
        return;
    }

    let len = data.len();
    let mut pos = 2;
    let mut frame: Option<(u16, u16)> = None;

    while pos < len {
        if data[pos] != 0xFF {
            findings.push(
                Diagnostic::error(DiagnosticCode::CorruptData, "expected a marker segment")
                    .at_offset(pos as u64),
            );
            break;
        }
        let marker_at = pos;
        while pos < len && data[pos] == 0xFF {
            pos += 1;
        }
        let Some(&marker) = data.get(pos) else {
            break;
        };
        pos += 1;

        if marker == 0xD9 {
            break;
        }
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            continue;
        }

        if pos + 2 > len {
            findings.push(
                Diagnostic::error(DiagnosticCode::Truncated, "segment length is cut off")
                    .at_offset(marker_at as u64),
            );
            return;
        }
        let seg_len = be_u16(&data[pos..]) as usize;
        if seg_len < 2 || pos + seg_len > len {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::Truncated,
                    format!("segment 0x{:02X} runs past the end of the file", marker),
                )
                .at_offset(marker_at as u64),
            );
            return;
        }

        if is_sof(marker) && seg_len >= 7 {
            let height = be_u16(&data[pos + 3..]);
            let width = be_u16(&data[pos + 5..]);
            frame = Some((width, height));
        }
        pos += seg_len;

        if marker == 0xDA {
            break;
        }
    }

    if scope.header {
        match frame {
            None => findings.push(
                Diagnostic::error(DiagnosticCode::BadHeader, "no SOF frame header before scan data")
                    .at_offset(0),
            ),
            Some((0, _)) | Some((_, 0)) => findings.push(
                Diagnostic::error(DiagnosticCode::BadHeader, "frame has a zero dimension")
                    .at_offset(0),
            ),
            Some(_) => {}
        }
    }

    if len < 4 || &data[len - 2..] != JPEG_EOI {
        let offset = len.saturating_sub(2);
        findings.push(
            Diagnostic::error(
                DiagnosticCode::CorruptTrailer,
                format!("missing EOI marker at offset {}", offset),
            )
            .at_offset(offset as u64),
        );
    }
}

fn check_gif(data: &[u8], scope: ValidationScope, findings: &mut Findings) {
    if !(data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) {
        findings.push(
            Diagnostic::error(DiagnosticCode::BadMagic, "missing GIF signature").at_offset(0),
        );
        return;
    }
    if data.len() < 14 {
        findings.push(
            Diagnostic::error(
                DiagnosticCode::Truncated,
                "file ends inside the logical screen descriptor",
            )
            .at_offset(6),
        );
        return;
    }

    if scope.header && (le_u16(&data[6..]) == 0 || le_u16(&data[8..]) == 0) {
        findings.push(
            Diagnostic::error(DiagnosticCode::BadHeader, "logical screen has a zero dimension")
                .at_offset(6),
        );
    }

    let last = data.len() - 1;
    if data[last] != GIF_TRAILER {
        findings.push(
            Diagnostic::error(
                DiagnosticCode::CorruptTrailer,
                format!("missing trailer byte at offset {}", last),
            )
            .at_offset(last as u64),
        );
    }
}
