//! Format sniffing from file-header bytes.
//!
//! Phone exports are frequently mislabelled: a "`.HEIC`" that was edited and
//! re-saved is often a plain JPEG underneath. The header decides which
//! decoder runs; the extension alone never does.

use crate::pipeline::discover::ImageAsset;
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected.
pub const HEADER_LEN: usize = 16;

/// Container markers that identify an ISO-BMFF / HEIF file. They may appear
/// anywhere in the header window (`ftyp` sits at offset 4, the brand at 8).
const HEIC_MARKERS: &[&[u8]] = &[b"ftyp", b"heic", b"heix"];

/// What the header bytes say the file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectedFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    TiffLittleEndian,
    TiffBigEndian,
    /// `ftyp` box found: HEIC or another ISO-BMFF container (MP4, MOV…).
    HeicContainer,
    /// `heic`/`heix` brand without an `ftyp` box in the window.
    Heic,
    Unknown,
}

impl DetectedFormat {
    pub fn is_heic_marker(self) -> bool {
        matches!(self, DetectedFormat::HeicContainer | DetectedFormat::Heic)
    }
}

impl fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectedFormat::Jpeg => "JPEG",
            DetectedFormat::Png => "PNG",
            DetectedFormat::Gif => "GIF",
            DetectedFormat::Bmp => "BMP",
            DetectedFormat::TiffLittleEndian => "TIFF (little-endian)",
            DetectedFormat::TiffBigEndian => "TIFF (big-endian)",
            DetectedFormat::HeicContainer => "HEIC/MP4",
            DetectedFormat::Heic => "HEIC",
            DetectedFormat::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Identify a format from the leading bytes of a file.
///
/// Fixed-offset signatures are checked first; the HEIF markers are searched
/// anywhere in `header`.
pub fn sniff_bytes(header: &[u8]) -> DetectedFormat {
    const SIGNATURES: &[(&[u8], DetectedFormat)] = &[
        (b"\xff\xd8\xff", DetectedFormat::Jpeg),
        (b"\x89PNG\r\n\x1a\n", DetectedFormat::Png),
        (b"GIF87a", DetectedFormat::Gif),
        (b"GIF89a", DetectedFormat::Gif),
        (b"BM", DetectedFormat::Bmp),
        (b"II*\x00", DetectedFormat::TiffLittleEndian),
        (b"MM\x00*", DetectedFormat::TiffBigEndian),
    ];
    for (sig, format) in SIGNATURES {
        if header.starts_with(sig) {
            return *format;
        }
    }
    if contains(header, b"ftyp") {
        DetectedFormat::HeicContainer
    } else if contains(header, b"heic") || contains(header, b"heix") {
        DetectedFormat::Heic
    } else {
        DetectedFormat::Unknown
    }
}

/// Whether any HEIF container marker occurs in `header`.
pub fn has_heic_marker(header: &[u8]) -> bool {
    HEIC_MARKERS.iter().any(|m| contains(header, m))
}

/// A file is decoded as HEIC only if it is named `.heic` **and** its header
/// carries a container marker.
pub fn is_true_heic(asset: &ImageAsset, header: &[u8]) -> bool {
    asset.claims_heic() && has_heic_marker(header)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Read up to [`HEADER_LEN`] bytes from the start of `path`.
pub fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = Vec::with_capacity(HEADER_LEN);
    file.by_ref().take(HEADER_LEN as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Diagnostic summary of one file: declared vs. detected format and size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatReport {
    /// Declared extension including the dot, or empty.
    pub extension: String,
    pub detected: DetectedFormat,
    pub size_bytes: u64,
    pub true_heic: bool,
}

impl FormatReport {
    pub fn size_mib(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for FormatReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Extension: {}, Detected: {}, Size: {:.1}MB",
            self.extension,
            self.detected,
            self.size_mib()
        )
    }
}

/// Sniff a file on disk.
pub fn format_report(asset: &ImageAsset) -> std::io::Result<FormatReport> {
    let header = read_header(&asset.path)?;
    let size_bytes = std::fs::metadata(&asset.path)?.len();
    Ok(FormatReport {
        extension: asset
            .extension()
            .map(|e| format!(".{e}"))
            .unwrap_or_default(),
        detected: sniff_bytes(&header),
        size_bytes,
        true_heic: is_true_heic(asset, &header),
    })
}
