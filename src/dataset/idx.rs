//! Parser for the IDX-style binary dataset format.
//!
//! Images and labels arrive as two separate streams, each with a big-endian
//! header followed by a raw `u8` payload:
//!
//! - image stream: magic `0x00000803`, sample count, row count, column count,
//!   then `count * rows * cols` pixel bytes
//! - label stream: magic `0x00000801`, sample count, then `count` label bytes
//!
//! Both headers must declare the same sample count before any cap is applied.
//! Every malformed input is reported as an `Err`; the parser never panics on
//! bad bytes.

use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::{Dataset, Sample};

/// Expected magic number of an image stream.
pub const IMAGE_MAGIC: u32 = 0x0000_0803;
/// Expected magic number of a label stream.
pub const LABEL_MAGIC: u32 = 0x0000_0801;

fn decode_error(message: String) -> Box<dyn Error> {
    Box::new(io::Error::new(io::ErrorKind::InvalidData, message))
}

fn read_be_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32, Box<dyn Error>> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("stream ended while reading {}", what),
        ),
        _ => e,
    })?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_payload<R: Read>(
    reader: &mut R,
    len: usize,
    what: &str,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} truncated: expected {} payload bytes", what, len),
        ),
        _ => e,
    })?;
    Ok(payload)
}

/// Parse an image stream and a label stream into a [`Dataset`].
///
/// `cap` limits how many samples are decoded; `None` decodes everything the
/// headers declare. The cap never masks a malformed file: header counts are
/// compared before it is applied.
///
/// # Arguments
///
/// * `images` - Image stream starting at the magic number
/// * `labels` - Label stream starting at the magic number
/// * `cap` - Optional upper bound on decoded samples
///
/// # Errors
///
/// Returns an error when a magic number is wrong, the image dimensions are
/// not square, the two headers disagree on the sample count, a payload is
/// shorter than its header implies, or a label byte is outside `0..=9`.
pub fn parse_dataset<R1: Read, R2: Read>(
    mut images: R1,
    mut labels: R2,
    cap: Option<usize>,
) -> Result<Dataset, Box<dyn Error>> {
    let image_magic = read_be_u32(&mut images, "image magic number")?;
    if image_magic != IMAGE_MAGIC {
        return Err(decode_error(format!(
            "bad image magic number {:#010x}, expected {:#010x}",
            image_magic, IMAGE_MAGIC
        )));
    }
    let image_count = read_be_u32(&mut images, "image count")? as usize;
    let rows = read_be_u32(&mut images, "row count")? as usize;
    let cols = read_be_u32(&mut images, "column count")? as usize;

    if rows != cols {
        return Err(decode_error(format!(
            "image dimensions {}x{} are not square",
            rows, cols
        )));
    }
    if rows == 0 {
        return Err(decode_error("image dimensions are zero".to_string()));
    }

    let label_magic = read_be_u32(&mut labels, "label magic number")?;
    if label_magic != LABEL_MAGIC {
        return Err(decode_error(format!(
            "bad label magic number {:#010x}, expected {:#010x}",
            label_magic, LABEL_MAGIC
        )));
    }
    let label_count = read_be_u32(&mut labels, "label count")? as usize;

    if image_count != label_count {
        return Err(decode_error(format!(
            "sample count mismatch: image header declares {} but label header declares {}",
            image_count, label_count
        )));
    }

    let decoded = match cap {
        Some(limit) => limit.min(image_count),
        None => image_count,
    };

    let pixel_count = rows * cols;
    let image_bytes = decoded
        .checked_mul(pixel_count)
        .ok_or_else(|| decode_error("image payload size overflows".to_string()))?;

    let pixels = read_payload(&mut images, image_bytes, "image stream")?;
    let label_bytes = read_payload(&mut labels, decoded, "label stream")?;

    for (index, &label) in label_bytes.iter().enumerate() {
        if label > 9 {
            return Err(decode_error(format!(
                "label value {} at index {} is out of range (expected 0-9)",
                label, index
            )));
        }
    }

    let samples = pixels
        .chunks_exact(pixel_count)
        .zip(label_bytes)
        .map(|(chunk, label)| Sample::new(chunk.to_vec(), label))
        .collect();

    Ok(Dataset::new(rows, samples))
}

/// Open two files and parse them with [`parse_dataset`].
///
/// # Errors
///
/// Returns an error when either file cannot be opened, plus every decode
/// error [`parse_dataset`] reports.
pub fn parse_dataset_files<P: AsRef<Path>, Q: AsRef<Path>>(
    image_path: P,
    label_path: Q,
    cap: Option<usize>,
) -> Result<Dataset, Box<dyn Error>> {
    let images = BufReader::new(File::open(image_path.as_ref())?);
    let labels = BufReader::new(File::open(label_path.as_ref())?);
    let dataset = parse_dataset(images, labels, cap)?;

    log::info!(
        "loaded {} samples of {}x{} pixels from {}",
        dataset.count(),
        dataset.width(),
        dataset.width(),
        image_path.as_ref().display()
    );
    Ok(dataset)
}
