//! Gzip-compressed IDX image and label files.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use ndarray::{s, Array2};
use walkdir::WalkDir;

use crate::common::error::{PipelineError, PipelineResult};

use super::domain::Shard;

pub const LABELS_FILE: &str = "labels.gz";
pub const IMAGES_FILE: &str = "images.gz";

const LABELS_MAGIC: u32 = 2049;
const IMAGES_MAGIC: u32 = 2051;

/// Images flattened to rows of pixels in `[0, 1]`, with their labels.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageSet {
    pub images: Array2<f32>,
    pub labels: Vec<u8>,
}

impl ImageSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.images.ncols()
    }

    pub fn shard(&self, shard: Shard) -> ImageSet {
        ImageSet {
            images: self.images.slice(s![shard.start..shard.end, ..]).to_owned(),
            labels: self.labels[shard.start..shard.end].to_vec(),
        }
    }
}

/// First file called `name` anywhere under `root`.
pub fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}

fn read_gz(path: &Path) -> PipelineResult<Vec<u8>> {
    let file = File::open(path).map_err(|err| PipelineError::store(path.display(), err))?;
    let mut out = Vec::new();
    GzDecoder::new(BufReader::new(file))
        .read_to_end(&mut out)
        .map_err(|err| PipelineError::data_format(format!("{}: {err}", path.display())))?;
    Ok(out)
}

fn header(bytes: &[u8], words: usize, source: &str) -> PipelineResult<Vec<u32>> {
    if bytes.len() < words * 4 {
        return Err(PipelineError::data_format(format!(
            "{source}: truncated IDX header"
        )));
    }
    Ok(bytes[..words * 4]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode an IDX label file body.
pub fn parse_labels(bytes: &[u8], source: &str) -> PipelineResult<Vec<u8>> {
    let head = header(bytes, 2, source)?;
    if head[0] != LABELS_MAGIC {
        return Err(PipelineError::data_format(format!(
            "{source}: bad label magic {}",
            head[0]
        )));
    }
    let labels = bytes[8..].to_vec();
    if labels.len() != head[1] as usize {
        return Err(PipelineError::data_format(format!(
            "{source}: header says {} labels, found {}",
            head[1],
            labels.len()
        )));
    }
    Ok(labels)
}

/// Decode an IDX image file body into one row per image, scaled by 1/255.
pub fn parse_images(bytes: &[u8], source: &str) -> PipelineResult<Array2<f32>> {
    let head = header(bytes, 4, source)?;
    if head[0] != IMAGES_MAGIC {
        return Err(PipelineError::data_format(format!(
            "{source}: bad image magic {}",
            head[0]
        )));
    }
    let oversized = || PipelineError::data_format(format!("{source}: IDX dimensions overflow"));
    let count = head[1] as usize;
    let pixels = (head[2] as usize).checked_mul(head[3] as usize).ok_or_else(oversized)?;
    let expected = count.checked_mul(pixels).ok_or_else(oversized)?;
    let body = &bytes[16..];
    if body.len() != expected {
        return Err(PipelineError::data_format(format!(
            "{source}: expected {count}x{pixels} pixels, found {} bytes",
            body.len()
        )));
    }
    let scaled = body.iter().map(|p| f32::from(*p) / 255.0).collect();
    Array2::from_shape_vec((count, pixels), scaled)
        .map_err(|err| PipelineError::data_format(format!("{source}: {err}")))
}

/// Load `labels.gz` and `images.gz` found under `dir`.
pub fn load_dir(dir: &Path) -> PipelineResult<ImageSet> {
    let locate = |name: &str| {
        find_file(dir, name).ok_or_else(|| {
            PipelineError::config(format!("no {name} under {}", dir.display()))
        })
    };
    let labels_path = locate(LABELS_FILE)?;
    let images_path = locate(IMAGES_FILE)?;

    let labels = parse_labels(&read_gz(&labels_path)?, &labels_path.display().to_string())?;
    let images = parse_images(&read_gz(&images_path)?, &images_path.display().to_string())?;
    if images.nrows() != labels.len() {
        return Err(PipelineError::data_format(format!(
            "{} images but {} labels under {}",
            images.nrows(),
            labels.len(),
            dir.display()
        )));
    }
    tracing::info!(dir = %dir.display(), samples = labels.len(), features = images.ncols(), "image set loaded");
    Ok(ImageSet { images, labels })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;
    use std::path::Path;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gz(path: &Path, bytes: &[u8]) {
        let mut enc = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::fast());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap();
    }

    pub fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut out = 2049u32.to_be_bytes().to_vec();
        out.extend((labels.len() as u32).to_be_bytes());
        out.extend(labels);
        out
    }

    pub fn idx_images(count: usize, rows: u32, cols: u32, pixel: impl Fn(usize, usize) -> u8) -> Vec<u8> {
        let mut out = 2051u32.to_be_bytes().to_vec();
        for word in [count as u32, rows, cols] {
            out.extend(word.to_be_bytes());
        }
        let pixels = (rows * cols) as usize;
        for i in 0..count {
            out.extend((0..pixels).map(|p| pixel(i, p)));
        }
        out
    }

    /// Write a gzip IDX pair into `dir`.
    pub fn write_set(dir: &Path, labels: &[u8], rows: u32, cols: u32, pixel: impl Fn(usize, usize) -> u8) {
        std::fs::create_dir_all(dir).unwrap();
        gz(&dir.join("labels.gz"), &idx_labels(labels));
        gz(&dir.join("images.gz"), &idx_images(labels.len(), rows, cols, pixel));
    }
}
