//! Zip packaging of a run's screenshots

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("No screenshots found in {0}")]
    Empty(PathBuf),
}

pub fn archive_name(stamp: &str) -> String {
    format!("cashier_screenshots_{stamp}.zip")
}

/// All `.png` files directly inside `dir`, sorted by name.
pub fn collect_pngs(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let io_err = |source| ArchiveError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut pngs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            pngs.push(path);
        }
    }
    pngs.sort();
    Ok(pngs)
}

/// Zip every screenshot in `run_dir` into `run_dir/cashier_screenshots_{stamp}.zip`.
///
/// Entries are stored flat under their file names.
pub fn package_run(run_dir: &Path, stamp: &str) -> Result<PathBuf, ArchiveError> {
    let pngs = collect_pngs(run_dir)?;
    if pngs.is_empty() {
        return Err(ArchiveError::Empty(run_dir.to_path_buf()));
    }

    let archive_path = run_dir.join(archive_name(stamp));
    let file = File::create(&archive_path).map_err(|source| ArchiveError::Io {
        path: archive_path.clone(),
        source,
    })?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for png in &pngs {
        let Some(name) = png.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        debug!("Adding {name} to archive");
        zip.start_file(name, options)?;
        let source = File::open(png).map_err(|source| ArchiveError::Io {
            path: png.clone(),
            source,
        })?;
        std::io::copy(&mut BufReader::new(source), &mut zip).map_err(|source| ArchiveError::Io {
            path: png.clone(),
            source,
        })?;
    }

    let mut file = zip.finish()?;
    file.flush().map_err(|source| ArchiveError::Io {
        path: archive_path.clone(),
        source,
    })?;

    info!(
        "Packaged {} screenshot(s) into {}",
        pngs.len(),
        archive_path.display()
    );
    Ok(archive_path)
}
