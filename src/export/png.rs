use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};

use crate::error::WriteError;
use crate::render::Figure;

/// `<dir>/<input stem>.png`, where `dir` is `output_dir` or the input's own directory.
pub fn output_path(input: &Path, output_dir: Option<&Path>) -> Result<PathBuf, WriteError> {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WriteError::NoFileName(input.to_path_buf()))?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let mut name = stem.to_os_string();
    name.push(".png");
    Ok(dir.join(name))
}

/// Encode `figure` as PNG next to `input` (or in `output_dir`).
///
/// The image is first written to a hidden sibling and then renamed over the
/// target, so a failed encode leaves no partial PNG behind.
pub fn write_png(figure: &Figure, input: &Path, output_dir: Option<&Path>) -> Result<PathBuf, WriteError> {
    let target = output_path(input, output_dir)?;

    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|source| WriteError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
            log::info!("Created output directory {}", dir.display());
        }
    }

    let image = RgbImage::from_raw(figure.width, figure.height, figure.pixels.clone()).ok_or(
        WriteError::BufferSize {
            width: figure.width,
            height: figure.height,
        },
    )?;

    let partial = partial_path(&target);
    if let Err(source) = image.save_with_format(&partial, ImageFormat::Png) {
        let _ = std::fs::remove_file(&partial);
        return Err(WriteError::Encode { path: target, source });
    }
    if let Err(source) = std::fs::rename(&partial, &target) {
        let _ = std::fs::remove_file(&partial);
        return Err(WriteError::Persist { path: target, source });
    }

    log::debug!("Wrote {}x{} PNG to {}", figure.width, figure.height, target.display());
    Ok(target)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".partial");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figure(width: u32, height: u32) -> Figure {
        Figure {
            width,
            height,
            pixels: (0..width * height * 3).map(|i| (i % 251) as u8).collect(),
        }
    }

    #[test]
    fn output_name_follows_input_stem() {
        assert_eq!(
            output_path(Path::new("/music/take 3.flac"), None).unwrap(),
            PathBuf::from("/music/take 3.png")
        );
        assert_eq!(
            output_path(Path::new("/music/song.mp3"), Some(Path::new("/tmp/plots"))).unwrap(),
            PathBuf::from("/tmp/plots/song.png")
        );
        assert_eq!(output_path(Path::new("song.wav"), None).unwrap(), PathBuf::from("song.png"));
        assert!(matches!(output_path(Path::new("/"), None), Err(WriteError::NoFileName(_))));
    }

    #[test]
    fn writes_png_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested").join("plots");
        let written = write_png(&figure(8, 5), Path::new("/somewhere/clip.wav"), Some(&out_dir)).unwrap();

        assert_eq!(written, out_dir.join("clip.png"));
        let decoded = image::open(&written).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 5));
        assert_eq!(decoded.into_raw(), figure(8, 5).pixels);
        let leftovers: Vec<_> = std::fs::read_dir(&out_dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn overwrites_existing_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("loop.ogg");
        write_png(&figure(4, 4), &input, None).unwrap();
        let written = write_png(&figure(6, 2), &input, None).unwrap();
        assert_eq!(image::open(written).unwrap().to_rgb8().dimensions(), (6, 2));
    }

    #[test]
    fn mismatched_buffer_is_rejected_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let bad = Figure {
            width: 10,
            height: 10,
            pixels: vec![0; 12],
        };
        let err = write_png(&bad, &dir.path().join("x.wav"), None).unwrap_err();
        assert!(matches!(err, WriteError::BufferSize { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
