// THEORY:
// Calibration happens once, before the first frame, and produces two plain
// values: the per-team HSV ranges and the camera-to-layout homography. This
// module only moves those values between disk and memory; the interactive tools
// that pick them are separate programs.
//
// Both artifacts live next to the run's other outputs (`hsv_ranges.json`,
// `h_matrix.json`) so a second run over the same video picks them up without
// being told. An explicit path always wins over the per-video directory.
//
// The two artifacts fail differently. Without color ranges no player can be
// assigned a team, so that is fatal. Without a homography the run still has a
// useful camera pane, so the caller gets `None` and continues un-projected.

use crate::core_modules::color_classifier::{ColorClassifier, ColorRange};
use crate::core_modules::projector::{Correspondence, Homography};
use crate::error::{Result, VisionError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const HSV_RANGES_FILE: &str = "hsv_ranges.json";
pub const HOMOGRAPHY_FILE: &str = "h_matrix.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn load_hsv_ranges(path: impl AsRef<Path>) -> Result<Vec<ColorRange>> {
    read_json(path.as_ref())
}

pub fn save_hsv_ranges(path: impl AsRef<Path>, ranges: &[ColorRange]) -> Result<()> {
    write_json(path.as_ref(), ranges)
}

pub fn load_homography(path: impl AsRef<Path>) -> Result<Homography> {
    read_json(path.as_ref())
}

pub fn save_homography(path: impl AsRef<Path>, homography: &Homography) -> Result<()> {
    write_json(path.as_ref(), homography)
}

pub fn load_correspondences(path: impl AsRef<Path>) -> Result<Vec<Correspondence>> {
    read_json(path.as_ref())
}

/// Build the team classifier from the explicit ranges file, or from
/// `hsv_ranges.json` in `output_dir`. Missing ranges are fatal.
pub fn resolve_classifier(explicit: Option<&Path>, output_dir: &Path) -> Result<ColorClassifier> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output_dir.join(HSV_RANGES_FILE));
    if !path.exists() {
        return Err(VisionError::CalibrationMissing(format!(
            "no HSV ranges at {}",
            path.display()
        )));
    }

    let ranges = load_hsv_ranges(&path)?;
    info!("Loaded {} HSV range(s) from {}", ranges.len(), path.display());
    ColorClassifier::new(ranges)
}

/// Find the homography for this run.
///
/// Point correspondences take precedence: the homography is estimated from them
/// and written to `h_matrix.json` in `output_dir`. Otherwise the explicit file,
/// then the one in `output_dir`, is loaded. Returns `None` when neither exists.
pub fn resolve_homography(
    explicit: Option<&Path>,
    correspondences: Option<&Path>,
    output_dir: &Path,
) -> Result<Option<Homography>> {
    if let Some(pairs_path) = correspondences {
        let pairs = load_correspondences(pairs_path)?;
        let homography = Homography::estimate(&pairs)?;
        let saved = output_dir.join(HOMOGRAPHY_FILE);
        save_homography(&saved, &homography)?;
        info!(
            "Estimated homography from {} point pair(s), saved to {}",
            pairs.len(),
            saved.display()
        );
        return Ok(Some(homography));
    }

    let path: PathBuf = match explicit {
        Some(path) => path.to_path_buf(),
        None => output_dir.join(HOMOGRAPHY_FILE),
    };
    if !path.exists() {
        if explicit.is_some() {
            warn!("Homography file {} does not exist", path.display());
        }
        return Ok(None);
    }

    let homography = load_homography(&path)?;
    info!("Loaded homography from {}", path.display());
    Ok(Some(homography))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use tempfile::TempDir;

    fn two_teams() -> Vec<ColorRange> {
        vec![
            ColorRange::new([0, 100, 100], [10, 255, 255]),
            ColorRange::new([110, 100, 100], [130, 255, 255]),
        ]
    }

    #[test]
    fn test_hsv_ranges_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(HSV_RANGES_FILE);
        save_hsv_ranges(&path, &two_teams()).unwrap();
        assert_eq!(load_hsv_ranges(&path).unwrap(), two_teams());
    }

    #[test]
    fn test_reads_nested_array_ranges() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(HSV_RANGES_FILE);
        fs::write(&path, "[[[0,100,100],[10,255,255]],[[110,100,100],[130,255,255]]]").unwrap();

        let classifier = resolve_classifier(Some(&path), dir.path()).unwrap();
        assert_eq!(classifier.team_count(), 2);
    }

    #[test]
    fn test_missing_ranges_are_fatal() {
        let dir = TempDir::new().unwrap();
        let err = resolve_classifier(None, dir.path()).unwrap_err();
        assert!(matches!(err, VisionError::CalibrationMissing(_)));
    }

    #[test]
    fn test_classifier_found_in_output_dir() {
        let dir = TempDir::new().unwrap();
        save_hsv_ranges(dir.path().join(HSV_RANGES_FILE), &two_teams()).unwrap();
        assert_eq!(resolve_classifier(None, dir.path()).unwrap().team_count(), 2);
    }

    #[test]
    fn test_missing_homography_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(resolve_homography(None, None, dir.path()).unwrap().is_none());
        let absent = dir.path().join("absent.json");
        assert!(resolve_homography(Some(&absent), None, dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_homography_loaded_from_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.json");
        let h = Homography::from([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]]);
        save_homography(&path, &h).unwrap();

        let loaded = resolve_homography(Some(&path), None, dir.path()).unwrap().unwrap();
        assert_eq!(loaded, h);
    }

    #[test]
    fn test_correspondences_are_estimated_and_saved() {
        let dir = TempDir::new().unwrap();
        let pairs_path = dir.path().join("points.json");
        fs::write(
            &pairs_path,
            r#"[
                {"camera": [0.0, 0.0], "layout": [10.0, 20.0]},
                {"camera": [100.0, 0.0], "layout": [210.0, 20.0]},
                {"camera": [100.0, 50.0], "layout": [210.0, 120.0]},
                {"camera": [0.0, 50.0], "layout": [10.0, 120.0]}
            ]"#,
        )
        .unwrap();

        let h = resolve_homography(None, Some(&pairs_path), dir.path()).unwrap().unwrap();
        let projected = h.project(Point2::new(50.0, 25.0)).unwrap();
        assert!((projected.x - 110.0).abs() < 1e-6);
        assert!((projected.y - 70.0).abs() < 1e-6);

        let saved = load_homography(dir.path().join(HOMOGRAPHY_FILE)).unwrap();
        let again = saved.project(Point2::new(50.0, 25.0)).unwrap();
        assert!((again.x - 110.0).abs() < 1e-6);
    }

    #[test]
    fn test_too_few_correspondences_fail() {
        let dir = TempDir::new().unwrap();
        let pairs_path = dir.path().join("points.json");
        fs::write(&pairs_path, r#"[{"camera": [0.0, 0.0], "layout": [1.0, 1.0]}]"#).unwrap();
        assert!(resolve_homography(None, Some(&pairs_path), dir.path()).is_err());
    }
}
