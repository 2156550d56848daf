//! Frame statistics: the mean/variance summary of a run entry, and the
//! quick-look numbers and histogram of a single shot.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use fitsio::compat::fitsfile::FitsFile;
use fitsio::compat::images::{ImageDescription, ImageType, WriteImage};
use image::{ImageBuffer, Luma};
use ndarray::{s, Array2, ArrayView2, Axis};

use crate::error::SensorResult;
use crate::frame::FrameSet;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Summary {
    pub mean: f64,
    /// Per-pixel variance across frames, averaged over the sensor. Only
    /// defined with two or more frames.
    pub variance: Option<f64>,
}

pub fn summarize(set: &FrameSet) -> Summary {
    match set {
        FrameSet::Single(frame) => Summary {
            mean: frame.mapv(f64::from).mean().unwrap_or(f64::NAN),
            variance: None,
        },
        FrameSet::Stack(stack) => {
            let stack = stack.mapv(f64::from);
            let variance = (stack.len_of(Axis(0)) > 1)
                .then(|| stack.var_axis(Axis(0), 0.0).mean())
                .flatten();
            Summary {
                mean: stack.mean().unwrap_or(f64::NAN),
                variance,
            }
        }
    }
}

/// Quick-look numbers for one frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameStats {
    pub min: u16,
    pub max: u16,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

impl FrameStats {
    pub fn of(frame: ArrayView2<u16>) -> Option<Self> {
        let mut sorted: Vec<u16> = frame.iter().copied().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();
        let n = sorted.len();
        let median = if n % 2 == 1 {
            f64::from(sorted[n / 2])
        } else {
            (f64::from(sorted[n / 2 - 1]) + f64::from(sorted[n / 2])) / 2.0
        };
        let values = frame.mapv(f64::from);
        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: values.mean()?,
            median,
            std: values.std(0.0),
        })
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Min {} Max {} Mean {:.2} Median {:.2} Std {:.2}",
            self.min, self.max, self.mean, self.median, self.std
        )
    }
}

/// Equal-width bins spanning min..=max of the data.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `counts.len() + 1` bin edges
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn new(frame: ArrayView2<u16>, bins: usize) -> Option<Self> {
        let bins = bins.max(1);
        let lo = f64::from(*frame.iter().min()?);
        let mut hi = f64::from(*frame.iter().max()?);
        if hi == lo {
            hi = lo + 1.0;
        }
        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0; bins];
        for &v in frame.iter() {
            // last bin is closed on the right
            let i = ((f64::from(v) - lo) / width) as usize;
            counts[i.min(bins - 1)] += 1;
        }
        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
        Some(Self { edges, counts })
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const BAR: u64 = 50;
        let peak = self.counts.iter().copied().max().unwrap_or(0).max(1);
        for (i, count) in self.counts.iter().enumerate() {
            let bar = "#".repeat((count * BAR / peak) as usize);
            writeln!(
                f,
                "{:>9.1} - {:<9.1} {:>9} {bar}",
                self.edges[i],
                self.edges[i + 1],
                count
            )?;
        }
        Ok(())
    }
}

/// Save a frame as a 16-bit grayscale image, format picked from the extension.
pub fn write_png(frame: &Array2<u16>, path: &Path) -> SensorResult<()> {
    let (h, w) = frame.dim();
    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(
        u32::try_from(w).context("frame too wide")?,
        u32::try_from(h).context("frame too tall")?,
        frame.iter().copied().collect(),
    )
    .ok_or(anyhow::anyhow!("no img from frame"))?;
    img.save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Single-HDU FITS image. Samples are stored as 32-bit integers since FITS
/// has no unsigned 16-bit type, and rows go bottom-up to match the FITS origin.
pub fn write_fits(frame: &Array2<u16>, path: &Path) -> SensorResult<()> {
    let (h, w) = frame.dim();
    let description = ImageDescription {
        data_type: ImageType::Long,
        dimensions: vec![w, h],
    };
    let mut fptr = FitsFile::create(path)
        .overwrite()
        .open()
        .map_err(|e| anyhow::anyhow!("creating {}: {e}", path.display()))?;
    let hdu = fptr
        .create_image("PRIMARY", &description)
        .map_err(|e| anyhow::anyhow!("creating image HDU in {}: {e}", path.display()))?;
    let data: Vec<i32> = frame.slice(s![..;-1, ..]).iter().map(|&v| i32::from(v)).collect();
    i32::write_image(&mut fptr, &hdu, &data)
        .map_err(|e| anyhow::anyhow!("writing {}: {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsio::compat::images::ReadImage;
    use ndarray::{arr2, arr3};

    #[test]
    fn stack_variance_is_per_pixel_across_frames() {
        // pixel (0,0): 1,3 -> var 1; pixel (0,1): 5,5 -> var 0
        let set = FrameSet::Stack(arr3(&[[[1u16, 5]], [[3, 5]]]));
        let s = summarize(&set);
        assert_eq!(s.mean, 3.5);
        assert_eq!(s.variance, Some(0.5));
    }

    #[test]
    fn spatial_structure_is_not_variance() {
        // a fixed pattern repeated exactly has no temporal noise
        let frame = arr2(&[[0u16, 100], [1000, 40000]]);
        let views = [frame.view(), frame.view(), frame.view()];
        let set = FrameSet::Stack(ndarray::stack(Axis(0), &views).unwrap());
        assert_eq!(summarize(&set).variance, Some(0.0));
    }

    #[test]
    fn single_frame_has_no_variance() {
        let s = summarize(&FrameSet::Single(arr2(&[[2u16, 4], [6, 8]])));
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.variance, None);
    }

    #[test]
    fn frame_stats() {
        let frame = arr2(&[[4u16, 1], [3, 2]]);
        let st = FrameStats::of(frame.view()).unwrap();
        assert_eq!((st.min, st.max), (1, 4));
        assert_eq!(st.mean, 2.5);
        assert_eq!(st.median, 2.5);
        assert!((st.std - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(
            st.to_string(),
            "Min 1 Max 4 Mean 2.50 Median 2.50 Std 1.12"
        );

        let odd = arr2(&[[9u16, 1, 5]]);
        assert_eq!(FrameStats::of(odd.view()).unwrap().median, 5.0);
        assert!(FrameStats::of(Array2::<u16>::zeros((0, 3)).view()).is_none());
    }

    #[test]
    fn histogram_bins_cover_min_to_max() {
        let frame = arr2(&[[0u16, 1, 2, 3], [4, 5, 6, 10]]);
        let hist = Histogram::new(frame.view(), 5).unwrap();
        assert_eq!(hist.edges, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(hist.counts, vec![2, 2, 2, 1, 1]);
        assert_eq!(hist.total(), 8);
        assert_eq!(hist.to_string().lines().count(), 5);
    }

    #[test]
    fn flat_frame_lands_in_first_bin() {
        let frame = Array2::<u16>::from_elem((3, 3), 240);
        let hist = Histogram::new(frame.view(), 4).unwrap();
        assert_eq!(hist.counts, vec![9, 0, 0, 0]);
    }

    #[test]
    fn png_keeps_16_bit_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let frame = arr2(&[[0u16, 1000, 65535], [7, 8, 9]]);
        write_png(&frame, &path).unwrap();
        let img = image::open(&path).unwrap().into_luma16();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 0).0[0], 65535);
        assert_eq!(img.get_pixel(1, 0).0[0], 1000);
        assert_eq!(img.get_pixel(0, 1).0[0], 7);
    }

    #[test]
    fn fits_keeps_samples_and_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.fits");
        let frame = arr2(&[[0u16, 1000, 65535], [7, 8, 9]]);
        write_fits(&frame, &path).unwrap();

        let fptr = FitsFile::open(&path).unwrap();
        let hdu = fptr.hdu(0).unwrap();
        assert_eq!(hdu.read_key::<i64>(&fptr, "NAXIS1").unwrap(), 3);
        assert_eq!(hdu.read_key::<i64>(&fptr, "NAXIS2").unwrap(), 2);
        let data = i32::read_image(&fptr, &hdu).unwrap();
        // bottom row first
        assert_eq!(data, vec![7, 8, 9, 0, 1000, 65535]);

        let back = Array2::from_shape_vec((2, 3), data).unwrap();
        let back = back.slice(s![..;-1, ..]).mapv(|v| v as u16);
        assert_eq!(back, frame);
    }
}
