//! Small statistics helpers used by preprocessing and clustering.

use std::cmp::Ordering;

fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Median of `values`, or `None` when empty. Even lengths average the two
/// central values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(cmp_f64);
    let m = sorted.len();
    Some(if m % 2 == 1 {
        sorted[m / 2]
    } else {
        0.5 * (sorted[m / 2 - 1] + sorted[m / 2])
    })
}

/// Running median with a centred window of `width` samples, truncated at the
/// edges.
pub fn running_median(data: &[f64], width: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let half = width.max(1) / 2;
    let mut window = Vec::with_capacity(2 * half + 1);
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            window.clear();
            window.extend_from_slice(&data[lo..hi]);
            let mid = window.len() / 2;
            let (_, value, _) = window.select_nth_unstable_by(mid, cmp_f64);
            *value
        })
        .collect()
}

/// Running median over `width` samples, evaluated on a downsampled copy when
/// the window holds more than `min_points` samples.
///
/// The series is averaged in blocks so that the window spans about
/// `min_points` blocks, the running median of the blocks is computed, and the
/// result is linearly interpolated back onto the original sample grid.
pub fn fast_running_median(data: &[f64], width: usize, min_points: usize) -> Vec<f64> {
    let n = data.len();
    let min_points = min_points.max(1);
    if n == 0 || width <= min_points {
        return running_median(data, width);
    }

    let factor = width / min_points;
    let blocks: Vec<f64> = data
        .chunks(factor)
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .collect();
    let smoothed = running_median(&blocks, min_points);
    if smoothed.len() == 1 {
        return vec![smoothed[0]; n];
    }

    // Block k is centred on sample k * factor + (len_k - 1) / 2.
    let centre = |k: usize| -> f64 {
        let start = k * factor;
        let len = factor.min(n - start);
        start as f64 + (len as f64 - 1.0) / 2.0
    };

    let last = smoothed.len() - 1;
    let mut k = 0;
    (0..n)
        .map(|i| {
            let x = i as f64;
            while k < last - 1 && centre(k + 1) < x {
                k += 1;
            }
            let (x0, x1) = (centre(k), centre(k + 1));
            let t = ((x - x0) / (x1 - x0)).clamp(0.0, 1.0);
            smoothed[k] + t * (smoothed[k + 1] - smoothed[k])
        })
        .collect()
}
