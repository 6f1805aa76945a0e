//! Feature quantization for histogram training.
//!
//! Each feature gets a [`BinMapper`] holding sorted cut points. A value `v`
//! falls into bin `#{cut : cut <= v}`, so the split "bins `0..=b` go left"
//! is exactly the raw-value test `v < cuts[b]` used at inference.
//! Missing values get the reserved [`MISSING_BIN`].

use ndarray::ArrayView2;

use crate::utils::Parallelism;

/// Bin index reserved for missing values.
pub const MISSING_BIN: u8 = u8::MAX;

/// Largest number of value bins a feature can have (missing excluded).
pub const MAX_BINS: usize = MISSING_BIN as usize;

/// Cut points for one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    cuts: Vec<f32>,
}

impl BinMapper {
    /// Compute quantile cut points from the non-missing values of a feature.
    ///
    /// With at most `max_bins` distinct values every value gets its own bin
    /// (cuts at midpoints). Otherwise cuts are taken at evenly spaced
    /// quantiles.
    pub fn fit(values: impl IntoIterator<Item = f32>, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, MAX_BINS);
        let mut sorted: Vec<f32> = values.into_iter().filter(|v| !v.is_nan()).collect();
        sorted.sort_unstable_by(f32::total_cmp);

        let mut distinct = sorted.clone();
        distinct.dedup();

        let cuts = if distinct.len() <= max_bins {
            distinct
                .windows(2)
                .map(|w| w[0] + (w[1] - w[0]) / 2.0)
                .collect()
        } else {
            let n = sorted.len();
            let mut cuts: Vec<f32> = (1..max_bins).map(|k| sorted[k * n / max_bins]).collect();
            cuts.dedup();
            // The lowest value must keep a bin of its own.
            if cuts.first().is_some_and(|&c| c <= sorted[0]) {
                cuts.remove(0);
            }
            cuts
        };

        Self { cuts }
    }

    /// Number of value bins.
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.cuts.len() + 1
    }

    #[inline]
    pub fn bin(&self, value: f32) -> u8 {
        if value.is_nan() {
            MISSING_BIN
        } else {
            self.cuts.partition_point(|&c| c <= value) as u8
        }
    }

    /// Raw-value threshold for a split after bin `bin`.
    #[inline]
    pub fn threshold(&self, bin: usize) -> f32 {
        self.cuts[bin]
    }

    pub fn cuts(&self) -> &[f32] {
        &self.cuts
    }
}

/// Feature-major matrix of bin indices.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    n_rows: usize,
    bins: Vec<u8>,
    mappers: Vec<BinMapper>,
}

impl BinnedMatrix {
    /// Quantize a row-major `[n_rows, n_features]` matrix.
    pub fn from_features(features: ArrayView2<'_, f32>, max_bins: usize, parallelism: Parallelism) -> Self {
        let (n_rows, n_features) = features.dim();

        let columns = parallelism.maybe_par_map(0..n_features, |f| {
            let column = features.column(f);
            let mapper = BinMapper::fit(column.iter().copied(), max_bins);
            let bins: Vec<u8> = column.iter().map(|&v| mapper.bin(v)).collect();
            (mapper, bins)
        });

        let mut bins = Vec::with_capacity(n_rows * n_features);
        let mut mappers = Vec::with_capacity(n_features);
        for (mapper, column) in columns {
            bins.extend_from_slice(&column);
            mappers.push(mapper);
        }

        Self { n_rows, bins, mappers }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.mappers.len()
    }

    /// Bin indices of one feature for all rows.
    #[inline]
    pub fn feature(&self, feature: usize) -> &[u8] {
        &self.bins[feature * self.n_rows..(feature + 1) * self.n_rows]
    }

    #[inline]
    pub fn mapper(&self, feature: usize) -> &BinMapper {
        &self.mappers[feature]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn few_distinct_values_get_own_bins() {
        let mapper = BinMapper::fit([3.0, 1.0, 2.0, 1.0, f32::NAN], 255);
        assert_eq!(mapper.cuts(), &[1.5, 2.5]);
        assert_eq!(mapper.n_bins(), 3);
        assert_eq!(mapper.bin(1.0), 0);
        assert_eq!(mapper.bin(2.0), 1);
        assert_eq!(mapper.bin(9.0), 2);
        assert_eq!(mapper.bin(f32::NAN), MISSING_BIN);
    }

    #[test]
    fn bin_agrees_with_threshold_test() {
        let values: Vec<f32> = (0..1000).map(|i| (i % 137) as f32 * 0.37).collect();
        let mapper = BinMapper::fit(values.iter().copied(), 16);
        assert!(mapper.n_bins() <= 16);
        for &v in &values {
            let b = mapper.bin(v) as usize;
            for split in 0..mapper.n_bins() - 1 {
                assert_eq!(b <= split, v < mapper.threshold(split));
            }
        }
    }

    #[test]
    fn constant_and_all_missing_features() {
        let mapper = BinMapper::fit([5.0, 5.0, 5.0], 255);
        assert_eq!(mapper.n_bins(), 1);
        let mapper = BinMapper::fit([f32::NAN, f32::NAN], 255);
        assert_eq!(mapper.n_bins(), 1);
        assert_eq!(mapper.bin(0.0), 0);
    }

    #[test]
    fn matrix_is_feature_major() {
        let features = array![[1.0f32, 10.0], [2.0, f32::NAN], [3.0, 30.0]];
        let binned = BinnedMatrix::from_features(features.view(), 255, Parallelism::Sequential);
        assert_eq!(binned.n_rows(), 3);
        assert_eq!(binned.n_features(), 2);
        assert_eq!(binned.feature(0), &[0, 1, 2]);
        assert_eq!(binned.feature(1), &[0, MISSING_BIN, 1]);
    }
}
