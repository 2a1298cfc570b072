//! Streaming per-parameter mean and variance.

/// Welford accumulator over fixed-width parameter vectors.
///
/// Two accumulators built from disjoint sample sets can be merged with
/// [`RunningMoments::merge`], which is what lets cell statistics be built
/// per shard in parallel and combined afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningMoments {
    count: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningMoments {
    /// Empty accumulator for `width` parameters.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; width],
            m2: vec![0.0; width],
        }
    }

    /// Add one parameter vector.
    pub fn push(&mut self, values: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &x) in self.mean.iter_mut().zip(&mut self.m2).zip(values) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &RunningMoments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            self.clone_from(other);
            return;
        }
        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        for p in 0..self.mean.len() {
            let delta = other.mean[p] - self.mean[p];
            self.mean[p] += delta * nb / n;
            self.m2[p] += other.m2[p] + delta * delta * na * nb / n;
        }
        self.count += other.count;
    }

    /// Number of vectors seen.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Per-parameter means.
    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-parameter sums of squared deviations.
    #[must_use]
    pub fn m2(&self) -> &[f64] {
        &self.m2
    }

    /// Unbiased per-parameter variances (zero below two samples).
    #[must_use]
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![0.0; self.mean.len()];
        }
        let dof = (self.count - 1) as f64;
        self.m2.iter().map(|m2| m2 / dof).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push() {
        let mut m = RunningMoments::new(2);
        for x in [1.0, 2.0, 3.0, 4.0] {
            m.push(&[x, 10.0 * x]);
        }
        assert_eq!(m.count(), 4);
        assert_relative_eq!(m.mean()[0], 2.5);
        assert_relative_eq!(m.variance()[0], 5.0 / 3.0);
        assert_relative_eq!(m.variance()[1], 500.0 / 3.0);
    }

    #[test]
    fn test_merge_matches_sequential() {
        let data: Vec<f64> = (0..37).map(|i| (f64::from(i) * 0.7).sin() * 3.0).collect();
        let mut all = RunningMoments::new(1);
        data.iter().for_each(|x| all.push(&[*x]));

        let mut left = RunningMoments::new(1);
        let mut right = RunningMoments::new(1);
        data[..11].iter().for_each(|x| left.push(&[*x]));
        data[11..].iter().for_each(|x| right.push(&[*x]));
        left.merge(&right);

        assert_eq!(left.count(), all.count());
        assert_relative_eq!(left.mean()[0], all.mean()[0], epsilon = 1e-12);
        assert_relative_eq!(left.m2()[0], all.m2()[0], epsilon = 1e-10);
    }

    #[test]
    fn test_merge_into_empty() {
        let mut empty = RunningMoments::new(1);
        let mut one = RunningMoments::new(1);
        one.push(&[4.0]);
        empty.merge(&one);
        assert_eq!(empty, one);
        assert_eq!(empty.variance(), vec![0.0]);
    }
}
