//! Running averages and rank-based accuracy.

/// Weighted running average of a scalar over one epoch.
///
/// `average()` is `NaN` while nothing has been accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMetric {
    sum: f64,
    count: f64,
}

impl RunningMetric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate `value` with the given weight (usually the batch size)
    pub fn update(&mut self, value: f64, weight: f64) {
        self.sum += value * weight;
        self.count += weight;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0.0 {
            f64::NAN
        } else {
            self.sum / self.count
        }
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0.0;
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0.0
    }
}

/// Loss, top-1 and top-2 trackers of one pass
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochMeters {
    pub loss: RunningMetric,
    pub top1: RunningMetric,
    pub top2: RunningMetric,
}

impl EpochMeters {
    /// Record one batch; the batch size is the weight of every tracker
    pub fn record(&mut self, loss: f64, scores: &[Vec<f32>], targets: &[usize]) {
        let weight = targets.len() as f64;
        if weight == 0.0 {
            return;
        }
        self.loss.update(loss, weight);
        self.top1.update(top_k_accuracy(scores, targets, 1), weight);
        self.top2.update(top_k_accuracy(scores, targets, 2), weight);
    }

    /// `[loss, top1, top2]` averages
    pub fn averages(&self) -> [f64; 3] {
        [self.loss.average(), self.top1.average(), self.top2.average()]
    }
}

/// Class indices ordered by descending score.
///
/// The sort is stable so equal scores keep the lower index first; NaN
/// scores rank last.
pub fn ranked_classes(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (scores[a], scores[b]);
        match (sa.is_nan(), sb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal),
        }
    });
    order
}

/// Whether `target` is among the `k` highest-scoring classes
pub fn in_top_k(scores: &[f32], target: usize, k: usize) -> bool {
    ranked_classes(scores).iter().take(k).any(|&class| class == target)
}

/// Fraction of rows whose target is within the top `k` classes
pub fn top_k_accuracy(scores: &[Vec<f32>], targets: &[usize], k: usize) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let hits = scores
        .iter()
        .zip(targets)
        .filter(|(row, &target)| in_top_k(row, target, k))
        .count();
    hits as f64 / targets.len() as f64
}
