use ndarray::{ArrayView1, ArrayView2, Axis};

/// A running metric accumulated over batches until `reset`.
pub trait Metric {
    /// Clears the accumulated state.
    fn reset(&mut self);

    /// Accumulates a batch of predictions against their targets.
    fn update(&mut self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>);

    /// Returns the metric over everything accumulated since the last reset.
    fn result(&self) -> f32;
}

/// Fraction of rows whose predicted class (argmax) matches the target's.
#[derive(Debug, Default, Clone)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for Accuracy {
    fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }

    fn update(&mut self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) {
        for (p, t) in y_pred.axis_iter(Axis(0)).zip(y.axis_iter(Axis(0))) {
            if argmax(p) == argmax(t) {
                self.correct += 1;
            }
            self.total += 1;
        }
    }

    fn result(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }

        self.correct as f32 / self.total as f32
    }
}

/// Mean absolute error over every accumulated element.
#[derive(Debug, Default, Clone)]
pub struct MeanAbsErr {
    sum: f64,
    count: usize,
}

impl MeanAbsErr {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MeanAbsErr {
    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    fn update(&mut self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) {
        for (p, t) in y_pred.iter().zip(y.iter()) {
            self.sum += (p - t).abs() as f64;
            self.count += 1;
        }
    }

    fn result(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }

        (self.sum / self.count as f64) as f32
    }
}

/// Running average of scalar observations, such as per batch losses.
#[derive(Debug, Default, Clone)]
pub struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    pub fn add(&mut self, value: f32) {
        self.sum += value as f64;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn result(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }

        (self.sum / self.count as f64) as f32
    }
}

fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}
