//! Windowed running average

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tracks the latest value and the mean of the last `length` values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageMeter {
    length: usize,
    history: VecDeque<f64>,
    val: f64,
    avg: f64,
}

impl AverageMeter {
    /// Create a meter over a window of `length` values. A zero length is
    /// treated as a window of one.
    pub fn new(length: usize) -> Self {
        let length = length.max(1);
        Self {
            length,
            history: VecDeque::with_capacity(length),
            val: 0.0,
            avg: 0.0,
        }
    }

    /// Clear the window and zero the readings
    pub fn reset(&mut self) {
        self.history.clear();
        self.val = 0.0;
        self.avg = 0.0;
    }

    /// Push a value, evicting the oldest once the window is full
    pub fn update(&mut self, val: f64) {
        self.history.push_back(val);
        if self.history.len() > self.length {
            self.history.pop_front();
        }

        self.val = val;
        self.avg = self.history.iter().sum::<f64>() / self.history.len() as f64;
    }

    /// Most recent value
    pub fn val(&self) -> f64 {
        self.val
    }

    /// Mean of the retained window
    pub fn avg(&self) -> f64 {
        self.avg
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of values currently retained
    pub fn count(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }
}
