//! Top-k accuracy

use ndarray::{ArrayBase, Data, Ix1, Ix2};
use runtime_core::{Error, Result};
use std::cmp::Ordering;

/// Percentage of samples whose target class is among the `k` highest
/// scores, for every `k` in `topk`.
///
/// `output` is `(batch, num_classes)`, `target` is `(batch,)`. Ties rank
/// the lower class index first.
pub fn accuracy<A, S, T>(
    output: &ArrayBase<S, Ix2>,
    target: &ArrayBase<T, Ix1>,
    topk: &[usize],
) -> Result<Vec<f64>>
where
    A: PartialOrd + Copy,
    S: Data<Elem = A>,
    T: Data<Elem = usize>,
{
    let (batch_size, num_classes) = output.dim();
    if batch_size != target.len() {
        return Err(Error::InvalidArgument {
            message: format!(
                "output has {} rows but target has {} labels",
                batch_size,
                target.len()
            ),
        });
    }
    if batch_size == 0 {
        return Err(Error::InvalidArgument {
            message: "accuracy of an empty batch".to_string(),
        });
    }
    if let Some(&k) = topk.iter().find(|&&k| k == 0 || k > num_classes) {
        return Err(Error::InvalidArgument {
            message: format!("k = {} out of range for {} classes", k, num_classes),
        });
    }

    // Rank of the target class within each row
    let mut ranks = Vec::with_capacity(batch_size);
    for (row, &label) in output.outer_iter().zip(target.iter()) {
        if label >= num_classes {
            return Err(Error::InvalidArgument {
                message: format!("target {} out of range for {} classes", label, num_classes),
            });
        }
        let score = row[label];
        let rank = row
            .iter()
            .enumerate()
            .filter(|&(class, other)| match other.partial_cmp(&score) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => class < label,
                _ => false,
            })
            .count();
        ranks.push(rank);
    }

    Ok(topk
        .iter()
        .map(|&k| {
            let correct = ranks.iter().filter(|&&rank| rank < k).count();
            correct as f64 * 100.0 / batch_size as f64
        })
        .collect())
}
