//! L2 normalization

use ndarray::{Array, ArrayBase, Axis, Data, Dimension, NdFloat};
use runtime_core::{Error, Result};

/// Divide by the L2 norm.
///
/// A 1-D input is scaled by its own norm and `axis` is ignored. A 2-D input
/// is normalized per column (`axis = 0`) or per row (`axis = 1`). Lanes with
/// zero norm are returned unchanged.
pub fn normalize<A, S, D>(feat: &ArrayBase<S, D>, axis: usize) -> Result<Array<A, D>>
where
    A: NdFloat,
    S: Data<Elem = A>,
    D: Dimension,
{
    let lane_axis = match (feat.ndim(), axis) {
        (1, _) => Axis(0),
        (2, 0) | (2, 1) => Axis(axis),
        (2, other) => {
            return Err(Error::InvalidArgument {
                message: format!("axis value should be 0 or 1 (cannot handle axis {})", other),
            })
        }
        (ndim, _) => {
            return Err(Error::InvalidArgument {
                message: format!("normalize expects a 1-D or 2-D array, got {}-D", ndim),
            })
        }
    };

    let mut out = feat.to_owned();
    for mut lane in out.lanes_mut(lane_axis) {
        let norm = lane.iter().fold(A::zero(), |acc, &v| acc + v * v).sqrt();
        if norm > A::zero() {
            lane.mapv_inplace(|v| v / norm);
        }
    }
    Ok(out)
}
