//! Free-index lists.
//!
//! A free index is an unsummed tensor index label carried by an expression,
//! contributing one extra component axis of its dimension. Lists are kept
//! sorted by [`IndexId`] everywhere, which fixes a canonical "declared order"
//! for the combined index space of compound expressions.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::id::IndexId;

/// One free index occurrence: the label and its axis dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreeIndex {
    pub id: IndexId,
    pub dim: usize,
}

/// Canonically ordered free-index list.
pub type FreeIndices = SmallVec<[FreeIndex; 2]>;

/// Product of all index dimensions (1 for an empty list).
pub fn dims_product(indices: &[FreeIndex]) -> usize {
    indices.iter().map(|fi| fi.dim).product()
}

/// Position of `id` in the list, if present.
pub fn position(indices: &[FreeIndex], id: IndexId) -> Option<usize> {
    indices.iter().position(|fi| fi.id == id)
}

/// Axis dimensions of the list, in order.
pub fn dims(indices: &[FreeIndex]) -> SmallVec<[usize; 4]> {
    indices.iter().map(|fi| fi.dim).collect()
}

/// Sorts a list into canonical id order. Duplicate labels must agree on
/// dimension and are collapsed to one occurrence.
pub fn canonicalize(mut indices: FreeIndices, op: &'static str) -> Result<FreeIndices, CoreError> {
    indices.sort_by_key(|fi| fi.id);
    let mut out = FreeIndices::new();
    for fi in indices {
        match out.last() {
            Some(prev) if prev.id == fi.id => {
                if prev.dim != fi.dim {
                    return Err(CoreError::IndexMismatch {
                        op,
                        reason: format!(
                            "index {} declared with dimensions {} and {}",
                            fi.id, prev.dim, fi.dim
                        ),
                    });
                }
            }
            _ => out.push(fi),
        }
    }
    Ok(out)
}

/// Union of two canonical lists; shared labels must agree on dimension.
pub fn merge(
    a: &[FreeIndex],
    b: &[FreeIndex],
    op: &'static str,
) -> Result<FreeIndices, CoreError> {
    let mut combined: FreeIndices = a.iter().chain(b.iter()).copied().collect();
    combined = canonicalize(combined, op)?;
    Ok(combined)
}

/// Removes one label from a canonical list; errors if it is not present.
pub fn remove(
    indices: &[FreeIndex],
    id: IndexId,
    op: &'static str,
) -> Result<FreeIndices, CoreError> {
    if position(indices, id).is_none() {
        return Err(CoreError::IndexMismatch {
            op,
            reason: format!("index {} is not free in the operand", id),
        });
    }
    Ok(indices.iter().filter(|fi| fi.id != id).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn fi(id: u32, dim: usize) -> FreeIndex {
        FreeIndex {
            id: IndexId(id),
            dim,
        }
    }

    #[test]
    fn dims_product_of_empty_is_one() {
        assert_eq!(dims_product(&[]), 1);
    }

    #[test]
    fn dims_product_multiplies() {
        assert_eq!(dims_product(&[fi(0, 2), fi(1, 3)]), 6);
    }

    #[test]
    fn canonicalize_sorts_and_dedups() {
        let list: FreeIndices = smallvec![fi(2, 3), fi(0, 2), fi(2, 3)];
        let canonical = canonicalize(list, "test").unwrap();
        assert_eq!(canonical.as_slice(), &[fi(0, 2), fi(2, 3)]);
    }

    #[test]
    fn canonicalize_rejects_conflicting_dims() {
        let list: FreeIndices = smallvec![fi(1, 2), fi(1, 3)];
        let err = canonicalize(list, "test").unwrap_err();
        assert!(matches!(err, CoreError::IndexMismatch { .. }));
    }

    #[test]
    fn merge_unions_shared_labels() {
        let a = [fi(0, 2), fi(1, 3)];
        let b = [fi(1, 3), fi(4, 2)];
        let merged = merge(&a, &b, "product").unwrap();
        assert_eq!(merged.as_slice(), &[fi(0, 2), fi(1, 3), fi(4, 2)]);
    }

    #[test]
    fn remove_drops_one_label() {
        let a = [fi(0, 2), fi(1, 3)];
        let rest = remove(&a, IndexId(1), "index sum").unwrap();
        assert_eq!(rest.as_slice(), &[fi(0, 2)]);
    }

    #[test]
    fn remove_missing_label_errors() {
        let a = [fi(0, 2)];
        let err = remove(&a, IndexId(9), "index sum").unwrap_err();
        assert!(matches!(err, CoreError::IndexMismatch { .. }));
    }
}
