use handlex_core::layout::Layout;

/// Kernel metadata `[dims, strides.., offsets..]` for `operands` iterated over `shape`, or
/// `None` when every operand is contiguous from element 0 and the fast path applies.
pub(crate) fn prepare_metadata(shape: &[usize], operands: &[&Layout]) -> Option<Vec<usize>> {
    if operands.iter().all(|layout| layout.is_contiguous() && layout.offset() == 0) {
        return None;
    }

    let mut metadata = Vec::with_capacity(shape.len() * (operands.len() + 1) + operands.len());
    metadata.extend_from_slice(shape);
    for layout in operands {
        metadata.extend_from_slice(layout.strides());
    }
    metadata.extend(operands.iter().map(|layout| layout.offset()));
    Some(metadata)
}
