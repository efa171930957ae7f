// Tensor operations over the host kernels.

// ## Operations that create new tensors with new storage
mod _try_binary;
mod _try_memory;
mod _try_reduction;
mod _try_unary;
mod binary;
mod memory;
mod reduction;
mod unary;

// ## Operations that write into existing storage
// These bump the shared version counter and rebase the recorded history.
mod _try_inplace;
mod inplace;

// ## Operations that create new tensors with shared storage
mod _try_transform;
mod transform;
