//! Read and write pumps for a link's socket halves.

pub(crate) mod read;
pub(crate) mod write;
