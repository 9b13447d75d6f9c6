//! Facade crate re-exporting the hicmap workspace members.
//!
//! Enable the `core`, `matrix`, and `store` features (all on by default)
//! to pull in the corresponding crates.

#[cfg(feature = "core")]
#[doc(inline)]
pub use hicmap_core as core;

#[cfg(feature = "matrix")]
#[doc(inline)]
pub use hicmap_matrix as matrix;

#[cfg(feature = "store")]
#[doc(inline)]
pub use hicmap_store as store;
