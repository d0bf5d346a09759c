//! Array and shape utilities.
//!
//! - [`layout`]: channel-order inference and reordering
//! - [`attribution`]: attribution channel expansion and shape checks
//! - [`patches`]: patch slices, index expansion, patch counting
//! - [`modality`]: per-modality instance layouts and patch policies
//! - [`batch`]: input batches and per-instance views

pub mod attribution;
pub mod batch;
pub mod layout;
pub mod modality;
pub mod patches;

pub use attribution::{check_attributions, expand_attribution_channel, is_constant};
pub use batch::{Batch, Instance, PreparedBatch};
pub use layout::{axis, infer_channel_first, make_channel_first, make_channel_last};
pub use modality::Modality;
pub use patches::{check_patch_size, create_patch_slice, expand_indices, nr_patches, PatchGrid};
