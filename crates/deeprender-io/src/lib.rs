pub mod listing;
pub mod style_io;
pub mod volume_io;
pub mod weights;

pub use listing::list_files;
pub use style_io::{read_image, read_style, write_rgb_png};
pub use volume_io::{read_nifti, read_tiff_stack, read_volume, write_nifti, write_tiff_stack, VolumeFormat};
pub use weights::{read_npz, NpzWeights, WeightArray};
