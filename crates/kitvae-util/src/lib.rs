pub mod background;
pub mod image;
pub mod letterbox;

pub use background::{
    apply_alpha_mask, composite_on_black, remove_background_to_black, BackgroundRemover,
    BorderKeyRemover, MaskModel, MaskModelRemover,
};
pub use image::{ImageError, ImageResult, LETTERBOX_EXTENSIONS, RAW_EXTENSIONS};
pub use letterbox::{letterbox, letterbox_dynamic, resize_area, LetterboxPlacement};
