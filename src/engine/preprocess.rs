//! Image preprocessing for the detector and the attribute classifiers

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;

use crate::error::{FaceError, FaceResult};

/// YOLO models downsample by up to 32, so input sides must be multiples of it
pub const MODEL_STRIDE: u32 = 32;

/// Letterbox padding value (ultralytics gray)
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Input size for the gender and age classifiers
pub const CLASSIFIER_INPUT_SIZE: (u32, u32) = (227, 227);

/// Per-channel mean subtracted from classifier input
pub const CLASSIFIER_MEAN: [f32; 3] = [78.426_34, 87.768_91, 114.895_85];

/// Largest detector input side accepted from a request
pub const MAX_IMAGE_SIZE: u32 = 4096;

/// Round a requested detector input size up to the model stride,
/// keeping it within `[MODEL_STRIDE, MAX_IMAGE_SIZE]`
pub fn check_image_size(size: u32) -> u32 {
    let size = size.clamp(MODEL_STRIDE, MAX_IMAGE_SIZE);
    size.div_ceil(MODEL_STRIDE) * MODEL_STRIDE
}

/// Decode image from bytes with EXIF orientation handling
pub fn decode_image(data: &[u8]) -> FaceResult<RgbImage> {
    let image = image::load_from_memory(data).map_err(|e| FaceError::Decode(e.to_string()))?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(FaceError::Decode("image dimensions are zero".to_string()));
    }

    Ok(apply_exif_orientation(data, image).to_rgb8())
}

/// Apply EXIF orientation to correct image rotation
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    };

    // https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Geometry of a letterbox resize, used to map boxes back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeInfo {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub new_width: u32,
    pub new_height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl ResizeInfo {
    /// `content_scale` shrinks the image inside the canvas (1.0 fills it)
    pub fn new(original: (u32, u32), target: u32, content_scale: f32) -> Self {
        let (orig_w, orig_h) = original;

        let scale = f32::min(
            target as f32 / orig_w as f32,
            target as f32 / orig_h as f32,
        ) * content_scale;

        let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target);
        let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target);

        let pad_x = (target - new_w) as f32 / 2.0;
        let pad_y = (target - new_h) as f32 / 2.0;

        Self {
            scale,
            offset_x: (pad_x - 0.1).round().max(0.0) as u32,
            offset_y: (pad_y - 0.1).round().max(0.0) as u32,
            new_width: new_w,
            new_height: new_h,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    /// Convert detection coordinates back to original image space
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.offset_x as f32) / self.scale;
        let y = (y - self.offset_y as f32) / self.scale;
        (x, y)
    }
}

/// Letterbox an image into a `target x target` NCHW tensor scaled to [0, 1]
pub fn letterbox(image: &RgbImage, target: u32, content_scale: f32) -> (Array4<f32>, ResizeInfo) {
    let info = ResizeInfo::new(image.dimensions(), target, content_scale);

    let resized = image::imageops::resize(image, info.new_width, info.new_height, FilterType::Triangle);

    let side = target as usize;
    let mut tensor = Array4::<f32>::from_elem((1, 3, side, side), PAD_VALUE);

    let (ox, oy) = (info.offset_x as usize, info.offset_y as usize);
    let copy_w = (info.new_width as usize).min(side - ox);
    let copy_h = (info.new_height as usize).min(side - oy);

    for y in 0..copy_h {
        for x in 0..copy_w {
            let pixel = resized.get_pixel(x as u32, y as u32);
            for c in 0..3 {
                tensor[[0, c, oy + y, ox + x]] = pixel[c] as f32 / 255.0;
            }
        }
    }

    (tensor, info)
}

/// Extract the face region, truncating box coordinates to whole pixels.
///
/// Boxes reaching past the image are clamped to it; a box with no pixels
/// inside the image is an error.
pub fn crop_face(image: &RgbImage, x1: f32, y1: f32, x2: f32, y2: f32) -> FaceResult<RgbImage> {
    let (img_w, img_h) = image.dimensions();

    let (bx1, by1, bx2, by2) = (x1 as i64, y1 as i64, x2 as i64, y2 as i64);

    let cx1 = bx1.clamp(0, img_w as i64);
    let cy1 = by1.clamp(0, img_h as i64);
    let cx2 = bx2.clamp(0, img_w as i64);
    let cy2 = by2.clamp(0, img_h as i64);

    if cx2 <= cx1 || cy2 <= cy1 {
        return Err(FaceError::InvalidFaceRegion {
            x1: bx1,
            y1: by1,
            x2: bx2,
            y2: by2,
            width: img_w,
            height: img_h,
        });
    }

    let face = image::imageops::crop_imm(
        image,
        cx1 as u32,
        cy1 as u32,
        (cx2 - cx1) as u32,
        (cy2 - cy1) as u32,
    );
    Ok(face.to_image())
}

/// Build a classifier blob: resize, keep RGB order, subtract the channel mean
pub fn blob_from_image(face: &RgbImage, size: (u32, u32), mean: [f32; 3]) -> Array4<f32> {
    let (target_w, target_h) = size;
    let resized = image::imageops::resize(face, target_w, target_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 - mean[c];
        }
    }

    tensor
}
