//! Snapshot codec: deterministic binary images of configuration trees.
//!
//! The codec is pure: it turns a [`ConfigTree`] into bytes and back without
//! touching the disk.  Persistence lives in the storage crate.
//!
//! [`ConfigTree`]: crate::domain::ConfigTree

pub mod image;

pub use image::{
    decode_image, encode_image, CodecError, EncodedImage, TreeImage, FORMAT_VERSION, HEADER_SIZE,
    MAGIC, MAX_DEPTH,
};
