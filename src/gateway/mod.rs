//! File I/O behind a narrow trait, plus the load → transform → save pipeline.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Load** | `ImageReader` → RGBA → B/G/R/A [`SharedImage`](crate::image::SharedImage) |
//! | **Save** | per-format `image` encoders, depth and alpha fitted to the format |
//! | **Process** | [`process_file`]: load, [`Operation`]s, history, save |
//!
//! The module is split into:
//! - **Parameters**: [`Quality`] and [`ImageFormat`]
//! - **Backend**: [`FormatGateway`] trait + [`RustGateway`]
//! - **Operations**: High-level functions combining transforms + gateway

pub mod backend;
pub mod operations;
mod params;
pub mod rust_gateway;

pub use backend::{Dimensions, FormatGateway, GatewayError};
pub use operations::{Operation, apply, output_path, process_file};
pub use params::{ImageFormat, Quality};
pub use rust_gateway::RustGateway;
