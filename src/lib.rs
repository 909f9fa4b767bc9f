//! # rasterbuf
//!
//! An in-memory raster image container for photo tools: 8 or 16 bits per
//! channel, optional alpha, copy-on-write sharing, and a fixed-point area
//! sampling resampler that treats both depths with the same integer
//! arithmetic.
//!
//! # Data Flow
//!
//! ```text
//! file ──FormatGateway::load──▶ SharedImage ──geometry / depth / scale──▶ SharedImage ──save──▶ file
//!                                   │
//!                                   └── side-table: attributes, text, ICC, metadata, history
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`image`] | Pixel buffer, copy-on-write handle, side-table, history, depth conversion, crop/rotate/flip |
//! | [`scale`] | Area-sampling and nearest-neighbour scaling: size math, mapping tables, pixel kernels |
//! | [`fingerprint`] | MD5 content hashes (V1, V2) and history references to files |
//! | [`gateway`] | [`FormatGateway`](gateway::FormatGateway) trait, `image`-crate implementation, load → transform → save |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Copy-On-Write Handles
//!
//! [`SharedImage`](image::SharedImage) is an `Arc` over pixels and
//! side-table. Cloning is cheap; the first write through a shared handle
//! detaches it. Undo stacks and previews can hold many handles to the same
//! pixels without copying.
//!
//! ## B/G/R/A In Memory
//!
//! Pixels are stored blue first, packed, with no row padding. The gateway
//! swaps channels at the codec boundary; everything inside the crate sees a
//! single layout.
//!
//! ## Integer Resampling
//!
//! Scale weights are fixed-point integers and every shift applies to a whole
//! weighted sum. A uniform area therefore scales to exactly its own value at
//! either depth, and results are bit-identical across platforms.
//!
//! ## Null Instead Of Panic
//!
//! Invalid geometry (non-positive sizes, crops that miss the image, sizes
//! that overflow) yields a null image and a log line, never a panic.

pub mod config;
pub mod fingerprint;
pub mod gateway;
pub mod image;
pub mod output;
pub mod scale;

#[cfg(test)]
pub(crate) mod test_helpers;
