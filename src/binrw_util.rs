//! Utility types for the binrw codec layer.

pub mod helpers;
pub mod pos_marker;

pub mod prelude {
    pub use super::helpers::*;
    pub use super::pos_marker::PosMarker;
}
