pub mod address;
pub mod cell;
pub mod metadata;
pub mod mint;
pub mod pointer;
pub mod raster;
pub mod valkey;
pub mod wallet;

pub use address::Address;
pub use cell::{Cell, CellBuilder, CellError, CellSlice};
pub use metadata::{Metadata, MintForm, ValidationError};
pub use mint::{MintComposer, MintError, TransactionRequest};
pub use pointer::{BoundingRect, Point, PointerEvent, PointerInput};
pub use raster::{Color, StrokeStyle};
