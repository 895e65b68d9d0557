//! Frames
//!
//! The data model every node consumes and produces:
//!
//! - **Types**: `Frame`, `Field`, `FieldData`
//! - **Import**: building base frames from CSV
//!
//! # Example
//!
//! ```rust
//! use alertexpr::frame::{Field, Frame};
//!
//! let frame = Frame::series(
//!     "A",
//!     vec![0, 10_000, 20_000],
//!     vec![Field::from_f64("cpu", vec![0.5, 0.7, 0.9]).label("host", "web-1")],
//! )
//! .unwrap();
//!
//! assert_eq!(frame.row_count(), 3);
//! ```

mod error;
mod import;
mod types;

pub use error::{FrameError, FrameResult};
pub use import::{read_csv_frame, CsvFrameReader};
pub use types::{Field, FieldData, Frame, Labels};
