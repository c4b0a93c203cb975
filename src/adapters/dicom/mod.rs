//! DICOM JSON adapter
//!
//! - [`dictionary`] - keyword/tag/VR lookup for symbolic selectors
//! - [`convert`] - DICOM JSON model ⇄ [`RecordTree`](crate::domain::RecordTree)

pub mod convert;
pub mod dictionary;

pub use convert::{from_json, to_json};
