//! Format detection, conversion and sequenced writing of XVIZ messages.
//!
//! ```
//! use xvizio::{Format, MemorySink, Sink, XvizData, XvizFormatWriter};
//!
//! let message = XvizData::new(r#"{"type":"xviz/state_update","data":{}}"#)?;
//! assert_eq!(message.format(), Format::JsonString);
//!
//! let mut writer = XvizFormatWriter::new(MemorySink::new(), Format::BinaryGlb)?;
//! assert_eq!(writer.write_message(0, &message)?, "2-frame.glb");
//! assert!(writer.sink().has("1-metadata.glb"));
//! # Ok::<(), xvizio::XvizError>(())
//! ```

pub mod error;
pub mod value;
pub mod format;
pub mod glb;
pub mod data;
pub mod sink;
pub mod writer;

pub use error::{Result, XvizError};
pub use value::Value;
pub use format::{detect, Blob, Format};
pub use data::XvizData;
pub use sink::{DirectorySink, EntryData, MemorySink, Sink};
pub use writer::{WriterOptions, XvizFormatWriter};
