pub mod array;
pub mod table;
pub mod database;
pub mod codec;
pub mod registry;
pub mod tablefile;

pub use array::{ArrayNd, IndexError};
pub use table::{Axis, Table};
pub use database::TableDatabase;
pub use codec::{Codec, CodecId, Confidence, FormatError, get_codec};
pub use registry::{CodecRegistry, Resolution};
pub use tablefile::{open_file, open_file_as, open_stream, save_file, save_stream};
