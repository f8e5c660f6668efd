pub mod error;
pub mod vli;
pub mod check;
pub mod filter;
pub mod stream_flags;
pub mod index;

pub use error::{Error, ErrorClass, Result, Status};
pub use check::Check;
pub use filter::{filters_copy, BuiltinFilters, Filter, FilterChain, FilterId, FilterRegistry};
pub use stream_flags::{compare, FlagsComparison, StreamFlags};
pub use index::{encode_index, IndexHash, IndexRecord, IndexState};
