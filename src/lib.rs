pub use handlex_internal::*;
