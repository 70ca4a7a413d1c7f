pub mod ptr;

pub use ptr::Ptr;
