pub mod png;

pub use png::write_png;
