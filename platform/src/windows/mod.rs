pub mod backend;

pub use backend::WindowsBackend;
