pub mod directory;

pub use directory::DirectoryProvider;
