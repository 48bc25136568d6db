pub mod compile_cache;
pub mod key;

pub use compile_cache::CompileCache;
pub use key::CacheKey;
