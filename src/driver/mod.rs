//! Page drivers shipped with the crate.

mod static_page;

pub use static_page::StaticPage;
