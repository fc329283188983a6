//! Device log scraping: separators, tag-filtered reads, the line → event
//! adapter and lifecycle validators built on top.

pub mod events;
pub mod lifecycle;
pub mod reader;
pub mod separator;
