//! Handlers 模块
//!
//! 定义 API 请求处理器。

pub mod chat_handler;
pub mod graph_handler;
pub mod nugget_handler;
