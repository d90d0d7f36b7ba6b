//! Sponge - Nugget Intelligence Pipeline
//!
//! 把用户的零散输入转化为带优先级的知识图：抽取候选知识单元、打分、去重合并、
//! 原子写入图，并给出下一个最值得追问的问题。

pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;
