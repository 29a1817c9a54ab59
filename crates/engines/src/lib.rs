//! # Engines
//!
//! 外部协作方的具体实现。
//!
//! - `HttpContentEngine`: 通过 reqwest 调用 OpenAI 兼容 / Claude / Gemini 接口
//! - `MockEngine` / `ScriptedEngine`: 本地模拟与测试脚本
//! - `IdentityTranslator` / `DispatchingTranslator`: 翻译
//! - `sinks`: 发布目标 (目录 / 日志)

pub mod http;
pub mod mock;
pub mod sinks;
pub mod translate;

pub use http::{HttpContentEngine, ServiceEndpoint};
pub use mock::{MockEngine, ScriptedEngine};
pub use sinks::{ConfiguredSink, DirectorySink, LogSink};
pub use translate::{DispatchingTranslator, IdentityTranslator};
