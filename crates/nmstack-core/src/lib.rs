//! nmstack core
//!
//! スタック設定、フェーズカタログ、ファイル描画、準備完了ポーリングを提供します。
//! Docker には依存しない。

pub mod catalogue;
pub mod config;
pub mod error;
pub mod manifest;
pub mod phase;
pub mod poller;
pub mod secrets;
pub mod template;

pub use catalogue::{SERVICE_DIRS, build_plan, images};
pub use config::*;
pub use error::*;
pub use manifest::*;
pub use phase::*;
pub use poller::*;
pub use secrets::Secrets;
pub use template::{TemplateProcessor, Variables};
