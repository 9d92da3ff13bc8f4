//! # sheng-core
//!
//! Sheng 音频处理核心库, 提供基础类型定义、错误处理、数值原语与变换.
//!
//! 本 crate 对标 FFmpeg 的 libavutil, 为整个 Sheng 工作区提供底层基础设施.

pub mod channel_layout;
pub mod error;
pub mod float_dsp;
pub mod sample_format;
pub mod tx;
pub mod window_func;

// 重导出常用类型
pub use channel_layout::{Channel, ChannelLayout, ChannelMask};
pub use error::{ShengError, ShengResult};
pub use float_dsp::Real;
pub use sample_format::{Sample, SampleFormat};
pub use window_func::{WindowFunc, WindowShape};
