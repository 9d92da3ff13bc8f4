//! # Sheng (声)
//!
//! 纯 Rust 实现的 AAC 频域重建核心与流式音频滤镜, 对标 FFmpeg.
//!
//! - **AAC 频域重建**: 尺度因子反量化、M/S 与强度立体声、TNS、LTP
//! - **滤镜**: 分段卷积 FIR、IIR、环绕声上混、STFT 频点滤镜、预加重/去加重
//! - **日志**: 基于 tracing 的控制台与按日滚动文件日志
//!
//! # 快速开始
//!
//! ```rust
//! use sheng::codec::AudioFrame;
//! use sheng::core::ChannelLayout;
//! use sheng::filter::{FilterGraph, create_filter};
//!
//! let mut graph = FilterGraph::new();
//! graph.add_filter(create_filter("aemphasis", r#"{"type": "cd"}"#).unwrap());
//!
//! let planes = vec![vec![0.25f64; 256], vec![-0.25f64; 256]];
//! let frame = AudioFrame::from_planes(&planes, 44100, ChannelLayout::STEREO).unwrap();
//! let out = graph.process_frame(&frame).unwrap();
//! assert_eq!(out[0].nb_samples, 256);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `sheng-core` | 错误类型、采样格式、声道布局、数值原语、FFT |
//! | `sheng-codec` | 音频帧与 AAC 频域重建 |
//! | `sheng-filter` | 滤镜框架与内置音频滤镜 |

/// 核心类型与工具 (对标 libavutil)
pub use sheng_core as core;

/// 音频帧与 AAC 频域重建 (对标 libavcodec 中的 AAC 解码器)
pub use sheng_codec as codec;

/// 滤镜框架 (对标 libavfilter)
pub use sheng_filter as filter;

pub mod logging;

/// 获取 Sheng 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
