//! # sheng-codec
//!
//! Sheng 编解码层, 提供音频帧抽象与 AAC 解码端的频域重建核心.
//!
//! 本 crate 对标 FFmpeg 的 libavcodec. 比特流解析与熵解码由调用方完成,
//! 这里只处理反量化之后的频谱.
//!
//! ## 使用示例
//!
//! ```rust
//! use sheng_codec::aac::{AacDsp, AacDspConfig, ChannelPair, IcsInfo, WindowSequence};
//!
//! let dsp = AacDsp::<f32>::new(AacDspConfig::default());
//! let ics = IcsInfo::long(WindowSequence::OnlyLong, 49).unwrap();
//! let mut cpe = ChannelPair::<f32>::new(ics);
//! cpe.ms_present = true;
//! dsp.apply_mid_side_stereo(&mut cpe);
//! ```

pub mod aac;
pub mod frame;

// 重导出常用类型
pub use frame::AudioFrame;
