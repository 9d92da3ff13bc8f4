//! AAC 频域重建核心.
//!
//! 输入为熵解码后的尺度因子索引、频带类型、量化频谱与 TNS/LTP 边信息,
//! 本模块负责:
//! - 尺度因子反量化 (浮点 / 定点)
//! - M/S 与强度立体声
//! - TNS 合成 / 分析滤波
//! - LTP 预测与历史更新
//!
//! 比特流解析与 IMDCT 合成不在本模块内.

pub mod band;
pub mod dequant;
pub mod dsp;
pub mod ltp;
pub mod stereo;
pub mod tns;


pub use band::{BandType, ChannelPair, IcsInfo, SingleChannelElement, WindowSequence};
pub use dequant::{FixedSf, FloatSf, SfDequant, dequant_scalefactors, pow2sf};
pub use dsp::{AacDsp, AacDspConfig};
pub use ltp::{LtpInfo, LtpState};
pub use stereo::{MsNormalization, MsSample, apply_intensity_stereo, apply_mid_side_stereo};
pub use tns::{TnsData, TnsMode, apply_tns, compute_tns_lpc, tns_coef_from_index};
