//! 内置滤镜实现模块.

pub mod acompressor;
pub mod aemphasis;
pub mod afftfilt;
pub mod afir;
pub mod aiir;
pub mod amix;
pub mod surround;

use sheng_codec::frame::{AudioFrame, NOPTS_VALUE};
use sheng_core::{ChannelLayout, Sample, ShengResult};

/// 由各声道采样构造输出帧, 继承采样率与时间戳
pub(crate) fn make_frame<S: Sample, P: AsRef<[S]>>(
    planes: &[P],
    sample_rate: u32,
    layout: ChannelLayout,
    pts: i64,
) -> ShengResult<AudioFrame> {
    let mut frame = AudioFrame::from_planes(planes, sample_rate, layout)?;
    frame.pts = pts;
    Ok(frame)
}

/// 按已输出采样数推算时间戳
pub(crate) fn offset_pts(first_pts: i64, samples: u64) -> i64 {
    if first_pts == NOPTS_VALUE {
        NOPTS_VALUE
    } else {
        first_pts + samples as i64
    }
}
