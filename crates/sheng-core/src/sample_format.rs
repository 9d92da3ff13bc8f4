//! 音频采样格式定义.
//!
//! 对标 FFmpeg 的 `AVSampleFormat`. 除格式枚举外, 还提供 [`Sample`] trait,
//! 让滤镜的处理核心只写一份, 按采样类型单态化.

use std::fmt;

/// 音频采样格式
///
/// - 交错 (Interleaved): 所有声道的采样点交替排列, 如 LRLRLR...
/// - 平面 (Planar): 每个声道独立存储, 如 LLL...RRR...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    /// 未指定
    None,

    // ========================
    // 交错格式 (Interleaved)
    // ========================
    /// 有符号 16 位整数, 交错
    S16,
    /// 有符号 32 位整数, 交错
    S32,
    /// 32 位浮点, 交错
    F32,
    /// 64 位浮点, 交错
    F64,

    // ========================
    // 平面格式 (Planar)
    // ========================
    /// 有符号 16 位整数, 平面
    S16p,
    /// 有符号 32 位整数, 平面
    S32p,
    /// 32 位浮点, 平面
    F32p,
    /// 64 位浮点, 平面
    F64p,
}

impl SampleFormat {
    /// 每个采样点占用的字节数
    pub const fn bytes_per_sample(&self) -> usize {
        match self {
            Self::None => 0,
            Self::S16 | Self::S16p => 2,
            Self::S32 | Self::S32p | Self::F32 | Self::F32p => 4,
            Self::F64 | Self::F64p => 8,
        }
    }

    /// 是否为平面格式
    pub const fn is_planar(&self) -> bool {
        matches!(self, Self::S16p | Self::S32p | Self::F32p | Self::F64p)
    }

    /// 是否为浮点格式
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F32p | Self::F64 | Self::F64p)
    }

    /// 获取对应的平面格式
    pub const fn to_planar(&self) -> Self {
        match self {
            Self::S16 => Self::S16p,
            Self::S32 => Self::S32p,
            Self::F32 => Self::F32p,
            Self::F64 => Self::F64p,
            other => *other,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "flt",
            Self::F64 => "dbl",
            Self::S16p => "s16p",
            Self::S32p => "s32p",
            Self::F32p => "fltp",
            Self::F64p => "dblp",
        };
        write!(f, "{name}")
    }
}

/// 可在帧字节缓冲与计算类型之间转换的采样类型.
///
/// 整数采样不做归一化, 与浮点采样一样按原值参与运算; 写回整数采样时
/// 超出表示范围的值被硬削波, 由调用者统计削波次数.
pub trait Sample: Copy + Default + Send + Sync + fmt::Debug + 'static {
    /// 对应的平面采样格式
    const PLANAR_FORMAT: SampleFormat;
    /// 输出是否需要削波
    const NEEDS_CLIPPING: bool;

    /// 从小端字节读取一个采样 (`bytes` 长度为 `bytes_per_sample`)
    fn read_le(bytes: &[u8]) -> Self;

    /// 以小端字节追加到缓冲区
    fn write_le(self, out: &mut Vec<u8>);

    /// 转换为双精度计算值
    fn to_f64(self) -> f64;

    /// 从双精度值转换, 返回 (采样, 是否发生削波)
    fn from_f64_clipped(v: f64) -> (Self, bool);
}

impl Sample for f64 {
    const PLANAR_FORMAT: SampleFormat = SampleFormat::F64p;
    const NEEDS_CLIPPING: bool = false;

    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64_clipped(v: f64) -> (Self, bool) {
        (v, false)
    }
}

impl Sample for f32 {
    const PLANAR_FORMAT: SampleFormat = SampleFormat::F32p;
    const NEEDS_CLIPPING: bool = false;

    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64_clipped(v: f64) -> (Self, bool) {
        (v as f32, false)
    }
}

impl Sample for i32 {
    const PLANAR_FORMAT: SampleFormat = SampleFormat::S32p;
    const NEEDS_CLIPPING: bool = true;

    fn read_le(bytes: &[u8]) -> Self {
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64_clipped(v: f64) -> (Self, bool) {
        if v < i32::MIN as f64 {
            (i32::MIN, true)
        } else if v > i32::MAX as f64 {
            (i32::MAX, true)
        } else {
            (v as i32, false)
        }
    }
}

impl Sample for i16 {
    const PLANAR_FORMAT: SampleFormat = SampleFormat::S16p;
    const NEEDS_CLIPPING: bool = true;

    fn read_le(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64_clipped(v: f64) -> (Self, bool) {
        if v < i16::MIN as f64 {
            (i16::MIN, true)
        } else if v > i16::MAX as f64 {
            (i16::MAX, true)
        } else {
            (v as i16, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_平面格式映射() {
        assert_eq!(SampleFormat::F32.to_planar(), SampleFormat::F32p);
        assert!(SampleFormat::S16p.is_planar());
        assert!(!SampleFormat::S16p.is_float());
        assert_eq!(SampleFormat::F64p.bytes_per_sample(), 8);
        assert_eq!(SampleFormat::F32p.to_string(), "fltp");
    }

    #[test]
    fn test_整数削波() {
        assert_eq!(i16::from_f64_clipped(40000.0), (i16::MAX, true));
        assert_eq!(i16::from_f64_clipped(-40000.0), (i16::MIN, true));
        assert_eq!(i16::from_f64_clipped(123.7), (123, false));
        assert_eq!(i32::from_f64_clipped(1e12), (i32::MAX, true));
    }

    #[test]
    fn test_小端读写() {
        let mut buf = Vec::new();
        (-2.5f32).write_le(&mut buf);
        1234i16.write_le(&mut buf);
        assert_eq!(f32::read_le(&buf[0..4]), -2.5);
        assert_eq!(i16::read_le(&buf[4..6]), 1234);
    }
}
